//! Tracing subscriber initialization with configurable console formats.

use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

#[derive(Debug, Error)]
pub enum TracingInitError {
    #[error("failed to initialize tracing subscriber: {0}")]
    Init(String),
}

/// Initialize the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, falling back to the
/// configured level. Call once at process start; a second call returns an
/// error rather than silently replacing the subscriber.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TracingInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    result.map_err(|e| TracingInitError::Init(e.to_string()))
}
