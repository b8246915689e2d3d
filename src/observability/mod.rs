//! Observability: diagnostic logging initialization.
//!
//! Audit records are a separate concern (see [`crate::audit`]); this
//! module only wires up the `tracing` subscriber used for diagnostics,
//! with the console format and default filter taken from configuration.

mod tracing_init;

pub use tracing_init::{TracingInitError, init_tracing};
