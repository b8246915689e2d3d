//! Audit records, audit sinks, and trusted time.
//!
//! The authorization service emits structured audit records for granted
//! access and for authentication failures; plain denies are traced
//! diagnostically but never audited (routine permission checks would
//! otherwise flood the audit trail). Sinks are fire-and-forget from the
//! engine's perspective: a sink failure is reported through the
//! diagnostic log and never alters the returned decision.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// An authorization query resolved to allow.
    AccessGranted,
    /// The principal's credential could not be validated.
    AuthenticationFailure,
}

/// A single audit event.
///
/// `timestamp` is taken from the trusted time provider and is `None` when
/// trusted time was unavailable at emission — the record is still written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub kind: AuditKind,
    pub principal: String,
    pub resource: String,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl AuditRecord {
    pub fn new(kind: AuditKind, principal: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            kind,
            principal: principal.into(),
            resource: resource.into(),
            timestamp: None,
            details: BTreeMap::new(),
        }
    }

    pub fn at(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuditError {
    #[error("audit sink failure: {0}")]
    Sink(String),
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Emits audit records as structured tracing events on the
/// `palisade::audit` target, serialized to JSON for downstream log
/// shippers.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, record: AuditRecord) -> Result<(), AuditError> {
        let payload =
            serde_json::to_string(&record).map_err(|e| AuditError::Sink(e.to_string()))?;
        tracing::info!(
            target: "palisade::audit",
            kind = ?record.kind,
            principal = %record.principal,
            resource = %record.resource,
            %payload,
            "audit event"
        );
        Ok(())
    }
}

/// Buffers audit records in memory for inspection. Used by embedded
/// deployments that forward records in batches, and by the test suite.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn drain(&self) -> Vec<AuditRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records.lock().push(record);
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum TimeError {
    #[error("trusted time unavailable: {0}")]
    Unavailable(String),
}

/// Trusted time provider for audit timestamps.
///
/// A failure here must never block an authorization decision; the service
/// degrades to a timestamp-less audit record and a diagnostic warning.
pub trait TrustedClock: Send + Sync {
    fn now(&self) -> Result<DateTime<Utc>, TimeError>;
}

/// System wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl TrustedClock for SystemClock {
    fn now(&self) -> Result<DateTime<Utc>, TimeError> {
        Ok(Utc::now())
    }
}
