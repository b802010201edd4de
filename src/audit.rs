//! Best-effort audit trail.
//!
//! Events are handed to the sink on a detached task. A failing sink is logged
//! and counted, never reported to the caller of the primary operation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use prometheus::IntCounter;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::audit::AuditEvent;

#[derive(Debug, Error)]
#[error("audit sink failed: {0}")]
pub struct AuditError(pub String);

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let details = serde_json::to_string(&event.details)
            .map_err(|err| AuditError(format!("unserializable details: {err}")))?;

        info!(
            target: "audit",
            actor = %event.actor,
            action = ?event.action,
            entity_type = ?event.entity_type,
            entity_id = %event.entity_id,
            details = %details,
            "audit event"
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| AuditError("audit buffer poisoned".to_string()))?;
        events.push(event.clone());
        Ok(())
    }
}

pub fn emit(sink: &Arc<dyn AuditSink>, failures: &IntCounter, event: AuditEvent) {
    let sink = Arc::clone(sink);
    let failures = failures.clone();

    tokio::spawn(async move {
        if let Err(err) = sink.record(&event).await {
            failures.inc();
            warn!(
                error = %err,
                action = ?event.action,
                entity_id = %event.entity_id,
                "failed to write audit event"
            );
        }
    });
}
