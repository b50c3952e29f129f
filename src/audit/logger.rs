//! Audit logger
//!
//! The logger is the write-side entry point for tracked actions. It
//! validates each record, appends it to an `AuditStore`, and optionally
//! announces it on the event bus as `audit.recorded`.

use super::record::AuditRecord;
use super::store::{AuditQuery, AuditStore};
use crate::bus::EventBus;
use crate::error::{CoreError, Result};
use crate::events::DomainEvent;
use async_trait::async_trait;
use std::sync::Arc;

/// Capability to persist audit records
#[async_trait]
pub trait AuditLogger: Send + Sync {
    /// Persist a fully-populated record; returns it with its assigned id
    async fn record(&self, entry: AuditRecord) -> Result<AuditRecord>;
}

/// Audit logger backed by an `AuditStore`
pub struct StoreAuditLogger {
    store: Arc<dyn AuditStore>,
    bus: Option<Arc<EventBus>>,
}

impl StoreAuditLogger {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store, bus: None }
    }

    /// Announce each stored record on the bus
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Read records back from the underlying store
    pub async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        self.store.query(query).await
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }
}

#[async_trait]
impl AuditLogger for StoreAuditLogger {
    async fn record(&self, entry: AuditRecord) -> Result<AuditRecord> {
        entry.validate()?;
        let stored = self.store.append(entry).await?;

        let record_id = stored
            .id
            .clone()
            .ok_or_else(|| CoreError::Storage("Audit store did not assign an id".to_string()))?;

        tracing::info!(
            audit_id = %record_id,
            org = %stored.org_id,
            actor = %stored.actor,
            action = %stored.action,
            entity = ?stored.entity,
            store = self.store.name(),
            "Audit record stored"
        );

        if let Some(bus) = &self.bus {
            let event = DomainEvent::AuditRecorded {
                org_id: stored.org_id.clone(),
                record_id: record_id.clone(),
                action: stored.action,
            };
            // The stored record is authoritative; the announcement is best effort
            if let Err(e) = bus.publish(event).await {
                tracing::warn!(audit_id = %record_id, error = %e, "Failed to announce audit record");
            }
        }

        Ok(stored)
    }
}
