//! Failed handler deliveries
//!
//! When an event handler returns an error, the `EventBus` keeps fanning out
//! to the remaining handlers and reports the failure to a `FailureSink`.
//! This is the monitoring hook for the hosting application: forward
//! failures to an error-reporting service or keep the last N in memory.

use crate::error::Result;
use crate::events::EventEnvelope;
use crate::types::now;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// A handler failure with the event that triggered it
#[derive(Debug, Clone)]
pub struct FailedDelivery {
    pub envelope: EventEnvelope,

    /// Subscriber that failed (subscription id)
    pub subscriber: String,

    pub reason: String,

    pub failed_at: DateTime<Utc>,
}

impl FailedDelivery {
    pub fn new(
        envelope: EventEnvelope,
        subscriber: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            envelope,
            subscriber: subscriber.into(),
            reason: reason.into(),
            failed_at: now(),
        }
    }
}

/// Receiver for failed deliveries
#[async_trait]
pub trait FailureSink: Send + Sync {
    /// Accept a failure; must not block the publisher for long
    async fn report(&self, failure: FailedDelivery) -> Result<()>;

    /// Number of failures currently retained
    async fn count(&self) -> Result<usize>;

    /// Most recent failures, newest first
    async fn list(&self, limit: usize) -> Result<Vec<FailedDelivery>>;
}

/// In-memory failure sink with a capacity cap
///
/// The oldest failures are dropped once `max_failures` is exceeded.
/// A cap of zero keeps everything.
pub struct MemoryFailureSink {
    failures: RwLock<VecDeque<FailedDelivery>>,
    max_failures: usize,
}

impl MemoryFailureSink {
    pub fn new(max_failures: usize) -> Self {
        Self {
            failures: RwLock::new(VecDeque::new()),
            max_failures,
        }
    }
}

impl Default for MemoryFailureSink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl FailureSink for MemoryFailureSink {
    async fn report(&self, failure: FailedDelivery) -> Result<()> {
        tracing::warn!(
            event_id = %failure.envelope.id,
            event = %failure.envelope.name,
            subscriber = %failure.subscriber,
            reason = %failure.reason,
            "Event delivery failed"
        );

        let mut failures = self.failures.write().await;
        failures.push_back(failure);

        if self.max_failures > 0 {
            while failures.len() > self.max_failures {
                failures.pop_front();
            }
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.failures.read().await.len())
    }

    async fn list(&self, limit: usize) -> Result<Vec<FailedDelivery>> {
        let failures = self.failures.read().await;
        Ok(failures.iter().rev().take(limit).cloned().collect())
    }
}
