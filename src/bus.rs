//! In-process domain event bus
//!
//! `EventBus` fans each published `DomainEvent` out to the handlers
//! subscribed to its name, in subscription order. Handler failures are
//! isolated: the remaining handlers still run and the failure is reported
//! to the configured `FailureSink`. The bus also keeps a bounded history
//! for inspection and exposes a broadcast stream for passive observers.
//!
//! There is no persistence and no ordering guarantee between concurrent
//! publishes.

use crate::config::BusConfig;
use crate::dead_letter::{FailedDelivery, FailureSink, MemoryFailureSink};
use crate::error::Result;
use crate::events::{DomainEvent, EventEnvelope, ALL_EVENTS};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// Receives events published on the bus
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one delivery; an error is reported to the failure sink
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;
}

/// Adapts a synchronous closure into an `EventHandler`
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&EventEnvelope) -> Result<()> + Send + Sync,
{
    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        (self.0)(event)
    }
}

struct Registered {
    id: String,
    seq: u64,
    handler: Arc<dyn EventHandler>,
}

type Registry = RwLock<HashMap<String, Vec<Registered>>>;

/// Handle returned by `subscribe`
///
/// Dropping the handle leaves the handler registered; call
/// `unsubscribe` to remove it.
pub struct Subscription {
    id: String,
    name: String,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Subscription identifier (sub-<uuid>)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Event name this subscription listens to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the handler; returns false if it was already gone
    pub async fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut handlers = registry.write().await;
        let Some(list) = handlers.get_mut(&self.name) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != self.id);
        let removed = list.len() < before;
        if list.is_empty() {
            handlers.remove(&self.name);
        }
        if removed {
            tracing::debug!(subscription = %self.id, event = %self.name, "Unsubscribed");
        }
        removed
    }
}

/// Outcome of a single publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub event_id: String,
    /// Handlers that returned Ok
    pub delivered: usize,
    /// Handlers that returned an error
    pub failed: usize,
}

/// Event counts over the retained history, grouped by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCounts {
    pub names: HashMap<String, u64>,
    pub total: u64,
}

/// In-process publish/subscribe bus
pub struct EventBus {
    handlers: Arc<Registry>,
    next_seq: AtomicU64,
    history: RwLock<VecDeque<EventEnvelope>>,
    history_capacity: usize,
    stream_tx: broadcast::Sender<EventEnvelope>,
    failures: Arc<dyn FailureSink>,
}

impl EventBus {
    /// Create a bus with an in-memory failure sink
    pub fn new(config: &BusConfig) -> Self {
        let sink = MemoryFailureSink::new(config.failure_capacity);
        Self::with_failure_sink(config, Arc::new(sink))
    }

    /// Create a bus that reports handler failures to the given sink
    pub fn with_failure_sink(config: &BusConfig, failures: Arc<dyn FailureSink>) -> Self {
        let (stream_tx, _rx) = broadcast::channel(config.stream_capacity.max(1));
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
            history: RwLock::new(VecDeque::new()),
            history_capacity: config.history_capacity,
            stream_tx,
            failures,
        }
    }

    /// Register a handler for an event name (`"*"` for all events)
    pub async fn subscribe(&self, name: &str, handler: Arc<dyn EventHandler>) -> Subscription {
        let id = format!("sub-{}", uuid::Uuid::new_v4());
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        self.handlers
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .push(Registered {
                id: id.clone(),
                seq,
                handler,
            });

        tracing::debug!(subscription = %id, event = %name, "Subscribed");

        Subscription {
            id,
            name: name.to_string(),
            registry: Arc::downgrade(&self.handlers),
        }
    }

    /// Register a synchronous closure as a handler
    pub async fn subscribe_fn<F>(&self, name: &str, f: F) -> Subscription
    where
        F: Fn(&EventEnvelope) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe(name, Arc::new(FnHandler(f))).await
    }

    /// Validate and publish an event to every current subscriber
    pub async fn publish(&self, event: DomainEvent) -> Result<PublishReceipt> {
        event.validate()?;
        let envelope = EventEnvelope::new(event);

        self.remember(&envelope).await;
        // No stream receivers is fine
        let _ = self.stream_tx.send(envelope.clone());

        let targets = self.targets(&envelope.name).await;
        let mut receipt = PublishReceipt {
            event_id: envelope.id.clone(),
            delivered: 0,
            failed: 0,
        };

        for (subscriber, handler) in targets {
            match handler.handle(&envelope).await {
                Ok(()) => receipt.delivered += 1,
                Err(e) => {
                    receipt.failed += 1;
                    let failure = FailedDelivery::new(envelope.clone(), subscriber, e.to_string());
                    if let Err(sink_err) = self.failures.report(failure).await {
                        tracing::warn!(
                            event_id = %envelope.id,
                            error = %sink_err,
                            "Failure sink rejected report"
                        );
                    }
                }
            }
        }

        tracing::debug!(
            event_id = %envelope.id,
            event = %envelope.name,
            delivered = receipt.delivered,
            failed = receipt.failed,
            "Event published"
        );

        Ok(receipt)
    }

    /// Handlers for a name plus wildcard handlers, in subscription order
    async fn targets(&self, name: &str) -> Vec<(String, Arc<dyn EventHandler>)> {
        let handlers = self.handlers.read().await;
        let mut keys = vec![name];
        if name != ALL_EVENTS {
            keys.push(ALL_EVENTS);
        }
        let mut targets: Vec<(u64, String, Arc<dyn EventHandler>)> = keys
            .into_iter()
            .filter_map(|key| handlers.get(key))
            .flatten()
            .map(|r| (r.seq, r.id.clone(), r.handler.clone()))
            .collect();
        targets.sort_by_key(|(seq, _, _)| *seq);
        targets.into_iter().map(|(_, id, h)| (id, h)).collect()
    }

    async fn remember(&self, envelope: &EventEnvelope) {
        if self.history_capacity == 0 {
            return;
        }
        let mut history = self.history.write().await;
        history.push_back(envelope.clone());
        while history.len() > self.history_capacity {
            history.pop_front();
        }
    }

    /// Recently published events, newest first, optionally filtered by name
    pub async fn recent(&self, name: Option<&str>, limit: usize) -> Vec<EventEnvelope> {
        let history = self.history.read().await;
        history
            .iter()
            .rev()
            .filter(|e| name.map_or(true, |n| e.name == n))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Per-name counts over the retained history
    pub async fn counts(&self) -> EventCounts {
        let history = self.history.read().await;
        let mut counts = EventCounts::default();
        for envelope in history.iter() {
            *counts.names.entry(envelope.name.clone()).or_insert(0) += 1;
            counts.total += 1;
        }
        counts
    }

    /// Number of handlers registered under an exact name
    pub async fn subscriber_count(&self, name: &str) -> usize {
        self.handlers
            .read()
            .await
            .get(name)
            .map_or(0, |list| list.len())
    }

    /// Passive stream of every event published after this call
    ///
    /// Receivers that fall behind skip the missed events.
    pub fn stream(&self) -> impl Stream<Item = EventEnvelope> + Send + 'static {
        BroadcastStream::new(self.stream_tx.subscribe()).filter_map(|item| {
            futures::future::ready(match item {
                Ok(envelope) => Some(envelope),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged, skipped events");
                    None
                }
            })
        })
    }

    /// Sink receiving handler failures
    pub fn failures(&self) -> &Arc<dyn FailureSink> {
        &self.failures
    }
}
