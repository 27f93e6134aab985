use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: String,
    pub seq: i64,
    pub name: String,
    pub payload: serde_json::Value,
    pub created_at: String,
}

impl BusEvent {
    /// Decode the payload into a typed event body.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(self.payload.clone()).map_err(|error| {
            HandlerError(format!("invalid payload for '{}': {error}", self.name))
        })
    }
}

/// Error returned by a handler. It is logged by the bus and never reaches
/// the publisher.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

type Handler = Arc<dyn Fn(&BusEvent) -> Result<(), HandlerError> + Send + Sync>;

pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
    next_subscription: AtomicU64,
    seq: AtomicI64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            seq: AtomicI64::new(0),
        }
    }

    /// Register `handler` for `name`. Handlers for the same name run in the
    /// order they were registered.
    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&BusEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let name = name.into();
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(event = %name, subscription = id.0, "handler subscribed");
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(name)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for entries in handlers.values_mut() {
            if let Some(pos) = entries.iter().position(|(sub, _)| *sub == id) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Build an event and deliver it synchronously to every handler for
    /// `name`. Handler errors and panics are isolated per handler.
    pub fn publish(&self, name: &str, payload: serde_json::Value) -> PublishReport {
        let event = BusEvent {
            id: Uuid::new_v4().to_string(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            payload,
            created_at: Utc::now().to_rfc3339(),
        };

        // Snapshot so handlers may subscribe or publish without deadlocking.
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::debug!(event = %name, "published event has no handlers");
        }

        let mut report = PublishReport::default();
        for (subscription, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(error)) => {
                    report.failed += 1;
                    tracing::warn!(
                        event = %name,
                        subscription = subscription.0,
                        "event handler failed: {error}"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(
                        event = %name,
                        subscription = subscription.0,
                        "event handler panicked"
                    );
                }
            }
        }
        report
    }

    /// Serialize `payload` and publish it.
    pub fn emit<T: Serialize>(&self, name: &str, payload: &T) -> PublishReport {
        match serde_json::to_value(payload) {
            Ok(value) => self.publish(name, value),
            Err(error) => {
                tracing::warn!(event = %name, "event payload failed to serialize: {error}");
                PublishReport::default()
            }
        }
    }
}
