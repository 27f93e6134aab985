//! In-process event bus used to decouple services.
//!
//! The bus provides:
//! - Named events with JSON payloads
//! - Synchronous delivery to every handler registered for a name, in
//!   registration order
//! - Per-handler error isolation: a failing or panicking handler is logged
//!   and the remaining handlers still run
//!
//! # Architecture
//!
//! There is no global registry. An `EventBus` is constructed once at startup
//! and handed to each service as `Arc<EventBus>`:
//! - `ResourceService` publishes `resource.deleted` after its delete commits
//!   and `resource.completed` after a resource reaches `completed`
//! - `collections::register_handlers` subscribes the embedding recompute to
//!   both

mod event_bus;
pub mod event_types;

#[cfg(test)]
mod tests;

pub use event_bus::{BusEvent, EventBus, HandlerError, PublishReport, SubscriptionId};
