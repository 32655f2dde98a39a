//! Event bus abstraction.
//!
//! Aggregates publish their events to a topic; listeners subscribe to topics
//! and receive a stream of [`SerializedEvent`]s. The completion listener is
//! one such subscriber.
//!
//! ```text
//! ┌─────────────┐   command    ┌─────────────┐   event    ┌─────────────┐
//! │  Handler    │ ───────────▶ │  Aggregate  │ ─────────▶ │  Event Bus  │
//! └─────────────┘              └─────────────┘            └──────┬──────┘
//!        ▲                                                       │
//!        │  resolve(token)                                       ▼
//!        └────────────────────────────────────────── Completion Listener
//! ```
//!
//! # Topic Naming Convention
//!
//! Topics follow the pattern `{aggregate-type}-events`, e.g. `todo-events`.

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// The subscriber fell behind and events were dropped
    #[error("Subscriber lagged on topic '{topic}', {skipped} events skipped")]
    Lagged {
        /// The topic that lagged
        topic: String,
        /// Number of events dropped
        skipped: u64,
    },

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of events from subscriptions.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SerializedEvent, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// Every subscriber of a topic receives each event published to that topic
/// once, in publish order. Events published before a subscription exists are
/// not replayed to it.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be used as `Arc<dyn EventBus>` inside effects.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of events.
    ///
    /// The subscription is live as soon as the returned future resolves:
    /// anything published afterwards is delivered on the stream.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
