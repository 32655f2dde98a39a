//! Completion listener.
//!
//! One long-lived consumer per application. It subscribes to the aggregate's
//! event topics, and for every event that carries a correlation token hands
//! the decoded event to a [`CompletionRouter`], which picks the pending table
//! and payload.
//!
//! ```text
//! EventBus ──▶ CompletionListener ──▶ CompletionRouter::route(token, event)
//!                                            │
//!                                            ├──▶ items table
//!                                            └──▶ lists table
//! ```
//!
//! Events without a token, events that fail to decode, and transport errors
//! are logged and skipped; the loop keeps running until shut down.

use futures::StreamExt;
use relay_core::correlation::{CorrelationToken, Tracked};
use relay_core::event::Event;
use relay_core::event_bus::{EventBus, EventBusError, EventStream};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Maps a tracked event to the pending table that waits for it.
pub trait CompletionRouter: Send + Sync + 'static {
    /// Event type published on the subscribed topics.
    type Event: Event + Tracked + DeserializeOwned;

    /// Resolve the entry for `token` with the payload extracted from `event`.
    ///
    /// Returns whether a waiter was woken.
    fn route(&self, token: CorrelationToken, event: Self::Event) -> bool;
}

/// Handle to the background consumer task.
///
/// Dropping the handle stops the consumer.
#[derive(Debug)]
pub struct CompletionListener {
    consumer_handle: Option<JoinHandle<()>>,
}

impl CompletionListener {
    /// Subscribe to `topics` and start routing events to `router`.
    ///
    /// The subscription is established before this returns, so any event
    /// published afterwards is seen.
    ///
    /// # Errors
    ///
    /// Returns the bus error if the subscription fails.
    pub async fn spawn<R>(
        event_bus: Arc<dyn EventBus>,
        topics: &[&str],
        router: Arc<R>,
    ) -> Result<Self, EventBusError>
    where
        R: CompletionRouter,
    {
        let stream = event_bus.subscribe(topics).await?;
        tracing::info!(?topics, "Completion listener subscribed");

        let consumer_handle = tokio::spawn(Self::consume_loop(stream, router));

        Ok(Self {
            consumer_handle: Some(consumer_handle),
        })
    }

    async fn consume_loop<R: CompletionRouter>(mut stream: EventStream, router: Arc<R>) {
        while let Some(result) = stream.next().await {
            let serialized = match result {
                Ok(serialized) => serialized,
                Err(EventBusError::Lagged { topic, skipped }) => {
                    // Waiters for skipped events run into their deadline.
                    tracing::warn!(%topic, skipped, "Completion listener lagged, events skipped");
                    metrics::counter!("correlation.listener.lagged").increment(skipped);
                    continue;
                },
                Err(error) => {
                    tracing::error!(%error, "Error receiving event for completion routing");
                    continue;
                },
            };

            if serialized.correlation_token.is_none() {
                tracing::trace!(event_type = %serialized.event_type, "Untracked event, skipping");
                continue;
            }

            let event = match serialized.decode::<R::Event>() {
                Ok(event) => event,
                Err(error) => {
                    tracing::warn!(
                        %error,
                        event_type = %serialized.event_type,
                        "Undecodable event, skipping"
                    );
                    metrics::counter!("correlation.listener.decode_errors").increment(1);
                    continue;
                },
            };

            let Some(token) = event.correlation_token() else {
                continue;
            };

            if !router.route(token, event) {
                tracing::debug!(
                    %token,
                    event_type = %serialized.event_type,
                    "Completion had no waiter"
                );
            }
        }

        tracing::info!("Completion listener stream ended");
    }

    /// Whether the consumer task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.consumer_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the consumer and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.consumer_handle.take() {
            handle.abort();
            let _ = handle.await;
            tracing::info!("Completion listener stopped");
        }
    }
}

impl Drop for CompletionListener {
    fn drop(&mut self) {
        if let Some(handle) = self.consumer_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::event_bus::InMemoryEventBus;
    use crate::pending::PendingTable;
    use relay_core::event::SerializedEvent;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Renamed {
        name: String,
        tracker: Option<CorrelationToken>,
    }

    impl Event for Renamed {
        fn event_type(&self) -> &'static str {
            "Renamed.v1"
        }
    }

    impl Tracked for Renamed {
        fn correlation_token(&self) -> Option<CorrelationToken> {
            self.tracker
        }
    }

    struct NameRouter {
        names: Arc<PendingTable<String>>,
    }

    impl CompletionRouter for NameRouter {
        type Event = Renamed;

        fn route(&self, token: CorrelationToken, event: Renamed) -> bool {
            self.names.resolve(&token, event.name)
        }
    }

    async fn listener_with_table()
    -> (Arc<InMemoryEventBus>, Arc<PendingTable<String>>, CompletionListener) {
        let bus = Arc::new(InMemoryEventBus::new());
        let names = PendingTable::new("names");
        let router = Arc::new(NameRouter {
            names: Arc::clone(&names),
        });
        let listener = CompletionListener::spawn(bus.clone(), &["names"], router).await.unwrap();
        (bus, names, listener)
    }

    #[tokio::test]
    async fn routes_tracked_event_to_waiter() {
        let (bus, names, _listener) = listener_with_table().await;
        let token = CorrelationToken::mint();
        let handle = names.register(token).unwrap();

        let event = Renamed {
            name: "groceries".to_string(),
            tracker: Some(token),
        };
        bus.publish("names", &SerializedEvent::from_event(&event).unwrap()).await.unwrap();

        assert_eq!(handle.wait(Duration::from_secs(1)).await.unwrap(), "groceries");
    }

    #[tokio::test]
    async fn skips_garbage_and_keeps_running() {
        let (bus, names, listener) = listener_with_table().await;
        let token = CorrelationToken::mint();
        let handle = names.register(token).unwrap();

        let garbage = SerializedEvent::new("Renamed.v1".to_string(), vec![0xff], Some(token));
        bus.publish("names", &garbage).await.unwrap();

        let untracked = Renamed {
            name: "ignored".to_string(),
            tracker: None,
        };
        bus.publish("names", &SerializedEvent::from_event(&untracked).unwrap()).await.unwrap();

        let event = Renamed {
            name: "kept".to_string(),
            tracker: Some(token),
        };
        bus.publish("names", &SerializedEvent::from_event(&event).unwrap()).await.unwrap();

        assert_eq!(handle.wait(Duration::from_secs(1)).await.unwrap(), "kept");
        assert!(listener.is_running());
    }

    #[tokio::test]
    async fn shutdown_stops_consumer() {
        let (_bus, _names, listener) = listener_with_table().await;
        assert!(listener.is_running());
        listener.shutdown().await;
    }
}
