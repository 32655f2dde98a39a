//! In-process event bus.
//!
//! One `tokio::sync::broadcast` channel per topic. Each subscriber gets its
//! own receiver, so every subscriber sees every event published after it
//! subscribed, in publish order. A subscriber that falls more than
//! `capacity` events behind receives [`EventBusError::Lagged`] and then
//! continues with the oldest event still buffered.

use async_stream::stream;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use relay_core::event::SerializedEvent;
use relay_core::event_bus::{EventBus, EventBusError, EventStream};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast;

/// Default per-topic buffer.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Event bus backed by in-memory broadcast channels.
#[derive(Debug)]
pub struct InMemoryEventBus {
    topics: DashMap<String, broadcast::Sender<SerializedEvent>>,
    capacity: usize,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Create a bus with [`DEFAULT_CAPACITY`] per topic.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus buffering up to `capacity` events per topic.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of live subscribers on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |sender| sender.receiver_count())
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<SerializedEvent> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let sender = self.sender(topic);
        let topic = topic.to_string();
        let event = event.clone();

        Box::pin(async move {
            let event_type = event.event_type.clone();
            match sender.send(event) {
                Ok(receivers) => {
                    tracing::trace!(%topic, %event_type, receivers, "Event published");
                },
                Err(_) => {
                    tracing::trace!(%topic, %event_type, "Event published with no subscribers");
                },
            }
            metrics::counter!("event_bus.published", "topic" => topic).increment(1);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            if topics.is_empty() {
                return Err(EventBusError::SubscriptionFailed {
                    topics,
                    reason: "no topics given".to_string(),
                });
            }

            let streams = topics.into_iter().map(|topic| {
                let mut receiver = self.sender(&topic).subscribe();
                let events = stream! {
                    loop {
                        match receiver.recv().await {
                            Ok(event) => yield Ok(event),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                yield Err(EventBusError::Lagged { topic: topic.clone(), skipped });
                            },
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                };
                events.boxed()
            });

            let merged: EventStream = Box::pin(stream::select_all(streams));
            Ok(merged)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(event_type: &str) -> SerializedEvent {
        SerializedEvent::new(event_type.to_string(), vec![1, 2, 3], None)
    }

    async fn next(stream: &mut EventStream) -> Result<SerializedEvent, EventBusError> {
        tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("stream should yield")
            .expect("stream should not end")
    }

    #[tokio::test]
    async fn subscriber_receives_in_publish_order() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["todo-events"]).await.unwrap();

        bus.publish("todo-events", &event("A")).await.unwrap();
        bus.publish("todo-events", &event("B")).await.unwrap();

        assert_eq!(next(&mut stream).await.unwrap().event_type, "A");
        assert_eq!(next(&mut stream).await.unwrap().event_type, "B");
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = InMemoryEventBus::new();
        bus.publish("nobody", &event("A")).await.unwrap();
        assert_eq!(bus.subscriber_count("nobody"), 0);
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = InMemoryEventBus::new();
        let mut first = bus.subscribe(&["t"]).await.unwrap();
        let mut second = bus.subscribe(&["t"]).await.unwrap();
        assert_eq!(bus.subscriber_count("t"), 2);

        bus.publish("t", &event("A")).await.unwrap();

        assert_eq!(next(&mut first).await.unwrap().event_type, "A");
        assert_eq!(next(&mut second).await.unwrap().event_type, "A");
    }

    #[tokio::test]
    async fn multi_topic_subscription_merges() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["a", "b"]).await.unwrap();

        bus.publish("b", &event("from-b")).await.unwrap();
        assert_eq!(next(&mut stream).await.unwrap().event_type, "from-b");
    }

    #[tokio::test]
    async fn slow_subscriber_is_told_it_lagged() {
        let bus = InMemoryEventBus::with_capacity(2);
        let mut stream = bus.subscribe(&["t"]).await.unwrap();

        for name in ["A", "B", "C", "D"] {
            bus.publish("t", &event(name)).await.unwrap();
        }

        assert!(matches!(
            next(&mut stream).await,
            Err(EventBusError::Lagged { skipped: 2, .. })
        ));
        assert_eq!(next(&mut stream).await.unwrap().event_type, "C");
    }

    #[tokio::test]
    async fn empty_topic_list_is_rejected() {
        let bus = InMemoryEventBus::new();
        assert!(matches!(
            bus.subscribe(&[]).await,
            Err(EventBusError::SubscriptionFailed { .. })
        ));
    }
}
