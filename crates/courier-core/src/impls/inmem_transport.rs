//! InMemoryTransport: a channel-backed transport for development and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use ulid::Ulid;

use crate::domain::errors::CourierError;
use crate::ports::transport::{
    Delivery, DeliveryFeed, Publisher, Subscriber, Transport, WireMessage,
};

/// Buffered deliveries per feed before publishes start blocking.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

struct TransportState {
    /// topic -> open feeds. Closed feeds are pruned on publish.
    feeds: HashMap<String, Vec<mpsc::Sender<Box<dyn Delivery>>>>,
}

struct Shared {
    state: Mutex<TransportState>,
    published: AtomicU64,
    acked: AtomicU64,
    capacity: usize,
}

/// In-memory transport.
///
/// Every open feed on a topic receives its own copy of each published
/// message (each subscribe call behaves like an independent consumer
/// instance). Messages published without an id get a fresh ULID, matching
/// the outbound-side id assignment of a real broker client.
pub struct InMemoryTransport {
    shared: Arc<Shared>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TransportState {
                    feeds: HashMap::new(),
                }),
                published: AtomicU64::new(0),
                acked: AtomicU64::new(0),
                capacity,
            }),
        }
    }

    /// Close every feed. Processing loops bound to them finish their current
    /// message and terminate.
    pub async fn shutdown(&self) {
        let mut state = self.shared.state.lock().await;
        state.feeds.clear();
    }

    /// Observability hook: messages accepted for publication.
    pub fn published_count(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    /// Observability hook: deliveries acknowledged.
    pub fn acked_count(&self) -> u64 {
        self.shared.acked.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn build_publisher(&self, _group: &str) -> Result<Arc<dyn Publisher>, CourierError> {
        Ok(Arc::new(InMemoryPublisher {
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn build_subscriber(&self, _group: &str) -> Result<Arc<dyn Subscriber>, CourierError> {
        Ok(Arc::new(InMemorySubscriber {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct InMemoryPublisher {
    shared: Arc<Shared>,
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, mut message: WireMessage) -> Result<(), CourierError> {
        if message.id.is_empty() {
            message.id = Ulid::new().to_string();
        }

        // The state lock is held across the sends; a full feed blocks every
        // publisher until its loop drains it.
        let mut state = self.shared.state.lock().await;
        if let Some(feeds) = state.feeds.get_mut(topic) {
            let mut open = Vec::with_capacity(feeds.len());
            for sender in feeds.drain(..) {
                let delivery: Box<dyn Delivery> = Box::new(InMemoryDelivery {
                    message: message.clone(),
                    shared: Arc::clone(&self.shared),
                });
                if sender.send(delivery).await.is_ok() {
                    open.push(sender);
                }
            }
            *feeds = open;
        }

        self.shared.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct InMemorySubscriber {
    shared: Arc<Shared>,
}

#[async_trait]
impl Subscriber for InMemorySubscriber {
    async fn subscribe(&self, topic: &str) -> Result<DeliveryFeed, CourierError> {
        let (sender, receiver) = mpsc::channel(self.shared.capacity);
        let mut state = self.shared.state.lock().await;
        state.feeds.entry(topic.to_string()).or_default().push(sender);
        Ok(receiver)
    }
}

struct InMemoryDelivery {
    message: WireMessage,
    shared: Arc<Shared>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn message(&self) -> &WireMessage {
        &self.message
    }

    async fn ack(self: Box<Self>) -> Result<(), CourierError> {
        self.shared.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn publish_reaches_an_open_feed() {
        let transport = InMemoryTransport::new();
        let subscriber = transport.build_subscriber("g").await.unwrap();
        let mut feed = subscriber.subscribe("greetings").await.unwrap();

        let publisher = transport.build_publisher("g").await.unwrap();
        publisher
            .publish("greetings", WireMessage::new("m-1".to_string(), b"hi".to_vec()))
            .await
            .unwrap();

        let delivery = feed.recv().await.unwrap();
        assert_eq!(delivery.message().id, "m-1");
        assert_eq!(delivery.message().payload, b"hi");
        assert_eq!(transport.published_count(), 1);
    }

    #[tokio::test]
    async fn idless_messages_get_a_fresh_id() {
        let transport = InMemoryTransport::new();
        let subscriber = transport.build_subscriber("g").await.unwrap();
        let mut feed = subscriber.subscribe("greetings").await.unwrap();

        let publisher = transport.build_publisher("g").await.unwrap();
        publisher
            .publish("greetings", WireMessage::new(String::new(), Vec::new()))
            .await
            .unwrap();

        let delivery = feed.recv().await.unwrap();
        assert!(!delivery.message().id.is_empty());
    }

    #[tokio::test]
    async fn every_open_feed_gets_its_own_copy() {
        let transport = InMemoryTransport::new();
        let sub_a = transport.build_subscriber("group-a").await.unwrap();
        let sub_b = transport.build_subscriber("group-b").await.unwrap();
        let mut feed_a = sub_a.subscribe("greetings").await.unwrap();
        let mut feed_b = sub_b.subscribe("greetings").await.unwrap();

        let publisher = transport.build_publisher("group-a").await.unwrap();
        publisher
            .publish("greetings", WireMessage::new("m-1".to_string(), Vec::new()))
            .await
            .unwrap();

        assert_eq!(feed_a.recv().await.unwrap().message().id, "m-1");
        assert_eq!(feed_b.recv().await.unwrap().message().id, "m-1");
    }

    #[tokio::test]
    async fn ack_is_counted() {
        let transport = InMemoryTransport::new();
        let subscriber = transport.build_subscriber("g").await.unwrap();
        let mut feed = subscriber.subscribe("greetings").await.unwrap();

        let publisher = transport.build_publisher("g").await.unwrap();
        publisher
            .publish("greetings", WireMessage::new("m-1".to_string(), Vec::new()))
            .await
            .unwrap();

        let delivery = feed.recv().await.unwrap();
        assert_eq!(transport.acked_count(), 0);
        delivery.ack().await.unwrap();
        assert_eq!(transport.acked_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_feeds() {
        let transport = InMemoryTransport::new();
        let subscriber = transport.build_subscriber("g").await.unwrap();
        let mut feed = subscriber.subscribe("greetings").await.unwrap();

        transport.shutdown().await;

        let next = tokio::time::timeout(Duration::from_millis(200), feed.recv()).await;
        assert!(matches!(next, Ok(None)));
    }

    #[tokio::test]
    async fn publishing_to_a_topic_without_feeds_is_not_an_error() {
        let transport = InMemoryTransport::new();
        let publisher = transport.build_publisher("g").await.unwrap();
        publisher
            .publish("nowhere", WireMessage::new("m-1".to_string(), Vec::new()))
            .await
            .unwrap();
        assert_eq!(transport.published_count(), 1);
    }
}
