//! Transport port: the contract an external pub/sub system must satisfy.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::errors::CourierError;

/// One message as the transport sees it: an id, an opaque body, and a
/// string-to-string header map carrying envelope metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireMessage {
    pub id: String,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl WireMessage {
    pub fn new(id: String, payload: Vec<u8>) -> Self {
        Self {
            id,
            payload,
            headers: HashMap::new(),
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers.insert(key.to_string(), value.to_string());
    }
}

/// A delivered message plus its acknowledgement.
///
/// Design intent:
/// - The loop reads the message through an immutable reference and consumes
///   the delivery exactly once via `ack`, whatever the handler outcome was.
/// - The transport decides what acknowledgement means (offset commit, queue
///   deletion, ...).
#[async_trait]
pub trait Delivery: Send {
    fn message(&self) -> &WireMessage;

    /// Mark this delivery attempt as consumed.
    async fn ack(self: Box<Self>) -> Result<(), CourierError>;
}

/// The ordered sequence of deliveries for one topic subscription.
/// The processing loop ends when the transport closes the channel.
pub type DeliveryFeed = mpsc::Receiver<Box<dyn Delivery>>;

/// Outbound side of the transport.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message: WireMessage) -> Result<(), CourierError>;
}

/// Inbound side of the transport, bound to one consumer group.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<DeliveryFeed, CourierError>;
}

/// Factory for per-group publishers and subscribers.
///
/// The manager calls these at most once per group key and caches the result;
/// implementations can treat each call as "open a connection for this
/// group".
#[async_trait]
pub trait Transport: Send + Sync {
    async fn build_publisher(&self, group: &str) -> Result<Arc<dyn Publisher>, CourierError>;

    async fn build_subscriber(&self, group: &str) -> Result<Arc<dyn Subscriber>, CourierError>;
}
