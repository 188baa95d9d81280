//! Ports: the abstraction layer between the core and the outside world.
//!
//! The transport traits hide the broker client (connections, consumer
//! groups, partition assignment all live behind them); the handler trait is
//! the seam for application code.

pub mod handler;
pub mod transport;

pub use handler::Handler;
pub use transport::{Delivery, DeliveryFeed, Publisher, Subscriber, Transport, WireMessage};
