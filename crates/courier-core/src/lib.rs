//! courier-core
//!
//! Core building blocks for the Courier delivery layer: envelopes over an
//! external pub/sub transport, bounded handler execution, and deterministic
//! retry/dead-letter routing.
//!
//! # Module map
//! - **domain**: data model (envelope, subscribe options, errors)
//! - **ports**: abstraction layer (Transport, Publisher, Subscriber, Delivery, Handler)
//! - **app**: application logic (config, manager, process loop, router)
//! - **impls**: implementations (InMemoryTransport for development/tests)

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::config::CourierConfig;
pub use app::manager::Manager;
pub use app::router::{DefaultDeadHandler, DefaultRetryHandler, RouteTarget, classify};
pub use domain::envelope::Envelope;
pub use domain::errors::CourierError;
pub use domain::options::SubscribeOptions;
pub use impls::inmem_transport::InMemoryTransport;
pub use ports::handler::Handler;
pub use ports::transport::{Delivery, DeliveryFeed, Publisher, Subscriber, Transport, WireMessage};

/// Built-in topic for messages awaiting another delivery attempt.
pub const RETRY_TOPIC: &str = "retry-topic";

/// Built-in terminal topic for messages whose retry budget is exhausted.
pub const DEAD_TOPIC: &str = "dead-topic";

/// Shared consumer group for the two built-in subscriptions.
pub const INNER_GROUP: &str = "inner-group";
