//! Implementations of the transport port.
//!
//! Only the in-memory transport lives here; broker-backed implementations
//! belong in their own crates so the core stays free of client dependencies.

pub mod inmem_transport;

pub use inmem_transport::InMemoryTransport;
