//! Publish coordination for the smart data store.
//!
//! Drains unsent rows to an upstream [`Transport`] and records delivery in
//! the store. Delivery is at-least-once: rows delivered just before a crash
//! may be sent again on the next cycle.

pub mod coordinator;
pub mod error;
pub mod jsonl;
pub mod transport;

pub use coordinator::{PublishConfig, PublishCoordinator, PublishReport};
pub use error::PublishError;
pub use jsonl::JsonLinesTransport;
pub use transport::{SendError, Transport};
