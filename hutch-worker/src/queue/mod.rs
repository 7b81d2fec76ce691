//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - The email message type and the fixed topology names
//! - Topology declaration (exchange, queue, binding)
//! - Async publisher for enqueueing email messages
//!
//! ## Topology
//!
//! ```text
//! Producer → [email exchange] --"email"--> email_sender queue → Worker
//! ```

pub mod publisher;
pub mod topology;
pub mod types;

pub use publisher::Publisher;
pub use topology::{Topology, TopologyError};
pub use types::{EmailMessage, EMAIL_EXCHANGE, EMAIL_QUEUE, EMAIL_ROUTING_KEY, JSON_CONTENT_TYPE};
