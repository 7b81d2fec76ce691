//! RabbitMQ consumer for the `email_sender` queue.
//!
//! ## Flow
//!
//! ```text
//! Worker (reconnect loop)
//!   └─ Subscription (one connection)
//!        receive loop ──mpsc──▶ dispatcher ──▶ EmailHandler ──▶ Disposition ──▶ ack / nack
//! ```
//!
//! Deliveries are handled one at a time in the order the broker sends them.

pub mod backoff;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod status;
pub mod subscription;
pub mod worker;

pub use backoff::Backoff;
pub use error::ConsumerError;
pub use handler::{DeliveryContext, Disposition, EmailHandler};
pub use status::{status_channel, ConsumerStatus};
pub use subscription::{Subscription, SubscriptionEnd, SubscriptionOptions};
pub use worker::Worker;
