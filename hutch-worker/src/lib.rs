//! Hutch - RabbitMQ email-sender worker.
//!
//! The worker subscribes to the `email_sender` queue, bound to the `email`
//! topic exchange with routing key `email`, logs every email request it
//! receives and hands it to an [`EmailSender`]. A thin HTTP pipeline reports
//! the subscription state.
//!
//! ## Architecture
//!
//! ```text
//! Producer → email exchange → email_sender queue → Worker → EmailSender
//!                                                     │
//!                                        /health ◀────┘ (consumer status)
//! ```

pub mod config;
pub mod consumer;
pub mod mailer;
pub mod queue;
pub mod shutdown;
pub mod telemetry;
pub mod web;

// Re-export commonly used types
pub use config::{BackoffConfig, Config};
pub use consumer::{ConsumerError, ConsumerStatus, Disposition, EmailHandler, Worker};
pub use mailer::{EmailSender, NoopSender, SendError};
pub use queue::{
    EmailMessage, Publisher, Topology, TopologyError, EMAIL_EXCHANGE, EMAIL_QUEUE,
    EMAIL_ROUTING_KEY,
};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use web::AppState;
