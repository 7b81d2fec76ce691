use thiserror::Error;

use crate::queue::TopologyError;

/// Errors raised while bringing up or running the subscription.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to connect to RabbitMQ: {0}")]
    Connect(#[source] lapin::Error),

    #[error("RabbitMQ channel setup failed: {0}")]
    Channel(#[source] lapin::Error),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("gave up reconnecting after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl ConsumerError {
    /// Whether a fresh connection attempt could succeed.
    ///
    /// A topology conflict needs an operator to fix the broker, so it is fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConsumerError::Connect(_) | ConsumerError::Channel(_) => true,
            ConsumerError::Topology(e) => !e.is_conflict(),
            ConsumerError::RetriesExhausted { .. } => false,
        }
    }
}
