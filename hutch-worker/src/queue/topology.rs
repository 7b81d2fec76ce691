//! Exchange, queue and binding declaration.
//!
//! Declaration is idempotent on the broker side: re-declaring an identical
//! exchange or queue is a no-op, while a declaration whose flags differ from
//! the existing entity fails with `PRECONDITION_FAILED` and closes the channel.

use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    protocol::{AMQPErrorKind, AMQPSoftError},
    types::FieldTable,
    Channel, ExchangeKind,
};
use thiserror::Error;
use tracing::info;

use super::types::{EMAIL_EXCHANGE, EMAIL_QUEUE, EMAIL_ROUTING_KEY};

/// Failure while declaring topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The entity exists with different durable/auto-delete/exclusive flags.
    #[error("{entity} '{name}' already exists with different properties: {reason}")]
    Conflict {
        entity: &'static str,
        name: String,
        reason: String,
    },

    /// An exclusive queue of this name is owned by another connection.
    #[error("{entity} '{name}' is locked by another connection: {reason}")]
    Locked {
        entity: &'static str,
        name: String,
        reason: String,
    },

    #[error("failed to declare {entity} '{name}': {source}")]
    Broker {
        entity: &'static str,
        name: String,
        #[source]
        source: lapin::Error,
    },
}

impl TopologyError {
    fn classify(entity: &'static str, name: &str, err: lapin::Error) -> Self {
        let name = name.to_string();
        if let lapin::Error::ProtocolError(amqp) = &err {
            match amqp.kind() {
                AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED) => {
                    return TopologyError::Conflict {
                        entity,
                        name,
                        reason: amqp.to_string(),
                    };
                }
                AMQPErrorKind::Soft(AMQPSoftError::RESOURCELOCKED) => {
                    return TopologyError::Locked {
                        entity,
                        name,
                        reason: amqp.to_string(),
                    };
                }
                _ => {}
            }
        }
        TopologyError::Broker {
            entity,
            name,
            source: err,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TopologyError::Conflict { .. })
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, TopologyError::Locked { .. })
    }
}

/// Broker entities a subscription depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub queue_durable: bool,
    pub queue_exclusive: bool,
}

impl Topology {
    /// The fixed `email` -> `email_sender` topology.
    pub fn email() -> Self {
        Self {
            exchange: EMAIL_EXCHANGE.to_string(),
            queue: EMAIL_QUEUE.to_string(),
            routing_key: EMAIL_ROUTING_KEY.to_string(),
            queue_durable: true,
            queue_exclusive: true,
        }
    }

    pub fn exchange_options(&self) -> ExchangeDeclareOptions {
        ExchangeDeclareOptions {
            durable: true,
            auto_delete: false,
            ..Default::default()
        }
    }

    pub fn queue_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            durable: self.queue_durable,
            exclusive: self.queue_exclusive,
            auto_delete: false,
            ..Default::default()
        }
    }

    /// Declare the exchange and queue, then bind them.
    pub async fn declare(&self, channel: &Channel) -> Result<(), TopologyError> {
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Topic,
                self.exchange_options(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| TopologyError::classify("exchange", &self.exchange, e))?;

        info!(exchange = %self.exchange, kind = "topic", "rabbitmq_exchange_declared");

        channel
            .queue_declare(&self.queue, self.queue_options(), FieldTable::default())
            .await
            .map_err(|e| TopologyError::classify("queue", &self.queue, e))?;

        info!(
            queue = %self.queue,
            durable = self.queue_durable,
            exclusive = self.queue_exclusive,
            "rabbitmq_queue_declared"
        );

        channel
            .queue_bind(
                &self.queue,
                &self.exchange,
                &self.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| TopologyError::classify("binding", &self.queue, e))?;

        info!(
            queue = %self.queue,
            exchange = %self.exchange,
            routing_key = %self.routing_key,
            "rabbitmq_queue_bound"
        );

        Ok(())
    }
}
