//! Async RabbitMQ publisher for email messages.
//!
//! The publisher owns a lazily opened connection and a confirm-mode channel,
//! reconnecting on the next publish after the channel drops.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions},
    publisher_confirm::Confirmation,
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::types::{EmailMessage, JSON_CONTENT_TYPE};

/// Async RabbitMQ publisher with connection management.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    exchange: String,
    exchange_options: ExchangeDeclareOptions,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl Publisher {
    /// Create a publisher for `exchange`, declared with `exchange_options` on connect.
    pub fn new(
        url: impl Into<String>,
        exchange: impl Into<String>,
        exchange_options: ExchangeDeclareOptions,
    ) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url: url.into(),
                exchange: exchange.into(),
                exchange_options,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.inner.exchange
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("rabbitmq_publisher_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        info!("rabbitmq_publisher_connected");

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        ch.confirm_select(ConfirmSelectOptions::default())
            .await
            .context("Failed to enable publisher confirms")?;

        ch.exchange_declare(
            &self.inner.exchange,
            ExchangeKind::Topic,
            self.inner.exchange_options.clone(),
            FieldTable::default(),
        )
        .await
        .context("Failed to declare exchange")?;

        info!(exchange = %self.inner.exchange, "rabbitmq_publisher_exchange_declared");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Publish an email message with the given routing key.
    ///
    /// Resolves once the broker has confirmed the message. Unroutable messages
    /// are confirmed too; the broker silently drops them.
    pub async fn publish(&self, routing_key: &str, message: &EmailMessage) -> Result<()> {
        let channel = self.ensure_connected().await?;

        let body = serde_json::to_vec(message).context("Failed to serialize email message")?;

        let confirmation = channel
            .basic_publish(
                &self.inner.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type(JSON_CONTENT_TYPE.into()),
            )
            .await
            .context("Failed to publish email message")?
            .await
            .context("Failed to confirm publish")?;

        if let Confirmation::Nack(_) = confirmation {
            bail!("Broker rejected email message");
        }

        info!(
            exchange = %self.inner.exchange,
            routing_key = %routing_key,
            to = %message.to,
            body_length = body.len(),
            "rabbitmq_email_published"
        );

        Ok(())
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_publisher_closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Topology;

    #[test]
    fn test_publisher_is_lazy() {
        let topology = Topology::email();
        let publisher = Publisher::new(
            "amqp://localhost:5672",
            topology.exchange.clone(),
            topology.exchange_options(),
        );
        assert_eq!(publisher.exchange(), "email");
        assert!(publisher.inner.connection.try_read().unwrap().is_none());
    }
}
