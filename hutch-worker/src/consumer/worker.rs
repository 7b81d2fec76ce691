//! Connection supervisor: connect, subscribe, reconnect on loss.

use std::sync::Arc;

use lapin::{Connection, ConnectionProperties};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::backoff::Backoff;
use super::error::ConsumerError;
use super::handler::EmailHandler;
use super::status::ConsumerStatus;
use super::subscription::{Subscription, SubscriptionEnd, SubscriptionOptions};
use crate::config::{BackoffConfig, Config};
use crate::mailer::EmailSender;
use crate::queue::Topology;
use crate::shutdown::Shutdown;

/// Keeps one subscription alive for the lifetime of the process.
pub struct Worker<S> {
    amqp_url: String,
    topology: Topology,
    options: SubscriptionOptions,
    reconnect: BackoffConfig,
    handler: Arc<EmailHandler<S>>,
    status: watch::Sender<ConsumerStatus>,
}

impl<S: EmailSender + 'static> Worker<S> {
    pub fn new(
        config: &Config,
        topology: Topology,
        sender: S,
        status: watch::Sender<ConsumerStatus>,
    ) -> Self {
        Self {
            amqp_url: config.amqp_url.clone(),
            topology,
            options: SubscriptionOptions {
                consumer_tag: config.consumer_tag.clone(),
                prefetch_count: config.prefetch_count,
                requeue: config.requeue.clone(),
            },
            reconnect: config.reconnect.clone(),
            handler: Arc::new(EmailHandler::new(sender)),
            status,
        }
    }

    /// Open a connection and start the subscription on it.
    pub async fn subscribe(&self) -> Result<Subscription<S>, ConsumerError> {
        // Connect to RabbitMQ
        info!(url_length = self.amqp_url.len(), "rabbitmq_connecting");

        let connection = Connection::connect(&self.amqp_url, ConnectionProperties::default())
            .await
            .map_err(ConsumerError::Connect)?;

        info!("rabbitmq_connected");

        // Start the subscription on this connection; it closes the connection if setup fails
        Subscription::start(
            connection,
            self.topology.clone(),
            self.options.clone(),
            Arc::clone(&self.handler),
        )
        .await
    }

    /// Run until shutdown, reconnecting with backoff after failures.
    ///
    /// Returns an error for a topology conflict or once the configured number
    /// of consecutive connection attempts has failed.
    pub async fn run(self, mut shutdown: Shutdown) -> Result<(), ConsumerError> {
        let mut backoff = Backoff::new(self.reconnect.clone());
        let result = self.supervise(&mut shutdown, &mut backoff).await;
        self.status.send_replace(ConsumerStatus::Stopped);

        match &result {
            Ok(()) => info!("worker_shutdown_complete"),
            Err(e) => error!(error = %e, "worker_failed"),
        }
        result
    }

    async fn supervise(&self, shutdown: &mut Shutdown, backoff: &mut Backoff) -> Result<(), ConsumerError> {
        while !shutdown.is_triggered() {
            let attempt = tokio::select! {
                _ = shutdown.wait() => break,
                attempt = self.subscribe() => attempt,
            };

            let reason = match attempt {
                Ok(subscription) => {
                    backoff.reset();
                    self.status.send_replace(ConsumerStatus::Consuming);

                    match subscription.run(shutdown).await {
                        SubscriptionEnd::Shutdown => break,
                        SubscriptionEnd::Interrupted => {
                            warn!("rabbitmq_connection_lost");
                            "subscription interrupted".to_string()
                        }
                    }
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e.to_string(),
            };

            self.status.send_replace(ConsumerStatus::Reconnecting);

            let Some(delay) = backoff.next_delay() else {
                return Err(ConsumerError::RetriesExhausted {
                    attempts: backoff.failures(),
                    last_error: reason,
                });
            };

            warn!(
                reason = %reason,
                failures = backoff.failures(),
                delay_ms = delay.as_millis() as u64,
                "rabbitmq_reconnect_scheduled"
            );

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        Ok(())
    }
}
