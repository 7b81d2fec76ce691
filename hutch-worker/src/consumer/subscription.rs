//! A live subscription on one broker connection.
//!
//! The subscription owns the connection it was started with. A receive loop
//! forwards deliveries over a bounded channel to a single dispatcher task,
//! which settles each delivery before taking the next.

use std::sync::Arc;

use futures::StreamExt;
use lapin::{
    options::{BasicCancelOptions, BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Channel, Connection, Consumer,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::dispatch::{dispatch, RequeuePacer};
use super::error::ConsumerError;
use super::handler::EmailHandler;
use crate::config::BackoffConfig;
use crate::mailer::EmailSender;
use crate::queue::Topology;
use crate::shutdown::Shutdown;

/// Per-subscription consumer settings.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    pub consumer_tag: String,
    pub prefetch_count: u16,
    /// Pause schedule before requeueing after a transient send failure
    pub requeue: BackoffConfig,
}

/// Why [`Subscription::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEnd {
    /// Shutdown was requested; consumption was cancelled cleanly.
    Shutdown,
    /// The delivery stream ended: connection or channel lost, or consumer cancelled by the broker.
    Interrupted,
}

pub struct Subscription<S> {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    topology: Topology,
    options: SubscriptionOptions,
    handler: Arc<EmailHandler<S>>,
}

impl<S: EmailSender + 'static> Subscription<S> {
    /// Declare the topology on a fresh channel and start consuming with manual acks.
    ///
    /// The connection is closed if setup fails.
    pub async fn start(
        connection: Connection,
        topology: Topology,
        options: SubscriptionOptions,
        handler: Arc<EmailHandler<S>>,
    ) -> Result<Self, ConsumerError> {
        match setup(&connection, &topology, &options).await {
            Ok((channel, consumer)) => Ok(Self {
                connection,
                channel,
                consumer,
                topology,
                options,
                handler,
            }),
            Err(e) => {
                close_connection(&connection).await;
                Err(e)
            }
        }
    }

    /// Consume until shutdown or until the delivery stream ends.
    ///
    /// Deliveries already handed to the dispatcher are handled and settled
    /// before the channel and connection are closed.
    pub async fn run(self, shutdown: &mut Shutdown) -> SubscriptionEnd {
        let Subscription {
            connection,
            channel,
            mut consumer,
            topology,
            options,
            handler,
        } = self;

        let queue = topology.queue;
        let (tx, rx) = mpsc::channel(usize::from(options.prefetch_count).max(1));
        let dispatcher = tokio::spawn(dispatch(
            handler,
            queue.clone(),
            RequeuePacer::new(options.requeue.clone()),
            shutdown.clone(),
            rx,
        ));

        info!(queue = %queue, consumer_tag = %options.consumer_tag, "worker_ready");

        let end = loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!(queue = %queue, "worker_stopping");
                    break SubscriptionEnd::Shutdown;
                }
                delivery = consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => {
                            info!(
                                queue = %queue,
                                delivery_tag = delivery.delivery_tag,
                                redelivered = delivery.redelivered,
                                body_length = delivery.data.len(),
                                "rabbitmq_email_received"
                            );

                            if tx.send(delivery).await.is_err() {
                                error!(queue = %queue, "dispatcher_stopped_unexpectedly");
                                break SubscriptionEnd::Interrupted;
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "rabbitmq_delivery_error");
                            if !channel.status().connected() {
                                break SubscriptionEnd::Interrupted;
                            }
                        }
                        None => {
                            warn!(queue = %queue, "rabbitmq_consumer_closed");
                            break SubscriptionEnd::Interrupted;
                        }
                    }
                }
            }
        };

        if end == SubscriptionEnd::Shutdown {
            if let Err(e) = channel
                .basic_cancel(&options.consumer_tag, BasicCancelOptions::default())
                .await
            {
                warn!(error = %e, "rabbitmq_cancel_failed");
            }
        }

        drop(tx);
        if let Err(e) = dispatcher.await {
            error!(error = %e, "dispatcher_panicked");
        }

        if channel.status().connected() {
            if let Err(e) = channel.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }
        close_connection(&connection).await;

        info!(queue = %queue, end = ?end, "subscription_closed");
        end
    }
}

async fn setup(
    connection: &Connection,
    topology: &Topology,
    options: &SubscriptionOptions,
) -> Result<(Channel, Consumer), ConsumerError> {
    // Create a channel for this subscription
    let channel = connection
        .create_channel()
        .await
        .map_err(ConsumerError::Channel)?;

    info!("rabbitmq_channel_created");

    // Set QoS so the broker never has more than prefetch_count unacked deliveries in flight
    channel
        .basic_qos(options.prefetch_count, BasicQosOptions::default())
        .await
        .map_err(ConsumerError::Channel)?;

    info!(prefetch_count = options.prefetch_count, "rabbitmq_qos_set");

    // Declare exchange, queue and binding
    topology.declare(&channel).await?;

    // Start consuming. no_ack stays false: every delivery waits for an explicit ack or nack.
    let consumer = channel
        .basic_consume(
            &topology.queue,
            &options.consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(ConsumerError::Channel)?;

    info!(queue = %topology.queue, "rabbitmq_consumer_started");

    Ok((channel, consumer))
}

async fn close_connection(connection: &Connection) {
    if !connection.status().connected() {
        debug!("rabbitmq_connection_already_closed");
        return;
    }
    if let Err(e) = connection.close(200, "Normal shutdown").await {
        warn!(error = %e, "rabbitmq_connection_close_error");
    }
}
