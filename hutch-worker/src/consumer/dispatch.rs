//! Ordered, one-at-a-time dispatch of deliveries to the handler.

use std::sync::Arc;
use std::time::Duration;

use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::backoff::Backoff;
use super::handler::{DeliveryContext, Disposition, EmailHandler};
use crate::config::BackoffConfig;
use crate::mailer::EmailSender;
use crate::shutdown::Shutdown;

impl Disposition {
    pub fn nack_options(self) -> Option<BasicNackOptions> {
        match self {
            Disposition::Ack => None,
            Disposition::Requeue => Some(BasicNackOptions {
                requeue: true,
                ..Default::default()
            }),
            Disposition::Reject => Some(BasicNackOptions {
                requeue: false,
                ..Default::default()
            }),
        }
    }
}

/// Spaces out consecutive requeues so a failing sender does not spin on
/// immediate redeliveries.
#[derive(Debug, Clone)]
pub struct RequeuePacer {
    backoff: Backoff,
}

impl RequeuePacer {
    /// `config.max_attempts` is ignored; requeues are paced forever.
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            backoff: Backoff::new(BackoffConfig {
                max_attempts: None,
                ..config
            }),
        }
    }

    /// How long to hold a delivery before settling it with `disposition`.
    ///
    /// Only requeues wait. An ack means the sender recovered, so the schedule
    /// starts over.
    pub fn pause_before(&mut self, disposition: Disposition) -> Option<Duration> {
        match disposition {
            Disposition::Requeue => self.backoff.next_delay(),
            Disposition::Ack => {
                self.backoff.reset();
                None
            }
            Disposition::Reject => None,
        }
    }

    /// Consecutive requeues since the last ack.
    pub fn requeues(&self) -> u32 {
        self.backoff.failures()
    }
}

/// Handle deliveries from `rx` in arrival order until the sender side closes.
///
/// The next delivery is not taken until the previous one has been settled
/// with the broker. A requeue is held back by the pacer's delay unless
/// shutdown is requested meanwhile.
pub async fn dispatch<S: EmailSender>(
    handler: Arc<EmailHandler<S>>,
    queue: String,
    mut pacer: RequeuePacer,
    mut shutdown: Shutdown,
    mut rx: mpsc::Receiver<Delivery>,
) {
    while let Some(delivery) = rx.recv().await {
        let ctx = DeliveryContext::from_delivery(&delivery);
        let disposition = handler.handle(&delivery.data, &ctx).await;

        if let Some(delay) = pacer.pause_before(disposition) {
            warn!(
                queue = %queue,
                delivery_tag = ctx.delivery_tag,
                requeues = pacer.requeues(),
                delay_ms = delay.as_millis() as u64,
                "rabbitmq_requeue_delayed"
            );

            tokio::select! {
                _ = shutdown.wait() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        settle(&delivery, &ctx, &queue, disposition).await;
    }

    info!(queue = %queue, "dispatcher_drained");
}

async fn settle(delivery: &Delivery, ctx: &DeliveryContext, queue: &str, disposition: Disposition) {
    let result = match disposition.nack_options() {
        None => delivery.acker.ack(BasicAckOptions::default()).await,
        Some(options) => delivery.acker.nack(options).await,
    };

    match result {
        Ok(_) => info!(
            queue = %queue,
            delivery_tag = ctx.delivery_tag,
            routing_key = %ctx.routing_key,
            disposition = ?disposition,
            "rabbitmq_delivery_settled"
        ),
        // The broker requeues unsettled deliveries when the channel closes.
        Err(e) => error!(
            queue = %queue,
            delivery_tag = ctx.delivery_tag,
            routing_key = %ctx.routing_key,
            disposition = ?disposition,
            error = %e,
            "rabbitmq_settle_failed"
        ),
    }
}
