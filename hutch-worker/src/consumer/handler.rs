//! Per-delivery handling: decode, log, send, decide.
//!
//! The handler never talks to the broker. It returns a [`Disposition`] and
//! the dispatcher turns that into ack / nack.

use tracing::{error, info, warn};

use crate::mailer::{EmailSender, SendError};
use crate::queue::EmailMessage;

/// What to tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// basic.ack, the message is removed from the queue.
    Ack,
    /// basic.nack with requeue, the broker redelivers it.
    Requeue,
    /// basic.nack without requeue, dropped or dead-lettered by broker policy.
    Reject,
}

/// Delivery metadata handed to the handler alongside the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryContext {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub routing_key: String,
}

impl DeliveryContext {
    pub fn from_delivery(delivery: &lapin::message::Delivery) -> Self {
        Self {
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            routing_key: delivery.routing_key.as_str().to_string(),
        }
    }
}

/// Handles `email_sender` deliveries with the given sender.
pub struct EmailHandler<S> {
    sender: S,
}

impl<S: EmailSender> EmailHandler<S> {
    pub fn new(sender: S) -> Self {
        Self { sender }
    }

    /// Handle one raw delivery body.
    pub async fn handle(&self, payload: &[u8], ctx: &DeliveryContext) -> Disposition {
        let message: EmailMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    delivery_tag = ctx.delivery_tag,
                    error = %e,
                    body_preview = %String::from_utf8_lossy(&payload[..payload.len().min(500)]),
                    "email_message_parse_failed"
                );
                return Disposition::Reject;
            }
        };

        info!(
            delivery_tag = ctx.delivery_tag,
            "Sending Email to: {}, message: {}",
            message.to,
            message.body
        );

        match self.sender.send(&message).await {
            Ok(()) => Disposition::Ack,
            Err(e) => self.on_send_failure(&message, ctx, e),
        }
    }

    fn on_send_failure(&self, message: &EmailMessage, ctx: &DeliveryContext, err: SendError) -> Disposition {
        // Transient failures stay on the queue however often they were redelivered.
        let disposition = if err.is_transient() {
            Disposition::Requeue
        } else {
            Disposition::Reject
        };

        warn!(
            delivery_tag = ctx.delivery_tag,
            routing_key = %ctx.routing_key,
            to = %message.to,
            sender = self.sender.name(),
            redelivered = ctx.redelivered,
            error = %err,
            disposition = ?disposition,
            "email_send_failed"
        );

        disposition
    }
}
