//! Email sending seam.
//!
//! Actual delivery (SMTP, provider APIs) is not part of this worker. The
//! [`NoopSender`] stands in for it and always succeeds.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::queue::EmailMessage;

/// Failure reported by an [`EmailSender`].
#[derive(Debug, Error)]
pub enum SendError {
    /// Worth another attempt (relay unavailable, rate limited, ...).
    #[error("transient send failure: {0}")]
    Transient(String),

    /// Retrying will not help (invalid recipient, rejected content, ...).
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

impl SendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SendError::Transient(_))
    }
}

/// Something that can send an email message.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), SendError>;

    /// A name for the sender, used in log fields.
    fn name(&self) -> &'static str;
}

/// Sender that performs no delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSender;

#[async_trait]
impl EmailSender for NoopSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), SendError> {
        debug!(to = %message.to, "email_send_skipped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
