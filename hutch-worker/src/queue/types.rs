//! Queue message types and fixed topology names.
//!
//! Messages on the `email` exchange are JSON objects with PascalCase keys:
//!
//! ```text
//! { "To": "a@example.com", "Body": "hello" }
//! ```

use serde::{Deserialize, Serialize};

/// Exchange the email messages are published to.
pub const EMAIL_EXCHANGE: &str = "email";

/// Queue the worker consumes from.
pub const EMAIL_QUEUE: &str = "email_sender";

/// Routing key binding [`EMAIL_QUEUE`] to [`EMAIL_EXCHANGE`].
pub const EMAIL_ROUTING_KEY: &str = "email";

/// Content type stamped on published messages.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// An email send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Recipient address
    #[serde(rename = "To")]
    pub to: String,
    /// Message text
    #[serde(rename = "Body")]
    pub body: String,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            body: body.into(),
        }
    }
}
