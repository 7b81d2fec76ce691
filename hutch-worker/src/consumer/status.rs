//! Subscription lifecycle state, published over a `watch` channel.

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerStatus {
    Connecting,
    Consuming,
    Reconnecting,
    Stopped,
}

/// Create a status channel starting in [`ConsumerStatus::Connecting`].
pub fn status_channel() -> (watch::Sender<ConsumerStatus>, watch::Receiver<ConsumerStatus>) {
    watch::channel(ConsumerStatus::Connecting)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ConsumerStatus::Reconnecting).unwrap(),
            "\"reconnecting\""
        );
    }

    #[test]
    fn test_status_channel_starts_connecting() {
        let (_tx, rx) = status_channel();
        assert_eq!(*rx.borrow(), ConsumerStatus::Connecting);
    }
}
