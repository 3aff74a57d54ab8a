//! Broadcast notifier feeding WebSocket subscribers.

use restream_core::{JobSnapshot, Notifier};
use tokio::sync::broadcast;

use crate::protocol::ServerMessage;

/// Capacity for the broadcast channel.
/// Subscribers that fall further behind skip to the newest list.
pub const MESSAGE_CHANNEL_CAPACITY: usize = 64;

/// Fans `streams_update` messages out to every subscriber.
#[derive(Debug, Clone)]
pub struct StreamsBroadcaster {
    tx: broadcast::Sender<ServerMessage>,
}

impl StreamsBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StreamsBroadcaster {
    fn default() -> Self {
        Self::new(MESSAGE_CHANNEL_CAPACITY)
    }
}

impl Notifier for StreamsBroadcaster {
    fn publish(&self, streams: Vec<JobSnapshot>) {
        // No subscribers is not an error.
        let _ = self.tx.send(ServerMessage::StreamsUpdate { streams });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let broadcaster = StreamsBroadcaster::default();
        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.publish(Vec::new());
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::StreamsUpdate { streams: Vec::new() }
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        StreamsBroadcaster::default().publish(Vec::new());
    }
}
