use tokio::sync::broadcast;
use tracing::debug;

use super::events::LeaderboardEvent;

/// Event bus for distributing leaderboard state changes to subscribers.
///
/// One global channel: every subscriber sees every event. Delivery is
/// at-least-once for connected subscribers; a subscriber that falls behind
/// the channel capacity skips ahead and misses the lagged messages.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LeaderboardEvent>,
}

impl EventBus {
    /// Creates a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all current subscribers.
    pub fn notify(&self, event: LeaderboardEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(receiver_count) => {
                debug!(
                    event_type = %event_type,
                    receivers = receiver_count,
                    "Leaderboard event emitted"
                );
            }
            Err(_) => {
                debug!(event_type = %event_type, "Leaderboard event emitted with no receivers");
            }
        }
    }

    /// Subscribe to all leaderboard events.
    pub fn subscribe(&self) -> broadcast::Receiver<LeaderboardEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();

        bus.notify(LeaderboardEvent::ClearAll);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "clearAll");
    }

    #[tokio::test]
    async fn notify_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.notify(LeaderboardEvent::ClearDemo);
    }

    #[tokio::test]
    async fn each_subscriber_gets_its_own_copy() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.notify(LeaderboardEvent::DeleteScore {
            id: "row-1".to_string(),
        });

        assert_eq!(first.recv().await.unwrap().event_type(), "deleteScore");
        assert_eq!(second.recv().await.unwrap().event_type(), "deleteScore");
    }
}
