//! Outbound notifications.
//!
//! The allocation engine only sees [`EventPublisher`]. Publishing happens after
//! commit and can neither fail nor block the caller: an event nobody receives
//! is simply gone.

use tokio::sync::broadcast;
use tracing::{debug, warn};
use yard_events::{ContainerEvent, EventEnvelope};

/// Fire-and-forget sink for committed changes.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: ContainerEvent);
}

/// Fans events out to every live subscriber over a bounded broadcast channel.
///
/// Subscribers that fall more than `capacity` events behind skip ahead; see
/// [`broadcast::error::RecvError::Lagged`].
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<EventEnvelope>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for BroadcastNotifier {
    fn publish(&self, event: ContainerEvent) {
        let envelope = match event.to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    error = %e,
                    event = event.event_type(),
                    container_id = %event.container_id(),
                    "Dropping notification that failed to encode"
                );
                return;
            }
        };

        if self.sender.send(envelope).is_err() {
            debug!(event = event.event_type(), "No notification subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yard_events::ContainerShippedPayload;
    use yard_id::ContainerId;

    #[tokio::test]
    async fn test_subscribers_receive_envelopes() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 1);

        let id = ContainerId::new();
        notifier.publish(ContainerEvent::Shipped(ContainerShippedPayload { id }));

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event, "containerShipped");
        assert_eq!(envelope.data["id"], id.to_string());
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(8);
        notifier.publish(ContainerEvent::Shipped(ContainerShippedPayload {
            id: ContainerId::new(),
        }));
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let notifier = BroadcastNotifier::new(2);
        let mut rx = notifier.subscribe();

        for _ in 0..5 {
            notifier.publish(ContainerEvent::Shipped(ContainerShippedPayload {
                id: ContainerId::new(),
            }));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert!(rx.recv().await.is_ok());
    }
}
