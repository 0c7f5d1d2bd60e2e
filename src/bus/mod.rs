//! Event bus for inter-component communication
//!
//! Uses tokio::sync::broadcast for pub/sub pattern.
//! The device session publishes here; the SSE endpoint and any other
//! observer subscribe.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::device::{Command, ReadingSet, WheelId};

/// Event types that can be published on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BusEvent {
    // Session lifecycle
    SessionConnected { address: String },
    SessionDisconnected { address: String },

    // Polling
    ReadingsUpdated {
        address: String,
        readings: ReadingSet,
        /// Wheels whose reading differs from the previous set
        changed: Vec<WheelId>,
    },
    PollFailed { address: String, error: String },

    // Commands
    CommandSent {
        address: String,
        command: Command,
        response: String,
    },
    CommandFailed {
        address: String,
        command: Command,
        error: String,
    },
}

/// Event bus handle for publishing and subscribing
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: BusEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    /// Default capacity (256 events)
    fn default() -> Self {
        Self::new(256)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing
pub type SharedBus = Arc<EventBus>;

/// Create a new shared event bus
pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pubsub() {
        let bus = create_bus();
        let mut rx = bus.subscribe();

        bus.publish(BusEvent::SessionConnected {
            address: "192.168.1.50".to_string(),
        });

        let event = rx.recv().await.unwrap();
        match event {
            BusEvent::SessionConnected { address } => {
                assert_eq!(address, "192.168.1.50");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = create_bus();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(BusEvent::SessionDisconnected {
            address: "10.0.0.5".to_string(),
        });

        assert!(matches!(
            rx1.recv().await.unwrap(),
            BusEvent::SessionDisconnected { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            BusEvent::SessionDisconnected { .. }
        ));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = create_bus();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(BusEvent::PollFailed {
            address: "10.0.0.5".to_string(),
            error: "timeout".to_string(),
        });
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = BusEvent::CommandSent {
            address: "10.0.0.5".to_string(),
            command: Command::increase(WheelId::FrontRight),
            response: "OK".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CommandSent");
        assert_eq!(json["payload"]["command"]["wheel"], "FR");
        assert_eq!(json["payload"]["command"]["command"], "INCREASE");
    }
}
