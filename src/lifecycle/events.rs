//! Broadcast bus for committed load and offer changes.
//!
//! Events are published after the owning load's lock is released.
//! Having no subscribers is normal and not an error.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{Actor, CarrierId, LoadId, LoadStatus, OfferId, OfferStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoadEvent {
    Created {
        load_id: LoadId,
        version: u64,
    },
    StatusChanged {
        load_id: LoadId,
        from: LoadStatus,
        to: LoadStatus,
        version: u64,
        actor: Actor,
    },
    DriverConfirmed {
        load_id: LoadId,
        driver_id: String,
        version: u64,
    },
    OfferPlaced {
        load_id: LoadId,
        offer_id: OfferId,
        carrier_id: CarrierId,
    },
    OfferResolved {
        load_id: LoadId,
        offer_id: OfferId,
        status: OfferStatus,
    },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LoadEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoadEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: LoadEvent) {
        if self.sender.send(event).is_err() {
            debug!("No event subscribers");
        }
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
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let load_id = Uuid::new_v4();
        bus.publish(LoadEvent::Created { load_id, version: 1 });

        match rx.recv().await.unwrap() {
            LoadEvent::Created { load_id: got, version } => {
                assert_eq!(got, load_id);
                assert_eq!(version, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(LoadEvent::Created {
            load_id: Uuid::new_v4(),
            version: 1,
        });
    }
}
