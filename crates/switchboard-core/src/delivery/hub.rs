//! In-process delivery rooms built on `tokio::sync::broadcast`.
//!
//! Each user gets a lazily created room. Publishing into a room with no
//! subscribers is a no-op, and rooms whose last subscriber went away are
//! pruned on the next publish.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use switchboard_types::error::DeliveryError;
use switchboard_types::event::DeliveryEvent;
use switchboard_types::user::UserId;

use super::publisher::DeliveryPublisher;

/// Per-user broadcast rooms.
pub struct DeliveryHub {
    rooms: DashMap<UserId, broadcast::Sender<DeliveryEvent>>,
    capacity: usize,
}

impl DeliveryHub {
    /// Create a hub whose rooms buffer `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Join a user's room, creating it if needed.
    pub fn subscribe(&self, user_id: &UserId) -> broadcast::Receiver<DeliveryEvent> {
        self.rooms
            .entry(user_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of live subscribers in a user's room.
    pub fn subscriber_count(&self, user_id: &UserId) -> usize {
        self.rooms
            .get(user_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of rooms currently held.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl DeliveryPublisher for DeliveryHub {
    fn publish(&self, user_id: &UserId, event: DeliveryEvent) -> Result<(), DeliveryError> {
        let Some(sender) = self.rooms.get(user_id).map(|s| s.value().clone()) else {
            return Ok(());
        };

        if sender.send(event).is_err() {
            // Every receiver is gone; drop the room unless someone re-joined.
            self.rooms
                .remove_if(user_id, |_, sender| sender.receiver_count() == 0);
            debug!(user_id = %user_id, "pruned empty delivery room");
        }
        Ok(())
    }
}

impl std::fmt::Debug for DeliveryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryHub")
            .field("rooms", &self.rooms.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
