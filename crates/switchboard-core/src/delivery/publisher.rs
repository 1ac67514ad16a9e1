//! DeliveryPublisher trait definition.

use switchboard_types::error::DeliveryError;
use switchboard_types::event::DeliveryEvent;
use switchboard_types::user::UserId;

/// Fan-out of events into per-user rooms.
///
/// Publishing must not block: it is called from the event dispatcher's
/// receive loop. A room with no subscribers drops the event.
pub trait DeliveryPublisher: Send + Sync {
    fn publish(&self, user_id: &UserId, event: DeliveryEvent) -> Result<(), DeliveryError>;
}
