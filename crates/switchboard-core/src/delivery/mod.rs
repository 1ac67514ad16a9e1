//! Real-time delivery of events to a user's subscribers.

pub mod hub;
pub mod publisher;

pub use hub::DeliveryHub;
pub use publisher::DeliveryPublisher;
