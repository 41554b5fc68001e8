//! # Notifications
//!
//! Outbound customer notifications, published only after the unit of work
//! that caused them has committed.

pub mod publisher;

pub use publisher::{EventPublisher, Notification, Notifier, PublishError};
