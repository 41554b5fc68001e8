use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Customer-facing notification handed to the communication collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Event name from [`crate::constants::events`]
    pub name: String,
    pub order_id: Uuid,
    pub context: Value,
    pub published_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(name: impl Into<String>, order_id: Uuid, context: Value) -> Self {
        Self {
            name: name.into(),
            order_id,
            context,
            published_at: Utc::now(),
        }
    }
}

/// Outbound notification seam (email delivery lives behind this)
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, notification: Notification) -> Result<(), PublishError>;
}

/// In-process notifier fanning notifications out over a broadcast channel
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<Notification>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl Notifier for EventPublisher {
    async fn notify(&self, notification: Notification) -> Result<(), PublishError> {
        debug!(
            event = %notification.name,
            order_id = %notification.order_id,
            subscribers = self.sender.receiver_count(),
            "Publishing notification"
        );
        // No subscribers is fine; the notification is simply dropped
        let _ = self.sender.send(notification);
        Ok(())
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Error types for notification delivery
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Notification channel is closed")]
    ChannelClosed,
    #[error("Delivery failed: {0}")]
    Delivery(String),
}
