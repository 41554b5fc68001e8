use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    errors::{StateMachineError, StateMachineResult},
    states::OrderStatus,
};
use crate::constants::events;
use crate::database::OrderStore;
use crate::events::{Notification, Notifier};
use crate::logging::log_order_operation;
use crate::models::{Order, QueueEntry, StatusHistoryEntry};

/// Outcome of one applied order transition
#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecord {
    /// The order after the transition
    pub order: Order,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub history_entry: StatusHistoryEntry,
    /// Queue entry closed by this transition, if any
    pub completed_queue_entry: Option<QueueEntry>,
}

impl TransitionRecord {
    /// Customer notification owed for this transition, if any.
    pub fn notification(&self) -> Option<Notification> {
        let name = match self.to {
            OrderStatus::PaymentConfirmed => events::ORDER_PAYMENT_CONFIRMED,
            OrderStatus::Shipped => events::ORDER_SHIPPED,
            OrderStatus::Delivered => events::ORDER_DELIVERED,
            OrderStatus::Cancelled => events::ORDER_CANCELLED,
            _ => return None,
        };
        Some(Notification::new(
            name,
            self.order.id,
            json!({
                "customer_id": self.order.customer_id,
                "previous_status": self.from,
                "status": self.to,
                "actor": self.history_entry.actor,
            }),
        ))
    }
}

/// Enforces the order transition table and keeps the history ledger and the
/// processing queue consistent with every status change.
pub struct OrderStateMachine<S: OrderStore> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: OrderStore> Clone for OrderStateMachine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<S: OrderStore> OrderStateMachine<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Transition an order in its own unit of work, then notify.
    #[instrument(skip(self, notes), fields(order_id = %order_id, to = %new_status))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
        notes: Option<String>,
    ) -> StateMachineResult<TransitionRecord> {
        let mut uow = self.store.begin().await?;
        let record = self
            .transition_in(&mut uow, order_id, new_status, actor, notes)
            .await?;
        self.store.commit(uow).await?;

        self.publish(&record).await;
        Ok(record)
    }

    /// Load the order (locked) and transition it inside the caller's unit of work.
    pub async fn transition_in(
        &self,
        uow: &mut S::UnitOfWork,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
        notes: Option<String>,
    ) -> StateMachineResult<TransitionRecord> {
        let mut order = self.store.get_order_for_update(uow, order_id).await?;
        self.apply(uow, &mut order, new_status, actor, notes).await
    }

    /// Transition an already-loaded order inside the caller's unit of work.
    ///
    /// `order` is updated in place so callers can keep working with it.
    pub async fn apply(
        &self,
        uow: &mut S::UnitOfWork,
        order: &mut Order,
        new_status: OrderStatus,
        actor: &str,
        notes: Option<String>,
    ) -> StateMachineResult<TransitionRecord> {
        let from = order.status;
        if !from.can_transition_to(new_status) {
            debug!(order_id = %order.id, %from, to = %new_status, "Rejected order transition");
            return Err(StateMachineError::invalid_transition(from, new_status));
        }

        let now = Utc::now();
        order.status = new_status;
        order.updated_at = now;
        if new_status == OrderStatus::Delivered {
            order.delivered_at = Some(now);
        }
        self.store.update_order(uow, order).await?;

        let history_entry =
            StatusHistoryEntry::new(order.id, Some(from), new_status, actor, notes, now);
        self.store.append_status_history(uow, &history_entry).await?;

        let completed_queue_entry = if new_status.completes_queue_entry() {
            match self.store.active_queue_entry(uow, order.id).await? {
                Some(mut entry) => {
                    entry.complete(now);
                    self.store.upsert_queue_entry(uow, &entry).await?;
                    Some(entry)
                }
                None => None,
            }
        } else {
            None
        };

        log_order_operation(
            "transition",
            Some(order.id),
            new_status.as_str(),
            Some(actor),
            Some(&format!("from {from}")),
        );

        Ok(TransitionRecord {
            order: order.clone(),
            from,
            to: new_status,
            history_entry,
            completed_queue_entry,
        })
    }

    /// Send the notification owed for a committed transition.
    ///
    /// Delivery failures are logged; the transition itself already committed.
    pub async fn publish(&self, record: &TransitionRecord) {
        if let Some(notification) = record.notification() {
            self.send(notification).await;
        }
    }

    pub async fn send(&self, notification: Notification) {
        let name = notification.name.clone();
        let order_id = notification.order_id;
        if let Err(error) = self.notifier.notify(notification).await {
            warn!(event = %name, %order_id, %error, "Notification delivery failed");
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
