//! In-memory [`OrderStore`] and [`TaskQueue`].
//!
//! Units of work are serialized behind one async mutex: `begin` takes the
//! lock and a working copy of the state, `commit` writes the copy back and
//! dropping the unit of work discards it. Never open a second unit of work
//! from a task that already holds one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{OrderStore, StorageError, StorageResult};
use crate::messaging::{QueueError, QueueResult, QueuedMessage, TaskQueue};
use crate::models::queue_entry::queue_ordering;
use crate::models::{
    AutomationRule, ExceptionStatus, Order, OrderException, OrderStatus, PartyMember,
    ProcessedEvent, ProcessingAnalytics, QueueEntry, QueueFilter, StatusHistoryEntry,
};

#[derive(Debug, Default, Clone)]
struct MemoryQueue {
    next_msg_id: i64,
    messages: Vec<QueuedMessage>,
    archive: Vec<QueuedMessage>,
}

#[derive(Debug, Default, Clone)]
struct MemoryState {
    orders: HashMap<Uuid, Order>,
    history: Vec<StatusHistoryEntry>,
    queue_entries: HashMap<Uuid, QueueEntry>,
    exceptions: Vec<OrderException>,
    analytics: HashMap<Uuid, ProcessingAnalytics>,
    rules: Vec<AutomationRule>,
    party_members: Vec<PartyMember>,
    processed_events: HashMap<String, ProcessedEvent>,
    task_queues: HashMap<String, MemoryQueue>,
}

/// Process-local store; clones share the same state
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

/// Exclusive access to the store plus a working copy of its state
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    type UnitOfWork = MemoryUnitOfWork;

    async fn begin(&self) -> StorageResult<MemoryUnitOfWork> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryUnitOfWork { guard, working })
    }

    async fn commit(&self, uow: MemoryUnitOfWork) -> StorageResult<()> {
        let MemoryUnitOfWork { mut guard, working } = uow;
        *guard = working;
        Ok(())
    }

    async fn rollback(&self, uow: MemoryUnitOfWork) -> StorageResult<()> {
        drop(uow);
        Ok(())
    }

    async fn insert_order(&self, uow: &mut MemoryUnitOfWork, order: &Order) -> StorageResult<()> {
        if uow.working.orders.contains_key(&order.id) {
            return Err(StorageError::duplicate("order", order.id.to_string()));
        }
        uow.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order_for_update(
        &self,
        uow: &mut MemoryUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Order> {
        uow.working
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(StorageError::OrderNotFound(order_id))
    }

    async fn update_order(&self, uow: &mut MemoryUnitOfWork, order: &Order) -> StorageResult<()> {
        match uow.working.orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(StorageError::OrderNotFound(order.id)),
        }
    }

    async fn list_orders(
        &self,
        uow: &mut MemoryUnitOfWork,
        status: Option<OrderStatus>,
    ) -> StorageResult<Vec<Order>> {
        let mut orders: Vec<Order> = uow
            .working
            .orders
            .values()
            .filter(|order| status.map_or(true, |s| order.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn append_status_history(
        &self,
        uow: &mut MemoryUnitOfWork,
        entry: &StatusHistoryEntry,
    ) -> StorageResult<()> {
        uow.working.history.push(entry.clone());
        Ok(())
    }

    async fn status_history(
        &self,
        uow: &mut MemoryUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Vec<StatusHistoryEntry>> {
        let mut entries: Vec<StatusHistoryEntry> = uow
            .working
            .history
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }

    async fn active_queue_entry(
        &self,
        uow: &mut MemoryUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Option<QueueEntry>> {
        Ok(uow
            .working
            .queue_entries
            .values()
            .find(|entry| entry.order_id == order_id && entry.queue_status.is_active())
            .cloned())
    }

    async fn upsert_queue_entry(
        &self,
        uow: &mut MemoryUnitOfWork,
        entry: &QueueEntry,
    ) -> StorageResult<()> {
        if entry.queue_status.is_active() {
            let conflicting = uow.working.queue_entries.values().any(|existing| {
                existing.order_id == entry.order_id
                    && existing.id != entry.id
                    && existing.queue_status.is_active()
            });
            if conflicting {
                return Err(StorageError::duplicate(
                    "active queue entry",
                    entry.order_id.to_string(),
                ));
            }
        }
        uow.working.queue_entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn list_queue(
        &self,
        uow: &mut MemoryUnitOfWork,
        filter: &QueueFilter,
    ) -> StorageResult<Vec<QueueEntry>> {
        let mut entries: Vec<QueueEntry> = uow
            .working
            .queue_entries
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        entries.sort_by(queue_ordering);
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    async fn insert_exception(
        &self,
        uow: &mut MemoryUnitOfWork,
        exception: &OrderException,
    ) -> StorageResult<()> {
        if !uow.working.orders.contains_key(&exception.order_id) {
            return Err(StorageError::OrderNotFound(exception.order_id));
        }
        uow.working.exceptions.push(exception.clone());
        Ok(())
    }

    async fn get_exception_for_update(
        &self,
        uow: &mut MemoryUnitOfWork,
        exception_id: Uuid,
    ) -> StorageResult<OrderException> {
        uow.working
            .exceptions
            .iter()
            .find(|exception| exception.id == exception_id)
            .cloned()
            .ok_or(StorageError::ExceptionNotFound(exception_id))
    }

    async fn update_exception(
        &self,
        uow: &mut MemoryUnitOfWork,
        exception: &OrderException,
    ) -> StorageResult<()> {
        match uow
            .working
            .exceptions
            .iter_mut()
            .find(|existing| existing.id == exception.id)
        {
            Some(existing) => {
                *existing = exception.clone();
                Ok(())
            }
            None => Err(StorageError::ExceptionNotFound(exception.id)),
        }
    }

    async fn exceptions_for_order(
        &self,
        uow: &mut MemoryUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Vec<OrderException>> {
        Ok(uow
            .working
            .exceptions
            .iter()
            .filter(|exception| exception.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_exceptions(
        &self,
        uow: &mut MemoryUnitOfWork,
        status: Option<ExceptionStatus>,
    ) -> StorageResult<Vec<OrderException>> {
        Ok(uow
            .working
            .exceptions
            .iter()
            .filter(|exception| status.map_or(true, |s| exception.status == s))
            .cloned()
            .collect())
    }

    async fn upsert_analytics(
        &self,
        uow: &mut MemoryUnitOfWork,
        analytics: &ProcessingAnalytics,
    ) -> StorageResult<()> {
        uow.working
            .analytics
            .insert(analytics.order_id, analytics.clone());
        Ok(())
    }

    async fn get_analytics(
        &self,
        uow: &mut MemoryUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Option<ProcessingAnalytics>> {
        Ok(uow.working.analytics.get(&order_id).cloned())
    }

    async fn list_analytics(
        &self,
        uow: &mut MemoryUnitOfWork,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<ProcessingAnalytics>> {
        let mut rows: Vec<ProcessingAnalytics> = uow
            .working
            .analytics
            .values()
            .filter(|row| row.calculated_at >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.calculated_at
                .cmp(&b.calculated_at)
                .then(a.order_id.cmp(&b.order_id))
        });
        Ok(rows)
    }

    async fn active_automation_rules(
        &self,
        uow: &mut MemoryUnitOfWork,
    ) -> StorageResult<Vec<AutomationRule>> {
        let mut rules: Vec<AutomationRule> = uow
            .working
            .rules
            .iter()
            .filter(|rule| rule.active)
            .cloned()
            .collect();
        rules.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(rules)
    }

    async fn insert_automation_rule(
        &self,
        uow: &mut MemoryUnitOfWork,
        rule: &AutomationRule,
    ) -> StorageResult<()> {
        uow.working.rules.push(rule.clone());
        Ok(())
    }

    async fn insert_party_member(
        &self,
        uow: &mut MemoryUnitOfWork,
        member: &PartyMember,
    ) -> StorageResult<()> {
        let email = member.email.to_lowercase();
        let duplicate = uow
            .working
            .party_members
            .iter()
            .any(|existing| {
                existing.order_id == member.order_id && existing.email.to_lowercase() == email
            });
        if duplicate {
            return Err(StorageError::duplicate("party member", member.email.clone()));
        }
        uow.working.party_members.push(member.clone());
        Ok(())
    }

    async fn party_members(
        &self,
        uow: &mut MemoryUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Vec<PartyMember>> {
        Ok(uow
            .working
            .party_members
            .iter()
            .filter(|member| member.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn find_processed_event(
        &self,
        uow: &mut MemoryUnitOfWork,
        idempotency_key: &str,
    ) -> StorageResult<Option<ProcessedEvent>> {
        Ok(uow.working.processed_events.get(idempotency_key).cloned())
    }

    async fn record_processed_event(
        &self,
        uow: &mut MemoryUnitOfWork,
        event: &ProcessedEvent,
    ) -> StorageResult<()> {
        if uow
            .working
            .processed_events
            .contains_key(&event.idempotency_key)
        {
            return Err(StorageError::duplicate(
                "processed event",
                event.idempotency_key.clone(),
            ));
        }
        uow.working
            .processed_events
            .insert(event.idempotency_key.clone(), event.clone());
        Ok(())
    }

    async fn schedule_task(
        &self,
        uow: &mut MemoryUnitOfWork,
        queue_name: &str,
        payload: &serde_json::Value,
        delay_seconds: u64,
    ) -> StorageResult<i64> {
        let now = Utc::now();
        let delay = i64::try_from(delay_seconds).unwrap_or(i64::MAX / 1000);
        let queue = uow
            .working
            .task_queues
            .entry(queue_name.to_string())
            .or_default();
        queue.next_msg_id += 1;
        let msg_id = queue.next_msg_id;
        queue.messages.push(QueuedMessage {
            msg_id,
            read_ct: 0,
            enqueued_at: now,
            vt: now + Duration::seconds(delay),
            message: payload.clone(),
        });
        Ok(msg_id)
    }
}

#[async_trait]
impl TaskQueue for InMemoryStore {
    async fn ensure_queue(&self, queue_name: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state
            .task_queues
            .entry(queue_name.to_string())
            .or_default();
        Ok(())
    }

    async fn read_messages(
        &self,
        queue_name: &str,
        visibility_timeout_seconds: i32,
        limit: i32,
    ) -> QueueResult<Vec<QueuedMessage>> {
        let mut state = self.state.lock().await;
        let queue = state
            .task_queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue_name.to_string(),
            })?;

        let now = Utc::now();
        let hidden_until = now + Duration::seconds(i64::from(visibility_timeout_seconds));
        let limit = usize::try_from(limit).unwrap_or(0);

        let mut read = Vec::new();
        for message in queue.messages.iter_mut().filter(|m| m.vt <= now) {
            if read.len() >= limit {
                break;
            }
            message.read_ct += 1;
            message.vt = hidden_until;
            read.push(message.clone());
        }
        Ok(read)
    }

    async fn delete_message(&self, queue_name: &str, msg_id: i64) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        let Some(queue) = state.task_queues.get_mut(queue_name) else {
            return Ok(false);
        };
        let before = queue.messages.len();
        queue.messages.retain(|message| message.msg_id != msg_id);
        Ok(queue.messages.len() != before)
    }

    async fn archive_message(&self, queue_name: &str, msg_id: i64) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        let Some(queue) = state.task_queues.get_mut(queue_name) else {
            return Ok(false);
        };
        match queue.messages.iter().position(|m| m.msg_id == msg_id) {
            Some(index) => {
                let message = queue.messages.remove(index);
                queue.archive.push(message);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn queue_length(&self, queue_name: &str) -> QueueResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .task_queues
            .get(queue_name)
            .map(|queue| queue.messages.len() as i64)
            .unwrap_or(0))
    }
}
