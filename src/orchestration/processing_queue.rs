//! # Processing Queue
//!
//! Keeps exactly one non-completed queue entry per paid, unshipped order,
//! scored by the [`PriorityScorer`]. Entries are completed by the order state machine
//! when the order ships, is delivered or is cancelled.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::priority_scorer::{PriorityScore, PriorityScorer};
use crate::database::OrderStore;
use crate::error::{OrderOpsError, Result};
use crate::models::{Order, QueueEntry, QueueFilter, QueueStatus};

/// Active assignment count for one processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessorLoad {
    pub processor: String,
    pub active_assignments: usize,
}

/// Result of routing an order to a processor
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub assigned_to: String,
    pub queue_entry: QueueEntry,
    /// Loads observed before this assignment, in request order
    pub processor_loads: Vec<ProcessorLoad>,
}

pub struct ProcessingQueue<S: OrderStore> {
    store: Arc<S>,
    scorer: PriorityScorer,
}

impl<S: OrderStore> ProcessingQueue<S> {
    pub fn new(store: Arc<S>, scorer: PriorityScorer) -> Self {
        Self { store, scorer }
    }

    pub fn scorer(&self) -> &PriorityScorer {
        &self.scorer
    }

    /// Create the order's active entry or refresh its score.
    #[instrument(skip(self))]
    pub async fn create_entry(&self, order_id: Uuid) -> Result<QueueEntry> {
        let mut uow = self.store.begin().await?;
        let mut order = self.store.get_order_for_update(&mut uow, order_id).await?;
        let entry = self.enqueue_in(&mut uow, &mut order, Utc::now()).await?;
        self.store.commit(uow).await?;
        Ok(entry)
    }

    /// Upsert the active entry for `order` inside the caller's unit of work.
    ///
    /// Raises the order's priority level to the scored level if needed; an
    /// assignment on an existing entry is preserved.
    pub async fn enqueue_in(
        &self,
        uow: &mut S::UnitOfWork,
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> Result<QueueEntry> {
        if !order.status.is_queueable() {
            return Err(OrderOpsError::validation(format!(
                "order {} is {} and cannot be queued",
                order.id, order.status
            )));
        }

        let score = self.apply_score(uow, order, now).await?;
        let entry = match self.store.active_queue_entry(uow, order.id).await? {
            Some(mut entry) => {
                Self::refresh(&mut entry, order, &score, now);
                entry
            }
            None => QueueEntry {
                id: Uuid::new_v4(),
                order_id: order.id,
                priority_score: score.numeric_score,
                priority_level: order.priority_level,
                queue_status: QueueStatus::Waiting,
                assigned_to: None,
                estimated_completion: score.estimated_completion(now),
                created_at: now,
                updated_at: now,
                completed_at: None,
            },
        };
        self.store.upsert_queue_entry(uow, &entry).await?;

        info!(
            order_id = %order.id,
            priority_score = entry.priority_score,
            priority_level = %entry.priority_level,
            queue_status = %entry.queue_status,
            "Order queued"
        );
        Ok(entry)
    }

    /// Rescore after the order's attributes changed. Updates the active
    /// entry when there is one.
    pub async fn rescore_in(
        &self,
        uow: &mut S::UnitOfWork,
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueEntry>> {
        let score = self.apply_score(uow, order, now).await?;
        match self.store.active_queue_entry(uow, order.id).await? {
            Some(mut entry) => {
                Self::refresh(&mut entry, order, &score, now);
                self.store.upsert_queue_entry(uow, &entry).await?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Score the order and persist a raised priority level. Levels never drop.
    async fn apply_score(
        &self,
        uow: &mut S::UnitOfWork,
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> Result<PriorityScore> {
        let score = self.scorer.score(order, now);
        let level = score.priority_level.max(order.priority_level);
        if level != order.priority_level {
            debug!(order_id = %order.id, from = %order.priority_level, to = %level, "Raising priority");
            order.priority_level = level;
            order.updated_at = now;
        }
        // Attribute changes made by the caller are persisted here as well
        self.store.update_order(uow, order).await?;
        Ok(score)
    }

    fn refresh(entry: &mut QueueEntry, order: &Order, score: &PriorityScore, now: DateTime<Utc>) {
        entry.priority_score = score.numeric_score;
        entry.priority_level = order.priority_level;
        entry.estimated_completion = score.estimated_completion(now);
        entry.updated_at = now;
    }

    pub async fn list(&self, filter: &QueueFilter) -> Result<Vec<QueueEntry>> {
        let mut uow = self.store.begin().await?;
        let entries = self.store.list_queue(&mut uow, filter).await?;
        self.store.rollback(uow).await?;
        Ok(entries)
    }

    /// Assign the order's active entry to the processor with the fewest
    /// active assignments. Ties go to the processor listed first.
    pub async fn assign_least_loaded_in(
        &self,
        uow: &mut S::UnitOfWork,
        order_id: Uuid,
        processors: &[String],
        now: DateTime<Utc>,
    ) -> Result<RoutingDecision> {
        if processors.is_empty() {
            return Err(OrderOpsError::validation("processors must not be empty"));
        }

        let mut entry = self
            .store
            .active_queue_entry(uow, order_id)
            .await?
            .ok_or_else(|| {
                OrderOpsError::validation(format!("order {order_id} has no active queue entry"))
            })?;

        let assigned = self
            .store
            .list_queue(
                uow,
                &QueueFilter {
                    queue_status: Some(QueueStatus::Assigned),
                    ..Default::default()
                },
            )
            .await?;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for other in assigned.iter().filter(|e| e.order_id != order_id) {
            if let Some(assignee) = other.assigned_to.as_deref() {
                *counts.entry(assignee).or_default() += 1;
            }
        }

        let processor_loads: Vec<ProcessorLoad> = processors
            .iter()
            .map(|processor| ProcessorLoad {
                processor: processor.clone(),
                active_assignments: counts.get(processor.as_str()).copied().unwrap_or(0),
            })
            .collect();

        // min_by_key returns the first minimum, which is the tie-break we want
        let chosen = processor_loads
            .iter()
            .min_by_key(|load| load.active_assignments)
            .map(|load| load.processor.clone())
            .ok_or_else(|| OrderOpsError::validation("processors must not be empty"))?;

        entry.assign(chosen.clone(), now);
        self.store.upsert_queue_entry(uow, &entry).await?;

        info!(%order_id, assigned_to = %chosen, "Order routed");
        Ok(RoutingDecision {
            assigned_to: chosen,
            queue_entry: entry,
            processor_loads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStore;
    use crate::models::{NewOrder, OrderStatus, OrderType, PriorityLevel};

    async fn seed(store: &InMemoryStore, total: f64) -> Order {
        let mut order = Order::from_new(
            NewOrder {
                customer_id: "cust_queue".to_string(),
                customer_tier: Default::default(),
                total_amount: total,
                order_type: OrderType::Standard,
                rush_order: false,
                group_order: false,
                party_size: 0,
                event_date: None,
            },
            Utc::now(),
        );
        order.status = OrderStatus::PaymentConfirmed;
        let mut uow = store.begin().await.unwrap();
        store.insert_order(&mut uow, &order).await.unwrap();
        store.commit(uow).await.unwrap();
        order
    }

    fn queue(store: &InMemoryStore) -> ProcessingQueue<InMemoryStore> {
        ProcessingQueue::new(Arc::new(store.clone()), PriorityScorer::default())
    }

    #[tokio::test]
    async fn test_create_entry_is_idempotent_per_order() {
        let store = InMemoryStore::new();
        let order = seed(&store, 6000.0).await;
        let queue = queue(&store);

        let first = queue.create_entry(order.id).await.unwrap();
        let second = queue.create_entry(order.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.priority_score, 150);
        assert_eq!(second.priority_level, PriorityLevel::High);

        let all = queue.list(&QueueFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);

        let mut uow = store.begin().await.unwrap();
        let stored = store.get_order_for_update(&mut uow, order.id).await.unwrap();
        assert_eq!(stored.priority_level, PriorityLevel::High);
    }

    #[tokio::test]
    async fn test_queue_lists_highest_score_first() {
        let store = InMemoryStore::new();
        let small = seed(&store, 100.0).await;
        let large = seed(&store, 9000.0).await;
        let queue = queue(&store);

        queue.create_entry(small.id).await.unwrap();
        queue.create_entry(large.id).await.unwrap();

        let entries = queue.list(&QueueFilter::default()).await.unwrap();
        assert_eq!(entries[0].order_id, large.id);
        assert_eq!(entries[1].order_id, small.id);
    }

    #[tokio::test]
    async fn test_terminal_orders_cannot_be_queued() {
        let store = InMemoryStore::new();
        let mut order = seed(&store, 100.0).await;
        order.status = OrderStatus::Cancelled;
        let mut uow = store.begin().await.unwrap();
        store.update_order(&mut uow, &order).await.unwrap();
        store.commit(uow).await.unwrap();

        let result = queue(&store).create_entry(order.id).await;
        assert!(matches!(result, Err(OrderOpsError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unpaid_and_shipped_orders_cannot_be_queued() {
        let store = InMemoryStore::new();
        let queue = queue(&store);
        for status in [OrderStatus::PendingPayment, OrderStatus::Shipped] {
            let mut order = seed(&store, 100.0).await;
            order.status = status;
            let mut uow = store.begin().await.unwrap();
            store.update_order(&mut uow, &order).await.unwrap();
            store.commit(uow).await.unwrap();

            let result = queue.create_entry(order.id).await;
            assert!(matches!(result, Err(OrderOpsError::Validation(_))), "{status}");
        }
        assert!(queue.list(&QueueFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_routing_picks_least_loaded_with_first_listed_tie_break() {
        let store = InMemoryStore::new();
        let queue = queue(&store);
        let busy = seed(&store, 100.0).await;
        let target = seed(&store, 100.0).await;
        queue.create_entry(busy.id).await.unwrap();
        queue.create_entry(target.id).await.unwrap();

        let processors = vec!["alice".to_string(), "bob".to_string(), "carol".to_string()];

        let mut uow = store.begin().await.unwrap();
        let first = queue
            .assign_least_loaded_in(&mut uow, busy.id, &processors, Utc::now())
            .await
            .unwrap();
        assert_eq!(first.assigned_to, "alice");

        let second = queue
            .assign_least_loaded_in(&mut uow, target.id, &processors, Utc::now())
            .await
            .unwrap();
        assert_eq!(second.assigned_to, "bob");
        assert_eq!(second.processor_loads[0].active_assignments, 1);
        assert_eq!(second.queue_entry.queue_status, QueueStatus::Assigned);
    }

    #[tokio::test]
    async fn test_routing_requires_processors_and_entry() {
        let store = InMemoryStore::new();
        let queue = queue(&store);
        let order = seed(&store, 100.0).await;

        let mut uow = store.begin().await.unwrap();
        let no_processors = queue
            .assign_least_loaded_in(&mut uow, order.id, &[], Utc::now())
            .await;
        assert!(matches!(no_processors, Err(OrderOpsError::Validation(_))));

        let no_entry = queue
            .assign_least_loaded_in(&mut uow, order.id, &["alice".to_string()], Utc::now())
            .await;
        assert!(matches!(no_entry, Err(OrderOpsError::Validation(_))));
    }
}
