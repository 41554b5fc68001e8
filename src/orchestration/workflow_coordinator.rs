//! # Workflow Coordinator
//!
//! Runs each named order action as a fixed sequence of steps inside a single
//! unit of work:
//!
//! 1. load (and lock) the order
//! 2. apply a state machine transition with its history entry
//! 3. score the order and upsert its processing queue entry
//! 4. record exceptions and schedule auto-resolution tasks
//! 5. recompute analytics
//!
//! The unit of work commits as a whole; any failing step rolls everything
//! back. Notifications go out only after the commit succeeds.
//!
//! ## Idempotency
//!
//! [`WorkflowCoordinator::process_payment_confirmation`] records its response
//! under the payment event id in the same unit of work. A replay of the same
//! event returns the recorded response without touching the order.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use super::automation_rules::{AutomationRulesEngine, RulesEvaluation};
use super::exception_tracker::{CreatedException, ExceptionTracker};
use super::processing_queue::{ProcessingQueue, RoutingDecision};
use super::wedding_party::{InviteResult, WeddingPartyCoordinator};
use crate::analytics::AnalyticsService;
use crate::constants::{actions, SYSTEM_ACTOR};
use crate::database::{OrderStore, StorageError};
use crate::error::{OrderOpsError, Result};
use crate::logging::log_order_operation;
use crate::models::{
    ExceptionSeverity, ExceptionType, NewOrder, NewPartyMember, Order, OrderStatus,
    ProcessedEvent, ProcessingAnalytics, QueueEntry, StatusHistoryEntry,
};
use crate::state_machine::{OrderStateMachine, TransitionRecord};

/// Payment amounts may differ from the order total by at most this much
const AMOUNT_TOLERANCE: f64 = 0.01;

// -- Requests -----------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub order_id: Uuid,
    /// Idempotency key from the payment provider
    pub payment_event_id: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRequest {
    pub order_id: Uuid,
    pub processors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleItem {
    pub sku: String,
    pub quantity: i32,
    /// Current stock level; `None` when the inventory system has no figure
    #[serde(default)]
    pub available_stock: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleRequest {
    pub order_id: Uuid,
    pub items: Vec<BundleItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeddingPartyRequest {
    pub order_id: Uuid,
    pub event_date: NaiveDate,
    #[serde(default)]
    pub members: Vec<NewPartyMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionRequest {
    pub order_id: Uuid,
    pub exception_type: ExceptionType,
    pub severity: ExceptionSeverity,
    pub description: String,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityInspection {
    pub order_id: Uuid,
    pub passed: bool,
    pub inspector: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Severity of the exception raised on failure; defaults to high
    #[serde(default)]
    pub severity: Option<ExceptionSeverity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub order_id: Uuid,
    pub status: OrderStatus,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

// -- Results ------------------------------------------------------------------

/// Response of an idempotent action; `replayed` is true for duplicates
#[derive(Debug, Clone, Serialize)]
pub struct IdempotentResponse {
    pub replayed: bool,
    #[serde(flatten)]
    pub response: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmationResult {
    pub order: Order,
    pub transition: TransitionRecord,
    pub queue_entry: Option<QueueEntry>,
    pub automation: RulesEvaluation,
    pub analytics: ProcessingAnalytics,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingResult {
    pub routing: RoutingDecision,
    pub transition: Option<TransitionRecord>,
}

text_enum! {
    pub enum StockStatus {
        Available => "available",
        InsufficientStock => "insufficient_stock",
        UnknownStock => "unknown_stock",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleItemCheck {
    pub sku: String,
    pub quantity: i32,
    pub available_stock: Option<i32>,
    pub status: StockStatus,
}

impl BundleItemCheck {
    fn check(item: &BundleItem) -> Self {
        let status = match item.available_stock {
            None => StockStatus::UnknownStock,
            Some(stock) if stock < item.quantity => StockStatus::InsufficientStock,
            Some(_) => StockStatus::Available,
        };
        Self {
            sku: item.sku.trim().to_string(),
            quantity: item.quantity,
            available_stock: item.available_stock,
            status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleResult {
    pub order_id: Uuid,
    pub items: Vec<BundleItemCheck>,
    pub exceptions: Vec<CreatedException>,
    pub transition: Option<TransitionRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeddingPartyResult {
    pub order: Order,
    pub queue_entry: Option<QueueEntry>,
    pub invitations: Vec<InviteResult>,
    pub invited: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityResult {
    pub passed: bool,
    pub transition: Option<TransitionRecord>,
    pub exception: Option<CreatedException>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdateResult {
    pub transition: TransitionRecord,
    pub analytics: ProcessingAnalytics,
}

// -- Coordinator --------------------------------------------------------------

pub struct WorkflowCoordinator<S: OrderStore> {
    store: Arc<S>,
    fsm: OrderStateMachine<S>,
    queue: Arc<ProcessingQueue<S>>,
    tracker: Arc<ExceptionTracker<S>>,
    rules: Arc<AutomationRulesEngine<S>>,
    party: Arc<WeddingPartyCoordinator<S>>,
    analytics: Arc<AnalyticsService<S>>,
}

impl<S: OrderStore> WorkflowCoordinator<S> {
    pub fn new(
        fsm: OrderStateMachine<S>,
        queue: Arc<ProcessingQueue<S>>,
        tracker: Arc<ExceptionTracker<S>>,
        rules: Arc<AutomationRulesEngine<S>>,
        party: Arc<WeddingPartyCoordinator<S>>,
        analytics: Arc<AnalyticsService<S>>,
    ) -> Self {
        Self {
            store: Arc::clone(fsm.store()),
            fsm,
            queue,
            tracker,
            rules,
            party,
            analytics,
        }
    }

    pub fn queue(&self) -> &Arc<ProcessingQueue<S>> {
        &self.queue
    }

    pub fn tracker(&self) -> &Arc<ExceptionTracker<S>> {
        &self.tracker
    }

    pub fn rules(&self) -> &Arc<AutomationRulesEngine<S>> {
        &self.rules
    }

    pub fn analytics(&self) -> &Arc<AnalyticsService<S>> {
        &self.analytics
    }

    pub fn party(&self) -> &Arc<WeddingPartyCoordinator<S>> {
        &self.party
    }

    /// Create an order in `pending_payment` with its initial history entry.
    #[instrument(skip(self, new_order), fields(customer_id = %new_order.customer_id))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<Order> {
        new_order.validate().map_err(OrderOpsError::Validation)?;

        let now = Utc::now();
        let order = Order::from_new(new_order, now);
        let history = StatusHistoryEntry::new(
            order.id,
            None,
            order.status,
            SYSTEM_ACTOR,
            Some("Order created".to_string()),
            now,
        );

        let mut uow = self.store.begin().await?;
        self.store.insert_order(&mut uow, &order).await?;
        self.store.append_status_history(&mut uow, &history).await?;
        self.store.commit(uow).await?;

        log_order_operation(
            "create_order",
            Some(order.id),
            order.status.as_str(),
            Some(SYSTEM_ACTOR),
            Some(order.order_type.as_str()),
        );
        Ok(order)
    }

    /// Confirm payment, queue the order, run automation rules and analytics.
    ///
    /// Idempotent on `payment_event_id`.
    #[instrument(skip(self, request), fields(order_id = %request.order_id, event = %request.payment_event_id))]
    pub async fn process_payment_confirmation(
        &self,
        request: PaymentConfirmation,
    ) -> Result<IdempotentResponse> {
        let key = request.payment_event_id.trim();
        if key.is_empty() {
            return Err(OrderOpsError::validation("payment_event_id is required"));
        }

        let mut uow = self.store.begin().await?;
        if let Some(previous) = self.store.find_processed_event(&mut uow, key).await? {
            self.store.rollback(uow).await?;
            info!(idempotency_key = %key, "Replaying processed payment confirmation");
            return Ok(IdempotentResponse {
                replayed: true,
                response: previous.response,
            });
        }

        let mut order = self.store.get_order_for_update(&mut uow, request.order_id).await?;
        if let Some(amount) = request.amount {
            if (amount - order.total_amount).abs() > AMOUNT_TOLERANCE {
                return Err(OrderOpsError::validation(format!(
                    "payment amount {amount:.2} does not match order total {:.2}",
                    order.total_amount
                )));
            }
        }

        let now = Utc::now();
        let transition = self
            .fsm
            .apply(
                &mut uow,
                &mut order,
                OrderStatus::PaymentConfirmed,
                SYSTEM_ACTOR,
                Some(format!("Payment event {key}")),
            )
            .await?;
        self.queue.enqueue_in(&mut uow, &mut order, now).await?;
        let automation = self.rules.evaluate_in(&mut uow, &mut order, now).await?;
        let analytics = self.analytics.calculate_in(&mut uow, order.id).await?;
        // Rules may have reassigned or re-leveled the entry
        let queue_entry = self.store.active_queue_entry(&mut uow, order.id).await?;

        let result = PaymentConfirmationResult {
            order,
            transition,
            queue_entry,
            automation,
            analytics,
        };
        let response = serde_json::to_value(&result).map_err(StorageError::from)?;
        self.store
            .record_processed_event(
                &mut uow,
                &ProcessedEvent {
                    idempotency_key: key.to_string(),
                    action: actions::PROCESS_PAYMENT_CONFIRMATION.to_string(),
                    order_id: Some(result.order.id),
                    response: response.clone(),
                    created_at: now,
                },
            )
            .await?;
        self.store.commit(uow).await?;

        self.fsm.publish(&result.transition).await;
        self.rules.notify(&result.automation).await;
        Ok(IdempotentResponse {
            replayed: false,
            response,
        })
    }

    /// Assign the order to the least-loaded processor and start processing.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn intelligent_order_routing(&self, request: RoutingRequest) -> Result<RoutingResult> {
        let processors: Vec<String> = request
            .processors
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if processors.is_empty() {
            return Err(OrderOpsError::validation("at least one processor is required"));
        }

        let mut uow = self.store.begin().await?;
        let mut order = self.store.get_order_for_update(&mut uow, request.order_id).await?;
        if !order.status.is_queueable() {
            return Err(OrderOpsError::validation(format!(
                "order {} is {} and cannot be routed",
                order.id, order.status
            )));
        }
        let now = Utc::now();
        if self.store.active_queue_entry(&mut uow, order.id).await?.is_none() {
            self.queue.enqueue_in(&mut uow, &mut order, now).await?;
        }

        let routing = self
            .queue
            .assign_least_loaded_in(&mut uow, order.id, &processors, now)
            .await?;
        let transition = if order.status == OrderStatus::PaymentConfirmed {
            let notes = format!("Routed to {}", routing.assigned_to);
            Some(
                self.fsm
                    .apply(&mut uow, &mut order, OrderStatus::Processing, SYSTEM_ACTOR, Some(notes))
                    .await?,
            )
        } else {
            None
        };
        self.analytics.calculate_in(&mut uow, order.id).await?;
        self.store.commit(uow).await?;

        if let Some(record) = &transition {
            self.fsm.publish(record).await;
        }
        Ok(RoutingResult {
            routing,
            transition,
        })
    }

    /// Check stock for each bundle item; raise exceptions for gaps or move
    /// the order to processing when everything is available.
    #[instrument(skip(self, request), fields(order_id = %request.order_id, items = request.items.len()))]
    pub async fn bundle_order_processing(&self, request: BundleRequest) -> Result<BundleResult> {
        if request.items.is_empty() {
            return Err(OrderOpsError::validation("bundle must contain at least one item"));
        }
        for item in &request.items {
            if item.sku.trim().is_empty() {
                return Err(OrderOpsError::validation("bundle item sku is required"));
            }
            if item.quantity <= 0 {
                return Err(OrderOpsError::validation(format!(
                    "quantity for {} must be positive",
                    item.sku
                )));
            }
        }

        let mut uow = self.store.begin().await?;
        let mut order = self.store.get_order_for_update(&mut uow, request.order_id).await?;
        let items: Vec<BundleItemCheck> = request.items.iter().map(BundleItemCheck::check).collect();

        let mut exceptions = Vec::new();
        for item in &items {
            let (exception_type, severity, description) = match item.status {
                StockStatus::Available => continue,
                StockStatus::UnknownStock => (
                    ExceptionType::InventoryCheck,
                    ExceptionSeverity::Low,
                    format!("Stock level unknown for {} (quantity {})", item.sku, item.quantity),
                ),
                StockStatus::InsufficientStock => (
                    ExceptionType::StockOut,
                    ExceptionSeverity::High,
                    format!(
                        "Insufficient stock for {}: requested {}, available {}",
                        item.sku,
                        item.quantity,
                        item.available_stock.unwrap_or(0)
                    ),
                ),
            };
            let created = self
                .tracker
                .create_in(&mut uow, &mut order, exception_type, severity, &description, SYSTEM_ACTOR)
                .await?;
            exceptions.push(created);
        }

        let transition = if exceptions.is_empty() && order.status != OrderStatus::Processing {
            Some(
                self.fsm
                    .apply(
                        &mut uow,
                        &mut order,
                        OrderStatus::Processing,
                        SYSTEM_ACTOR,
                        Some("All bundle items in stock".to_string()),
                    )
                    .await?,
            )
        } else {
            None
        };
        self.store.commit(uow).await?;

        for created in &exceptions {
            self.tracker.notify_created(created).await;
        }
        if let Some(record) = &transition {
            self.fsm.publish(record).await;
        }
        Ok(BundleResult {
            order_id: order.id,
            items,
            exceptions,
            transition,
        })
    }

    /// Set the event date, rescore the order and invite the party.
    #[instrument(skip(self, request), fields(order_id = %request.order_id, members = request.members.len()))]
    pub async fn wedding_party_coordination(
        &self,
        request: WeddingPartyRequest,
    ) -> Result<WeddingPartyResult> {
        let now = Utc::now();
        if request.event_date < now.date_naive() {
            return Err(OrderOpsError::validation(format!(
                "event_date {} is in the past",
                request.event_date
            )));
        }

        let mut uow = self.store.begin().await?;
        let mut order = self.store.get_order_for_update(&mut uow, request.order_id).await?;
        if order.status.is_terminal() {
            return Err(OrderOpsError::validation(format!(
                "order {} is {}",
                order.id, order.status
            )));
        }

        order.event_date = Some(request.event_date);
        order.updated_at = now;
        let queue_entry = self.queue.rescore_in(&mut uow, &mut order, now).await?;
        let invitations = self
            .party
            .invite_members_in(&mut uow, &order, request.members, now)
            .await?;
        self.store.commit(uow).await?;

        self.party.notify_invited(order.id, &invitations).await;
        let invited = invitations.iter().filter(|r| r.success).count();
        Ok(WeddingPartyResult {
            failed: invitations.len() - invited,
            invited,
            order,
            queue_entry,
            invitations,
        })
    }

    pub async fn exception_handling(&self, request: ExceptionRequest) -> Result<CreatedException> {
        let actor = request.actor.as_deref().unwrap_or(SYSTEM_ACTOR);
        self.tracker
            .create(
                request.order_id,
                request.exception_type,
                request.severity,
                &request.description,
                actor,
            )
            .await
    }

    /// Passed inspections move to packaging; failures raise a quality issue.
    #[instrument(skip(self, request), fields(order_id = %request.order_id, passed = request.passed))]
    pub async fn quality_assurance_workflow(&self, request: QualityInspection) -> Result<QualityResult> {
        let inspector = request.inspector.trim();
        if inspector.is_empty() {
            return Err(OrderOpsError::validation("inspector is required"));
        }

        let mut uow = self.store.begin().await?;
        let mut order = self.store.get_order_for_update(&mut uow, request.order_id).await?;

        let (transition, exception) = if request.passed {
            let record = self
                .fsm
                .apply(&mut uow, &mut order, OrderStatus::Packaging, inspector, request.notes)
                .await?;
            (Some(record), None)
        } else {
            let description = request
                .notes
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Quality inspection failed".to_string());
            let severity = request.severity.unwrap_or(ExceptionSeverity::High);
            let created = self
                .tracker
                .create_in(
                    &mut uow,
                    &mut order,
                    ExceptionType::QualityIssue,
                    severity,
                    &description,
                    inspector,
                )
                .await?;
            (None, Some(created))
        };
        self.analytics.calculate_in(&mut uow, order.id).await?;
        self.store.commit(uow).await?;

        if let Some(record) = &transition {
            self.fsm.publish(record).await;
        }
        if let Some(created) = &exception {
            self.tracker.notify_created(created).await;
        }
        Ok(QualityResult {
            passed: request.passed,
            transition,
            exception,
        })
    }

    /// Manual status change with analytics recomputation.
    #[instrument(skip(self, request), fields(order_id = %request.order_id, to = %request.status))]
    pub async fn update_order_status(&self, request: StatusUpdate) -> Result<StatusUpdateResult> {
        let actor = request.actor.as_deref().unwrap_or(SYSTEM_ACTOR);

        let mut uow = self.store.begin().await?;
        let transition = self
            .fsm
            .transition_in(&mut uow, request.order_id, request.status, actor, request.notes)
            .await?;
        let analytics = self.analytics.calculate_in(&mut uow, request.order_id).await?;
        self.store.commit(uow).await?;

        self.fsm.publish(&transition).await;
        Ok(StatusUpdateResult {
            transition,
            analytics,
        })
    }
}
