//! # Exception Tracker
//!
//! Records anomalies against orders, derives their customer impact, and owns
//! the exception lifecycle.
//!
//! ## Order Coupling
//!
//! - Creating a high or critical exception moves the order to `exception`
//!   through the order state machine (already in `exception` is a no-op).
//! - Resolving the last unresolved exception of an order that sits in
//!   `exception` moves it back to `processing` and makes sure the order holds
//!   an active processing queue entry.
//!
//! ## Auto-resolution
//!
//! Auto-resolvable exceptions get a durable task scheduled in the same unit of
//! work that created them. The background worker later calls
//! [`ExceptionTracker::attempt_auto_resolution`], which delegates to the
//! configured [`ResolutionStrategy`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::processing_queue::ProcessingQueue;
use super::resolution::ResolutionStrategy;
use crate::constants::{events, SYSTEM_ACTOR};
use crate::database::OrderStore;
use crate::error::{OrderOpsError, Result};
use crate::events::Notification;
use crate::logging::log_exception_operation;
use crate::messaging::AutoResolutionTask;
use crate::models::{
    ExceptionSeverity, ExceptionStatus, ExceptionType, ImpactLevel, Order, OrderException,
    OrderStatus,
};
use crate::state_machine::{OrderStateMachine, StateMachineError, TransitionRecord};

/// A newly recorded exception and its side effects
#[derive(Debug, Clone, Serialize)]
pub struct CreatedException {
    pub exception: OrderException,
    /// Set when the exception moved the order into `exception`
    pub order_transition: Option<TransitionRecord>,
    /// Message id of the scheduled auto-resolution task
    pub scheduled_task: Option<i64>,
}

/// A resolved exception and the order revert it caused, if any
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedException {
    pub exception: OrderException,
    pub order_transition: Option<TransitionRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutoResolutionOutcome {
    /// The exception no longer accepts automated attempts
    Skipped { exception_id: Uuid, reason: String },
    Resolved {
        exception: OrderException,
        order_reverted: bool,
    },
    /// Attempt recorded; the exception stays open for another try
    Failed { exception: OrderException },
}

pub struct ExceptionTracker<S: OrderStore> {
    store: Arc<S>,
    fsm: OrderStateMachine<S>,
    queue: Arc<ProcessingQueue<S>>,
    strategy: Arc<dyn ResolutionStrategy>,
    auto_resolution_delay_seconds: u64,
    queue_name: String,
}

impl<S: OrderStore> ExceptionTracker<S> {
    pub fn new(
        fsm: OrderStateMachine<S>,
        queue: Arc<ProcessingQueue<S>>,
        strategy: Arc<dyn ResolutionStrategy>,
        auto_resolution_delay_seconds: u64,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            store: Arc::clone(fsm.store()),
            fsm,
            queue,
            strategy,
            auto_resolution_delay_seconds,
            queue_name: queue_name.into(),
        }
    }

    /// Record an exception in its own unit of work, then notify.
    #[instrument(skip(self, description))]
    pub async fn create(
        &self,
        order_id: Uuid,
        exception_type: ExceptionType,
        severity: ExceptionSeverity,
        description: &str,
        actor: &str,
    ) -> Result<CreatedException> {
        let mut uow = self.store.begin().await?;
        let mut order = self.store.get_order_for_update(&mut uow, order_id).await?;
        let created = self
            .create_in(&mut uow, &mut order, exception_type, severity, description, actor)
            .await?;
        self.store.commit(uow).await?;

        self.notify_created(&created).await;
        Ok(created)
    }

    /// Record an exception against an already-locked order.
    pub async fn create_in(
        &self,
        uow: &mut S::UnitOfWork,
        order: &mut Order,
        exception_type: ExceptionType,
        severity: ExceptionSeverity,
        description: &str,
        actor: &str,
    ) -> Result<CreatedException> {
        let description = description.trim();
        if description.is_empty() {
            return Err(OrderOpsError::validation("exception description is required"));
        }

        let now = Utc::now();
        let exception = OrderException {
            id: Uuid::new_v4(),
            order_id: order.id,
            exception_type,
            severity,
            status: ExceptionStatus::Open,
            description: description.to_string(),
            auto_resolvable: exception_type.is_auto_resolvable(),
            customer_impact_level: ImpactLevel::assess(
                exception_type,
                severity,
                order.total_amount,
                order.rush_order,
            ),
            affects_delivery_date: exception_type.affects_delivery_date(),
            estimated_delay_days: exception_type.estimated_delay_days(severity),
            resolution_notes: None,
            auto_resolution_attempts: 0,
            escalated_to: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            escalated_at: None,
        };
        self.store.insert_exception(uow, &exception).await?;

        let order_transition = if severity.blocks_order() {
            self.halt_order(uow, order, &exception, actor).await?
        } else {
            None
        };

        let scheduled_task = if exception.auto_resolvable {
            let task = AutoResolutionTask::new(exception.id, order.id);
            let msg_id = self
                .store
                .schedule_task(
                    uow,
                    &self.queue_name,
                    &task.to_json()?,
                    self.auto_resolution_delay_seconds,
                )
                .await?;
            Some(msg_id)
        } else {
            None
        };

        log_exception_operation(
            "create",
            exception.id,
            order.id,
            exception.status.as_str(),
            Some(&format!(
                "{} {} impact={}",
                exception.exception_type, exception.severity, exception.customer_impact_level
            )),
        );

        Ok(CreatedException {
            exception,
            order_transition,
            scheduled_task,
        })
    }

    async fn halt_order(
        &self,
        uow: &mut S::UnitOfWork,
        order: &mut Order,
        exception: &OrderException,
        actor: &str,
    ) -> Result<Option<TransitionRecord>> {
        if order.status == OrderStatus::Exception {
            return Ok(None);
        }
        if order.status.is_terminal() {
            warn!(
                order_id = %order.id,
                status = %order.status,
                exception_id = %exception.id,
                "Blocking exception recorded on a terminal order; status left unchanged"
            );
            return Ok(None);
        }
        let notes = format!("{} exception: {}", exception.exception_type, exception.description);
        let record = self
            .fsm
            .apply(uow, order, OrderStatus::Exception, actor, Some(notes))
            .await?;
        Ok(Some(record))
    }

    pub async fn notify_created(&self, created: &CreatedException) {
        if let Some(record) = &created.order_transition {
            self.fsm.publish(record).await;
        }
        let exception = &created.exception;
        self.fsm
            .send(Notification::new(
                events::EXCEPTION_RAISED,
                exception.order_id,
                json!({
                    "exception_id": exception.id,
                    "exception_type": exception.exception_type,
                    "severity": exception.severity,
                    "customer_impact_level": exception.customer_impact_level,
                    "estimated_delay_days": exception.estimated_delay_days,
                }),
            ))
            .await;
    }

    /// Run one automated resolution attempt.
    ///
    /// Non-open or non-auto-resolvable exceptions are skipped, not errors.
    #[instrument(skip(self))]
    pub async fn attempt_auto_resolution(&self, exception_id: Uuid) -> Result<AutoResolutionOutcome> {
        let mut uow = self.store.begin().await?;
        let mut exception = self.store.get_exception_for_update(&mut uow, exception_id).await?;

        if !exception.accepts_auto_resolution() {
            self.store.rollback(uow).await?;
            let reason = if exception.auto_resolvable {
                format!("exception is {}", exception.status)
            } else {
                format!("{} is not auto-resolvable", exception.exception_type)
            };
            return Ok(AutoResolutionOutcome::Skipped {
                exception_id,
                reason,
            });
        }

        let order = self.store.get_order_for_update(&mut uow, exception.order_id).await?;
        let attempt = self.strategy.attempt(&exception, &order).await;

        let now = Utc::now();
        exception.auto_resolution_attempts += 1;
        exception.add_note(&attempt.notes);
        exception.updated_at = now;

        if !attempt.success {
            self.store.update_exception(&mut uow, &exception).await?;
            self.store.commit(uow).await?;
            log_exception_operation(
                "auto_resolution_failed",
                exception.id,
                exception.order_id,
                exception.status.as_str(),
                Some(&attempt.notes),
            );
            return Ok(AutoResolutionOutcome::Failed { exception });
        }

        exception.status = ExceptionStatus::Resolved;
        exception.resolved_at = Some(now);
        self.store.update_exception(&mut uow, &exception).await?;
        let order_transition = self
            .revert_if_clear(&mut uow, &exception, SYSTEM_ACTOR)
            .await?;
        self.store.commit(uow).await?;

        let resolved = ResolvedException {
            exception,
            order_transition,
        };
        self.notify_resolved(&resolved).await;
        Ok(AutoResolutionOutcome::Resolved {
            order_reverted: resolved.order_transition.is_some(),
            exception: resolved.exception,
        })
    }

    #[instrument(skip(self, notes))]
    pub async fn resolve(
        &self,
        exception_id: Uuid,
        notes: Option<String>,
        actor: &str,
    ) -> Result<ResolvedException> {
        let mut uow = self.store.begin().await?;
        let resolved = self.resolve_in(&mut uow, exception_id, notes, actor).await?;
        self.store.commit(uow).await?;

        self.notify_resolved(&resolved).await;
        Ok(resolved)
    }

    pub async fn resolve_in(
        &self,
        uow: &mut S::UnitOfWork,
        exception_id: Uuid,
        notes: Option<String>,
        actor: &str,
    ) -> Result<ResolvedException> {
        let mut exception = self.store.get_exception_for_update(uow, exception_id).await?;
        Self::move_to(&mut exception, ExceptionStatus::Resolved)?;

        let now = Utc::now();
        exception.resolved_at = Some(now);
        exception.updated_at = now;
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            exception.add_note(notes);
        }
        self.store.update_exception(uow, &exception).await?;

        let order_transition = self.revert_if_clear(uow, &exception, actor).await?;
        log_exception_operation(
            "resolve",
            exception.id,
            exception.order_id,
            exception.status.as_str(),
            Some(&format!("by {actor}")),
        );

        Ok(ResolvedException {
            exception,
            order_transition,
        })
    }

    /// Move the order back to processing once nothing blocks it anymore and
    /// put it back in the processing queue.
    async fn revert_if_clear(
        &self,
        uow: &mut S::UnitOfWork,
        resolved: &OrderException,
        actor: &str,
    ) -> Result<Option<TransitionRecord>> {
        let still_blocking = self
            .store
            .exceptions_for_order(uow, resolved.order_id)
            .await?
            .iter()
            .any(|other| other.id != resolved.id && other.status.is_unresolved());
        if still_blocking {
            return Ok(None);
        }

        let mut order = self.store.get_order_for_update(uow, resolved.order_id).await?;
        if order.status != OrderStatus::Exception {
            return Ok(None);
        }

        let record = self
            .fsm
            .apply(
                uow,
                &mut order,
                OrderStatus::Processing,
                actor,
                Some("All exceptions resolved".to_string()),
            )
            .await?;
        // Orders that entered `exception` unpaid or after shipping have no active entry
        self.queue.enqueue_in(uow, &mut order, record.history_entry.created_at).await?;
        Ok(Some(record))
    }

    async fn notify_resolved(&self, resolved: &ResolvedException) {
        let exception = &resolved.exception;
        self.fsm
            .send(Notification::new(
                events::EXCEPTION_RESOLVED,
                exception.order_id,
                json!({
                    "exception_id": exception.id,
                    "exception_type": exception.exception_type,
                    "order_reverted": resolved.order_transition.is_some(),
                }),
            ))
            .await;
    }

    #[instrument(skip(self))]
    pub async fn escalate(&self, exception_id: Uuid, to_user: &str) -> Result<OrderException> {
        let to_user = to_user.trim();
        if to_user.is_empty() {
            return Err(OrderOpsError::validation("escalation target is required"));
        }

        let mut uow = self.store.begin().await?;
        let mut exception = self.store.get_exception_for_update(&mut uow, exception_id).await?;
        Self::move_to(&mut exception, ExceptionStatus::Escalated)?;

        let now = Utc::now();
        exception.escalated_to = Some(to_user.to_string());
        exception.escalated_at = Some(now);
        exception.updated_at = now;
        self.store.update_exception(&mut uow, &exception).await?;
        self.store.commit(uow).await?;

        log_exception_operation(
            "escalate",
            exception.id,
            exception.order_id,
            exception.status.as_str(),
            Some(&format!("to {to_user}")),
        );
        self.fsm
            .send(Notification::new(
                events::EXCEPTION_ESCALATED,
                exception.order_id,
                json!({
                    "exception_id": exception.id,
                    "escalated_to": to_user,
                    "severity": exception.severity,
                }),
            ))
            .await;
        Ok(exception)
    }

    /// open -> in_progress
    pub async fn start_work(&self, exception_id: Uuid) -> Result<OrderException> {
        let mut uow = self.store.begin().await?;
        let mut exception = self.store.get_exception_for_update(&mut uow, exception_id).await?;
        Self::move_to(&mut exception, ExceptionStatus::InProgress)?;
        exception.updated_at = Utc::now();
        self.store.update_exception(&mut uow, &exception).await?;
        self.store.commit(uow).await?;

        log_exception_operation(
            "start_work",
            exception.id,
            exception.order_id,
            exception.status.as_str(),
            None,
        );
        Ok(exception)
    }

    /// Exceptions for an existing order, oldest first.
    pub async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<OrderException>> {
        let mut uow = self.store.begin().await?;
        self.store.get_order_for_update(&mut uow, order_id).await?;
        let exceptions = self.store.exceptions_for_order(&mut uow, order_id).await?;
        self.store.rollback(uow).await?;
        Ok(exceptions)
    }

    fn move_to(exception: &mut OrderException, target: ExceptionStatus) -> Result<()> {
        if !exception.status.can_transition_to(target) {
            return Err(StateMachineError::invalid_transition(exception.status, target).into());
        }
        exception.status = target;
        Ok(())
    }
}
