//! Automation rules evaluated against an order after payment confirmation
//! or on demand. Rules run in ascending `priority`; every matching rule
//! applies its action.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::exception_tracker::{CreatedException, ExceptionTracker};
use crate::constants::SYSTEM_ACTOR;
use crate::database::OrderStore;
use crate::error::{OrderOpsError, Result};
use crate::models::{AutomationRule, NewAutomationRule, Order, RuleAction};

/// One rule that matched and what it did
#[derive(Debug, Clone, Serialize)]
pub struct AppliedRule {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub action: RuleAction,
    pub effect: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RulesEvaluation {
    pub rules_evaluated: usize,
    pub applied: Vec<AppliedRule>,
    #[serde(skip)]
    pub created_exceptions: Vec<CreatedException>,
}

pub struct AutomationRulesEngine<S: OrderStore> {
    store: Arc<S>,
    tracker: Arc<ExceptionTracker<S>>,
}

impl<S: OrderStore> AutomationRulesEngine<S> {
    pub fn new(store: Arc<S>, tracker: Arc<ExceptionTracker<S>>) -> Self {
        Self { store, tracker }
    }

    #[instrument(skip(self))]
    pub async fn process(&self, order_id: Uuid) -> Result<RulesEvaluation> {
        let mut uow = self.store.begin().await?;
        let mut order = self.store.get_order_for_update(&mut uow, order_id).await?;
        let evaluation = self.evaluate_in(&mut uow, &mut order, Utc::now()).await?;
        self.store.commit(uow).await?;

        self.notify(&evaluation).await;
        Ok(evaluation)
    }

    /// Send notifications for exceptions raised by a committed evaluation.
    pub async fn notify(&self, evaluation: &RulesEvaluation) {
        for created in &evaluation.created_exceptions {
            self.tracker.notify_created(created).await;
        }
    }

    pub async fn evaluate_in(
        &self,
        uow: &mut S::UnitOfWork,
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> Result<RulesEvaluation> {
        let rules = self.store.active_automation_rules(uow).await?;
        let mut evaluation = RulesEvaluation {
            rules_evaluated: rules.len(),
            ..Default::default()
        };

        for rule in rules {
            if !rule.condition.matches(order, now) {
                debug!(rule = %rule.name, order_id = %order.id, "Rule did not match");
                continue;
            }
            let effect = self.apply(uow, order, &rule, now, &mut evaluation).await?;
            info!(rule = %rule.name, order_id = %order.id, %effect, "Automation rule applied");
            evaluation.applied.push(AppliedRule {
                rule_id: rule.id,
                rule_name: rule.name,
                action: rule.action,
                effect,
            });
        }
        Ok(evaluation)
    }

    async fn apply(
        &self,
        uow: &mut S::UnitOfWork,
        order: &mut Order,
        rule: &AutomationRule,
        now: DateTime<Utc>,
        evaluation: &mut RulesEvaluation,
    ) -> Result<String> {
        match &rule.action {
            RuleAction::SetPriority { level } => {
                if *level <= order.priority_level {
                    return Ok(format!("priority already {}", order.priority_level));
                }
                order.priority_level = *level;
                order.updated_at = now;
                self.store.update_order(uow, order).await?;
                if let Some(mut entry) = self.store.active_queue_entry(uow, order.id).await? {
                    entry.priority_level = *level;
                    entry.updated_at = now;
                    self.store.upsert_queue_entry(uow, &entry).await?;
                }
                Ok(format!("priority raised to {level}"))
            }
            RuleAction::AssignTo { assignee } => {
                match self.store.active_queue_entry(uow, order.id).await? {
                    Some(mut entry) => {
                        entry.assign(assignee.clone(), now);
                        self.store.upsert_queue_entry(uow, &entry).await?;
                        Ok(format!("assigned to {assignee}"))
                    }
                    None => Ok("skipped: no active queue entry".to_string()),
                }
            }
            RuleAction::RaiseException {
                exception_type,
                severity,
                description,
            } => {
                let description = description
                    .clone()
                    .unwrap_or_else(|| format!("Raised by automation rule '{}'", rule.name));
                let created = self
                    .tracker
                    .create_in(uow, order, *exception_type, *severity, &description, SYSTEM_ACTOR)
                    .await?;
                let effect = format!("raised {} exception {}", exception_type, created.exception.id);
                evaluation.created_exceptions.push(created);
                Ok(effect)
            }
        }
    }

    pub async fn create_rule(&self, new_rule: NewAutomationRule) -> Result<AutomationRule> {
        new_rule.validate().map_err(OrderOpsError::Validation)?;
        let rule = new_rule.into_rule(Utc::now());

        let mut uow = self.store.begin().await?;
        self.store.insert_automation_rule(&mut uow, &rule).await?;
        self.store.commit(uow).await?;

        info!(rule_id = %rule.id, name = %rule.name, priority = rule.priority, "Automation rule created");
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuccessRates;
    use crate::database::InMemoryStore;
    use crate::events::EventPublisher;
    use crate::models::{
        ExceptionSeverity, ExceptionType, NewOrder, OrderStatus, OrderType, PriorityLevel,
        QueueEntry, QueueStatus, RuleCondition,
    };
    use crate::orchestration::priority_scorer::PriorityScorer;
    use crate::orchestration::processing_queue::ProcessingQueue;
    use crate::orchestration::resolution::SimulatedResolutionStrategy;
    use crate::state_machine::OrderStateMachine;
    use chrono::Duration;

    fn engine(store: &InMemoryStore) -> AutomationRulesEngine<InMemoryStore> {
        let store = Arc::new(store.clone());
        let fsm = OrderStateMachine::new(Arc::clone(&store), Arc::new(EventPublisher::default()));
        let queue = Arc::new(ProcessingQueue::new(Arc::clone(&store), PriorityScorer::default()));
        let tracker = ExceptionTracker::new(
            fsm,
            queue,
            Arc::new(SimulatedResolutionStrategy::new(SuccessRates::default())),
            0,
            "test_rules_queue",
        );
        AutomationRulesEngine::new(store, Arc::new(tracker))
    }

    async fn seed(store: &InMemoryStore, total: f64) -> Order {
        let mut order = Order::from_new(
            NewOrder {
                customer_id: "cust_rules".to_string(),
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
        let now = Utc::now();
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            order_id: order.id,
            priority_score: 100,
            priority_level: PriorityLevel::Standard,
            queue_status: QueueStatus::Waiting,
            assigned_to: None,
            estimated_completion: now + Duration::hours(48),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let mut uow = store.begin().await.unwrap();
        store.insert_order(&mut uow, &order).await.unwrap();
        store.upsert_queue_entry(&mut uow, &entry).await.unwrap();
        store.commit(uow).await.unwrap();
        order
    }

    fn rule(name: &str, priority: i32, condition: RuleCondition, action: RuleAction) -> NewAutomationRule {
        NewAutomationRule {
            name: name.to_string(),
            active: true,
            priority,
            condition,
            action,
        }
    }

    #[tokio::test]
    async fn test_matching_rules_apply_in_priority_order() {
        let store = InMemoryStore::new();
        let engine = engine(&store);
        let order = seed(&store, 2500.0).await;

        engine
            .create_rule(rule(
                "big orders to senior",
                20,
                RuleCondition {
                    min_total: Some(2000.0),
                    ..Default::default()
                },
                RuleAction::AssignTo {
                    assignee: "senior_tailor".to_string(),
                },
            ))
            .await
            .unwrap();
        engine
            .create_rule(rule(
                "big orders urgent",
                10,
                RuleCondition {
                    min_total: Some(2000.0),
                    ..Default::default()
                },
                RuleAction::SetPriority {
                    level: PriorityLevel::Urgent,
                },
            ))
            .await
            .unwrap();

        let evaluation = engine.process(order.id).await.unwrap();
        assert_eq!(evaluation.rules_evaluated, 2);
        let names: Vec<_> = evaluation.applied.iter().map(|a| a.rule_name.as_str()).collect();
        assert_eq!(names, vec!["big orders urgent", "big orders to senior"]);

        let mut uow = store.begin().await.unwrap();
        let stored = store.get_order_for_update(&mut uow, order.id).await.unwrap();
        assert_eq!(stored.priority_level, PriorityLevel::Urgent);
        let entry = store.active_queue_entry(&mut uow, order.id).await.unwrap().unwrap();
        assert_eq!(entry.priority_level, PriorityLevel::Urgent);
        assert_eq!(entry.assigned_to.as_deref(), Some("senior_tailor"));
    }

    #[tokio::test]
    async fn test_non_matching_and_inactive_rules_are_ignored() {
        let store = InMemoryStore::new();
        let engine = engine(&store);
        let order = seed(&store, 100.0).await;

        engine
            .create_rule(rule(
                "rush only",
                1,
                RuleCondition {
                    rush_only: true,
                    ..Default::default()
                },
                RuleAction::SetPriority {
                    level: PriorityLevel::Urgent,
                },
            ))
            .await
            .unwrap();
        let mut inactive = rule(
            "disabled",
            2,
            RuleCondition::default(),
            RuleAction::SetPriority {
                level: PriorityLevel::High,
            },
        );
        inactive.active = false;
        engine.create_rule(inactive).await.unwrap();

        let evaluation = engine.process(order.id).await.unwrap();
        assert!(evaluation.applied.is_empty());
    }

    #[tokio::test]
    async fn test_priority_is_never_lowered() {
        let store = InMemoryStore::new();
        let engine = engine(&store);
        let mut order = seed(&store, 100.0).await;
        order.priority_level = PriorityLevel::Urgent;
        let mut uow = store.begin().await.unwrap();
        store.update_order(&mut uow, &order).await.unwrap();
        store.commit(uow).await.unwrap();

        engine
            .create_rule(rule(
                "everything high",
                1,
                RuleCondition::default(),
                RuleAction::SetPriority {
                    level: PriorityLevel::High,
                },
            ))
            .await
            .unwrap();

        let evaluation = engine.process(order.id).await.unwrap();
        assert_eq!(evaluation.applied[0].effect, "priority already urgent");
    }

    #[tokio::test]
    async fn test_raise_exception_action_goes_through_tracker() {
        let store = InMemoryStore::new();
        let engine = engine(&store);
        let order = seed(&store, 100.0).await;

        engine
            .create_rule(rule(
                "verify everything",
                1,
                RuleCondition::default(),
                RuleAction::RaiseException {
                    exception_type: ExceptionType::AddressValidation,
                    severity: ExceptionSeverity::High,
                    description: None,
                },
            ))
            .await
            .unwrap();

        let evaluation = engine.process(order.id).await.unwrap();
        assert_eq!(evaluation.created_exceptions.len(), 1);
        assert!(evaluation.created_exceptions[0].scheduled_task.is_some());

        let mut uow = store.begin().await.unwrap();
        let stored = store.get_order_for_update(&mut uow, order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Exception);
    }

    #[tokio::test]
    async fn test_invalid_rule_is_rejected() {
        let store = InMemoryStore::new();
        let engine = engine(&store);
        let result = engine
            .create_rule(rule(
                " ",
                1,
                RuleCondition::default(),
                RuleAction::SetPriority {
                    level: PriorityLevel::High,
                },
            ))
            .await;
        assert!(matches!(result, Err(OrderOpsError::Validation(_))));
    }
}
