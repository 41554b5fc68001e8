use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ExceptionSeverity, ExceptionType, Order, OrderType, PriorityLevel};

/// Conditions an order must satisfy for a rule to fire. Unset fields match
/// everything; all set fields must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    #[serde(default)]
    pub min_total: Option<f64>,
    #[serde(default)]
    pub order_types: Option<Vec<OrderType>>,
    #[serde(default)]
    pub rush_only: bool,
    #[serde(default)]
    pub group_only: bool,
    #[serde(default)]
    pub max_days_until_event: Option<i64>,
}

impl RuleCondition {
    pub fn matches(&self, order: &Order, now: DateTime<Utc>) -> bool {
        if let Some(min_total) = self.min_total {
            if order.total_amount < min_total {
                return false;
            }
        }
        if let Some(types) = &self.order_types {
            if !types.contains(&order.order_type) {
                return false;
            }
        }
        if self.rush_only && !order.rush_order {
            return false;
        }
        if self.group_only && !order.group_order {
            return false;
        }
        if let Some(max_days) = self.max_days_until_event {
            match order.days_until_event(now) {
                Some(days) if days <= max_days => {}
                _ => return false,
            }
        }
        true
    }
}

/// What a matching rule does to the order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Raise the order's priority level (never lowers it)
    SetPriority { level: PriorityLevel },
    /// Assign the active queue entry to a processor
    AssignTo { assignee: String },
    /// Record an exception against the order
    RaiseException {
        exception_type: ExceptionType,
        severity: ExceptionSeverity,
        #[serde(default)]
        description: Option<String>,
    },
}

/// Row of `order_automation_rules`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    /// Lower values evaluate first
    pub priority: i32,
    pub condition: RuleCondition,
    pub action: RuleAction,
    pub created_at: DateTime<Utc>,
}

/// Payload for registering a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAutomationRule {
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub condition: RuleCondition,
    pub action: RuleAction,
}

fn default_active() -> bool {
    true
}

impl NewAutomationRule {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("rule name is required".to_string());
        }
        if let Some(min_total) = self.condition.min_total {
            if !min_total.is_finite() || min_total < 0.0 {
                return Err(format!("min_total must be a non-negative number, got {min_total}"));
            }
        }
        if let RuleAction::AssignTo { assignee } = &self.action {
            if assignee.trim().is_empty() {
                return Err("assign_to requires an assignee".to_string());
            }
        }
        Ok(())
    }

    pub fn into_rule(self, now: DateTime<Utc>) -> AutomationRule {
        AutomationRule {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            active: self.active,
            priority: self.priority,
            condition: self.condition,
            action: self.action,
            created_at: now,
        }
    }
}
