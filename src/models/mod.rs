//! # Data Layer
//!
//! Plain records for every persisted table. Persistence itself lives behind
//! [`crate::database::OrderStore`]; these types carry no database handles.

pub mod automation_rule;
pub mod order;
pub mod order_exception;
pub mod party_member;
pub mod processed_event;
pub mod processing_analytics;
pub mod queue_entry;
pub mod status_history;

pub use automation_rule::{AutomationRule, NewAutomationRule, RuleAction, RuleCondition};
pub use order::{CustomerTier, NewOrder, Order, OrderType, PriorityLevel};
pub use order_exception::{ExceptionSeverity, ExceptionType, ImpactLevel, OrderException};
pub use party_member::{NewPartyMember, PartyMember};
pub use processed_event::ProcessedEvent;
pub use processing_analytics::{BottleneckStage, ProcessingAnalytics, StageTimings};
pub use queue_entry::{QueueEntry, QueueFilter, QueueStatus};
pub use status_history::StatusHistoryEntry;

pub use crate::state_machine::{ExceptionStatus, OrderStatus};

/// Raised when a stored or submitted string is not a known enum value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
