//! # Priority Scorer
//!
//! Pure scoring of an order into a numeric queue priority, a priority tier
//! and an estimated completion window. Deterministic given the order, the
//! clock reading and the estimated-hours table.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EstimatedHoursTable;
use crate::constants::scoring::{
    BASE_SCORE, HIGH_EVENT_DAYS, HIGH_VALUE_BONUS, LARGE_PARTY_BONUS, LARGE_PARTY_THRESHOLD,
    RUSH_BONUS, URGENT_EVENT_DAYS,
};
use crate::models::{Order, OrderType, PriorityLevel};

/// Scorer output for one order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityScore {
    pub priority_level: PriorityLevel,
    pub numeric_score: i32,
    pub estimated_hours: i64,
}

impl PriorityScore {
    pub fn estimated_completion(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::hours(self.estimated_hours)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriorityScorer {
    estimated_hours: EstimatedHoursTable,
}

impl PriorityScorer {
    pub fn new(estimated_hours: EstimatedHoursTable) -> Self {
        Self { estimated_hours }
    }

    pub fn score(&self, order: &Order, now: DateTime<Utc>) -> PriorityScore {
        PriorityScore {
            priority_level: Self::priority_level(order, now),
            numeric_score: Self::numeric_score(order),
            estimated_hours: self.estimated_hours(order),
        }
    }

    pub fn numeric_score(order: &Order) -> i32 {
        let mut score = BASE_SCORE;
        if order.is_high_value() {
            score += HIGH_VALUE_BONUS;
        }
        if order.rush_order {
            score += RUSH_BONUS;
        }
        if order.group_order && order.party_size > LARGE_PARTY_THRESHOLD {
            score += LARGE_PARTY_BONUS;
        }
        score
    }

    /// Higher of the event-window tier and the attribute tier.
    pub fn priority_level(order: &Order, now: DateTime<Utc>) -> PriorityLevel {
        let attribute_level = Self::attribute_level(order);
        match Self::event_level(order, now) {
            Some(event_level) => event_level.max(attribute_level),
            None => attribute_level,
        }
    }

    /// Tier implied by the event date alone, if it is close enough to matter.
    pub fn event_level(order: &Order, now: DateTime<Utc>) -> Option<PriorityLevel> {
        match order.days_until_event(now)? {
            days if days < URGENT_EVENT_DAYS => Some(PriorityLevel::Urgent),
            days if days < HIGH_EVENT_DAYS => Some(PriorityLevel::High),
            _ => None,
        }
    }

    pub fn attribute_level(order: &Order) -> PriorityLevel {
        if order.rush_order {
            PriorityLevel::Urgent
        } else if order.is_high_value() {
            PriorityLevel::High
        } else {
            PriorityLevel::Standard
        }
    }

    /// Rush orders use the rush row regardless of their order type.
    pub fn estimated_hours(&self, order: &Order) -> i64 {
        if order.rush_order {
            self.estimated_hours.hours_for(OrderType::Rush)
        } else {
            self.estimated_hours.hours_for(order.order_type)
        }
    }
}
