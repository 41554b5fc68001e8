//! # System Constants
//!
//! Fixed scoring weights, thresholds and identifiers shared by the order
//! lifecycle components. Tunable values (estimated hours, SLA targets,
//! auto-resolution success rates) live in [`crate::config`] and default to
//! the values declared here.

/// Actor recorded on history entries written by automation
pub const SYSTEM_ACTOR: &str = "system";

/// Notification event names handed to the communication collaborator
pub mod events {
    pub const ORDER_PAYMENT_CONFIRMED: &str = "order.payment_confirmed";
    pub const ORDER_SHIPPED: &str = "order.shipped";
    pub const ORDER_DELIVERED: &str = "order.delivered";
    pub const ORDER_CANCELLED: &str = "order.cancelled";
    pub const EXCEPTION_RAISED: &str = "exception.raised";
    pub const EXCEPTION_RESOLVED: &str = "exception.resolved";
    pub const EXCEPTION_ESCALATED: &str = "exception.escalated";
    pub const PARTY_MEMBER_INVITED: &str = "wedding_party.member_invited";
}

/// Priority scorer weights
pub mod scoring {
    pub const BASE_SCORE: i32 = 100;
    pub const HIGH_VALUE_BONUS: i32 = 50;
    pub const RUSH_BONUS: i32 = 100;
    pub const LARGE_PARTY_BONUS: i32 = 75;

    /// Orders strictly above this total count as high value
    pub const HIGH_VALUE_THRESHOLD: f64 = 5000.0;
    /// Group orders with more members than this earn the party bonus
    pub const LARGE_PARTY_THRESHOLD: i32 = 4;

    /// Events closer than this many days make the order urgent
    pub const URGENT_EVENT_DAYS: i64 = 14;
    /// Events closer than this many days make the order high priority
    pub const HIGH_EVENT_DAYS: i64 = 30;

    // Canonical estimated completion hours by order type
    pub const STANDARD_HOURS: i64 = 48;
    pub const RUSH_HOURS: i64 = 24;
    pub const WEDDING_PARTY_HOURS: i64 = 72;
    pub const BUNDLE_HOURS: i64 = 48;
    pub const CUSTOM_HOURS: i64 = 96;
}

/// SLA targets in minutes
pub mod sla {
    pub const RUSH_TARGET_MINUTES: i64 = 2880;
    pub const HIGH_PRIORITY_TARGET_MINUTES: i64 = 4320;
    pub const STANDARD_TARGET_MINUTES: i64 = 7200;

    /// Rush orders finishing under this share of target earn a bonus
    pub const RUSH_BONUS_RATIO: f64 = 0.8;
    pub const RUSH_EFFICIENCY_BONUS: f64 = 10.0;
    pub const MAX_OVERRUN_PENALTY: f64 = 50.0;
}

pub mod exceptions {
    /// Order totals above this raise the customer impact tier
    pub const IMPACT_VALUE_THRESHOLD: f64 = 1000.0;

    /// Delay before the first automated resolution attempt
    pub const AUTO_RESOLUTION_DELAY_SECONDS: u64 = 5;

    pub const PAYMENT_RETRY_SUCCESS_RATE: f64 = 0.7;
    pub const ADDRESS_VALIDATION_SUCCESS_RATE: f64 = 0.8;
    pub const INVENTORY_CHECK_SUCCESS_RATE: f64 = 0.9;
}

/// Durable queue names
pub mod queues {
    pub const AUTO_RESOLUTION: &str = "order_auto_resolution";
}

/// Action names recorded in the idempotency ledger
pub mod actions {
    pub const PROCESS_PAYMENT_CONFIRMATION: &str = "process_payment_confirmation";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sla_targets_are_ordered() {
        assert!(sla::RUSH_TARGET_MINUTES <= sla::HIGH_PRIORITY_TARGET_MINUTES);
        assert!(sla::HIGH_PRIORITY_TARGET_MINUTES <= sla::STANDARD_TARGET_MINUTES);
    }

    #[test]
    fn test_event_windows_are_ordered() {
        assert!(scoring::URGENT_EVENT_DAYS < scoring::HIGH_EVENT_DAYS);
    }
}
