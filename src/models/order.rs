use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::scoring::HIGH_VALUE_THRESHOLD;
use crate::state_machine::OrderStatus;

text_enum! {
    pub enum CustomerTier {
        Standard => "standard",
        Vip => "vip",
    }
}

impl Default for CustomerTier {
    fn default() -> Self {
        Self::Standard
    }
}

text_enum! {
    /// Fulfillment category; keys the estimated-hours table.
    pub enum OrderType {
        Standard => "standard",
        Rush => "rush",
        WeddingParty => "wedding_party",
        Bundle => "bundle",
        Custom => "custom",
    }
}

impl Default for OrderType {
    fn default() -> Self {
        Self::Standard
    }
}

text_enum! {
    /// Ordered from least to most urgent.
    pub enum PriorityLevel {
        Standard => "standard",
        High => "high",
        Urgent => "urgent",
    }
}

impl Default for PriorityLevel {
    fn default() -> Self {
        Self::Standard
    }
}

/// Customer purchase moving through the fulfillment lifecycle.
/// Maps to the `orders` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub customer_tier: CustomerTier,
    pub total_amount: f64,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub priority_level: PriorityLevel,
    pub rush_order: bool,
    pub group_order: bool,
    pub party_size: i32,
    pub event_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Payload for creating an order at checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    #[serde(default)]
    pub customer_tier: CustomerTier,
    pub total_amount: f64,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub rush_order: bool,
    #[serde(default)]
    pub group_order: bool,
    #[serde(default)]
    pub party_size: i32,
    #[serde(default)]
    pub event_date: Option<NaiveDate>,
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), String> {
        if self.customer_id.trim().is_empty() {
            return Err("customer_id is required".to_string());
        }
        if !self.total_amount.is_finite() || self.total_amount < 0.0 {
            return Err(format!(
                "total_amount must be a non-negative number, got {}",
                self.total_amount
            ));
        }
        if self.party_size < 0 {
            return Err("party_size cannot be negative".to_string());
        }
        Ok(())
    }
}

impl Order {
    /// Build a new `pending_payment` order from checkout data.
    pub fn from_new(new_order: NewOrder, now: DateTime<Utc>) -> Self {
        let rush_order = new_order.rush_order || new_order.order_type == OrderType::Rush;
        let group_order = new_order.group_order || new_order.order_type == OrderType::WeddingParty;

        Self {
            id: Uuid::new_v4(),
            customer_id: new_order.customer_id,
            customer_tier: new_order.customer_tier,
            total_amount: new_order.total_amount,
            order_type: new_order.order_type,
            status: OrderStatus::PendingPayment,
            priority_level: PriorityLevel::Standard,
            rush_order,
            group_order,
            party_size: new_order.party_size,
            event_date: new_order.event_date,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        }
    }

    pub fn is_high_value(&self) -> bool {
        self.total_amount > HIGH_VALUE_THRESHOLD || self.customer_tier == CustomerTier::Vip
    }

    /// Whole days from `now` until the event, negative once it has passed.
    pub fn days_until_event(&self, now: DateTime<Utc>) -> Option<i64> {
        self.event_date
            .map(|date| date.signed_duration_since(now.date_naive()).num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn checkout(total: f64) -> NewOrder {
        NewOrder {
            customer_id: "cust_1".to_string(),
            customer_tier: CustomerTier::Standard,
            total_amount: total,
            order_type: OrderType::Standard,
            rush_order: false,
            group_order: false,
            party_size: 0,
            event_date: None,
        }
    }

    #[test]
    fn test_new_order_starts_pending_payment() {
        let order = Order::from_new(checkout(120.0), Utc::now());
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.priority_level, PriorityLevel::Standard);
        assert!(order.delivered_at.is_none());
    }

    #[test]
    fn test_order_type_implies_flags() {
        let mut new_order = checkout(800.0);
        new_order.order_type = OrderType::WeddingParty;
        let order = Order::from_new(new_order, Utc::now());
        assert!(order.group_order);
        assert!(!order.rush_order);
    }

    #[test]
    fn test_validation_rejects_negative_totals() {
        assert!(checkout(-1.0).validate().is_err());
        assert!(checkout(f64::NAN).validate().is_err());
        assert!(checkout(0.0).validate().is_ok());

        let mut missing_customer = checkout(10.0);
        missing_customer.customer_id = "  ".to_string();
        assert!(missing_customer.validate().is_err());
    }

    #[test]
    fn test_days_until_event() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 15, 0, 0).unwrap();
        let mut new_order = checkout(100.0);
        new_order.event_date = NaiveDate::from_ymd_opt(2025, 6, 11);
        let order = Order::from_new(new_order, now);
        assert_eq!(order.days_until_event(now), Some(10));
    }

    #[test]
    fn test_priority_levels_are_ordered() {
        assert!(PriorityLevel::Urgent > PriorityLevel::High);
        assert!(PriorityLevel::High > PriorityLevel::Standard);
    }
}
