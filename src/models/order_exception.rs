use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::exceptions::IMPACT_VALUE_THRESHOLD;
use crate::state_machine::ExceptionStatus;

text_enum! {
    pub enum ExceptionType {
        PaymentRetry => "payment_retry",
        InventoryCheck => "inventory_check",
        AddressValidation => "address_validation",
        StockOut => "stock_out",
        QualityIssue => "quality_issue",
        ShippingDelay => "shipping_delay",
        Other => "other",
    }
}

impl ExceptionType {
    /// Types that push the promised delivery date out.
    pub fn affects_delivery_date(&self) -> bool {
        matches!(self, Self::StockOut | Self::QualityIssue | Self::ShippingDelay)
    }

    /// Types eligible for automated resolution attempts.
    pub fn is_auto_resolvable(&self) -> bool {
        matches!(
            self,
            Self::PaymentRetry | Self::InventoryCheck | Self::AddressValidation
        )
    }

    /// Expected delivery slip in days for this type at the given severity.
    pub fn estimated_delay_days(&self, severity: ExceptionSeverity) -> i32 {
        use ExceptionSeverity::*;
        match (*self, severity) {
            (Self::StockOut, Low) => 2,
            (Self::StockOut, Medium) => 5,
            (Self::StockOut, High) => 7,
            (Self::StockOut, Critical) => 14,
            (Self::QualityIssue, Low) => 1,
            (Self::QualityIssue, Medium) => 3,
            (Self::QualityIssue, High) => 5,
            (Self::QualityIssue, Critical) => 7,
            (Self::ShippingDelay, Low) => 1,
            (Self::ShippingDelay, Medium) => 2,
            (Self::ShippingDelay, High) => 4,
            (Self::ShippingDelay, Critical) => 7,
            (Self::Other, Low) => 0,
            (Self::Other, Medium) => 1,
            (Self::Other, High) => 2,
            (Self::Other, Critical) => 3,
            (_, Low | Medium) => 0,
            (_, High) => 1,
            (_, Critical) => 2,
        }
    }
}

text_enum! {
    /// Ordered from least to most severe.
    pub enum ExceptionSeverity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

impl ExceptionSeverity {
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// High and critical exceptions halt the order.
    pub fn blocks_order(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

text_enum! {
    /// Customer-facing impact tier, ordered from least to most severe.
    pub enum ImpactLevel {
        Minimal => "minimal",
        Moderate => "moderate",
        Significant => "significant",
        Severe => "severe",
    }
}

impl ImpactLevel {
    fn from_rank(rank: u8) -> Self {
        match rank {
            0 => Self::Minimal,
            1 => Self::Moderate,
            2 => Self::Significant,
            _ => Self::Severe,
        }
    }

    /// Impact matrix: severity sets the base tier and any aggravating factor
    /// (valuable order, rush order, delivery-affecting type at medium or
    /// above) raises it by one, capped at severe.
    pub fn assess(
        exception_type: ExceptionType,
        severity: ExceptionSeverity,
        order_total: f64,
        rush_order: bool,
    ) -> Self {
        let aggravated = order_total > IMPACT_VALUE_THRESHOLD
            || rush_order
            || (exception_type.affects_delivery_date() && severity >= ExceptionSeverity::Medium);

        let rank = severity.rank() + u8::from(aggravated);
        Self::from_rank(rank)
    }
}

/// A recorded anomaly blocking or threatening an order.
/// Maps to `order_exceptions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderException {
    pub id: Uuid,
    pub order_id: Uuid,
    pub exception_type: ExceptionType,
    pub severity: ExceptionSeverity,
    pub status: ExceptionStatus,
    pub description: String,
    pub auto_resolvable: bool,
    pub customer_impact_level: ImpactLevel,
    pub affects_delivery_date: bool,
    pub estimated_delay_days: i32,
    pub resolution_notes: Option<String>,
    pub auto_resolution_attempts: i32,
    pub escalated_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub escalated_at: Option<DateTime<Utc>>,
}

impl OrderException {
    /// Whether an automated attempt may run right now.
    pub fn accepts_auto_resolution(&self) -> bool {
        self.auto_resolvable && self.status == ExceptionStatus::Open
    }

    /// Append a line to the resolution notes.
    pub fn add_note(&mut self, note: impl AsRef<str>) {
        match &mut self.resolution_notes {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(note.as_ref());
            }
            None => self.resolution_notes = Some(note.as_ref().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_affecting_types() {
        assert!(ExceptionType::StockOut.affects_delivery_date());
        assert!(ExceptionType::QualityIssue.affects_delivery_date());
        assert!(ExceptionType::ShippingDelay.affects_delivery_date());
        assert!(!ExceptionType::PaymentRetry.affects_delivery_date());
        assert!(!ExceptionType::Other.affects_delivery_date());
    }

    #[test]
    fn test_auto_resolvable_types() {
        let resolvable: Vec<_> = ExceptionType::ALL
            .iter()
            .filter(|t| t.is_auto_resolvable())
            .copied()
            .collect();
        assert_eq!(
            resolvable,
            vec![
                ExceptionType::PaymentRetry,
                ExceptionType::InventoryCheck,
                ExceptionType::AddressValidation
            ]
        );
    }

    #[test]
    fn test_critical_payment_retry_on_small_order_is_severe() {
        let impact = ImpactLevel::assess(
            ExceptionType::PaymentRetry,
            ExceptionSeverity::Critical,
            200.0,
            false,
        );
        assert_eq!(impact, ImpactLevel::Severe);
    }

    #[test]
    fn test_impact_aggravating_factors() {
        let base = ImpactLevel::assess(ExceptionType::Other, ExceptionSeverity::Low, 50.0, false);
        assert_eq!(base, ImpactLevel::Minimal);

        let rush = ImpactLevel::assess(ExceptionType::Other, ExceptionSeverity::Low, 50.0, true);
        assert_eq!(rush, ImpactLevel::Moderate);

        let stock = ImpactLevel::assess(ExceptionType::StockOut, ExceptionSeverity::Medium, 50.0, false);
        assert_eq!(stock, ImpactLevel::Significant);
    }

    #[test]
    fn test_delay_table_grows_with_severity() {
        for exception_type in ExceptionType::ALL {
            let delays: Vec<i32> = ExceptionSeverity::ALL
                .iter()
                .map(|s| exception_type.estimated_delay_days(*s))
                .collect();
            assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{exception_type}: {delays:?}");
        }
    }

    #[test]
    fn test_add_note_appends() {
        let now = Utc::now();
        let mut exception = OrderException {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            exception_type: ExceptionType::Other,
            severity: ExceptionSeverity::Low,
            status: ExceptionStatus::Open,
            description: "note test".to_string(),
            auto_resolvable: false,
            customer_impact_level: ImpactLevel::Minimal,
            affects_delivery_date: false,
            estimated_delay_days: 0,
            resolution_notes: None,
            auto_resolution_attempts: 0,
            escalated_to: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            escalated_at: None,
        };
        exception.add_note("first");
        exception.add_note("second");
        assert_eq!(exception.resolution_notes.as_deref(), Some("first\nsecond"));
    }
}
