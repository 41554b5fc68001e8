//! Proptest strategies for orders and exceptions.

use chrono::{DateTime, Days, TimeZone, Utc};
use proptest::prelude::*;

use order_ops::models::{
    CustomerTier, ExceptionSeverity, ExceptionType, NewOrder, Order, OrderType,
};

/// Fixed clock for generated orders
pub fn reference_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap()
}

pub fn order_type_strategy() -> impl Strategy<Value = OrderType> {
    prop::sample::select(OrderType::ALL.to_vec())
}

pub fn exception_type_strategy() -> impl Strategy<Value = ExceptionType> {
    prop::sample::select(ExceptionType::ALL.to_vec())
}

pub fn severity_strategy() -> impl Strategy<Value = ExceptionSeverity> {
    prop::sample::select(ExceptionSeverity::ALL.to_vec())
}

pub fn order_strategy() -> impl Strategy<Value = Order> {
    (
        0.0f64..20_000.0,
        any::<bool>(),
        order_type_strategy(),
        any::<bool>(),
        any::<bool>(),
        0i32..12,
        prop::option::of(0u64..120),
    )
        .prop_map(|(total, vip, order_type, rush, group, party_size, event_days)| {
            let now = reference_now();
            Order::from_new(
                NewOrder {
                    customer_id: "cust_prop".to_string(),
                    customer_tier: if vip { CustomerTier::Vip } else { CustomerTier::Standard },
                    total_amount: total,
                    order_type,
                    rush_order: rush,
                    group_order: group,
                    party_size,
                    event_date: event_days.map(|d| now.date_naive() + Days::new(d)),
                },
                now,
            )
        })
}
