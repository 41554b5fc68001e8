//! Processing analytics integration tests: stage timings from seeded
//! histories, dashboard rollups and live metrics.

mod common;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use common::*;
use order_ops::database::{InMemoryStore, OrderStore};
use order_ops::error::OrderOpsError;
use order_ops::models::{
    BottleneckStage, ExceptionSeverity, ExceptionType, Order, OrderStatus, StatusHistoryEntry,
};
use order_ops::orchestration::{ExceptionRequest, OrderOpsSystem, RoutingRequest};

/// Insert an order whose history walks `path`, one step every `minutes[i]`
/// after the previous one. The order ends in the last status of `path`.
async fn seed_order(
    system: &OrderOpsSystem<InMemoryStore>,
    builder: OrderBuilder,
    path: &[(OrderStatus, i64)],
) -> Order {
    let start: DateTime<Utc> = Utc::now() - Duration::days(3);
    let mut order = Order::from_new(builder.build(), start);

    let store = system.store();
    let mut uow = store.begin().await.unwrap();
    let mut at = start;
    let mut previous = None;
    for (status, minutes) in path {
        at += Duration::minutes(*minutes);
        let entry = StatusHistoryEntry::new(order.id, previous, *status, "ops_user", None, at);
        store.append_status_history(&mut uow, &entry).await.unwrap();
        previous = Some(*status);
    }
    if let Some(status) = previous {
        order.status = status;
    }
    if order.status == OrderStatus::Delivered {
        order.delivered_at = Some(at);
    }
    store.insert_order(&mut uow, &order).await.unwrap();
    store.commit(uow).await.unwrap();
    order
}

#[tokio::test]
async fn test_thirty_minutes_from_payment_to_processing() {
    let system = test_system();
    let order = seed_order(
        &system,
        OrderBuilder::new(),
        &[
            (OrderStatus::PendingPayment, 0),
            (OrderStatus::PaymentConfirmed, 10),
            (OrderStatus::Processing, 30),
        ],
    )
    .await;

    let analytics = system.coordinator().analytics().calculate(order.id).await.unwrap();
    assert_eq!(analytics.stage_timings.payment_to_processing, 30);
    assert_eq!(analytics.stage_timings.processing_to_production, 0);
    assert_eq!(analytics.total_fulfillment_minutes, 40);
    assert_eq!(analytics.bottleneck_stage, BottleneckStage::PaymentProcessing);
    assert_eq!(analytics.efficiency_score, 100.0);
    assert!(!analytics.sla_violated);
    assert!(!analytics.completed);
}

#[tokio::test]
async fn test_delivered_order_over_sla_is_penalized() {
    let system = test_system();
    // Standard SLA is 7200 minutes; this order takes 7920 (10% over).
    let order = seed_order(
        &system,
        OrderBuilder::new(),
        &[
            (OrderStatus::PendingPayment, 0),
            (OrderStatus::PaymentConfirmed, 0),
            (OrderStatus::Processing, 120),
            (OrderStatus::InProduction, 600),
            (OrderStatus::QualityCheck, 4800),
            (OrderStatus::Packaging, 200),
            (OrderStatus::Shipped, 200),
            (OrderStatus::Delivered, 2000),
        ],
    )
    .await;

    let analytics = system.coordinator().analytics().calculate(order.id).await.unwrap();
    assert_eq!(analytics.total_fulfillment_minutes, 7920);
    assert_eq!(analytics.sla_target_minutes, 7200);
    assert!(analytics.sla_violated);
    assert_eq!(analytics.efficiency_score, 90.0);
    assert_eq!(analytics.stage_timings.quality_to_shipping, 400);
    assert_eq!(analytics.bottleneck_stage, BottleneckStage::Production);
    assert!(analytics.completed);
}

#[tokio::test]
async fn test_recalculation_overwrites_the_single_row() {
    let system = test_system();
    let order = OrderBuilder::new().create(&system).await;
    confirm_payment(&system, order.id).await;
    advance(&system, order.id, &[OrderStatus::Processing]).await;

    let analytics = system.coordinator().analytics();
    let first = analytics.calculate(order.id).await.unwrap();
    let second = analytics.calculate(order.id).await.unwrap();
    assert_eq!(first.stage_timings, second.stage_timings);
    assert_eq!(first.total_fulfillment_minutes, second.total_fulfillment_minutes);

    let dashboard = analytics.efficiency_dashboard(30).await.unwrap();
    assert_eq!(dashboard.orders_analyzed, 1);
}

#[tokio::test]
async fn test_dashboards_roll_up_stored_rows() {
    let system = test_system();
    let fast = seed_order(
        &system,
        OrderBuilder::new(),
        &[
            (OrderStatus::PendingPayment, 0),
            (OrderStatus::PaymentConfirmed, 5),
            (OrderStatus::Processing, 60),
        ],
    )
    .await;
    let rush = seed_order(
        &system,
        OrderBuilder::new().rush(),
        &[
            (OrderStatus::PendingPayment, 0),
            (OrderStatus::PaymentConfirmed, 5),
            (OrderStatus::Processing, 100),
            (OrderStatus::InProduction, 3000),
        ],
    )
    .await;

    let analytics = system.coordinator().analytics();
    analytics.calculate(fast.id).await.unwrap();
    let rush_row = analytics.calculate(rush.id).await.unwrap();
    assert_eq!(rush_row.sla_target_minutes, 2880);
    assert!(rush_row.sla_violated);

    let dashboard = analytics.efficiency_dashboard(7).await.unwrap();
    assert_eq!(dashboard.orders_analyzed, 2);
    assert_eq!(dashboard.sla_violations, 1);
    assert_eq!(dashboard.sla_compliance_rate, 50.0);
    assert_eq!(
        dashboard.bottleneck_distribution[&BottleneckStage::PaymentProcessing],
        1
    );
    assert_eq!(dashboard.bottleneck_distribution[&BottleneckStage::Production], 1);

    let compliance = analytics.sla_compliance(7).await.unwrap();
    assert_eq!(compliance.within_sla, 1);
    assert_eq!(compliance.violated, 1);
    assert_eq!(compliance.by_target.len(), 2);

    // One order each; ties go to the earlier stage
    let bottlenecks = analytics.bottleneck_analysis(7).await.unwrap();
    assert_eq!(
        bottlenecks.most_common_bottleneck,
        Some(BottleneckStage::PaymentProcessing)
    );
}

#[tokio::test]
async fn test_processor_performance_uses_routing_assignments() {
    let system = test_system();
    let order = OrderBuilder::new().create(&system).await;
    confirm_payment(&system, order.id).await;
    system
        .coordinator()
        .intelligent_order_routing(RoutingRequest {
            order_id: order.id,
            processors: vec!["tailor_a".to_string()],
        })
        .await
        .unwrap();

    let performance = system
        .coordinator()
        .analytics()
        .processor_performance(30)
        .await
        .unwrap();
    assert_eq!(performance.len(), 1);
    assert_eq!(performance[0].processor, "tailor_a");
    assert_eq!(performance[0].orders_handled, 1);
}

#[tokio::test]
async fn test_day_window_is_bounded() {
    let system = test_system();
    let analytics = system.coordinator().analytics();
    for days in [0, -1, 400] {
        let result = analytics.efficiency_dashboard(days).await;
        assert!(
            matches!(result, Err(OrderOpsError::Validation(_))),
            "days={days} should be rejected"
        );
    }
    assert!(analytics.sla_compliance(365).await.is_ok());
}

#[tokio::test]
async fn test_real_time_metrics_reflect_queue_and_exceptions() {
    let system = test_system();
    let urgent = OrderBuilder::new().rush().create(&system).await;
    let standard = OrderBuilder::new().create(&system).await;
    confirm_payment(&system, urgent.id).await;
    confirm_payment(&system, standard.id).await;
    OrderBuilder::new().create(&system).await;

    system
        .coordinator()
        .exception_handling(ExceptionRequest {
            order_id: standard.id,
            exception_type: ExceptionType::ShippingDelay,
            severity: ExceptionSeverity::Low,
            description: "Carrier pickup delayed".to_string(),
            actor: None,
        })
        .await
        .unwrap();

    let metrics = system.coordinator().analytics().real_time_metrics().await.unwrap();
    assert_eq!(metrics.queue_waiting, 2);
    assert_eq!(metrics.queue_assigned, 0);
    assert_eq!(metrics.urgent_in_queue, 1);
    assert_eq!(metrics.orders_by_status[&OrderStatus::PaymentConfirmed], 2);
    assert_eq!(metrics.orders_by_status[&OrderStatus::PendingPayment], 1);
    assert_eq!(metrics.open_exceptions, 1);
    assert_eq!(metrics.escalated_exceptions, 0);
}

#[tokio::test]
async fn test_analytics_for_unknown_order_is_not_found() {
    let system = test_system();
    let result = system
        .coordinator()
        .analytics()
        .get_or_calculate(Uuid::new_v4())
        .await;
    assert!(matches!(result, Err(OrderOpsError::OrderNotFound(_))));
}
