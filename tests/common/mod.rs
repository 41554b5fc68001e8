//! Shared integration test harness: a fully wired system on the in-memory
//! store with deterministic auto-resolution.

#![allow(dead_code)]

pub mod builders;
pub mod strategies;

use std::sync::Arc;

use order_ops::config::{OrderOpsConfig, SuccessRates};
use order_ops::database::InMemoryStore;
use order_ops::events::EventPublisher;
use order_ops::models::QueueFilter;
use order_ops::orchestration::{OrderOpsSystem, SimulatedResolutionStrategy};

pub use builders::*;

pub const TEST_QUEUE: &str = "test_auto_resolution";

pub fn test_config() -> OrderOpsConfig {
    let mut config = OrderOpsConfig::default();
    config.environment = "test".to_string();
    config.exceptions.auto_resolution_delay_seconds = 0;
    config.auto_resolution.queue_name = TEST_QUEUE.to_string();
    config.auto_resolution.visibility_timeout_seconds = 0;
    config.auto_resolution.enabled = false;
    config
}

pub fn uniform_rates(rate: f64) -> SuccessRates {
    SuccessRates {
        payment_retry: rate,
        address_validation: rate,
        inventory_check: rate,
    }
}

/// System whose auto-resolution attempts succeed with probability `rate`.
/// Use 0.0 or 1.0 for deterministic outcomes.
pub fn system_with_success_rate(rate: f64) -> (OrderOpsSystem<InMemoryStore>, EventPublisher) {
    let publisher = EventPublisher::default();
    let system = OrderOpsSystem::with_components(
        test_config(),
        InMemoryStore::new(),
        Arc::new(publisher.clone()),
        Arc::new(SimulatedResolutionStrategy::with_seed(uniform_rates(rate), 42)),
    );
    (system, publisher)
}

pub fn test_system() -> OrderOpsSystem<InMemoryStore> {
    system_with_success_rate(1.0).0
}

/// Non-completed queue entries held by one order.
pub async fn active_entries(system: &OrderOpsSystem<InMemoryStore>, order_id: uuid::Uuid) -> usize {
    system
        .coordinator()
        .queue()
        .list(&QueueFilter::default())
        .await
        .unwrap()
        .iter()
        .filter(|entry| entry.order_id == order_id && entry.queue_status.is_active())
        .count()
}
