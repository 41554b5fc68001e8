//! # Order Ops Bootstrap
//!
//! Builds every order lifecycle service from one configuration and one
//! store, the same way for the HTTP server, the tests and local runs.
//!
//! ## Key Features
//!
//! - **One wiring path**: the store, notifier and resolution strategy are the
//!   only injected pieces; everything else is derived from [`OrderOpsConfig`]
//! - **Worker lifecycle**: [`OrderOpsSystem::start_worker`] spawns the
//!   auto-resolution worker and returns a handle that stops it gracefully

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::auto_resolution_worker::AutoResolutionWorker;
use super::automation_rules::AutomationRulesEngine;
use super::exception_tracker::ExceptionTracker;
use super::priority_scorer::PriorityScorer;
use super::processing_queue::ProcessingQueue;
use super::resolution::{ResolutionStrategy, SimulatedResolutionStrategy};
use super::wedding_party::WeddingPartyCoordinator;
use super::workflow_coordinator::WorkflowCoordinator;
use crate::analytics::AnalyticsService;
use crate::config::OrderOpsConfig;
use crate::database::OrderStore;
use crate::events::{EventPublisher, Notifier};
use crate::messaging::TaskQueue;
use crate::state_machine::OrderStateMachine;

/// Running auto-resolution worker
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker and wait for its current batch to finish.
    pub async fn stop(self) {
        if self.shutdown.send(true).is_err() {
            warn!("Auto-resolution worker already exited");
        }
        if let Err(err) = self.join.await {
            warn!(error = %err, "Auto-resolution worker task failed");
        }
    }
}

/// Fully wired order operations services sharing one store
pub struct OrderOpsSystem<S: OrderStore + TaskQueue> {
    config: OrderOpsConfig,
    store: Arc<S>,
    publisher: Option<EventPublisher>,
    fsm: OrderStateMachine<S>,
    coordinator: Arc<WorkflowCoordinator<S>>,
}

impl<S: OrderStore + TaskQueue> OrderOpsSystem<S> {
    /// Wire with the in-process [`EventPublisher`] and the simulated
    /// resolution strategy.
    pub fn new(config: OrderOpsConfig, store: S) -> Self {
        let publisher = EventPublisher::default();
        let strategy = Arc::new(SimulatedResolutionStrategy::new(
            config.auto_resolution.success_rates.clone(),
        ));
        let mut system = Self::with_components(config, store, Arc::new(publisher.clone()), strategy);
        system.publisher = Some(publisher);
        system
    }

    pub fn with_components(
        config: OrderOpsConfig,
        store: S,
        notifier: Arc<dyn Notifier>,
        strategy: Arc<dyn ResolutionStrategy>,
    ) -> Self {
        let store = Arc::new(store);
        let fsm = OrderStateMachine::new(Arc::clone(&store), Arc::clone(&notifier));

        let queue = Arc::new(ProcessingQueue::new(
            Arc::clone(&store),
            PriorityScorer::new(config.scoring.estimated_hours.clone()),
        ));
        let tracker = Arc::new(ExceptionTracker::new(
            fsm.clone(),
            Arc::clone(&queue),
            strategy,
            config.exceptions.auto_resolution_delay_seconds,
            config.auto_resolution.queue_name.clone(),
        ));
        let rules = Arc::new(AutomationRulesEngine::new(
            Arc::clone(&store),
            Arc::clone(&tracker),
        ));
        let party = Arc::new(WeddingPartyCoordinator::new(Arc::clone(&store), notifier));
        let analytics = Arc::new(AnalyticsService::new(
            Arc::clone(&store),
            config.sla.clone(),
        ));

        let coordinator = Arc::new(WorkflowCoordinator::new(
            fsm.clone(),
            queue,
            tracker,
            rules,
            party,
            analytics,
        ));

        info!(environment = %config.environment, "Order ops services wired");
        Self {
            config,
            store,
            publisher: None,
            fsm,
            coordinator,
        }
    }

    pub fn config(&self) -> &OrderOpsConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn state_machine(&self) -> &OrderStateMachine<S> {
        &self.fsm
    }

    pub fn coordinator(&self) -> &Arc<WorkflowCoordinator<S>> {
        &self.coordinator
    }

    /// The in-process publisher, when the system owns one.
    pub fn publisher(&self) -> Option<&EventPublisher> {
        self.publisher.as_ref()
    }

    /// Spawn the auto-resolution worker. Returns `None` when disabled.
    pub fn start_worker(&self) -> Option<WorkerHandle> {
        if !self.config.auto_resolution.enabled {
            info!("Auto-resolution worker disabled");
            return None;
        }

        let worker = AutoResolutionWorker::new(
            Arc::clone(&self.store),
            Arc::clone(self.coordinator.tracker()),
            self.config.auto_resolution.clone(),
        );
        let (shutdown, receiver) = watch::channel(false);
        let join = tokio::spawn(worker.run(receiver));
        Some(WorkerHandle { shutdown, join })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStore;
    use crate::models::{NewOrder, OrderType};

    #[tokio::test]
    async fn test_system_wires_a_working_coordinator() {
        let system = OrderOpsSystem::new(OrderOpsConfig::default(), InMemoryStore::new());
        let mut notifications = system.publisher().unwrap().subscribe();

        let order = system
            .coordinator()
            .create_order(NewOrder {
                customer_id: "cust_boot".to_string(),
                customer_tier: Default::default(),
                total_amount: 99.0,
                order_type: OrderType::Standard,
                rush_order: false,
                group_order: false,
                party_size: 0,
                event_date: None,
            })
            .await
            .unwrap();

        system
            .state_machine()
            .transition(order.id, crate::models::OrderStatus::Cancelled, "user_9", None)
            .await
            .unwrap();
        assert_eq!(
            notifications.recv().await.unwrap().name,
            crate::constants::events::ORDER_CANCELLED
        );
    }

    #[tokio::test]
    async fn test_worker_starts_and_stops() {
        let system = OrderOpsSystem::new(OrderOpsConfig::default(), InMemoryStore::new());
        let handle = system.start_worker().unwrap();
        handle.stop().await;

        let mut config = OrderOpsConfig::default();
        config.auto_resolution.enabled = false;
        let disabled = OrderOpsSystem::new(config, InMemoryStore::new());
        assert!(disabled.start_worker().is_none());
    }
}
