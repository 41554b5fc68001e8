//! # Web API Application State

use std::sync::Arc;

use crate::config::OrderOpsConfig;
use crate::database::OrderStore;
use crate::messaging::TaskQueue;
use crate::orchestration::{OrderOpsSystem, WorkflowCoordinator};

/// Shared application state handed to every request handler
pub struct AppState<S: OrderStore + TaskQueue> {
    pub system: Arc<OrderOpsSystem<S>>,
}

impl<S: OrderStore + TaskQueue> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            system: Arc::clone(&self.system),
        }
    }
}

impl<S: OrderStore + TaskQueue> AppState<S> {
    pub fn new(system: Arc<OrderOpsSystem<S>>) -> Self {
        Self { system }
    }

    pub fn coordinator(&self) -> &WorkflowCoordinator<S> {
        self.system.coordinator()
    }

    pub fn config(&self) -> &OrderOpsConfig {
        self.system.config()
    }

    pub fn store(&self) -> &Arc<S> {
        self.system.store()
    }
}
