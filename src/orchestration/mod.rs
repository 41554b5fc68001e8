//! # Order Orchestration
//!
//! The order lifecycle services and the coordinator that composes them.
//!
//! ## Core Components
//!
//! - **PriorityScorer**: pure scoring of an order into score, tier and ETA
//! - **ProcessingQueue**: one active queue entry per order, least-loaded routing
//! - **ExceptionTracker**: exception lifecycle and its coupling to order status
//! - **AutomationRulesEngine**: condition/action rules evaluated at payment time
//! - **WeddingPartyCoordinator**: bulk party member invitations
//! - **WorkflowCoordinator**: named actions, each one unit of work
//! - **AutoResolutionWorker**: drains the durable auto-resolution queue
//!
//! [`bootstrap::OrderOpsSystem`] wires all of them from one configuration.

pub mod auto_resolution_worker;
pub mod automation_rules;
pub mod bootstrap;
pub mod exception_tracker;
pub mod priority_scorer;
pub mod processing_queue;
pub mod resolution;
pub mod wedding_party;
pub mod workflow_coordinator;

pub use auto_resolution_worker::{AutoResolutionWorker, WorkerBatchStats};
pub use automation_rules::{AppliedRule, AutomationRulesEngine, RulesEvaluation};
pub use bootstrap::{OrderOpsSystem, WorkerHandle};
pub use exception_tracker::{
    AutoResolutionOutcome, CreatedException, ExceptionTracker, ResolvedException,
};
pub use priority_scorer::{PriorityScore, PriorityScorer};
pub use processing_queue::{ProcessingQueue, ProcessorLoad, RoutingDecision};
pub use resolution::{ResolutionAttempt, ResolutionStrategy, SimulatedResolutionStrategy};
pub use wedding_party::{InviteResult, WeddingPartyCoordinator};
pub use workflow_coordinator::{
    BundleItem, BundleItemCheck, BundleRequest, BundleResult, ExceptionRequest,
    IdempotentResponse, PaymentConfirmation, PaymentConfirmationResult, QualityInspection,
    QualityResult, RoutingRequest, RoutingResult, StatusUpdate, StatusUpdateResult, StockStatus,
    WeddingPartyRequest, WeddingPartyResult, WorkflowCoordinator,
};
