// State machines for the order and exception lifecycles
//
// Order transitions are validated against an explicit table, persisted
// together with an append-only history entry, and close the processing queue
// entry when the order leaves the pipeline.

pub mod errors;
pub mod order_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use order_state_machine::{OrderStateMachine, TransitionRecord};
pub use states::{ExceptionStatus, OrderStatus};
