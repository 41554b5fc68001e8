//! # Persistence
//!
//! Transactional storage for orders and everything derived from them.
//!
//! ## Unit of Work Semantics
//!
//! Every operation takes `&mut Self::UnitOfWork`, a value representing an
//! in-progress transaction. The lifecycle is:
//!
//! 1. [`OrderStore::begin`] starts a unit of work
//! 2. call reads and writes with `&mut uow`
//! 3. [`OrderStore::commit`] makes all writes visible, or
//!    [`OrderStore::rollback`] discards them
//!
//! Dropping a unit of work without committing discards its writes.
//! [`OrderStore::get_order_for_update`] locks the order row until the unit of
//! work ends, which serializes concurrent transitions on the same order.
//!
//! ## Backends
//!
//! - [`memory::InMemoryStore`] - single-process store used by tests and local runs
//! - [`postgres::PgStore`] - sqlx/Postgres store with pgmq for durable tasks

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AutomationRule, ExceptionStatus, Order, OrderException, OrderStatus, PartyMember,
    ProcessedEvent, ProcessingAnalytics, QueueEntry, QueueFilter, StatusHistoryEntry,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Errors returned by an [`OrderStore`] implementation
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("exception not found: {0}")]
    ExceptionNotFound(Uuid),

    /// A uniqueness constraint rejected the write
    #[error("duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// A stored value could not be decoded into its model type
    #[error("corrupt {column} value: {message}")]
    Decode { column: &'static str, message: String },

    /// A backend-specific storage error (connection, query, serialization)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn duplicate(entity: &'static str, key: impl Into<String>) -> Self {
        Self::Duplicate {
            entity,
            key: key.into(),
        }
    }

    pub fn decode(column: &'static str, message: impl ToString) -> Self {
        Self::Decode {
            column,
            message: message.to_string(),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Backend(format!("migration failed: {err}"))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(format!("json: {err}"))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Transactional store behind every order-ops operation.
///
/// Implementations must be `Send + Sync + 'static` so they can live in axum
/// state and be shared with background workers.
#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    /// In-progress transaction. Dropping it without commit rolls back.
    type UnitOfWork: Send;

    // -- Unit of work lifecycle ---------------------------------------------

    async fn begin(&self) -> StorageResult<Self::UnitOfWork>;

    async fn commit(&self, uow: Self::UnitOfWork) -> StorageResult<()>;

    async fn rollback(&self, uow: Self::UnitOfWork) -> StorageResult<()>;

    // -- Orders ---------------------------------------------------------------

    async fn insert_order(&self, uow: &mut Self::UnitOfWork, order: &Order) -> StorageResult<()>;

    /// Read an order, locking it until the unit of work ends.
    ///
    /// Returns `Err(StorageError::OrderNotFound)` if the order does not exist.
    async fn get_order_for_update(
        &self,
        uow: &mut Self::UnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Order>;

    async fn update_order(&self, uow: &mut Self::UnitOfWork, order: &Order) -> StorageResult<()>;

    async fn list_orders(
        &self,
        uow: &mut Self::UnitOfWork,
        status: Option<OrderStatus>,
    ) -> StorageResult<Vec<Order>>;

    // -- Status history (append-only) ----------------------------------------

    async fn append_status_history(
        &self,
        uow: &mut Self::UnitOfWork,
        entry: &StatusHistoryEntry,
    ) -> StorageResult<()>;

    /// History for one order ordered by `created_at`, then insertion order.
    async fn status_history(
        &self,
        uow: &mut Self::UnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Vec<StatusHistoryEntry>>;

    // -- Processing queue -----------------------------------------------------

    /// The order's non-completed queue entry, if any.
    async fn active_queue_entry(
        &self,
        uow: &mut Self::UnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Option<QueueEntry>>;

    /// Insert or replace a queue entry by id.
    async fn upsert_queue_entry(
        &self,
        uow: &mut Self::UnitOfWork,
        entry: &QueueEntry,
    ) -> StorageResult<()>;

    /// Entries matching the filter, highest score first then oldest first.
    async fn list_queue(
        &self,
        uow: &mut Self::UnitOfWork,
        filter: &QueueFilter,
    ) -> StorageResult<Vec<QueueEntry>>;

    // -- Exceptions -----------------------------------------------------------

    async fn insert_exception(
        &self,
        uow: &mut Self::UnitOfWork,
        exception: &OrderException,
    ) -> StorageResult<()>;

    /// Returns `Err(StorageError::ExceptionNotFound)` if the exception does not exist.
    async fn get_exception_for_update(
        &self,
        uow: &mut Self::UnitOfWork,
        exception_id: Uuid,
    ) -> StorageResult<OrderException>;

    async fn update_exception(
        &self,
        uow: &mut Self::UnitOfWork,
        exception: &OrderException,
    ) -> StorageResult<()>;

    /// Exceptions for one order, oldest first.
    async fn exceptions_for_order(
        &self,
        uow: &mut Self::UnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Vec<OrderException>>;

    async fn list_exceptions(
        &self,
        uow: &mut Self::UnitOfWork,
        status: Option<ExceptionStatus>,
    ) -> StorageResult<Vec<OrderException>>;

    // -- Analytics ------------------------------------------------------------

    /// Insert or overwrite the single analytics row for an order.
    async fn upsert_analytics(
        &self,
        uow: &mut Self::UnitOfWork,
        analytics: &ProcessingAnalytics,
    ) -> StorageResult<()>;

    async fn get_analytics(
        &self,
        uow: &mut Self::UnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Option<ProcessingAnalytics>>;

    /// Rows calculated at or after `since`.
    async fn list_analytics(
        &self,
        uow: &mut Self::UnitOfWork,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<ProcessingAnalytics>>;

    // -- Automation rules -----------------------------------------------------

    /// Active rules in evaluation order (ascending `priority`).
    async fn active_automation_rules(
        &self,
        uow: &mut Self::UnitOfWork,
    ) -> StorageResult<Vec<AutomationRule>>;

    async fn insert_automation_rule(
        &self,
        uow: &mut Self::UnitOfWork,
        rule: &AutomationRule,
    ) -> StorageResult<()>;

    // -- Wedding party --------------------------------------------------------

    /// Returns `Err(StorageError::Duplicate)` when the email is already
    /// invited to this order. The unit of work stays usable afterwards.
    async fn insert_party_member(
        &self,
        uow: &mut Self::UnitOfWork,
        member: &PartyMember,
    ) -> StorageResult<()>;

    async fn party_members(
        &self,
        uow: &mut Self::UnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Vec<PartyMember>>;

    // -- Idempotency ledger ---------------------------------------------------

    async fn find_processed_event(
        &self,
        uow: &mut Self::UnitOfWork,
        idempotency_key: &str,
    ) -> StorageResult<Option<ProcessedEvent>>;

    async fn record_processed_event(
        &self,
        uow: &mut Self::UnitOfWork,
        event: &ProcessedEvent,
    ) -> StorageResult<()>;

    // -- Durable tasks --------------------------------------------------------

    /// Enqueue a task that becomes visible after `delay_seconds`, but only if
    /// the unit of work commits. Returns the message id.
    async fn schedule_task(
        &self,
        uow: &mut Self::UnitOfWork,
        queue_name: &str,
        payload: &serde_json::Value,
        delay_seconds: u64,
    ) -> StorageResult<i64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_messages() {
        let err = StorageError::duplicate("party member", "a@b.com");
        assert_eq!(err.to_string(), "duplicate party member: a@b.com");

        let err = StorageError::decode("status", "invalid OrderStatus value: held");
        assert!(err.to_string().contains("status"));
    }
}
