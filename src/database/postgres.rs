//! Postgres [`OrderStore`] and pgmq-backed [`TaskQueue`].
//!
//! Queries are plain runtime `sqlx::query` calls so the crate builds without
//! a live database. Enum columns are stored as their snake_case text and
//! parsed back on read.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::{OrderStore, StorageError, StorageResult};
use crate::config::DatabaseConfig;
use crate::messaging::{QueueError, QueueResult, QueuedMessage, TaskQueue};
use crate::models::{
    AutomationRule, ExceptionStatus, Order, OrderException, OrderStatus, ParseEnumError,
    PartyMember, ProcessedEvent, ProcessingAnalytics, QueueEntry, QueueFilter, StageTimings,
    StatusHistoryEntry,
};

/// Migrations under `migrations/`, including the pgmq extension
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const UNIQUE_VIOLATION: &str = "23505";

/// sqlx/Postgres store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

pub type PgUnitOfWork = Transaction<'static, Postgres>;

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using the database section of the configuration
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StorageError::Backend("database.url is not configured".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Connected to Postgres"
        );
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running order-ops migrations");
        MIGRATOR.run(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_column<T>(column: &'static str, value: &str) -> StorageResult<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    value
        .parse()
        .map_err(|err: ParseEnumError| StorageError::decode(column, err))
}

fn parse_optional_column<T>(column: &'static str, value: Option<&str>) -> StorageResult<Option<T>>
where
    T: FromStr<Err = ParseEnumError>,
{
    value.map(|v| parse_column(column, v)).transpose()
}

/// Map a unique-constraint violation to `Duplicate`, anything else to `Backend`
fn unique_violation(err: sqlx::Error, entity: &'static str, key: impl Into<String>) -> StorageError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StorageError::duplicate(entity, key)
        }
        _ => err.into(),
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: String,
    customer_tier: String,
    total_amount: f64,
    order_type: String,
    status: String,
    priority_level: String,
    rush_order: bool,
    group_order: bool,
    party_size: i32,
    event_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StorageError;

    fn try_from(row: OrderRow) -> StorageResult<Self> {
        Ok(Order {
            id: row.id,
            customer_id: row.customer_id,
            customer_tier: parse_column("customer_tier", &row.customer_tier)?,
            total_amount: row.total_amount,
            order_type: parse_column("order_type", &row.order_type)?,
            status: parse_column("status", &row.status)?,
            priority_level: parse_column("priority_level", &row.priority_level)?,
            rush_order: row.rush_order,
            group_order: row.group_order,
            party_size: row.party_size,
            event_date: row.event_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            delivered_at: row.delivered_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: Uuid,
    order_id: Uuid,
    previous_status: Option<String>,
    new_status: String,
    actor: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for StatusHistoryEntry {
    type Error = StorageError;

    fn try_from(row: HistoryRow) -> StorageResult<Self> {
        Ok(StatusHistoryEntry {
            id: row.id,
            order_id: row.order_id,
            previous_status: parse_optional_column("previous_status", row.previous_status.as_deref())?,
            new_status: parse_column("new_status", &row.new_status)?,
            actor: row.actor,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct QueueRow {
    id: Uuid,
    order_id: Uuid,
    priority_score: i32,
    priority_level: String,
    queue_status: String,
    assigned_to: Option<String>,
    estimated_completion: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = StorageError;

    fn try_from(row: QueueRow) -> StorageResult<Self> {
        Ok(QueueEntry {
            id: row.id,
            order_id: row.order_id,
            priority_score: row.priority_score,
            priority_level: parse_column("priority_level", &row.priority_level)?,
            queue_status: parse_column("queue_status", &row.queue_status)?,
            assigned_to: row.assigned_to,
            estimated_completion: row.estimated_completion,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ExceptionRow {
    id: Uuid,
    order_id: Uuid,
    exception_type: String,
    severity: String,
    status: String,
    description: String,
    auto_resolvable: bool,
    customer_impact_level: String,
    affects_delivery_date: bool,
    estimated_delay_days: i32,
    resolution_notes: Option<String>,
    auto_resolution_attempts: i32,
    escalated_to: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    escalated_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExceptionRow> for OrderException {
    type Error = StorageError;

    fn try_from(row: ExceptionRow) -> StorageResult<Self> {
        Ok(OrderException {
            id: row.id,
            order_id: row.order_id,
            exception_type: parse_column("exception_type", &row.exception_type)?,
            severity: parse_column("severity", &row.severity)?,
            status: parse_column("status", &row.status)?,
            description: row.description,
            auto_resolvable: row.auto_resolvable,
            customer_impact_level: parse_column(
                "customer_impact_level",
                &row.customer_impact_level,
            )?,
            affects_delivery_date: row.affects_delivery_date,
            estimated_delay_days: row.estimated_delay_days,
            resolution_notes: row.resolution_notes,
            auto_resolution_attempts: row.auto_resolution_attempts,
            escalated_to: row.escalated_to,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
            escalated_at: row.escalated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AnalyticsRow {
    order_id: Uuid,
    payment_to_processing: i64,
    processing_to_production: i64,
    production_to_quality: i64,
    quality_to_shipping: i64,
    shipping_to_delivery: i64,
    total_fulfillment_minutes: i64,
    efficiency_score: f64,
    bottleneck_stage: String,
    sla_target_minutes: i64,
    sla_violated: bool,
    assigned_to: Option<String>,
    completed: bool,
    calculated_at: DateTime<Utc>,
}

impl TryFrom<AnalyticsRow> for ProcessingAnalytics {
    type Error = StorageError;

    fn try_from(row: AnalyticsRow) -> StorageResult<Self> {
        Ok(ProcessingAnalytics {
            order_id: row.order_id,
            stage_timings: StageTimings {
                payment_to_processing: row.payment_to_processing,
                processing_to_production: row.processing_to_production,
                production_to_quality: row.production_to_quality,
                quality_to_shipping: row.quality_to_shipping,
                shipping_to_delivery: row.shipping_to_delivery,
            },
            total_fulfillment_minutes: row.total_fulfillment_minutes,
            efficiency_score: row.efficiency_score,
            bottleneck_stage: parse_column("bottleneck_stage", &row.bottleneck_stage)?,
            sla_target_minutes: row.sla_target_minutes,
            sla_violated: row.sla_violated,
            assigned_to: row.assigned_to,
            completed: row.completed,
            calculated_at: row.calculated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RuleRow {
    id: Uuid,
    name: String,
    active: bool,
    priority: i32,
    condition: serde_json::Value,
    action: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for AutomationRule {
    type Error = StorageError;

    fn try_from(row: RuleRow) -> StorageResult<Self> {
        Ok(AutomationRule {
            id: row.id,
            name: row.name,
            active: row.active,
            priority: row.priority,
            condition: serde_json::from_value(row.condition)
                .map_err(|e| StorageError::decode("condition", e))?,
            action: serde_json::from_value(row.action)
                .map_err(|e| StorageError::decode("action", e))?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PartyMemberRow {
    id: Uuid,
    order_id: Uuid,
    name: String,
    email: String,
    role: Option<String>,
    invited_at: DateTime<Utc>,
}

impl From<PartyMemberRow> for PartyMember {
    fn from(row: PartyMemberRow) -> Self {
        PartyMember {
            id: row.id,
            order_id: row.order_id,
            name: row.name,
            email: row.email,
            role: row.role,
            invited_at: row.invited_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProcessedEventRow {
    idempotency_key: String,
    action: String,
    order_id: Option<Uuid>,
    response: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<ProcessedEventRow> for ProcessedEvent {
    fn from(row: ProcessedEventRow) -> Self {
        ProcessedEvent {
            idempotency_key: row.idempotency_key,
            action: row.action,
            order_id: row.order_id,
            response: row.response,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    msg_id: i64,
    read_ct: i32,
    enqueued_at: DateTime<Utc>,
    vt: DateTime<Utc>,
    message: serde_json::Value,
}

impl From<MessageRow> for QueuedMessage {
    fn from(row: MessageRow) -> Self {
        QueuedMessage {
            msg_id: row.msg_id,
            read_ct: row.read_ct,
            enqueued_at: row.enqueued_at,
            vt: row.vt,
            message: row.message,
        }
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StorageResult<Vec<T>>
where
    T: TryFrom<R, Error = StorageError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const ORDER_COLUMNS: &str = "id, customer_id, customer_tier, total_amount, order_type, status, \
     priority_level, rush_order, group_order, party_size, event_date, created_at, updated_at, \
     delivered_at";

const QUEUE_COLUMNS: &str = "id, order_id, priority_score, priority_level, queue_status, \
     assigned_to, estimated_completion, created_at, updated_at, completed_at";

const EXCEPTION_COLUMNS: &str = "id, order_id, exception_type, severity, status, description, \
     auto_resolvable, customer_impact_level, affects_delivery_date, estimated_delay_days, \
     resolution_notes, auto_resolution_attempts, escalated_to, created_at, updated_at, \
     resolved_at, escalated_at";

const ANALYTICS_COLUMNS: &str = "order_id, payment_to_processing, processing_to_production, \
     production_to_quality, quality_to_shipping, shipping_to_delivery, \
     total_fulfillment_minutes, efficiency_score, bottleneck_stage, sla_target_minutes, \
     sla_violated, assigned_to, completed, calculated_at";

#[async_trait]
impl OrderStore for PgStore {
    type UnitOfWork = PgUnitOfWork;

    async fn begin(&self) -> StorageResult<PgUnitOfWork> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, uow: PgUnitOfWork) -> StorageResult<()> {
        Ok(uow.commit().await?)
    }

    async fn rollback(&self, uow: PgUnitOfWork) -> StorageResult<()> {
        Ok(uow.rollback().await?)
    }

    async fn insert_order(&self, uow: &mut PgUnitOfWork, order: &Order) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, customer_id, customer_tier, total_amount, order_type, status, \
             priority_level, rush_order, group_order, party_size, event_date, created_at, \
             updated_at, delivered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(order.id)
        .bind(&order.customer_id)
        .bind(order.customer_tier.as_str())
        .bind(order.total_amount)
        .bind(order.order_type.as_str())
        .bind(order.status.as_str())
        .bind(order.priority_level.as_str())
        .bind(order.rush_order)
        .bind(order.group_order)
        .bind(order.party_size)
        .bind(order.event_date)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.delivered_at)
        .execute(&mut **uow)
        .await
        .map_err(|e| unique_violation(e, "order", order.id.to_string()))?;
        Ok(())
    }

    async fn get_order_for_update(
        &self,
        uow: &mut PgUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Order> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&mut **uow)
            .await?
            .ok_or(StorageError::OrderNotFound(order_id))?;
        row.try_into()
    }

    async fn update_order(&self, uow: &mut PgUnitOfWork, order: &Order) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET customer_tier = $2, total_amount = $3, order_type = $4, \
             status = $5, priority_level = $6, rush_order = $7, group_order = $8, \
             party_size = $9, event_date = $10, updated_at = $11, delivered_at = $12 \
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.customer_tier.as_str())
        .bind(order.total_amount)
        .bind(order.order_type.as_str())
        .bind(order.status.as_str())
        .bind(order.priority_level.as_str())
        .bind(order.rush_order)
        .bind(order.group_order)
        .bind(order.party_size)
        .bind(order.event_date)
        .bind(order.updated_at)
        .bind(order.delivered_at)
        .execute(&mut **uow)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::OrderNotFound(order.id));
        }
        Ok(())
    }

    async fn list_orders(
        &self,
        uow: &mut PgUnitOfWork,
        status: Option<OrderStatus>,
    ) -> StorageResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&mut **uow)
            .await?;
        convert_all(rows)
    }

    async fn append_status_history(
        &self,
        uow: &mut PgUnitOfWork,
        entry: &StatusHistoryEntry,
    ) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO order_status_history \
             (id, order_id, previous_status, new_status, actor, notes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.id)
        .bind(entry.order_id)
        .bind(entry.previous_status.map(|s| s.as_str()))
        .bind(entry.new_status.as_str())
        .bind(&entry.actor)
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(&mut **uow)
        .await?;
        Ok(())
    }

    async fn status_history(
        &self,
        uow: &mut PgUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Vec<StatusHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, order_id, previous_status, new_status, actor, notes, created_at \
             FROM order_status_history WHERE order_id = $1 ORDER BY created_at, seq",
        )
        .bind(order_id)
        .fetch_all(&mut **uow)
        .await?;
        convert_all(rows)
    }

    async fn active_queue_entry(
        &self,
        uow: &mut PgUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Option<QueueEntry>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM order_priority_queue \
             WHERE order_id = $1 AND queue_status <> 'completed' FOR UPDATE"
        );
        sqlx::query_as::<_, QueueRow>(&sql)
            .bind(order_id)
            .fetch_optional(&mut **uow)
            .await?
            .map(QueueEntry::try_from)
            .transpose()
    }

    async fn upsert_queue_entry(
        &self,
        uow: &mut PgUnitOfWork,
        entry: &QueueEntry,
    ) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO order_priority_queue \
             (id, order_id, priority_score, priority_level, queue_status, assigned_to, \
              estimated_completion, created_at, updated_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET \
               priority_score = EXCLUDED.priority_score, \
               priority_level = EXCLUDED.priority_level, \
               queue_status = EXCLUDED.queue_status, \
               assigned_to = EXCLUDED.assigned_to, \
               estimated_completion = EXCLUDED.estimated_completion, \
               updated_at = EXCLUDED.updated_at, \
               completed_at = EXCLUDED.completed_at",
        )
        .bind(entry.id)
        .bind(entry.order_id)
        .bind(entry.priority_score)
        .bind(entry.priority_level.as_str())
        .bind(entry.queue_status.as_str())
        .bind(&entry.assigned_to)
        .bind(entry.estimated_completion)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .bind(entry.completed_at)
        .execute(&mut **uow)
        .await
        .map_err(|e| unique_violation(e, "active queue entry", entry.order_id.to_string()))?;
        Ok(())
    }

    async fn list_queue(
        &self,
        uow: &mut PgUnitOfWork,
        filter: &QueueFilter,
    ) -> StorageResult<Vec<QueueEntry>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM order_priority_queue \
             WHERE ($1::text IS NULL OR queue_status = $1) \
               AND ($2::text IS NULL OR assigned_to = $2) \
             ORDER BY priority_score DESC, created_at ASC \
             LIMIT $3"
        );
        let limit = filter.limit.and_then(|l| i64::try_from(l).ok());
        let rows = sqlx::query_as::<_, QueueRow>(&sql)
            .bind(filter.queue_status.map(|s| s.as_str()))
            .bind(filter.assigned_to.as_deref())
            .bind(limit)
            .fetch_all(&mut **uow)
            .await?;
        convert_all(rows)
    }

    async fn insert_exception(
        &self,
        uow: &mut PgUnitOfWork,
        exception: &OrderException,
    ) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO order_exceptions \
             (id, order_id, exception_type, severity, status, description, auto_resolvable, \
              customer_impact_level, affects_delivery_date, estimated_delay_days, \
              resolution_notes, auto_resolution_attempts, escalated_to, created_at, updated_at, \
              resolved_at, escalated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(exception.id)
        .bind(exception.order_id)
        .bind(exception.exception_type.as_str())
        .bind(exception.severity.as_str())
        .bind(exception.status.as_str())
        .bind(&exception.description)
        .bind(exception.auto_resolvable)
        .bind(exception.customer_impact_level.as_str())
        .bind(exception.affects_delivery_date)
        .bind(exception.estimated_delay_days)
        .bind(&exception.resolution_notes)
        .bind(exception.auto_resolution_attempts)
        .bind(&exception.escalated_to)
        .bind(exception.created_at)
        .bind(exception.updated_at)
        .bind(exception.resolved_at)
        .bind(exception.escalated_at)
        .execute(&mut **uow)
        .await?;
        Ok(())
    }

    async fn get_exception_for_update(
        &self,
        uow: &mut PgUnitOfWork,
        exception_id: Uuid,
    ) -> StorageResult<OrderException> {
        let sql = format!("SELECT {EXCEPTION_COLUMNS} FROM order_exceptions WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(exception_id)
            .fetch_optional(&mut **uow)
            .await?
            .ok_or(StorageError::ExceptionNotFound(exception_id))?;
        row.try_into()
    }

    async fn update_exception(
        &self,
        uow: &mut PgUnitOfWork,
        exception: &OrderException,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE order_exceptions SET status = $2, resolution_notes = $3, \
             auto_resolution_attempts = $4, escalated_to = $5, updated_at = $6, \
             resolved_at = $7, escalated_at = $8 WHERE id = $1",
        )
        .bind(exception.id)
        .bind(exception.status.as_str())
        .bind(&exception.resolution_notes)
        .bind(exception.auto_resolution_attempts)
        .bind(&exception.escalated_to)
        .bind(exception.updated_at)
        .bind(exception.resolved_at)
        .bind(exception.escalated_at)
        .execute(&mut **uow)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ExceptionNotFound(exception.id));
        }
        Ok(())
    }

    async fn exceptions_for_order(
        &self,
        uow: &mut PgUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Vec<OrderException>> {
        let sql = format!(
            "SELECT {EXCEPTION_COLUMNS} FROM order_exceptions \
             WHERE order_id = $1 ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(order_id)
            .fetch_all(&mut **uow)
            .await?;
        convert_all(rows)
    }

    async fn list_exceptions(
        &self,
        uow: &mut PgUnitOfWork,
        status: Option<ExceptionStatus>,
    ) -> StorageResult<Vec<OrderException>> {
        let sql = format!(
            "SELECT {EXCEPTION_COLUMNS} FROM order_exceptions \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&mut **uow)
            .await?;
        convert_all(rows)
    }

    async fn upsert_analytics(
        &self,
        uow: &mut PgUnitOfWork,
        analytics: &ProcessingAnalytics,
    ) -> StorageResult<()> {
        let timings = &analytics.stage_timings;
        sqlx::query(
            "INSERT INTO processing_analytics \
             (order_id, payment_to_processing, processing_to_production, production_to_quality, \
              quality_to_shipping, shipping_to_delivery, total_fulfillment_minutes, \
              efficiency_score, bottleneck_stage, sla_target_minutes, sla_violated, assigned_to, \
              completed, calculated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (order_id) DO UPDATE SET \
               payment_to_processing = EXCLUDED.payment_to_processing, \
               processing_to_production = EXCLUDED.processing_to_production, \
               production_to_quality = EXCLUDED.production_to_quality, \
               quality_to_shipping = EXCLUDED.quality_to_shipping, \
               shipping_to_delivery = EXCLUDED.shipping_to_delivery, \
               total_fulfillment_minutes = EXCLUDED.total_fulfillment_minutes, \
               efficiency_score = EXCLUDED.efficiency_score, \
               bottleneck_stage = EXCLUDED.bottleneck_stage, \
               sla_target_minutes = EXCLUDED.sla_target_minutes, \
               sla_violated = EXCLUDED.sla_violated, \
               assigned_to = EXCLUDED.assigned_to, \
               completed = EXCLUDED.completed, \
               calculated_at = EXCLUDED.calculated_at",
        )
        .bind(analytics.order_id)
        .bind(timings.payment_to_processing)
        .bind(timings.processing_to_production)
        .bind(timings.production_to_quality)
        .bind(timings.quality_to_shipping)
        .bind(timings.shipping_to_delivery)
        .bind(analytics.total_fulfillment_minutes)
        .bind(analytics.efficiency_score)
        .bind(analytics.bottleneck_stage.as_str())
        .bind(analytics.sla_target_minutes)
        .bind(analytics.sla_violated)
        .bind(&analytics.assigned_to)
        .bind(analytics.completed)
        .bind(analytics.calculated_at)
        .execute(&mut **uow)
        .await?;
        Ok(())
    }

    async fn get_analytics(
        &self,
        uow: &mut PgUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Option<ProcessingAnalytics>> {
        let sql = format!("SELECT {ANALYTICS_COLUMNS} FROM processing_analytics WHERE order_id = $1");
        sqlx::query_as::<_, AnalyticsRow>(&sql)
            .bind(order_id)
            .fetch_optional(&mut **uow)
            .await?
            .map(ProcessingAnalytics::try_from)
            .transpose()
    }

    async fn list_analytics(
        &self,
        uow: &mut PgUnitOfWork,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<ProcessingAnalytics>> {
        let sql = format!(
            "SELECT {ANALYTICS_COLUMNS} FROM processing_analytics \
             WHERE calculated_at >= $1 ORDER BY calculated_at, order_id"
        );
        let rows = sqlx::query_as::<_, AnalyticsRow>(&sql)
            .bind(since)
            .fetch_all(&mut **uow)
            .await?;
        convert_all(rows)
    }

    async fn active_automation_rules(
        &self,
        uow: &mut PgUnitOfWork,
    ) -> StorageResult<Vec<AutomationRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(
            "SELECT id, name, active, priority, condition, action, created_at \
             FROM order_automation_rules WHERE active ORDER BY priority, created_at",
        )
        .fetch_all(&mut **uow)
        .await?;
        convert_all(rows)
    }

    async fn insert_automation_rule(
        &self,
        uow: &mut PgUnitOfWork,
        rule: &AutomationRule,
    ) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO order_automation_rules \
             (id, name, active, priority, condition, action, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(rule.active)
        .bind(rule.priority)
        .bind(serde_json::to_value(&rule.condition)?)
        .bind(serde_json::to_value(&rule.action)?)
        .bind(rule.created_at)
        .execute(&mut **uow)
        .await?;
        Ok(())
    }

    async fn insert_party_member(
        &self,
        uow: &mut PgUnitOfWork,
        member: &PartyMember,
    ) -> StorageResult<()> {
        // DO NOTHING keeps the transaction usable when a duplicate is skipped
        let result = sqlx::query(
            "INSERT INTO wedding_party_members (id, order_id, name, email, role, invited_at) \
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT DO NOTHING",
        )
        .bind(member.id)
        .bind(member.order_id)
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.role)
        .bind(member.invited_at)
        .execute(&mut **uow)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::duplicate("party member", member.email.clone()));
        }
        Ok(())
    }

    async fn party_members(
        &self,
        uow: &mut PgUnitOfWork,
        order_id: Uuid,
    ) -> StorageResult<Vec<PartyMember>> {
        let rows = sqlx::query_as::<_, PartyMemberRow>(
            "SELECT id, order_id, name, email, role, invited_at FROM wedding_party_members \
             WHERE order_id = $1 ORDER BY invited_at, id",
        )
        .bind(order_id)
        .fetch_all(&mut **uow)
        .await?;
        Ok(rows.into_iter().map(PartyMember::from).collect())
    }

    async fn find_processed_event(
        &self,
        uow: &mut PgUnitOfWork,
        idempotency_key: &str,
    ) -> StorageResult<Option<ProcessedEvent>> {
        let row = sqlx::query_as::<_, ProcessedEventRow>(
            "SELECT idempotency_key, action, order_id, response, created_at \
             FROM processed_events WHERE idempotency_key = $1",
        )
        .bind(idempotency_key)
        .fetch_optional(&mut **uow)
        .await?;
        Ok(row.map(ProcessedEvent::from))
    }

    async fn record_processed_event(
        &self,
        uow: &mut PgUnitOfWork,
        event: &ProcessedEvent,
    ) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO processed_events (idempotency_key, action, order_id, response, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&event.idempotency_key)
        .bind(&event.action)
        .bind(event.order_id)
        .bind(&event.response)
        .bind(event.created_at)
        .execute(&mut **uow)
        .await
        .map_err(|e| unique_violation(e, "processed event", event.idempotency_key.clone()))?;
        Ok(())
    }

    async fn schedule_task(
        &self,
        uow: &mut PgUnitOfWork,
        queue_name: &str,
        payload: &serde_json::Value,
        delay_seconds: u64,
    ) -> StorageResult<i64> {
        let delay = i32::try_from(delay_seconds).unwrap_or(i32::MAX);
        let msg_id: i64 = sqlx::query_scalar("SELECT pgmq.send($1, $2, $3)")
            .bind(queue_name)
            .bind(payload)
            .bind(delay)
            .fetch_one(&mut **uow)
            .await?;
        debug!(queue = queue_name, msg_id, delay, "Scheduled task");
        Ok(msg_id)
    }
}

#[async_trait]
impl TaskQueue for PgStore {
    async fn ensure_queue(&self, queue_name: &str) -> QueueResult<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::queue_operation(queue_name, "create", e))?;
        Ok(())
    }

    async fn read_messages(
        &self,
        queue_name: &str,
        visibility_timeout_seconds: i32,
        limit: i32,
    ) -> QueueResult<Vec<QueuedMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.read($1, $2, $3)",
        )
        .bind(queue_name)
        .bind(visibility_timeout_seconds)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::queue_operation(queue_name, "read", e))?;
        Ok(rows.into_iter().map(QueuedMessage::from).collect())
    }

    async fn delete_message(&self, queue_name: &str, msg_id: i64) -> QueueResult<bool> {
        sqlx::query_scalar("SELECT pgmq.delete($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::queue_operation(queue_name, "delete", e))
    }

    async fn archive_message(&self, queue_name: &str, msg_id: i64) -> QueueResult<bool> {
        sqlx::query_scalar("SELECT pgmq.archive($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::queue_operation(queue_name, "archive", e))
    }

    async fn queue_length(&self, queue_name: &str) -> QueueResult<i64> {
        sqlx::query_scalar("SELECT queue_length FROM pgmq.metrics($1)")
            .bind(queue_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::queue_operation(queue_name, "metrics", e))
    }
}
