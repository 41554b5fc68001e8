//! # Order Ops Configuration System
//!
//! YAML-based configuration with environment-specific override sections.
//!
//! ## Architecture
//!
//! - **Single file**: `config/order-ops.yaml`, with optional `development`,
//!   `test` and `production` sections merged over the base values
//! - **Defaults everywhere**: every section has a `Default` so partial files load
//! - **Explicit validation**: inconsistent SLA targets or probabilities are
//!   rejected at load time
//!
//! ## Usage
//!
//! ```rust,no_run
//! use order_ops::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let bind = &manager.config().server.bind_address;
//! let sla = manager.config().sla.standard_minutes;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::{exceptions, queues, scoring, sla};
use crate::models::{ExceptionType, OrderType};

/// Root configuration structure mirroring order-ops.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OrderOpsConfig {
    /// Detected environment name; set by the loader
    pub environment: String,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub scoring: ScoringConfig,
    pub sla: SlaConfig,
    pub exceptions: ExceptionConfig,
    pub auto_resolution: AutoResolutionConfig,
}

impl OrderOpsConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.database.validate()?;
        self.sla.validate()?;
        self.scoring.estimated_hours.validate()?;
        self.auto_resolution.validate()?;
        Ok(())
    }
}

/// Database connection configuration.
///
/// When `url` is unset the service runs on the in-memory store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_seconds: 5,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                self.max_connections,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub estimated_hours: EstimatedHoursTable,
}

/// The single canonical estimated-completion table, in hours
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EstimatedHoursTable {
    pub standard: i64,
    pub rush: i64,
    pub wedding_party: i64,
    pub bundle: i64,
    pub custom: i64,
}

impl Default for EstimatedHoursTable {
    fn default() -> Self {
        Self {
            standard: scoring::STANDARD_HOURS,
            rush: scoring::RUSH_HOURS,
            wedding_party: scoring::WEDDING_PARTY_HOURS,
            bundle: scoring::BUNDLE_HOURS,
            custom: scoring::CUSTOM_HOURS,
        }
    }
}

impl EstimatedHoursTable {
    pub fn hours_for(&self, order_type: OrderType) -> i64 {
        match order_type {
            OrderType::Standard => self.standard,
            OrderType::Rush => self.rush,
            OrderType::WeddingParty => self.wedding_party,
            OrderType::Bundle => self.bundle,
            OrderType::Custom => self.custom,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        for order_type in OrderType::ALL {
            let hours = self.hours_for(*order_type);
            if hours <= 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("scoring.estimated_hours.{order_type}"),
                    hours,
                    "must be positive",
                ));
            }
        }
        Ok(())
    }
}

/// SLA targets in minutes
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SlaConfig {
    pub rush_minutes: i64,
    pub high_priority_minutes: i64,
    pub standard_minutes: i64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            rush_minutes: sla::RUSH_TARGET_MINUTES,
            high_priority_minutes: sla::HIGH_PRIORITY_TARGET_MINUTES,
            standard_minutes: sla::STANDARD_TARGET_MINUTES,
        }
    }
}

impl SlaConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.rush_minutes <= 0 {
            return Err(ConfigurationError::invalid_value(
                "sla.rush_minutes",
                self.rush_minutes,
                "must be positive",
            ));
        }
        if self.rush_minutes > self.high_priority_minutes
            || self.high_priority_minutes > self.standard_minutes
        {
            return Err(ConfigurationError::invalid_value(
                "sla",
                format!(
                    "{}/{}/{}",
                    self.rush_minutes, self.high_priority_minutes, self.standard_minutes
                ),
                "targets must satisfy rush <= high_priority <= standard",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExceptionConfig {
    /// Visibility delay for the first auto-resolution attempt
    pub auto_resolution_delay_seconds: u64,
}

impl Default for ExceptionConfig {
    fn default() -> Self {
        Self {
            auto_resolution_delay_seconds: exceptions::AUTO_RESOLUTION_DELAY_SECONDS,
        }
    }
}

/// Background worker draining the auto-resolution queue
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutoResolutionConfig {
    pub enabled: bool,
    pub queue_name: String,
    pub poll_interval_ms: u64,
    pub visibility_timeout_seconds: i32,
    pub batch_size: i32,
    /// Deliveries after which a message is archived instead of retried
    pub max_attempts: i32,
    pub success_rates: SuccessRates,
}

impl Default for AutoResolutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_name: queues::AUTO_RESOLUTION.to_string(),
            poll_interval_ms: 1000,
            visibility_timeout_seconds: 30,
            batch_size: 10,
            max_attempts: 3,
            success_rates: SuccessRates::default(),
        }
    }
}

impl AutoResolutionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.queue_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "auto_resolution.queue_name",
                &self.queue_name,
                "must not be empty",
            ));
        }
        if self.batch_size <= 0 || self.max_attempts <= 0 {
            return Err(ConfigurationError::invalid_value(
                "auto_resolution",
                format!("batch_size={} max_attempts={}", self.batch_size, self.max_attempts),
                "batch_size and max_attempts must be positive",
            ));
        }
        self.success_rates.validate()
    }
}

/// Success probabilities used by the simulated resolution strategy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SuccessRates {
    pub payment_retry: f64,
    pub address_validation: f64,
    pub inventory_check: f64,
}

impl Default for SuccessRates {
    fn default() -> Self {
        Self {
            payment_retry: exceptions::PAYMENT_RETRY_SUCCESS_RATE,
            address_validation: exceptions::ADDRESS_VALIDATION_SUCCESS_RATE,
            inventory_check: exceptions::INVENTORY_CHECK_SUCCESS_RATE,
        }
    }
}

impl SuccessRates {
    /// Probability for an auto-resolvable type; zero for everything else.
    pub fn for_type(&self, exception_type: ExceptionType) -> f64 {
        match exception_type {
            ExceptionType::PaymentRetry => self.payment_retry,
            ExceptionType::AddressValidation => self.address_validation,
            ExceptionType::InventoryCheck => self.inventory_check,
            _ => 0.0,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("payment_retry", self.payment_retry),
            ("address_validation", self.address_validation),
            ("inventory_check", self.inventory_check),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigurationError::invalid_value(
                    format!("auto_resolution.success_rates.{field}"),
                    value,
                    "must be between 0.0 and 1.0",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrderOpsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sla.rush_minutes, 2880);
        assert_eq!(config.sla.high_priority_minutes, 4320);
        assert_eq!(config.sla.standard_minutes, 7200);
    }

    #[test]
    fn test_single_estimated_hours_table() {
        let table = EstimatedHoursTable::default();
        assert_eq!(table.hours_for(OrderType::Rush), 24);
        assert_eq!(table.hours_for(OrderType::Standard), 48);
        assert_eq!(table.hours_for(OrderType::WeddingParty), 72);
        assert_eq!(table.hours_for(OrderType::Bundle), 48);
        assert_eq!(table.hours_for(OrderType::Custom), 96);
    }

    #[test]
    fn test_sla_ordering_is_enforced() {
        let mut config = OrderOpsConfig::default();
        config.sla.rush_minutes = 5000;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_success_rates_must_be_probabilities() {
        let mut config = OrderOpsConfig::default();
        config.auto_resolution.success_rates.payment_retry = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_success_rate_lookup() {
        let rates = SuccessRates::default();
        assert_eq!(rates.for_type(ExceptionType::PaymentRetry), 0.7);
        assert_eq!(rates.for_type(ExceptionType::AddressValidation), 0.8);
        assert_eq!(rates.for_type(ExceptionType::InventoryCheck), 0.9);
        assert_eq!(rates.for_type(ExceptionType::StockOut), 0.0);
    }
}
