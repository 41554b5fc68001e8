//! Configuration loading against the shipped config file and custom
//! directories, and its effect on a wired system.

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use common::*;
use order_ops::config::loader::CONFIG_FILE_NAME;
use order_ops::config::{ConfigManager, ConfigurationError};
use order_ops::database::InMemoryStore;
use order_ops::events::EventPublisher;
use order_ops::models::OrderStatus;
use order_ops::orchestration::{OrderOpsSystem, SimulatedResolutionStrategy};

fn shipped_config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config")
}

#[test]
fn test_shipped_config_loads_for_every_environment() {
    for environment in ["development", "test", "production"] {
        let manager =
            ConfigManager::load_from_directory_with_env(&shipped_config_dir(), environment)
                .unwrap_or_else(|err| panic!("{environment} config failed: {err}"));
        assert_eq!(manager.environment(), environment);
        assert!(manager.config_file().is_some());
        assert_eq!(manager.config().sla.rush_minutes, 2880);
    }
}

#[test]
fn test_shipped_test_environment_disables_worker() {
    let manager = ConfigManager::load_from_directory_with_env(&shipped_config_dir(), "test").unwrap();
    let config = manager.config();
    assert!(!config.auto_resolution.enabled);
    assert_eq!(config.exceptions.auto_resolution_delay_seconds, 0);
    assert_eq!(config.server.bind_address, "127.0.0.1:0");
    // Base values survive the override
    assert_eq!(config.auto_resolution.max_attempts, 3);
}

#[test]
fn test_shipped_production_overrides_pool_and_polling() {
    let manager =
        ConfigManager::load_from_directory_with_env(&shipped_config_dir(), "production").unwrap();
    assert_eq!(manager.config().database.max_connections, 25);
    assert_eq!(manager.config().auto_resolution.poll_interval_ms, 2000);
    assert!(manager.config().auto_resolution.enabled);
}

#[test]
fn test_inconsistent_sla_override_is_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "sla:\n  rush_minutes: 2880\n  high_priority_minutes: 4320\n  standard_minutes: 7200\n\
         test:\n  sla:\n    high_priority_minutes: 100\n",
    )
    .unwrap();
    let result = ConfigManager::load_from_directory_with_env(dir.path(), "test");
    assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
}

#[test]
fn test_out_of_range_success_rate_is_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "auto_resolution:\n  success_rates:\n    payment_retry: 1.5\n",
    )
    .unwrap();
    let result = ConfigManager::load_from_directory_with_env(dir.path(), "development");
    assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
}

#[tokio::test]
async fn test_loaded_sla_targets_drive_analytics() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "sla:\n  rush_minutes: 60\n  high_priority_minutes: 120\n  standard_minutes: 240\n\
         auto_resolution:\n  enabled: false\n",
    )
    .unwrap();
    let manager = ConfigManager::load_from_directory_with_env(dir.path(), "test").unwrap();

    let system = OrderOpsSystem::with_components(
        manager.config().clone(),
        InMemoryStore::new(),
        Arc::new(EventPublisher::default()),
        Arc::new(SimulatedResolutionStrategy::with_seed(uniform_rates(1.0), 7)),
    );
    let order = OrderBuilder::new().create(&system).await;
    confirm_payment(&system, order.id).await;
    advance(&system, order.id, &[OrderStatus::Processing]).await;

    let analytics = system
        .coordinator()
        .analytics()
        .get_or_calculate(order.id)
        .await
        .unwrap();
    assert_eq!(analytics.sla_target_minutes, 240);
}
