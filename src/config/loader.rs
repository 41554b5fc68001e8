//! Configuration Loader
//!
//! Environment-aware configuration loading: YAML file discovery, environment
//! detection, override merging and `${VAR}` expansion.

use super::error::{ConfigResult, ConfigurationError};
use super::OrderOpsConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "order-ops.yaml";

const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: OrderOpsConfig,
    environment: String,
    config_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection.
    ///
    /// Falls back to defaults when no configuration file exists.
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        let config_dir = Self::default_config_directory();

        match Self::find_config_file(&config_dir) {
            Ok(_) => Self::load_from_directory_with_env(&config_dir, &environment),
            Err(ConfigurationError::ConfigFileNotFound { searched_paths }) => {
                warn!(
                    searched = ?searched_paths,
                    "No configuration file found, using defaults"
                );
                Self::from_config(OrderOpsConfig::default(), &environment)
            }
            Err(e) => Err(e),
        }
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch process environment variables.
    pub fn load_from_directory_with_env(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config_file = Self::find_config_file(config_directory)?;
        let mut config = Self::load_and_merge_config(&config_file, environment)?;
        Self::expand_environment_variables(&mut config);
        config.environment = environment.to_string();
        config.validate()?;

        info!(
            environment = environment,
            config_file = %config_file.display(),
            database_configured = config.database.url.is_some(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_file: Some(config_file),
        }))
    }

    /// Wrap an already-built configuration (tests, embedding).
    pub fn from_config(
        mut config: OrderOpsConfig,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::expand_environment_variables(&mut config);
        config.environment = environment.to_string();
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_file: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &OrderOpsConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Detect current environment from environment variables
    fn detect_environment() -> String {
        env::var("ORDER_OPS_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        env::var("ORDER_OPS_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let candidates = [
            config_directory.join(CONFIG_FILE_NAME),
            config_directory.join("order-ops.yml"),
        ];

        for path in &candidates {
            if path.is_file() {
                debug!("Found configuration file: {}", path.display());
                return Ok(path.clone());
            }
        }

        Err(ConfigurationError::config_file_not_found(candidates.to_vec()))
    }

    /// Safely read a configuration file with a size limit
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len(),
                format!("Configuration file exceeds {MAX_CONFIG_FILE_SIZE} bytes"),
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(config_file: &Path, environment: &str) -> ConfigResult<OrderOpsConfig> {
        let yaml_content = Self::read_config_file_safely(config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            if !env_overrides.is_mapping() {
                return Err(ConfigurationError::ConfigMergeError {
                    error: format!("'{environment}' section must be a mapping"),
                });
            }
            debug!("Applying environment-specific overrides for: {}", environment);
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        // An empty file parses to null; treat it as "all defaults"
        if yaml_data.is_null() {
            return Ok(OrderOpsConfig::default());
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }

    /// Expand a `${VAR}` database URL; an unset variable leaves the URL empty
    fn expand_environment_variables(config: &mut OrderOpsConfig) {
        if let Some(url) = config.database.url.take() {
            if url.starts_with("${") && url.ends_with('}') {
                let var_name = &url[2..url.len() - 1];
                match env::var(var_name) {
                    Ok(value) if !value.is_empty() => {
                        debug!("Expanding environment variable {} in database URL", var_name);
                        config.database.url = Some(value);
                    }
                    _ => {
                        warn!(
                            "Environment variable {} not set, running without a database URL",
                            var_name
                        );
                    }
                }
            } else {
                config.database.url = Some(url);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_yaml() -> &'static str {
        r#"
server:
  bind_address: "127.0.0.1:9000"

sla:
  rush_minutes: 2880
  high_priority_minutes: 4320
  standard_minutes: 7200

scoring:
  estimated_hours:
    rush: 24

auto_resolution:
  poll_interval_ms: 500

test:
  server:
    bind_address: "127.0.0.1:0"
  auto_resolution:
    enabled: false

production:
  database:
    url: "${ORDER_OPS_TEST_UNSET_DATABASE_URL}"
    max_connections: 25
"#
    }

    fn setup_test_config_dir(contents: &str) -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();
        fs::write(config_dir.join(CONFIG_FILE_NAME), contents).unwrap();
        (temp_dir, config_dir)
    }

    #[test]
    fn test_config_file_discovery() {
        let (_temp_dir, config_dir) = setup_test_config_dir(create_test_config_yaml());
        let config_file = ConfigManager::find_config_file(&config_dir).unwrap();
        assert_eq!(config_file.file_name().unwrap(), CONFIG_FILE_NAME);
    }

    #[test]
    fn test_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigManager::find_config_file(temp_dir.path());

        match result {
            Err(ConfigurationError::ConfigFileNotFound { searched_paths }) => {
                assert_eq!(searched_paths.len(), 2);
            }
            other => panic!("Expected ConfigFileNotFound error, got {other:?}"),
        }
    }

    #[test]
    fn test_base_config_loading() {
        let (_temp_dir, config_dir) = setup_test_config_dir(create_test_config_yaml());
        let manager =
            ConfigManager::load_from_directory_with_env(&config_dir, "development").unwrap();
        let config = manager.config();

        assert_eq!(manager.environment(), "development");
        assert_eq!(config.environment, "development");
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.auto_resolution.poll_interval_ms, 500);
        assert!(config.auto_resolution.enabled);
        // Unspecified values keep their defaults
        assert_eq!(config.scoring.estimated_hours.custom, 96);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_environment_specific_overrides() {
        let (_temp_dir, config_dir) = setup_test_config_dir(create_test_config_yaml());
        let manager = ConfigManager::load_from_directory_with_env(&config_dir, "test").unwrap();
        let config = manager.config();

        assert_eq!(config.server.bind_address, "127.0.0.1:0");
        assert!(!config.auto_resolution.enabled);
        // Sibling keys in overridden sections survive the merge
        assert_eq!(config.auto_resolution.poll_interval_ms, 500);
    }

    #[test]
    fn test_unset_database_variable_is_dropped() {
        let (_temp_dir, config_dir) = setup_test_config_dir(create_test_config_yaml());
        let manager =
            ConfigManager::load_from_directory_with_env(&config_dir, "production").unwrap();

        assert_eq!(manager.config().database.max_connections, 25);
        assert!(manager.config().database.url.is_none());
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        let (_temp_dir, config_dir) = setup_test_config_dir("sla: [unclosed");
        let result = ConfigManager::load_from_directory_with_env(&config_dir, "development");
        assert!(matches!(result, Err(ConfigurationError::InvalidYaml { .. })));
    }

    #[test]
    fn test_validation_runs_after_merge() {
        let (_temp_dir, config_dir) =
            setup_test_config_dir("sla:\n  rush_minutes: 9000\n  standard_minutes: 7200\n");
        let result = ConfigManager::load_from_directory_with_env(&config_dir, "development");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_scalar_environment_section_is_a_merge_error() {
        let (_temp_dir, config_dir) = setup_test_config_dir("sla:\n  rush_minutes: 2880\ntest: 5\n");
        let result = ConfigManager::load_from_directory_with_env(&config_dir, "test");
        assert!(matches!(result, Err(ConfigurationError::ConfigMergeError { .. })));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let (_temp_dir, config_dir) = setup_test_config_dir("");
        let manager =
            ConfigManager::load_from_directory_with_env(&config_dir, "development").unwrap();
        assert_eq!(manager.config().sla.standard_minutes, 7200);
    }
}
