use std::time::Duration;

use thiserror::Error;

use crate::storage::{CatalogOptions, PageLimits};

/// Upper bound on `IO_RETRIES`; retries hold catalog locks while sleeping.
pub const MAX_IO_RETRIES: u32 = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub catalog: CatalogConfig,
    pub maintenance: MaintenanceConfig,
    /// Enables the manual maintenance routes. Must never be true in production.
    pub test_mode: bool,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Maximum number of records held in the LRU cache
    pub cache_capacity: usize,
    /// Page size used when a query asks for `limit <= 0`
    pub default_page_size: usize,
    /// Upper bound on any query's page size
    pub max_page_size: usize,
    /// Extra attempts for transient metadata I/O failures
    pub io_retries: u32,
}

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// How often every index is rebuilt from the metadata files
    pub rebuild_interval: Duration,
    /// How often a dirty index snapshot is written to disk
    pub snapshot_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            default_page_size: 50,
            max_page_size: 1000,
            io_retries: 2,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            rebuild_interval: Duration::from_secs(30 * 60),
            snapshot_interval: Duration::from_secs(5 * 60),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let node_defaults = NodeConfig::default();
        let catalog_defaults = CatalogConfig::default();
        let maintenance_defaults = MaintenanceConfig::default();

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| node_defaults.bind_address.clone());
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| node_defaults.data_dir.clone());

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let rebuild_secs = env_parse(
            "REBUILD_INTERVAL_SECS",
            maintenance_defaults.rebuild_interval.as_secs(),
        );
        let snapshot_secs = env_parse(
            "SNAPSHOT_INTERVAL_SECS",
            maintenance_defaults.snapshot_interval.as_secs(),
        );

        let config = Config {
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            catalog: CatalogConfig {
                cache_capacity: env_parse("CACHE_CAPACITY", catalog_defaults.cache_capacity),
                default_page_size: env_parse(
                    "DEFAULT_PAGE_SIZE",
                    catalog_defaults.default_page_size,
                ),
                max_page_size: env_parse("MAX_PAGE_SIZE", catalog_defaults.max_page_size),
                io_retries: env_parse("IO_RETRIES", catalog_defaults.io_retries),
            },
            maintenance: MaintenanceConfig {
                rebuild_interval: Duration::from_secs(rebuild_secs),
                snapshot_interval: Duration::from_secs(snapshot_secs),
            },
            test_mode,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node.data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "DATA_DIR cannot be empty".to_string(),
            ));
        }

        if self.catalog.default_page_size == 0 || self.catalog.max_page_size == 0 {
            return Err(ConfigError::ValidationError(
                "DEFAULT_PAGE_SIZE and MAX_PAGE_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.catalog.default_page_size > self.catalog.max_page_size {
            return Err(ConfigError::ValidationError(format!(
                "DEFAULT_PAGE_SIZE ({}) cannot exceed MAX_PAGE_SIZE ({})",
                self.catalog.default_page_size, self.catalog.max_page_size
            )));
        }

        if self.maintenance.rebuild_interval.is_zero()
            || self.maintenance.snapshot_interval.is_zero()
        {
            return Err(ConfigError::ValidationError(
                "REBUILD_INTERVAL_SECS and SNAPSHOT_INTERVAL_SECS must be greater than 0"
                    .to_string(),
            ));
        }

        if self.catalog.io_retries > MAX_IO_RETRIES {
            return Err(ConfigError::ValidationError(format!(
                "IO_RETRIES ({}) cannot exceed {}",
                self.catalog.io_retries, MAX_IO_RETRIES
            )));
        }

        if self.catalog.cache_capacity == 0 {
            tracing::warn!("CACHE_CAPACITY is 0; every read will go to disk");
        }

        if self.maintenance.snapshot_interval > self.maintenance.rebuild_interval {
            tracing::warn!(
                "Snapshot interval {:?} is longer than rebuild interval {:?}; \
                 rebuild results may not be persisted before the next rebuild.",
                self.maintenance.snapshot_interval,
                self.maintenance.rebuild_interval
            );
        }

        Ok(())
    }

    /// Catalog settings derived from this configuration.
    pub fn catalog_options(&self) -> CatalogOptions {
        CatalogOptions {
            data_dir: self.node.data_dir.clone().into(),
            cache_capacity: self.catalog.cache_capacity,
            io_retries: self.catalog.io_retries,
            page_limits: PageLimits {
                default_size: self.catalog.default_page_size,
                max_size: self.catalog.max_page_size,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            node: NodeConfig::default(),
            catalog: CatalogConfig::default(),
            maintenance: MaintenanceConfig::default(),
            test_mode: false,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_rejects_default_page_above_max() {
        let mut config = config();
        config.catalog.default_page_size = 2000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config = config();
        config.maintenance.snapshot_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unbounded_io_retries() {
        let mut config = config();
        config.catalog.io_retries = MAX_IO_RETRIES;
        assert!(config.validate().is_ok());

        config.catalog.io_retries = 40;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("IO_RETRIES")
        ));
    }

    #[test]
    fn test_catalog_options_carry_page_limits() {
        let options = config().catalog_options();
        assert_eq!(options.page_limits.default_size, 50);
        assert_eq!(options.page_limits.max_size, 1000);
        assert_eq!(options.cache_capacity, 1000);
    }
}
