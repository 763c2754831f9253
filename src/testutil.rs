//! Shared test helpers for asset-catalog unit tests.

use std::sync::Arc;

use crate::config::{CatalogConfig, Config, MaintenanceConfig, NodeConfig};
use crate::storage::Catalog;
use crate::AppState;

/// Create a test AppState backed by a temporary data directory.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");

    let config = Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        catalog: CatalogConfig {
            cache_capacity: 16,
            ..Default::default()
        },
        maintenance: MaintenanceConfig::default(),
        test_mode: true,
    };

    let catalog = Catalog::open(config.catalog_options()).expect("Failed to open test catalog");

    Arc::new(AppState {
        config,
        catalog: Arc::new(catalog),
    })
}
