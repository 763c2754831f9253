//! asset-catalog - An embedded, file-backed, indexed metadata store for media assets
//!
//! This crate provides asset metadata storage and querying with:
//! - One JSON file per asset record as the durable source of truth
//! - In-memory owner, day, text, favorite and hidden indexes with a JSON snapshot
//! - An O(1) LRU record cache in front of the metadata files
//! - A query planner that seeds candidates from a single index, then filters,
//!   sorts and paginates
//! - Cancellable background index rebuilds and snapshot flushes
//! - REST API for create, update, delete, get and query

pub mod api;
pub mod config;
pub mod maintenance;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use storage::Catalog;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub catalog: Arc<Catalog>,
}
