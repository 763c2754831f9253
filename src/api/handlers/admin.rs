use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use super::blocking;
use crate::api::response::{ApiError, JSend};
use crate::storage::{CatalogStats, RebuildStats};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub catalog: CatalogStats,
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct FlushResponse {
    pub written: bool,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        catalog: state.catalog.stats(),
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn admin_rebuild(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<RebuildStats>>, ApiError> {
    let catalog = Arc::clone(&state.catalog);
    let stats = blocking(move || catalog.rebuild_indexes()).await?;

    tracing::warn!(records = stats.records, "Manual index rebuild completed");
    Ok(JSend::success(stats))
}

pub async fn admin_flush(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<FlushResponse>>, ApiError> {
    let catalog = Arc::clone(&state.catalog);
    let written = blocking(move || catalog.flush_snapshot()).await?;
    Ok(JSend::success(FlushResponse { written }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::NewAsset;
    use crate::testutil::test_state;

    #[tokio::test]
    async fn test_health_reports_catalog_stats() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        state
            .catalog
            .create(NewAsset {
                user_id: 1,
                filename: "a.jpg".to_string(),
                named: "first".to_string(),
                ..Default::default()
            })
            .unwrap();

        let health = health(State(state)).await.0.data;
        assert_eq!(health.status, "ok");
        assert_eq!(health.catalog.records, 1);
        assert_eq!(health.catalog.cache_capacity, 16);
    }

    #[tokio::test]
    async fn test_rebuild_then_flush() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        for i in 0..3 {
            state
                .catalog
                .create(NewAsset {
                    user_id: 1,
                    filename: format!("{i}.jpg"),
                    named: format!("photo {i}"),
                    ..Default::default()
                })
                .unwrap();
        }

        let stats = admin_rebuild(State(state.clone())).await.unwrap().0.data;
        assert_eq!(stats.records, 3);

        let flushed = admin_flush(State(state.clone())).await.unwrap().0.data;
        assert!(flushed.written);
        let flushed = admin_flush(State(state)).await.unwrap().0.data;
        assert!(!flushed.written);
    }
}
