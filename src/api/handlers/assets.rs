use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::blocking;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::storage::models::{AssetRecord, AssetUpdate, NewAsset};
use crate::storage::{AssetQuery, QueryResult};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_asset(
    State(state): State<Arc<AppState>>,
    AppJson(asset): AppJson<NewAsset>,
) -> Result<Json<JSend<AssetRecord>>, ApiError> {
    if asset.filename.trim().is_empty() {
        return Err(ApiError::bad_request("filename must not be empty"));
    }

    let catalog = Arc::clone(&state.catalog);
    let record = blocking(move || catalog.create(asset)).await?;

    tracing::debug!(asset_id = %record.id, "Created asset");
    Ok(JSend::success(record))
}

pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<Arc<AssetRecord>>>, ApiError> {
    let catalog = Arc::clone(&state.catalog);
    let record = blocking(move || catalog.get(&id)).await?;
    Ok(JSend::success(record))
}

pub async fn update_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(update): AppJson<AssetUpdate>,
) -> Result<Json<JSend<AssetRecord>>, ApiError> {
    if update.is_empty() {
        return Err(ApiError::bad_request(
            "at least one field (named, albums, persons, isFavorite, isHidden) must be provided",
        ));
    }

    let catalog = Arc::clone(&state.catalog);
    let record = blocking(move || catalog.update(&id, &update)).await?;

    tracing::debug!(asset_id = %record.id, "Updated asset");
    Ok(JSend::success(record))
}

pub async fn delete_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    let catalog = Arc::clone(&state.catalog);
    let record = blocking(move || catalog.delete(&id)).await?;

    tracing::debug!(asset_id = %record.id, "Deleted asset");
    Ok(JSend::success(()))
}

pub async fn query_assets(
    State(state): State<Arc<AppState>>,
    AppJson(query): AppJson<AssetQuery>,
) -> Result<Json<JSend<QueryResult>>, ApiError> {
    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        if start > end {
            return Err(ApiError::bad_request("startDate must not be after endDate"));
        }
    }

    let catalog = Arc::clone(&state.catalog);
    let result = blocking(move || catalog.query(&query)).await?;
    Ok(JSend::success(result))
}

pub async fn search_assets(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<SearchParams>,
) -> Result<Json<JSend<Vec<Arc<AssetRecord>>>>, ApiError> {
    if params.q.trim().is_empty() {
        return Err(ApiError::bad_request("q must not be empty"));
    }

    let catalog = Arc::clone(&state.catalog);
    let assets = blocking(move || catalog.search(&params.q)).await?;
    Ok(JSend::success(assets))
}
