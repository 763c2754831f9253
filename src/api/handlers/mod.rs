mod admin;
mod assets;

pub use admin::{admin_flush, admin_rebuild, health};
pub use assets::{
    create_asset, delete_asset, get_asset, query_assets, search_assets, update_asset,
};

use crate::api::response::ApiError;

/// Run a blocking catalog call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, crate::storage::CatalogError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("Catalog task failed: {e}")))?
        .map_err(ApiError::from)
}
