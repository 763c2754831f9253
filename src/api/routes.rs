use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Assets
        .route("/assets", post(handlers::create_asset))
        .route("/assets/query", post(handlers::query_assets))
        .route("/assets/search", get(handlers::search_assets))
        .route(
            "/assets/:id",
            get(handlers::get_asset)
                .put(handlers::update_asset)
                .delete(handlers::delete_asset),
        )
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled, manual maintenance routes are available");
        router = router
            .route("/admin/rebuild", post(handlers::admin_rebuild))
            .route("/admin/flush", post(handlers::admin_flush));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
