use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::*;
use crate::ws::ws_handler;

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        // Read accessors
        .route("/tournaments", get(list_tournaments))
        .route("/tournaments/search", post(search_tournaments))
        .route("/tournaments/:address", get(get_tournament))
        .route("/tournaments/:address/groups", get(tournament_groups))
        .route("/groups", get(list_groups))
        .route("/groups/search", post(search_groups))
        .route("/groups/:address", get(get_group))
        .route("/users/:address/groups", get(user_groups))
        // Admin
        .route("/admin/reconcile", post(reconcile_all))
        .route("/admin/reconcile/:group", post(reconcile_group))
        .route("/admin/verify/:user/:group", post(verify_membership))
        // Event stream
        .route("/ws", get(ws_handler))
        .route("/ws/info", get(ws_info))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
