//! Route wiring: assembles the public and admin-authenticated halves of
//! the HTTP surface into one [`axum::Router`].

pub mod admin;
pub mod boot;
pub mod static_files;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth;
use crate::state::AppState;

/// Build the full application router.
pub fn build(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/", get(admin::index))
        .route("/api/config", get(admin::get_config).post(admin::post_config))
        .route("/api/assets", get(admin::get_assets))
        .route("/api/upload_injection", post(admin::upload_injection))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));

    let public_routes = Router::new()
        .route("/boot.ipxe", get(boot::boot))
        .merge(static_files::router(&state));

    Router::new()
        .merge(admin_routes)
        .merge(public_routes)
        .with_state(state)
}
