//! Unauthenticated static file service for the admin UI's assets and
//! for uploaded injection files (kernel command lines must be able to
//! fetch the latter without credentials).

use axum::Router;
use tower_http::services::ServeDir;

use crate::state::AppState;
use std::sync::Arc;

/// Build the `/static/*` and `/injections/*` sub-routers.
pub fn router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .nest_service("/static", ServeDir::new(&state.paths.static_dir))
        .nest_service("/injections", ServeDir::new(&state.paths.injection_root))
}
