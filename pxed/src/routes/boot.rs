//! `GET /boot.ipxe`: the only unauthenticated route that does real work.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use pxed_lib::bootscript::{self, MenuRequest, TypeFilter};

use crate::state::AppState;

/// Query parameters accepted by `GET /boot.ipxe`.
#[derive(Debug, Deserialize, Default)]
pub struct BootQuery {
    /// A client MAC address, switching this request to auto-boot mode.
    pub mac: Option<String>,
    /// Tree-relative subdirectory to browse, interactive mode only.
    #[serde(default)]
    pub path: String,
    /// Asset-root filter: `root`, `iso`, or `vhd`.
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
}

/// Serve either a per-client auto-boot script or the interactive menu.
pub async fn boot(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BootQuery>,
) -> Response {
    let guarded = state.guarded.read().await;
    let server_ip = guarded.config.server_ip.clone();
    let boot_timeout = guarded.config.boot_timeout;
    let menu_title = guarded.config.menu_title.clone();
    let clients = guarded.config.clients.clone();
    drop(guarded);

    let script = if let Some(mac) = query.mac.as_deref() {
        match bootscript::find_client(&clients, mac) {
            Some(client) => bootscript::generate_client_boot_script(client, &server_ip),
            None => {
                tracing::warn!(%mac, "no client matched MAC; falling back to menu");
                render_menu(&state, &query, &server_ip, boot_timeout, &menu_title)
            }
        }
    } else {
        render_menu(&state, &query, &server_ip, boot_timeout, &menu_title)
    };

    ([(header::CONTENT_TYPE, "text/plain")], script).into_response()
}

fn render_menu(
    state: &AppState,
    query: &BootQuery,
    server_ip: &str,
    boot_timeout: u32,
    menu_title: &str,
) -> String {
    let type_filter = query
        .asset_type
        .as_deref()
        .map(TypeFilter::parse)
        .unwrap_or(TypeFilter::Root);
    let req = MenuRequest {
        iso_root: &state.paths.iso_root,
        vhd_root: &state.paths.vhd_root,
        path: &query.path,
        type_filter,
        server_ip,
        boot_timeout,
        menu_title,
    };
    bootscript::generate_menu(&req)
}
