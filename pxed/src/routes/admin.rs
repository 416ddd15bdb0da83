//! Authenticated administrative routes: configuration CRUD, the asset
//! browser feed, and injection-file upload.

use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use pxed_lib::assets::{self, DirEntry, FileEntry};
use pxed_lib::bootscript::TypeFilter;
use pxed_lib::config::{self, ConfigDocument, ConfigReadView};
use pxed_lib::license;

use crate::state::{self, AppState};

/// Serve the administrative single-page app's entry document.
pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    let index_path = state.paths.static_dir.join("index.html");
    match tokio::fs::read_to_string(&index_path).await {
        Ok(body) => Html(body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, path = %index_path.display(), "missing admin index.html");
            (StatusCode::NOT_FOUND, "admin UI not installed").into_response()
        }
    }
}

/// `GET /api/config`: the stored document enriched with the freshly
/// computed license status and machine id.
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigReadView> {
    let guarded = state.guarded.read().await;
    Json(ConfigReadView {
        document: guarded.config.clone(),
        license_status: guarded.license_status.clone(),
        hardware_id: license::current_machine_id(),
    })
}

/// `POST /api/config`: persist a new document, re-applying the
/// feature-gate policy, then re-run the {scan, refresh, materialize}
/// sequence so `GET /boot.ipxe` observes the change immediately.
pub async fn post_config(
    State(state): State<Arc<AppState>>,
    Json(doc): Json<ConfigDocument>,
) -> Response {
    let license_status = {
        let guarded = state.guarded.read().await;
        guarded.license_status.clone()
    };

    let saved = match config::save(&state.paths.config_file, doc, &license_status) {
        Ok(saved) => saved,
        Err(err) => {
            tracing::error!(error = %err, "failed to save configuration");
            return (
                StatusCode::OK,
                Json(serde_json::json!({"status": "error", "message": err.to_string()})),
            )
                .into_response();
        }
    };

    {
        let mut guarded = state.guarded.write().await;
        guarded.config = saved.clone();
    }

    state::refresh_license(&state).await;
    if let Err(err) = state::refresh_and_materialize(&state).await {
        tracing::error!(error = %err, "failed to refresh asset caches after config save");
    }

    let guarded = state.guarded.read().await;
    Json(ConfigReadView {
        document: guarded.config.clone(),
        license_status: guarded.license_status.clone(),
        hardware_id: license::current_machine_id(),
    })
    .into_response()
}

/// Query parameters shared by `GET /boot.ipxe` and `GET /api/assets`.
#[derive(Debug, Deserialize, Default)]
pub struct AssetsQuery {
    /// Tree-relative subdirectory to browse.
    #[serde(default)]
    pub path: String,
    /// Asset-root filter: `root`, `iso`, or `vhd`.
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
}

/// The JSON listing consumed by the admin UI's asset browser.
#[derive(Debug, Serialize)]
pub struct AssetsResponse {
    isos: Vec<FileEntry>,
    iso_dirs: Vec<DirEntry>,
    vhds: Vec<FileEntry>,
    vhd_dirs: Vec<DirEntry>,
    injections: Vec<FileEntry>,
    current_path: String,
}

/// `GET /api/assets`: a browsing feed for the admin UI, filtered by
/// `type` exactly as the boot menu is.
pub async fn get_assets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AssetsQuery>,
) -> Json<AssetsResponse> {
    let type_filter = query
        .asset_type
        .as_deref()
        .map(TypeFilter::parse)
        .unwrap_or(TypeFilter::Root);

    let (isos, iso_dirs) = if matches!(type_filter, TypeFilter::Root | TypeFilter::Iso) {
        assets::list(&state.paths.iso_root, &query.path)
    } else {
        (Vec::new(), Vec::new())
    };
    let (vhds, vhd_dirs) = if matches!(type_filter, TypeFilter::Root | TypeFilter::Vhd) {
        assets::list(&state.paths.vhd_root, &query.path)
    } else {
        (Vec::new(), Vec::new())
    };
    let (injections, _) = assets::list(&state.paths.injection_root, "");

    Json(AssetsResponse {
        isos,
        iso_dirs,
        vhds,
        vhd_dirs,
        injections,
        current_path: query.path,
    })
}

/// `POST /api/upload_injection`: store an uploaded file verbatim under
/// the injection directory, keyed by its original filename.
pub async fn upload_injection(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => {
            return upload_error("no file field in upload");
        }
        Err(err) => return upload_error(&err.to_string()),
    };

    let Some(file_name) = field.file_name().map(str::to_string) else {
        return upload_error("upload is missing a filename");
    };
    // Reject any path component so an uploaded filename can't escape the
    // injection directory.
    if file_name.contains('/') || file_name.contains('\\') || file_name == ".." {
        return upload_error("invalid filename");
    }

    let bytes = match field.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => return upload_error(&err.to_string()),
    };

    let dest = state.paths.injection_root.join(&file_name);
    match tokio::fs::write(&dest, &bytes).await {
        Ok(()) => Json(serde_json::json!({"status": "success", "filename": file_name})).into_response(),
        Err(err) => {
            tracing::error!(error = %err, path = %dest.display(), "failed to write uploaded injection file");
            upload_error(&err.to_string())
        }
    }
}

fn upload_error(message: &str) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "error", "message": message})),
    )
        .into_response()
}
