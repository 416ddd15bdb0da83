//! HTTP Basic authentication for the admin routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

fn www_authenticate_response(status: StatusCode) -> Response {
    let mut resp = status.into_response();
    resp.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"pxed\""),
    );
    resp
}

/// Constant-time byte comparison: always scans both slices fully so the
/// number of matching leading bytes cannot be inferred from timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn extract_basic_password(header_value: &str) -> Option<String> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (_user, password) = text.split_once(':')?;
    Some(password.to_string())
}

/// Axum middleware: reject with `401` + `WWW-Authenticate: Basic` unless
/// the request carries an `Authorization: Basic` header whose password
/// matches the current `admin_password`.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let supplied = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_basic_password);

    let expected = {
        let guarded = state.guarded.read().await;
        guarded.config.admin_password.clone()
    };

    match supplied {
        Some(password) if constant_time_eq(password.as_bytes(), expected.as_bytes()) => {
            next.run(request).await
        }
        _ => {
            tracing::warn!("rejected unauthenticated admin request");
            www_authenticate_response(StatusCode::UNAUTHORIZED)
        }
    }
}
