//! Network boot controller: HTTP surface wiring over `pxed-lib`'s
//! scanning, naming, licensing and boot-script primitives.
//!
//! Split into a library target (this crate) and a thin `main.rs` binary
//! so integration tests can drive the assembled [`axum::Router`]
//! directly via `tower::ServiceExt::oneshot`.

pub mod auth;
pub mod cli;
pub mod routes;
pub mod state;
