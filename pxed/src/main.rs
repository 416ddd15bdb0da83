#![forbid(unused_must_use)]
#![deny(unsafe_code)]

//! Network boot controller entrypoint: CLI parsing, structured logging,
//! the startup scan/refresh/materialize sequence, then bind-and-serve.

use anyhow::{Context, Result};
use clap::Parser;

use pxed::cli::Opts;
use pxed::routes;
use pxed::state::{AppState, Paths};

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let opts = Opts::parse();
    let paths = Paths::from_opts(&opts);
    let state = AppState::bootstrap(paths).await.context("startup sequence failed")?;

    let app = routes::build(state);
    let listener = tokio::net::TcpListener::bind(&opts.bind)
        .await
        .with_context(|| format!("binding {}", opts.bind))?;
    tracing::info!(addr = %opts.bind, "listening");
    axum::serve(listener, app).await.context("server loop exited")?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
