//! Shared application state and the single writer-lock discipline
//! guarding the configuration document, generated target file, and
//! in-memory asset caches.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::RwLock;

use pxed_lib::assets::{self, ScannedAsset};
use pxed_lib::config::ConfigDocument;
use pxed_lib::iscsi;
use pxed_lib::license::{self, LicenseStatus};
use pxed_lib::overlay::QemuImgTool;

use crate::cli::Opts;

/// The five storage subdirectories plus the derived file paths, all
/// rooted under the CLI's runtime and configuration directories.
#[derive(Debug, Clone)]
pub struct Paths {
    /// ISO asset root.
    pub iso_root: PathBuf,
    /// Virtual-disk asset root.
    pub vhd_root: PathBuf,
    /// Uploaded kickstart/cloud-init injection files.
    pub injection_root: PathBuf,
    /// Generated per-client overlay qcow2 files.
    pub overlay_root: PathBuf,
    /// Directory the materialized target file is written under.
    pub generated_dir: PathBuf,
    /// The materialized iSCSI target-daemon configuration file.
    pub targets_file: PathBuf,
    /// The administrator's JSON configuration document.
    pub config_file: PathBuf,
    /// The persisted trial record.
    pub trial_store: PathBuf,
    /// Static admin-UI asset directory.
    pub static_dir: PathBuf,
}

impl Paths {
    /// Derive the full storage layout from CLI options.
    pub fn from_opts(opts: &Opts) -> Self {
        let storage = opts.runtime_dir.join("storage");
        let config_dir = opts.config_dir();
        Self {
            iso_root: storage.join("isos"),
            vhd_root: storage.join("vhds"),
            injection_root: storage.join("injections"),
            overlay_root: storage.join("overlays"),
            generated_dir: opts.runtime_dir.join("generated_configs"),
            targets_file: opts.runtime_dir.join("generated_configs").join("targets.conf"),
            config_file: config_dir.join("config.json"),
            trial_store: license::trial_store_path(&config_dir),
            static_dir: opts.static_dir.clone(),
        }
    }

    /// Create every directory this layout names, if absent.
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        for dir in [
            &self.iso_root,
            &self.vhd_root,
            &self.injection_root,
            &self.overlay_root,
            &self.generated_dir,
        ] {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        if let Some(parent) = self.config_file.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        Ok(())
    }
}

/// The portion of shared state protected by the writer lock.
#[derive(Debug)]
pub struct Guarded {
    /// The current administrative document.
    pub config: ConfigDocument,
    /// The most recently computed license status.
    pub license_status: LicenseStatus,
    /// Cached scan of the VHD tree.
    pub vhd_assets: Vec<ScannedAsset>,
    /// Cached scan of the ISO tree.
    pub iso_assets: Vec<ScannedAsset>,
}

/// Application-wide shared state, cloned cheaply via [`Arc`] into every
/// request handler.
#[derive(Debug)]
pub struct AppState {
    /// Static, immutable filesystem layout.
    pub paths: Paths,
    /// Everything that changes after startup.
    pub guarded: RwLock<Guarded>,
}

impl AppState {
    /// Load configuration, refresh the license, scan both asset trees,
    /// and materialize the target file — the startup sequence, also
    /// re-run synchronously by `POST /api/config`.
    pub async fn bootstrap(paths: Paths) -> anyhow::Result<Arc<Self>> {
        paths.ensure_dirs()?;
        let config = pxed_lib::config::load(&paths.config_file);
        let license_status = license::refresh(&config.license_key, &paths.trial_store);

        let state = Arc::new(Self {
            paths,
            guarded: RwLock::new(Guarded {
                config,
                license_status,
                vhd_assets: Vec::new(),
                iso_assets: Vec::new(),
            }),
        });
        refresh_and_materialize(&state).await?;
        Ok(state)
    }
}

/// Re-scan both asset trees, re-materialize `targets.conf`, and publish
/// the new caches. The scan and the `qemu-img` subprocess calls run
/// outside the writer lock; only the final cache swap reacquires it, so
/// a slow overlay creation never blocks concurrent readers.
pub async fn refresh_and_materialize(state: &Arc<AppState>) -> anyhow::Result<()> {
    let paths = state.paths.clone();
    let (clients, allowed_initiators) = {
        let guarded = state.guarded.read().await;
        (guarded.config.clients.clone(), guarded.config.iscsi_allowed_initiators.clone())
    };

    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<(Vec<ScannedAsset>, Vec<ScannedAsset>)> {
        let vhds = assets::scan_vhds(&paths.vhd_root);
        let isos = assets::scan_isos(&paths.iso_root);
        iscsi::materialize(
            &paths.targets_file,
            &vhds,
            &clients,
            &allowed_initiators,
            &paths.overlay_root,
            &QemuImgTool,
        )?;
        Ok((vhds, isos))
    })
    .await
    .context("asset scan/materialize task panicked")??;

    let (vhds, isos) = result;
    let mut guarded = state.guarded.write().await;
    guarded.vhd_assets = vhds;
    guarded.iso_assets = isos;
    Ok(())
}

/// Re-evaluate the license status from the current `license_key` and
/// store it.
pub async fn refresh_license(state: &Arc<AppState>) {
    let mut guarded = state.guarded.write().await;
    guarded.license_status = license::refresh(&guarded.config.license_key, &state.paths.trial_store);
}
