//! Command-line entrypoint options.

use std::path::PathBuf;

use clap::Parser;

/// Network boot controller: serves iPXE boot scripts and materializes
/// iSCSI target configuration.
#[derive(Debug, Parser)]
#[command(name = "pxed", version)]
pub struct Opts {
    /// Address to bind the HTTP server to.
    #[clap(long, env = "PXED_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Runtime root directory, housing `storage/{isos,vhds,injections,overlays}`
    /// and `generated_configs/targets.conf`.
    #[clap(long, env = "PXED_RUNTIME_DIR", default_value = "./runtime")]
    pub runtime_dir: PathBuf,

    /// Directory holding `config.json` and `.license_store`. Defaults to
    /// the runtime root.
    #[clap(long, env = "PXED_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Directory holding the administrative UI's static assets.
    #[clap(long, env = "PXED_STATIC_DIR", default_value = "./static")]
    pub static_dir: PathBuf,
}

impl Opts {
    /// The effective configuration directory: `config_dir` if set,
    /// otherwise `runtime_dir`.
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(|| self.runtime_dir.clone())
    }
}
