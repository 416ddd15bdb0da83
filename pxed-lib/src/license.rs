//! License and feature-gate evaluation.
//!
//! The controller ships as a single binary with three license states:
//! a signed-looking enterprise key, a 60-day trial seeded on first run,
//! or an expired state once the trial lapses or the key's machine
//! binding no longer matches. The community tier (no valid key, no
//! active trial) is feature-limited rather than refused outright.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const TRIAL_DAYS: i64 = 60;
const SECONDS_PER_DAY: i64 = 86_400;
const ENTERPRISE_MARKER: &str = "SPS-ENT-";

/// The kind of license currently in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LicenseType {
    /// A valid enterprise key bound to this machine.
    Enterprise,
    /// A time-limited evaluation, not yet expired.
    Trial,
    /// No enterprise key, and either no trial or a lapsed/mismatched one.
    Expired,
}

/// The computed license state, as returned by [`refresh`] and echoed back
/// to the admin UI on `GET /api/config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseStatus {
    /// Which tier is in effect.
    #[serde(rename = "type")]
    pub kind: LicenseType,
    /// Days remaining in the trial; only present while `kind == Trial`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_left: Option<i64>,
    /// Human-readable status line shown in the admin UI.
    pub message: String,
}

/// The persisted trial record, stored at `<config_dir>/.license_store`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Unix timestamp (seconds) the trial was first observed.
    pub start_ts: i64,
    /// The machine id the trial was bound to.
    pub machine_id: String,
}

/// Read the current machine identity: the trimmed contents of
/// `/etc/machine-id`, or the host's network node name if that file is
/// absent.
pub fn current_machine_id() -> String {
    if let Ok(contents) = std::fs::read_to_string("/etc/machine-id") {
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    rustix::system::uname()
        .nodename()
        .to_string_lossy()
        .into_owned()
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn enterprise_fingerprint(machine_id: &str) -> String {
    let digest = Sha256::digest(machine_id.as_bytes());
    hex::encode(digest)[..8].to_uppercase()
}

/// Does `license_key` authorize the enterprise tier for `machine_id`?
fn is_valid_enterprise_key(license_key: &str, machine_id: &str) -> bool {
    !license_key.is_empty()
        && license_key.contains(ENTERPRISE_MARKER)
        && license_key.contains(&enterprise_fingerprint(machine_id))
}

fn read_trial_record(path: &Path) -> Option<TrialRecord> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn write_trial_record(path: &Path, record: &TrialRecord) -> anyhow::Result<()> {
    let contents = serde_json::to_string(record)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Evaluate the current license state.
///
/// `license_key` is the administrator-configured key (may be empty).
/// `trial_store_path` is `<config_dir>/.license_store`; it is created
/// with the current machine id on first call if absent.
pub fn refresh(license_key: &str, trial_store_path: &Path) -> LicenseStatus {
    let machine_id = current_machine_id();

    if is_valid_enterprise_key(license_key, &machine_id) {
        return LicenseStatus {
            kind: LicenseType::Enterprise,
            days_left: None,
            message: "Enterprise Subscription Active".to_string(),
        };
    }

    if read_trial_record(trial_store_path).is_none() {
        let record = TrialRecord {
            start_ts: now_unix(),
            machine_id: machine_id.clone(),
        };
        if let Err(err) = write_trial_record(trial_store_path, &record) {
            tracing::error!(error = %err, "failed to persist trial record");
        }
    }

    let record = match read_trial_record(trial_store_path) {
        Some(r) => r,
        None => {
            // Could not read back what we just wrote (e.g. read-only fs);
            // treat as an unbound trial starting now so we degrade to a
            // sensible default instead of panicking.
            TrialRecord {
                start_ts: now_unix(),
                machine_id: machine_id.clone(),
            }
        }
    };

    if record.machine_id != machine_id {
        return LicenseStatus {
            kind: LicenseType::Expired,
            days_left: None,
            message: "Hardware ID Mismatch".to_string(),
        };
    }

    let elapsed_days = (now_unix() - record.start_ts) as f64 / SECONDS_PER_DAY as f64;
    let remaining = TRIAL_DAYS as f64 - elapsed_days;

    if remaining <= 0.0 {
        LicenseStatus {
            kind: LicenseType::Expired,
            days_left: None,
            message: "Trial Expired - Community Edition Limits Applied".to_string(),
        }
    } else {
        let days_left = remaining.floor() as i64;
        LicenseStatus {
            kind: LicenseType::Trial,
            days_left: Some(days_left),
            message: format!("Trial Active ({days_left} days left)"),
        }
    }
}

impl LicenseStatus {
    /// Trial and enterprise both unlock the full feature set; only a
    /// lapsed/mismatched state is restricted.
    pub fn is_enterprise(&self) -> bool {
        matches!(self.kind, LicenseType::Enterprise | LicenseType::Trial)
    }
}

/// A feature gated by license tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Per-client copy-on-write disk overlays.
    DisklessOverlay,
    /// Automated kickstart/cloud-init injection.
    Injection,
}

/// Is `feature` allowed given `current_count` already-granted uses of it
/// in the roster being validated? Returns `(allowed, message)`; `message`
/// is empty when `allowed` is true.
pub fn check_feature(status: &LicenseStatus, feature: Feature, current_count: u32) -> (bool, String) {
    let is_ent = status.is_enterprise();
    match feature {
        Feature::DisklessOverlay => {
            if !is_ent && current_count >= 1 {
                (
                    false,
                    "Community Edition limited to 1 persistent workstation. Upgrade to Enterprise for unlimited diskless nodes.".to_string(),
                )
            } else {
                (true, String::new())
            }
        }
        Feature::Injection => {
            if !is_ent {
                (false, "Automated Injection is an Enterprise-only feature.".to_string())
            } else {
                (true, String::new())
            }
        }
    }
}

/// Convenience: where the trial record lives under a configuration
/// directory.
pub fn trial_store_path(config_dir: &Path) -> PathBuf {
    config_dir.join(".license_store")
}
