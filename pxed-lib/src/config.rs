//! The administrator's JSON configuration document: load/save plus the
//! license-policy enforcement applied on every save.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::license::{self, Feature, LicenseStatus};

/// A client boot record, keyed by MAC address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientRecord {
    /// Lowercase, colon-separated MAC address.
    pub mac: String,
    /// Tree-relative path under the ISO or VHD root, per `type`.
    pub image: String,
    /// Which asset root `image` is resolved against.
    #[serde(rename = "type")]
    pub kind: ClientKind,
    /// Optional display hostname, cosmetic only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// For `type: vhd`, whether to boot a per-client copy-on-write
    /// overlay instead of the shared master. Ignored for `type: iso`.
    #[serde(default)]
    pub overlay: bool,
    /// For `type: iso`, the name of an uploaded kickstart/cloud-init file
    /// to inject. Ignored for `type: vhd`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection_file: Option<String>,
    /// Extra kernel command-line arguments, ISO boot only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_args: Option<String>,
}

/// Which asset root a [`ClientRecord::image`] resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// Boot from a memdisk-loaded ISO.
    Iso,
    /// Boot from an iSCSI-backed virtual disk.
    Vhd,
}

fn default_server_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_dhcp_next_server() -> String {
    "127.0.0.1".to_string()
}

fn default_iscsi_allowed_initiators() -> String {
    "ALL".to_string()
}

fn default_boot_timeout() -> u32 {
    10
}

fn default_menu_title() -> String {
    "Super PXE Server (Next-Gen)".to_string()
}

fn default_admin_password() -> String {
    "admin".to_string()
}

/// The on-disk administrative document.
///
/// Every field carries a `#[serde(default = …)]` so that a partial file —
/// one an administrator hand-edited and left keys out of — merges onto the
/// built-in defaults key by key rather than being discarded wholesale by a
/// single missing field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigDocument {
    /// The address clients reach this controller at, embedded in every
    /// emitted URL and `sanboot` line.
    #[serde(default = "default_server_ip")]
    pub server_ip: String,
    /// The `next-server` value DHCP should advertise (informational; the
    /// DHCP server itself is out of scope).
    #[serde(default = "default_dhcp_next_server")]
    pub dhcp_next_server: String,
    /// The iSCSI `initiator-address` allowlist written into every target
    /// block, e.g. `ALL` or a CIDR.
    #[serde(default = "default_iscsi_allowed_initiators")]
    pub iscsi_allowed_initiators: String,
    /// iPXE menu timeout, in seconds.
    #[serde(default = "default_boot_timeout")]
    pub boot_timeout: u32,
    /// Title line of the interactive boot menu.
    #[serde(default = "default_menu_title")]
    pub menu_title: String,
    /// HTTP Basic password guarding the admin routes.
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    /// Enterprise license key, or empty for community/trial.
    #[serde(default)]
    pub license_key: String,
    /// The known client roster.
    #[serde(default)]
    pub clients: Vec<ClientRecord>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            server_ip: default_server_ip(),
            dhcp_next_server: default_dhcp_next_server(),
            iscsi_allowed_initiators: default_iscsi_allowed_initiators(),
            boot_timeout: default_boot_timeout(),
            menu_title: default_menu_title(),
            admin_password: default_admin_password(),
            license_key: String::new(),
            clients: Vec::new(),
        }
    }
}

/// Load the configuration document from `path`, merging it over the
/// built-in defaults field by field. A missing or unparsable file is not
/// an error: it is logged and the defaults are returned so the controller
/// always comes up with a usable configuration. A file that is valid JSON
/// but only sets some keys keeps those values and fills the rest from the
/// defaults above, rather than being discarded wholesale.
pub fn load(path: &Path) -> ConfigDocument {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return ConfigDocument::default(),
    };
    match serde_json::from_str::<ConfigDocument>(&contents) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::error!(error = %err, path = %path.display(), "failed to parse configuration; using defaults");
            ConfigDocument::default()
        }
    }
}

/// The view returned by `GET /api/config`: the stored document plus the
/// freshly computed license status and machine id. These two fields are
/// never round-tripped back through [`save`].
#[derive(Debug, Clone, Serialize)]
pub struct ConfigReadView {
    /// The persisted document.
    #[serde(flatten)]
    pub document: ConfigDocument,
    /// Freshly computed license status.
    pub license_status: LicenseStatus,
    /// This host's machine id, as used by the license gate.
    pub hardware_id: String,
}

/// Enforce the feature-gate policy on `doc` in place, given the current
/// `license_status`. For every client with `overlay = true` beyond the
/// community allowance, force `overlay = false`; for every client with
/// an `injection_file` the license denies, clear it. Both denials are
/// logged at `warn`.
pub fn apply_feature_policy(doc: &mut ConfigDocument, license_status: &LicenseStatus) {
    let mut overlay_count: u32 = 0;
    for client in &mut doc.clients {
        if client.overlay {
            overlay_count += 1;
            let (allowed, message) =
                license::check_feature(license_status, Feature::DisklessOverlay, overlay_count);
            if !allowed {
                client.overlay = false;
                tracing::warn!(mac = %client.mac, "{message}");
            }
        }
        if client.injection_file.is_some() {
            let (allowed, message) = license::check_feature(license_status, Feature::Injection, 0);
            if !allowed {
                client.injection_file = None;
                tracing::warn!(mac = %client.mac, "{message}");
            }
        }
    }
}

/// Persist `doc` to `path` as indented (4-space) JSON, after first
/// applying the feature-gate policy computed from `license_status`.
pub fn save(
    path: &Path,
    mut doc: ConfigDocument,
    license_status: &LicenseStatus,
) -> anyhow::Result<ConfigDocument> {
    apply_feature_policy(&mut doc, license_status);
    let serialized = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path, serialized)?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::LicenseType;

    fn expired() -> LicenseStatus {
        LicenseStatus {
            kind: LicenseType::Expired,
            days_left: None,
            message: String::new(),
        }
    }

    fn client(mac: &str, overlay: bool, injection: Option<&str>) -> ClientRecord {
        ClientRecord {
            mac: mac.to_string(),
            image: "win.vhd".to_string(),
            kind: ClientKind::Vhd,
            hostname: None,
            overlay,
            injection_file: injection.map(|s| s.to_string()),
            kernel_args: None,
        }
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = load(&tmp.path().join("config.json"));
        assert_eq!(doc, ConfigDocument::default());
    }

    #[test]
    fn load_partial_document_merges_onto_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"server_ip": "10.0.0.5", "admin_password": "hunter2"}"#).unwrap();

        let doc = load(&path);
        assert_eq!(doc.server_ip, "10.0.0.5");
        assert_eq!(doc.admin_password, "hunter2");
        assert_eq!(doc.dhcp_next_server, default_dhcp_next_server());
        assert_eq!(doc.iscsi_allowed_initiators, default_iscsi_allowed_initiators());
        assert_eq!(doc.boot_timeout, default_boot_timeout());
        assert_eq!(doc.menu_title, default_menu_title());
        assert!(doc.clients.is_empty());
    }

    #[test]
    fn load_invalid_json_returns_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let doc = load(&path);
        assert_eq!(doc, ConfigDocument::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let mut doc = ConfigDocument::default();
        doc.clients.push(client("aa:bb:cc:dd:ee:ff", true, None));
        let status = LicenseStatus {
            kind: LicenseType::Trial,
            days_left: Some(10),
            message: String::new(),
        };
        let saved = save(&path, doc.clone(), &status).unwrap();
        let reloaded = load(&path);
        similar_asserts::assert_eq!(saved, reloaded);
    }

    #[test]
    fn feature_policy_allows_only_first_overlay_in_community() {
        let mut doc = ConfigDocument::default();
        doc.clients.push(client("aa:aa:aa:aa:aa:aa", true, Some("x.cfg")));
        doc.clients.push(client("bb:bb:bb:bb:bb:bb", true, None));
        apply_feature_policy(&mut doc, &expired());
        assert!(doc.clients[0].overlay);
        assert!(doc.clients[0].injection_file.is_none());
        assert!(!doc.clients[1].overlay);
    }
}
