//! iPXE script generation: the interactive browse-and-boot menu, and the
//! per-client auto-boot script selected by a `mac` query parameter.

use std::path::Path;

use crate::assets::{self, DirEntry, FileEntry};
use crate::config::{ClientKind, ClientRecord};
use crate::naming::{client_iqn, master_iqn, menu_label, normalize_mac, LabelKind};

/// Which asset root(s) a menu listing draws from, selected by the
/// `type` query parameter (`root`, `iso`, `vhd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    /// Both ISO and VHD roots.
    Root,
    /// ISO root only.
    Iso,
    /// VHD root only.
    Vhd,
}

impl TypeFilter {
    /// Parse a `type` query parameter value; unrecognized values fall
    /// back to [`TypeFilter::Root`], matching the reference's default.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "iso" => TypeFilter::Iso,
            "vhd" => TypeFilter::Vhd,
            _ => TypeFilter::Root,
        }
    }

    /// The query-string spelling of this filter.
    pub fn as_str(self) -> &'static str {
        match self {
            TypeFilter::Root => "root",
            TypeFilter::Iso => "iso",
            TypeFilter::Vhd => "vhd",
        }
    }

    fn wants_iso(self) -> bool {
        matches!(self, TypeFilter::Root | TypeFilter::Iso)
    }

    fn wants_vhd(self) -> bool {
        matches!(self, TypeFilter::Root | TypeFilter::Vhd)
    }
}

/// Build the injection-file kernel-argument suffix, per the heuristic in
/// the component design: `.cfg`/`.ks` files append `inst.ks=<url>`;
/// files whose name contains `user-data` append a cloud-init `ds=`
/// argument with the trailing `user-data` stripped from the URL; any
/// other filename is ignored.
fn injection_kernel_arg(server_ip: &str, injection_file: &str) -> Option<String> {
    let url = format!("http://{server_ip}/injections/{injection_file}");
    if injection_file.ends_with(".cfg") || injection_file.ends_with(".ks") {
        Some(format!(" inst.ks={url}"))
    } else if injection_file.contains("user-data") {
        let stripped = url.strip_suffix("user-data").unwrap_or(&url);
        Some(format!(" ds=nocloud-net;s={stripped}"))
    } else {
        None
    }
}

/// Generate the per-client auto-boot script for `client`, found by a
/// prior MAC lookup.
pub fn generate_client_boot_script(client: &ClientRecord, server_ip: &str) -> String {
    let mut lines = vec![
        "#!ipxe".to_string(),
        format!("echo Auto-booting client {}...", client.mac),
    ];

    match client.kind {
        ClientKind::Iso => {
            lines.push(format!("echo Loading ISO: {}", client.image));
            lines.push(format!(
                "initrd http://{server_ip}/storage/isos/{}",
                client.image
            ));

            let mut kernel_args = client.kernel_args.clone().unwrap_or_default();
            if let Some(injection_file) = &client.injection_file {
                lines.push(format!("echo Injections: {injection_file}"));
                if let Some(arg) = injection_kernel_arg(server_ip, injection_file) {
                    kernel_args.push_str(&arg);
                }
            }

            if !kernel_args.is_empty() {
                lines.push(format!("imgargs memdisk iso raw {kernel_args}"));
            }
            lines.push(format!("chain http://{server_ip}/tftpboot/memdisk iso raw"));
        }
        ClientKind::Vhd => {
            let iqn = if client.overlay {
                lines.push("echo Booting with Persistent Overlay...".to_string());
                client_iqn(&client.mac, &client.image)
            } else {
                master_iqn(&client.image)
            };
            lines.push(format!("sanboot iscsi:{server_ip}::::{iqn}"));
        }
    }

    lines.join("\n")
}

/// Find the first client in `clients` whose MAC matches `requested_mac`
/// once both sides are normalized (lowercase, `-` folded to `:`).
pub fn find_client<'a>(clients: &'a [ClientRecord], requested_mac: &str) -> Option<&'a ClientRecord> {
    let target = normalize_mac(requested_mac);
    clients.iter().find(|c| normalize_mac(&c.mac) == target)
}

/// Parameters controlling a single interactive-menu render.
#[derive(Debug)]
pub struct MenuRequest<'a> {
    /// Root of the ISO asset tree.
    pub iso_root: &'a Path,
    /// Root of the VHD asset tree.
    pub vhd_root: &'a Path,
    /// Tree-relative subdirectory currently being browsed.
    pub path: &'a str,
    /// Which root(s) to list.
    pub type_filter: TypeFilter,
    /// Address embedded in generated URLs.
    pub server_ip: &'a str,
    /// iPXE menu timeout, in seconds.
    pub boot_timeout: u32,
    /// Menu title line.
    pub menu_title: &'a str,
}

fn parent_path(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

/// Render the interactive iPXE menu for the given request.
pub fn generate_menu(req: &MenuRequest<'_>) -> String {
    let timeout_ms = req.boot_timeout * 1000;
    let path_label = if req.path.is_empty() { "Root" } else { req.path };

    let mut lines = vec![
        "#!ipxe".to_string(),
        format!("set timeout {timeout_ms}"),
        format!("menu {} - {path_label}", req.menu_title),
    ];

    if !req.path.is_empty() {
        lines.push("item --key 0 back .. Back to Previous".to_string());
    }

    let (iso_files, iso_dirs): (Vec<FileEntry>, Vec<DirEntry>) = if req.type_filter.wants_iso() {
        assets::list(req.iso_root, req.path)
    } else {
        (Vec::new(), Vec::new())
    };
    let (vhd_files, vhd_dirs): (Vec<FileEntry>, Vec<DirEntry>) = if req.type_filter.wants_vhd() {
        assets::list(req.vhd_root, req.path)
    } else {
        (Vec::new(), Vec::new())
    };
    let iso_files: Vec<_> = iso_files
        .into_iter()
        .filter(|f| f.name.to_lowercase().ends_with(".iso"))
        .collect();
    let vhd_files: Vec<_> = vhd_files
        .into_iter()
        .filter(|f| assets::VHD_EXTENSIONS.iter().any(|ext| f.name.to_lowercase().ends_with(&format!(".{ext}"))))
        .collect();

    if !iso_dirs.is_empty() || !vhd_dirs.is_empty() {
        lines.push("item --gap -- Directories".to_string());
        for d in &iso_dirs {
            lines.push(format!("item {} [DIR] {}", menu_label(LabelKind::DirIso, &d.path), d.name));
        }
        for d in &vhd_dirs {
            lines.push(format!("item {} [DIR] {}", menu_label(LabelKind::DirVhd, &d.path), d.name));
        }
    }

    if !iso_files.is_empty() {
        lines.push("item --gap -- ISO Images".to_string());
        for f in &iso_files {
            lines.push(format!("item {} {}", menu_label(LabelKind::Iso, &f.path), f.name));
        }
    }

    if !vhd_files.is_empty() {
        lines.push("item --gap -- VHD Images".to_string());
        for f in &vhd_files {
            lines.push(format!("item {} {}", menu_label(LabelKind::Vhd, &f.path), f.name));
        }
    }

    lines.push("choose target && goto ${target}".to_string());

    if !req.path.is_empty() {
        lines.push(":back".to_string());
        lines.push(format!(
            "chain http://{}:8000/boot.ipxe?path={}&type={}",
            req.server_ip,
            parent_path(req.path),
            req.type_filter.as_str()
        ));
    }

    for d in &iso_dirs {
        lines.push(format!(":{}", menu_label(LabelKind::DirIso, &d.path)));
        lines.push(format!(
            "chain http://{}:8000/boot.ipxe?path={}&type=iso",
            req.server_ip, d.path
        ));
    }
    for d in &vhd_dirs {
        lines.push(format!(":{}", menu_label(LabelKind::DirVhd, &d.path)));
        lines.push(format!(
            "chain http://{}:8000/boot.ipxe?path={}&type=vhd",
            req.server_ip, d.path
        ));
    }

    for f in &iso_files {
        lines.push(format!(":{}", menu_label(LabelKind::Iso, &f.path)));
        lines.push(format!("initrd http://{}/storage/isos/{}", req.server_ip, f.path));
        lines.push(format!("chain http://{}/tftpboot/memdisk iso raw", req.server_ip));
    }

    for f in &vhd_files {
        lines.push(format!(":{}", menu_label(LabelKind::Vhd, &f.path)));
        lines.push(format!(
            "sanboot iscsi:{}::::{}",
            req.server_ip,
            master_iqn(&f.path)
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientRecord;

    fn iso_client(mac: &str, injection: Option<&str>, kernel_args: Option<&str>) -> ClientRecord {
        ClientRecord {
            mac: mac.to_string(),
            image: "centos.iso".to_string(),
            kind: ClientKind::Iso,
            hostname: None,
            overlay: false,
            injection_file: injection.map(|s| s.to_string()),
            kernel_args: kernel_args.map(|s| s.to_string()),
        }
    }

    #[test]
    fn injection_heuristic_kickstart() {
        let script = generate_client_boot_script(&iso_client("aa:bb:cc:dd:ee:ff", Some("ks.cfg"), None), "10.0.0.1");
        assert!(script.contains("imgargs memdisk iso raw  inst.ks=http://10.0.0.1/injections/ks.cfg"));
    }

    #[test]
    fn injection_heuristic_cloud_init() {
        let script = generate_client_boot_script(
            &iso_client("aa:bb:cc:dd:ee:ff", Some("user-data"), None),
            "10.0.0.1",
        );
        assert!(script.contains("ds=nocloud-net;s=http://10.0.0.1/injections/"));
    }

    #[test]
    fn injection_heuristic_ignores_unknown_filenames() {
        let script = generate_client_boot_script(
            &iso_client("aa:bb:cc:dd:ee:ff", Some("notes.txt"), None),
            "10.0.0.1",
        );
        assert!(!script.contains("imgargs"));
    }

    #[test]
    fn vhd_overlay_client_uses_client_iqn() {
        let client = ClientRecord {
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
            image: "win.vhd".to_string(),
            kind: ClientKind::Vhd,
            hostname: None,
            overlay: true,
            injection_file: None,
            kernel_args: None,
        };
        let script = generate_client_boot_script(&client, "127.0.0.1");
        assert!(script.contains("sanboot iscsi:127.0.0.1::::iqn.2024-01.com.pxeserver:aabbccddeeff:win-vhd"));
    }

    #[test]
    fn vhd_non_overlay_client_uses_master_iqn() {
        let client = ClientRecord {
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
            image: "win.vhd".to_string(),
            kind: ClientKind::Vhd,
            hostname: None,
            overlay: false,
            injection_file: None,
            kernel_args: None,
        };
        let script = generate_client_boot_script(&client, "127.0.0.1");
        assert!(script.contains("sanboot iscsi:127.0.0.1::::iqn.2024-01.com.pxeserver:win-vhd"));
    }

    #[test]
    fn find_client_normalizes_mac_before_comparing() {
        let clients = vec![iso_client("aa:bb:cc:dd:ee:ff", None, None)];
        assert!(find_client(&clients, "AA-BB-CC-DD-EE-FF").is_some());
        assert!(find_client(&clients, "11:22:33:44:55:66").is_none());
    }

    #[test]
    fn menu_items_and_labels_are_paired() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("ubuntu.iso"), b"x").unwrap();
        let req = MenuRequest {
            iso_root: tmp.path(),
            vhd_root: tmp.path(),
            path: "",
            type_filter: TypeFilter::Iso,
            server_ip: "127.0.0.1",
            boot_timeout: 10,
            menu_title: "Test Menu",
        };
        let script = generate_menu(&req);
        assert!(script.starts_with("#!ipxe"));
        assert!(script.contains("set timeout 10000"));

        let item_label = script
            .lines()
            .find(|l| l.starts_with("item iso_"))
            .and_then(|l| l.split_whitespace().nth(1))
            .unwrap();
        let handler_marker = format!(":{item_label}");
        assert!(script.lines().any(|l| l == handler_marker));
        assert!(script.contains("initrd http://127.0.0.1/storage/isos/ubuntu.iso"));
    }

    #[test]
    fn empty_tree_menu_still_has_required_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let req = MenuRequest {
            iso_root: tmp.path(),
            vhd_root: tmp.path(),
            path: "",
            type_filter: TypeFilter::Root,
            server_ip: "127.0.0.1",
            boot_timeout: 10,
            menu_title: "Super PXE Server (Next-Gen)",
        };
        let script = generate_menu(&req);
        assert!(script.starts_with("#!ipxe"));
        assert!(script.contains("choose target && goto ${target}"));
    }
}
