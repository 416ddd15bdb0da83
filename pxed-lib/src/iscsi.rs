//! iSCSI target-daemon configuration materializer.
//!
//! Renders one `<target>` block per master virtual disk and one more per
//! client overlay, and writes the result to `targets.conf`. The target
//! daemon itself is not reloaded; an out-of-band reload is assumed.

use std::path::Path;

use crate::assets::ScannedAsset;
use crate::config::{ClientKind, ClientRecord};
use crate::naming::{client_iqn, master_iqn};
use crate::overlay::{self, DiskImageTool};

fn target_block(iqn: &str, backing_store: &str, allowed_initiators: &str) -> String {
    format!(
        "<target {iqn}>\n    backing-store {backing_store}\n    initiator-address {allowed_initiators}\n</target>\n"
    )
}

/// Render the full `targets.conf` contents for `masters` (in scan order)
/// followed by one overlay block per client with `type: vhd, overlay:
/// true` (in roster order). Overlay files are created via `tool` as
/// needed.
pub fn render(
    masters: &[ScannedAsset],
    clients: &[ClientRecord],
    allowed_initiators: &str,
    overlay_dir: &Path,
    tool: &dyn DiskImageTool,
) -> String {
    let mut out = String::new();

    for master in masters {
        out.push_str(&target_block(
            &master_iqn(&master.path),
            &master.full_path.to_string_lossy(),
            allowed_initiators,
        ));
    }

    for client in clients {
        if client.kind != ClientKind::Vhd || !client.overlay {
            continue;
        }
        let master_path = masters
            .iter()
            .find(|m| m.path == client.image)
            .map(|m| m.full_path.clone())
            .unwrap_or_else(|| Path::new(&client.image).to_path_buf());

        let overlay_path = overlay::ensure_overlay(tool, overlay_dir, &master_path, &client.mac);
        out.push_str(&target_block(
            &client_iqn(&client.mac, &client.image),
            &overlay_path.to_string_lossy(),
            allowed_initiators,
        ));
    }

    out
}

/// Render and write `targets.conf` to `path`.
pub fn materialize(
    path: &Path,
    masters: &[ScannedAsset],
    clients: &[ClientRecord],
    allowed_initiators: &str,
    overlay_dir: &Path,
    tool: &dyn DiskImageTool,
) -> anyhow::Result<()> {
    let contents = render(masters, clients, allowed_initiators, overlay_dir, tool);
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::QemuImgTool;

    fn master(path: &str, full: &Path) -> ScannedAsset {
        ScannedAsset {
            path: path.to_string(),
            full_path: full.join(path),
        }
    }

    fn vhd_client(mac: &str, image: &str, overlay: bool) -> ClientRecord {
        ClientRecord {
            mac: mac.to_string(),
            image: image.to_string(),
            kind: ClientKind::Vhd,
            hostname: None,
            overlay,
            injection_file: None,
            kernel_args: None,
        }
    }

    struct StubTool;
    impl DiskImageTool for StubTool {
        fn create_overlay(&self, _master: &Path, overlay: &Path) -> anyhow::Result<()> {
            std::fs::write(overlay, b"stub")?;
            Ok(())
        }
    }

    #[test]
    fn masters_come_before_overlays_and_iqns_are_disjoint() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("win.vhd"), b"master").unwrap();
        let masters = vec![master("win.vhd", tmp.path())];
        let clients = vec![vhd_client("aa:bb:cc:dd:ee:ff", "win.vhd", true)];

        let rendered = render(&masters, &clients, "ALL", tmp.path(), &StubTool);
        let master_idx = rendered.find("iqn.2024-01.com.pxeserver:win-vhd>").unwrap();
        let overlay_idx = rendered
            .find("iqn.2024-01.com.pxeserver:aabbccddeeff:win-vhd>")
            .unwrap();
        assert!(master_idx < overlay_idx);
        assert!(rendered.contains("initiator-address ALL"));
    }

    #[test]
    fn overlay_target_backing_store_points_at_overlay_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("win.vhd"), b"master").unwrap();
        let masters = vec![master("win.vhd", tmp.path())];
        let clients = vec![vhd_client("aa:bb:cc:dd:ee:ff", "win.vhd", true)];

        let rendered = render(&masters, &clients, "ALL", tmp.path(), &StubTool);
        assert!(rendered.contains("aabbccddeeff_win.vhd.qcow2"));
    }

    #[test]
    fn clients_without_overlay_produce_no_extra_target() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("win.vhd"), b"master").unwrap();
        let masters = vec![master("win.vhd", tmp.path())];
        let clients = vec![vhd_client("aa:bb:cc:dd:ee:ff", "win.vhd", false)];

        let rendered = render(&masters, &clients, "ALL", tmp.path(), &StubTool);
        assert_eq!(rendered.matches("<target").count(), 1);
    }

    #[test]
    fn materialize_writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("win.vhd"), b"master").unwrap();
        let masters = vec![master("win.vhd", tmp.path())];
        let out_path = tmp.path().join("targets.conf");
        materialize(&out_path, &masters, &[], "ALL", tmp.path(), &QemuImgTool).unwrap();
        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert!(contents.contains("win-vhd"));
    }
}
