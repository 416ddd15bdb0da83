//! Per-client copy-on-write overlay management.
//!
//! An overlay is a qcow2 file backed by a read-only master virtual disk,
//! created lazily the first time a client with `overlay = true`
//! materializes. Overlays are never deleted automatically.

use std::path::{Path, PathBuf};

use crate::naming::mac_compact;
use crate::task::Task;

/// The external tool invoked to create an overlay file. Modeled as a
/// trait so tests can substitute a fake instead of shelling out to
/// `qemu-img`.
pub trait DiskImageTool {
    /// Create a qcow2 file at `overlay_path`, backed by the raw file at
    /// `master_path`.
    fn create_overlay(&self, master_path: &Path, overlay_path: &Path) -> anyhow::Result<()>;
}

/// The production [`DiskImageTool`]: shells out to `qemu-img create -f
/// qcow2 -F raw -b <master> <overlay>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct QemuImgTool;

impl DiskImageTool for QemuImgTool {
    fn create_overlay(&self, master_path: &Path, overlay_path: &Path) -> anyhow::Result<()> {
        Task::new("qemu-img create", "qemu-img")
            .args([
                "create".as_ref(),
                "-f".as_ref(),
                "qcow2".as_ref(),
                "-F".as_ref(),
                "raw".as_ref(),
                "-b".as_ref(),
                master_path.as_os_str(),
                overlay_path.as_os_str(),
            ])
            .run()
    }
}

/// The filename an overlay over `master_path` for `mac` is stored under,
/// within the overlay directory.
pub fn overlay_file_name(master_path: &Path, mac: &str) -> String {
    let basename = master_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}_{}.qcow2", mac_compact(mac), basename)
}

/// Ensure an overlay exists over `master_path` for `mac`, creating it
/// with `tool` if necessary. Returns the overlay's absolute path.
///
/// If the overlay already exists, it is returned untouched. If creation
/// fails, the failure is logged and `master_path` itself is returned as
/// a fallback — callers must tolerate a master being handed back in
/// place of an overlay.
pub fn ensure_overlay(
    tool: &dyn DiskImageTool,
    overlay_dir: &Path,
    master_path: &Path,
    mac: &str,
) -> PathBuf {
    let overlay_path = overlay_dir.join(overlay_file_name(master_path, mac));
    if overlay_path.exists() {
        return overlay_path;
    }

    tracing::info!(mac = %mac, master = %master_path.display(), "creating overlay");
    match tool.create_overlay(master_path, &overlay_path) {
        Ok(()) => overlay_path,
        Err(err) => {
            tracing::error!(error = %err, "failed to create overlay; falling back to master");
            master_path.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeTool {
        should_fail: bool,
        calls: Cell<u32>,
    }

    impl DiskImageTool for FakeTool {
        fn create_overlay(&self, _master_path: &Path, overlay_path: &Path) -> anyhow::Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.should_fail {
                anyhow::bail!("boom");
            }
            std::fs::write(overlay_path, b"qcow2-stub")?;
            Ok(())
        }
    }

    #[test]
    fn overlay_file_name_matches_reference_scheme() {
        let name = overlay_file_name(Path::new("win.vhd"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(name, "aabbccddeeff_win.vhd.qcow2");
    }

    #[test]
    fn creates_overlay_once_then_reuses_it() {
        let tmp = tempfile::tempdir().unwrap();
        let master = tmp.path().join("win.vhd");
        std::fs::write(&master, b"master").unwrap();
        let tool = FakeTool {
            should_fail: false,
            calls: Cell::new(0),
        };

        let first = ensure_overlay(&tool, tmp.path(), &master, "aa:bb:cc:dd:ee:ff");
        let second = ensure_overlay(&tool, tmp.path(), &master, "aa:bb:cc:dd:ee:ff");
        assert_eq!(first, second);
        assert_eq!(tool.calls.get(), 1);
    }

    #[test]
    fn falls_back_to_master_on_tool_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let master = tmp.path().join("win.vhd");
        std::fs::write(&master, b"master").unwrap();
        let tool = FakeTool {
            should_fail: true,
            calls: Cell::new(0),
        };

        let result = ensure_overlay(&tool, tmp.path(), &master, "aa:bb:cc:dd:ee:ff");
        assert_eq!(result, master);
    }
}
