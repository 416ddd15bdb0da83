//! Enumeration of the ISO and virtual-disk trees.
//!
//! All listing operations are careful to treat an out-of-tree `subpath`
//! (one that escapes `root` via `..` or a symlink) as an empty directory
//! rather than an error: a browsable admin UI should never be able to
//! walk outside the configured asset roots.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Extensions recognized as bootable ISO images.
pub const ISO_EXTENSIONS: &[&str] = &["iso"];
/// Extensions recognized as virtual disks.
pub const VHD_EXTENSIONS: &[&str] = &["vhd", "qcow2", "img"];

/// A file entry returned by [`list`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileEntry {
    /// The file's bare name, including extension.
    pub name: String,
    /// Tree-relative path, forward-slash separated.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// `name` with its extension stripped.
    pub label: String,
}

/// A directory entry returned by [`list`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DirEntry {
    /// The directory's bare name.
    pub name: String,
    /// Tree-relative path, forward-slash separated.
    pub path: String,
}

/// A scanned master asset: its path relative to its root, and the
/// absolute path on disk used as an iSCSI `backing-store` or an `initrd`
/// source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedAsset {
    /// Tree-relative path, forward-slash separated.
    pub path: String,
    /// Absolute filesystem path.
    pub full_path: PathBuf,
}

fn join_rel(sub_path: &str, name: &str) -> String {
    if sub_path.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", sub_path.trim_end_matches('/'), name)
    }
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let lower = name.to_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

/// List the direct children of `root/sub_path`, split into files and
/// directories, each sorted by lowercased name.
///
/// Returns `([], [])` if `sub_path` resolves outside `root` (traversal
/// attempt) or if the resolved directory does not exist. No extension
/// filtering is applied here; callers filter by kind.
pub fn list(root: &Path, sub_path: &str) -> (Vec<FileEntry>, Vec<DirEntry>) {
    let target = root.join(sub_path);

    let root_canon = match fs::canonicalize(root) {
        Ok(p) => p,
        Err(_) => return (Vec::new(), Vec::new()),
    };
    let target_canon = match fs::canonicalize(&target) {
        Ok(p) => p,
        Err(_) => return (Vec::new(), Vec::new()),
    };
    if !target_canon.starts_with(&root_canon) {
        return (Vec::new(), Vec::new());
    }

    let mut files = Vec::new();
    let mut dirs = Vec::new();

    let entries = match fs::read_dir(&target_canon) {
        Ok(e) => e,
        Err(_) => return (Vec::new(), Vec::new()),
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        // Follow symlinks, matching the reference's `follow_symlinks=True`.
        let is_dir = if file_type.is_symlink() {
            entry.path().is_dir()
        } else {
            file_type.is_dir()
        };
        let is_file = if file_type.is_symlink() {
            entry.path().is_file()
        } else {
            file_type.is_file()
        };

        let rel_path = join_rel(sub_path, &name);
        if is_dir {
            dirs.push(DirEntry {
                name,
                path: rel_path,
            });
        } else if is_file {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let label = Path::new(&name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone());
            files.push(FileEntry {
                name,
                path: rel_path,
                size,
                label,
            });
        }
    }

    files.sort_by_key(|f| f.name.to_lowercase());
    dirs.sort_by_key(|d| d.name.to_lowercase());
    (files, dirs)
}

/// Shallow (non-recursive into subdirectories) scan of `root`, keeping
/// only entries whose name carries one of `extensions`.
fn scan_root(root: &Path, extensions: &[&str]) -> Vec<ScannedAsset> {
    let (files, _dirs) = list(root, "");
    files
        .into_iter()
        .filter(|f| has_extension(&f.name, extensions))
        .map(|f| ScannedAsset {
            full_path: root.join(&f.path),
            path: f.path,
        })
        .collect()
}

/// Scan the VHD root for canonical virtual-disk files.
pub fn scan_vhds(vhd_root: &Path) -> Vec<ScannedAsset> {
    scan_root(vhd_root, VHD_EXTENSIONS)
}

/// Scan the ISO root for `.iso` files.
pub fn scan_isos(iso_root: &Path) -> Vec<ScannedAsset> {
    scan_root(iso_root, ISO_EXTENSIONS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir, write};

    #[test]
    fn lists_files_and_dirs_sorted_case_insensitively() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path().join("Bravo.iso"), b"x").unwrap();
        write(tmp.path().join("alpha.iso"), b"x").unwrap();
        create_dir(tmp.path().join("Zeta")).unwrap();
        create_dir(tmp.path().join("alpha_dir")).unwrap();

        let (files, dirs) = list(tmp.path(), "");
        assert_eq!(files.iter().map(|f| &f.name).collect::<Vec<_>>(), vec!["alpha.iso", "Bravo.iso"]);
        assert_eq!(dirs.iter().map(|d| &d.name).collect::<Vec<_>>(), vec!["alpha_dir", "Zeta"]);
    }

    #[test]
    fn traversal_outside_root_yields_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let (files, dirs) = list(tmp.path(), "../../etc");
        assert!(files.is_empty());
        assert!(dirs.is_empty());
    }

    #[test]
    fn missing_directory_yields_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let (files, dirs) = list(tmp.path(), "does-not-exist");
        assert!(files.is_empty());
        assert!(dirs.is_empty());
    }

    #[test]
    fn scan_vhds_filters_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path().join("win.vhd"), b"x").unwrap();
        write(tmp.path().join("linux.qcow2"), b"x").unwrap();
        write(tmp.path().join("notes.txt"), b"x").unwrap();

        let mut assets = scan_vhds(tmp.path());
        assets.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].path, "linux.qcow2");
        assert_eq!(assets[1].path, "win.vhd");
    }

    #[test]
    fn label_strips_extension() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path().join("ubuntu.iso"), b"x").unwrap();
        let (files, _) = list(tmp.path(), "");
        assert_eq!(files[0].label, "ubuntu");
    }
}
