//! IQN and iPXE label derivation.
//!
//! These are pure functions: given a `(kind, path)` or `(mac, path)` pair
//! they deterministically produce an iSCSI Qualified Name or a short
//! iPXE-legal label identifier. Nothing here touches the filesystem.

/// The IQN naming authority date-and-domain prefix used by every target
/// this controller emits.
const IQN_PREFIX: &str = "iqn.2024-01.com.pxeserver";

/// Lowercase `path` and replace each of `/`, `\`, `_`, `.` with `-`.
///
/// Idempotent: `asset_safe_name(&asset_safe_name(p))  == asset_safe_name(p)`,
/// since the output alphabet (lowercase ascii, digits, `-`) contains none of
/// the characters being replaced.
pub fn asset_safe_name(path: &str) -> String {
    path.to_lowercase()
        .replace('/', "-")
        .replace('\\', "-")
        .replace('_', "-")
        .replace('.', "-")
}

/// Strip `:` separators from a lowercased MAC address.
pub fn mac_compact(mac: &str) -> String {
    mac.to_lowercase().replace(':', "")
}

/// Normalize a MAC address as supplied by a client: lowercase, and fold
/// `-` separators to `:` so `AA-BB-CC-DD-EE-FF` and `aa:bb:cc:dd:ee:ff`
/// compare equal.
pub fn normalize_mac(mac: &str) -> String {
    mac.to_lowercase().replace('-', ":")
}

/// The IQN of a read-only master virtual disk, addressed by its
/// tree-relative path under the VHD root.
pub fn master_iqn(vhd_path: &str) -> String {
    format!("{IQN_PREFIX}:{}", asset_safe_name(vhd_path))
}

/// The IQN of a per-client copy-on-write overlay over `image`.
///
/// Disjoint from every [`master_iqn`] suffix by construction: the suffix
/// always contains exactly one `:`, which no `asset_safe_name` output can
/// ever contain.
pub fn client_iqn(mac: &str, image: &str) -> String {
    format!(
        "{IQN_PREFIX}:{}:{}",
        mac_compact(mac),
        asset_safe_name(image)
    )
}

/// The namespace an iPXE menu label belongs to: directories and files,
/// under either asset root, each get a disjoint label prefix so that
/// `item`/`:label` pairs never collide across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// A subdirectory under the ISO root.
    DirIso,
    /// A subdirectory under the VHD root.
    DirVhd,
    /// An ISO file.
    Iso,
    /// A virtual disk file.
    Vhd,
}

impl LabelKind {
    fn prefix(self) -> &'static str {
        match self {
            LabelKind::DirIso => "dir_iso",
            LabelKind::DirVhd => "dir_vhd",
            LabelKind::Iso => "iso",
            LabelKind::Vhd => "vhd",
        }
    }
}

/// FNV-1a, 32-bit. Not cryptographic; chosen only for a short, stable,
/// always-non-negative hex digest suitable as an iPXE label suffix.
fn fnv1a32(data: &[u8]) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    data.iter().fold(OFFSET, |hash, &byte| {
        (hash ^ byte as u32).wrapping_mul(PRIME)
    })
}

/// A short, stable, iPXE-legal label identifier for `path` within `kind`'s
/// namespace. The same `(kind, path)` always yields the same label within
/// and across processes, so a menu's `item X …` line and its `:X` handler
/// block always agree.
pub fn menu_label(kind: LabelKind, path: &str) -> String {
    format!("{}_{:08x}", kind.prefix(), fnv1a32(path.as_bytes()))
}
