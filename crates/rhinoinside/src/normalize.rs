//! Installation path normalization.
//!
//! Users may pass either an installation root (`C:/Program Files/Rhino 8`,
//! `/Applications/Rhino 8.app`) or the system directory itself. These
//! functions map both forms onto the system directory and leave an already
//! normalized path unchanged.

use std::path::{Path, PathBuf};

/// Windows system directory name.
pub const WINDOWS_SYSTEM_DIR: &str = "System";

/// Library that only exists inside the Windows system directory.
pub const WINDOWS_BRIDGE_LIBRARY: &str = "RhinoLibrary.dll";

/// Application bundle suffix on macOS.
pub const MACOS_BUNDLE_SUFFIX: &str = ".app";

/// True for an empty or whitespace-only path.
pub fn is_blank(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}

/// Map a macOS bundle path to `<bundle>/Contents/Frameworks`.
pub fn normalize_macos(path: &Path) -> PathBuf {
    let is_bundle = path
        .file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(MACOS_BUNDLE_SUFFIX)
        })
        .unwrap_or(false);

    if is_bundle {
        path.join("Contents").join("Frameworks")
    } else {
        path.to_path_buf()
    }
}

/// Map a Windows installation root to `<root>/System`.
///
/// A path already named `System`, or one containing the bridge library, is
/// taken to be the system directory.
pub fn normalize_windows(path: &Path) -> PathBuf {
    let is_system = path
        .file_name()
        .map(|name| name.to_string_lossy().eq_ignore_ascii_case(WINDOWS_SYSTEM_DIR))
        .unwrap_or(false);

    if is_system || path.join(WINDOWS_BRIDGE_LIBRARY).is_file() {
        path.to_path_buf()
    } else {
        path.join(WINDOWS_SYSTEM_DIR)
    }
}
