//! Installed Rhino discovery.
//!
//! Windows installations are enumerated from the installation registry;
//! macOS installations are application bundles named `Rhino <N>.app` found
//! in a list of search roots (`/Applications`, then `~/Applications`).
//!
//! Both searches accept a major version and a `use_latest` flag. With
//! `use_latest` unset only an installation whose major version equals the
//! requested one is accepted. With it set the highest version wins; on ties
//! the candidate enumerated last wins.

use crate::error::{InitError, InitResult};
use crate::install_registry::InstallRegistry;
use crate::MIN_SUPPORTED_MAJOR;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Operating system an installation was found for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    Windows,
    MacOs,
    Other,
}

impl PlatformKind {
    /// Platform of the running process.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            PlatformKind::Windows
        } else if cfg!(target_os = "macos") {
            PlatformKind::MacOs
        } else {
            PlatformKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Windows => "windows",
            PlatformKind::MacOs => "macos",
            PlatformKind::Other => std::env::consts::OS,
        }
    }
}

/// An installation seen during a search.
#[derive(Debug, Clone, Serialize)]
pub struct InstallationCandidate {
    /// Registry version name or bundle directory name.
    pub version_name: String,

    /// Parsed version number.
    pub version: f64,

    /// Integral major version.
    pub major: u32,

    /// Windows: the directory containing the core library.
    /// macOS: the application bundle.
    pub root_path: PathBuf,

    /// Core library recorded for the installation (Windows only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_library: Option<PathBuf>,

    pub platform: PlatformKind,
}

impl InstallationCandidate {
    /// Check whether the installation still exists on disk.
    pub fn is_present(&self) -> bool {
        match &self.core_library {
            Some(core) => core.is_file(),
            None => self.root_path.is_dir(),
        }
    }

    /// Canonical system directory of this installation.
    pub fn system_directory(&self) -> PathBuf {
        match self.platform {
            PlatformKind::MacOs => self.root_path.join("Contents").join("Frameworks"),
            _ => self.root_path.clone(),
        }
    }
}

/// Parse a registry version name such as `8.0` or `10.1`.
///
/// Rust's float parser does not depend on the process locale, so `8.0`
/// parses the same everywhere.
pub fn parse_version_name(name: &str) -> Option<f64> {
    let value: f64 = name.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// Enumerate Windows installations of a supported version.
pub fn windows_candidates(registry: &dyn InstallRegistry) -> InitResult<Vec<InstallationCandidate>> {
    let mut candidates = Vec::new();

    for name in registry.version_names()? {
        let Some(version) = parse_version_name(&name) else {
            debug!("Skipping registry key {:?}: not a version", name);
            continue;
        };

        if version < MIN_SUPPORTED_MAJOR as f64 {
            debug!("Skipping Rhino {}: older than {}", name, MIN_SUPPORTED_MAJOR);
            continue;
        }

        let Some(core) = registry.core_dll_path(&name) else {
            warn!("Rhino {} has no {} value", name, crate::install_registry::CORE_DLL_PATH_VALUE);
            continue;
        };

        let Some(root) = core.parent().map(Path::to_path_buf) else {
            warn!("Rhino {} records an invalid core path {:?}", name, core);
            continue;
        };

        candidates.push(InstallationCandidate {
            version_name: name,
            version,
            major: version.floor() as u32,
            root_path: root,
            core_library: Some(core),
            platform: PlatformKind::Windows,
        });
    }

    Ok(candidates)
}

/// Find the system directory of a Windows installation.
pub fn find_windows(
    registry: &dyn InstallRegistry,
    min_major: u32,
    use_latest: bool,
) -> InitResult<PathBuf> {
    let mut candidates: Vec<(usize, InstallationCandidate)> = windows_candidates(registry)?
        .into_iter()
        .enumerate()
        .filter(|(_, c)| use_latest || c.major == min_major)
        .collect();

    // Highest version first; among equal versions the later record first.
    candidates.sort_by(|(ia, a), (ib, b)| {
        b.version
            .partial_cmp(&a.version)
            .unwrap_or(Ordering::Equal)
            .then(ib.cmp(ia))
    });

    for (_, candidate) in candidates {
        if candidate.is_present() {
            info!(
                "Found Rhino {} at {:?}",
                candidate.version_name, candidate.root_path
            );
            return Ok(candidate.system_directory());
        }
        warn!(
            "Rhino {} is registered but {:?} is missing",
            candidate.version_name, candidate.core_library
        );
    }

    Err(not_found(min_major, use_latest))
}

fn bundle_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^rhino (?P<ver>\d+)\.app$").ok())
        .as_ref()
}

/// Enumerate `Rhino <N>.app` bundles under the given roots.
///
/// Roots are visited in order and entries within a root by name, so the
/// result is stable for an unchanged filesystem.
pub fn macos_candidates<P: AsRef<Path>>(search_paths: &[P]) -> Vec<InstallationCandidate> {
    let mut candidates = Vec::new();
    let Some(pattern) = bundle_pattern() else {
        return candidates;
    };

    for root in search_paths {
        let root = root.as_ref();
        let entries = match std::fs::read_dir(root) {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to read applications directory {:?}: {}", root, e);
                continue;
            }
        };

        let mut bundles: Vec<(String, PathBuf)> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                Some((name, entry.path()))
            })
            .collect();
        bundles.sort();

        for (name, path) in bundles {
            let Some(caps) = pattern.captures(&name) else {
                continue;
            };
            let Ok(major) = caps["ver"].parse::<u32>() else {
                continue;
            };

            debug!("Found bundle {:?} (version {})", path, major);
            candidates.push(InstallationCandidate {
                version_name: name,
                version: major as f64,
                major,
                root_path: path,
                core_library: None,
                platform: PlatformKind::MacOs,
            });
        }
    }

    candidates
}

/// Find the system directory of a macOS installation.
///
/// The running maximum for `use_latest` starts at `min_major`, so bundles
/// older than `min_major` are never picked.
pub fn find_macos<P: AsRef<Path>>(
    search_paths: &[P],
    min_major: u32,
    use_latest: bool,
) -> InitResult<PathBuf> {
    let mut found: Option<InstallationCandidate> = None;

    for candidate in macos_candidates(search_paths) {
        let floor = found.as_ref().map_or(min_major, |f| f.major);
        let accept = if use_latest {
            candidate.major >= floor
        } else {
            candidate.major == min_major
        };

        if accept {
            found = Some(candidate);
        }
    }

    match found {
        Some(candidate) if candidate.major >= min_major => {
            info!("Found Rhino {} at {:?}", candidate.major, candidate.root_path);
            Ok(candidate.system_directory())
        }
        _ => Err(not_found(min_major, use_latest)),
    }
}

/// Default macOS search roots: `/Applications` and `~/Applications` when it
/// exists.
pub fn default_macos_roots() -> Vec<PathBuf> {
    let mut roots = vec![PathBuf::from("/Applications")];

    if let Some(dirs) = directories::BaseDirs::new() {
        let user_apps = dirs.home_dir().join("Applications");
        if user_apps.is_dir() {
            roots.push(user_apps);
        }
    }

    roots
}

fn not_found(min_major: u32, use_latest: bool) -> InitError {
    if use_latest {
        InitError::InstallationNotFound(format!("no Rhino >= {min_major} installed"))
    } else {
        InitError::InstallationNotFound(format!("no Rhino {min_major} installed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install_registry::StaticRegistry;
    use tempfile::TempDir;

    fn create_bundles(temp: &TempDir) -> Vec<PathBuf> {
        let system = temp.path().join("System");
        let user = temp.path().join("User");
        for dir in [
            system.join("Rhinoceros.app"),
            system.join("Rhino 7.app"),
            system.join("Rhino 8.app"),
            system.join("Rhino 9.app"),
            user.join("Rhino 10.app"),
        ] {
            std::fs::create_dir_all(dir).unwrap();
        }
        vec![system, user]
    }

    fn create_core(temp: &TempDir, version: &str) -> PathBuf {
        let system = temp.path().join(format!("Rhino {version}")).join("System");
        std::fs::create_dir_all(&system).unwrap();
        let core = system.join("RhinoCore.dll");
        std::fs::write(&core, b"").unwrap();
        core
    }

    #[test]
    fn test_find_major_macos() {
        let temp = TempDir::new().unwrap();
        let roots = create_bundles(&temp);

        for major in [8, 9, 10] {
            let path = find_macos(&roots, major, false).unwrap();
            assert!(path.ends_with(format!("Rhino {major}.app/Contents/Frameworks")));
        }
    }

    #[test]
    fn test_find_latest_macos() {
        let temp = TempDir::new().unwrap();
        let roots = create_bundles(&temp);

        for major in [8, 9, 10] {
            let path = find_macos(&roots, major, true).unwrap();
            assert!(path.ends_with("User/Rhino 10.app/Contents/Frameworks"));
        }
    }

    #[test]
    fn test_latest_seeded_at_min_major() {
        let temp = TempDir::new().unwrap();
        let roots = create_bundles(&temp);

        assert!(matches!(
            find_macos(&roots, 11, true),
            Err(InitError::InstallationNotFound(_))
        ));
    }

    #[test]
    fn test_bundle_match_is_case_insensitive() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("rhino 9.APP")).unwrap();

        let path = find_macos(&[temp.path()], 9, false).unwrap();
        assert!(path.ends_with("rhino 9.APP/Contents/Frameworks"));
    }

    #[test]
    fn test_macos_missing_root_is_skipped() {
        let temp = TempDir::new().unwrap();
        let mut roots = create_bundles(&temp);
        roots.insert(0, temp.path().join("does-not-exist"));

        assert!(find_macos(&roots, 9, false).is_ok());
    }

    #[test]
    fn test_find_windows_exact_and_latest() {
        let temp = TempDir::new().unwrap();
        let registry = StaticRegistry::new()
            .with_version("8.0", create_core(&temp, "8"))
            .with_version("9.0", create_core(&temp, "9"))
            .with_version("10.0", create_core(&temp, "10"));

        let exact = find_windows(&registry, 9, false).unwrap();
        assert!(exact.ends_with("Rhino 9/System"));

        let latest = find_windows(&registry, 9, true).unwrap();
        assert!(latest.ends_with("Rhino 10/System"));
    }

    #[test]
    fn test_find_windows_never_below_min_major() {
        let temp = TempDir::new().unwrap();
        let registry = StaticRegistry::new()
            .with_version("8.0", create_core(&temp, "8"))
            .with_version("10.0", create_core(&temp, "10"));

        assert!(matches!(
            find_windows(&registry, 9, false),
            Err(InitError::InstallationNotFound(_))
        ));
    }

    #[test]
    fn test_find_windows_skips_old_and_missing() {
        let temp = TempDir::new().unwrap();
        let registry = StaticRegistry::new()
            .with_version("7.0", create_core(&temp, "7"))
            .with_version("8.0", temp.path().join("gone/System/RhinoCore.dll"))
            .with_version("8.1", create_core(&temp, "8.1"))
            .with_version("not-a-version", create_core(&temp, "x"));

        let path = find_windows(&registry, 8, false).unwrap();
        assert!(path.ends_with("Rhino 8.1/System"));

        let candidates = windows_candidates(&registry).unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.major == 8));
    }

    #[test]
    fn test_find_windows_tie_prefers_last_record() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        for dir in [&first, &second] {
            std::fs::create_dir_all(dir).unwrap();
            std::fs::write(dir.join("RhinoCore.dll"), b"").unwrap();
        }
        let registry = StaticRegistry::new()
            .with_version("9.0", first.join("RhinoCore.dll"))
            .with_version(" 9.0", second.join("RhinoCore.dll"));

        assert_eq!(find_windows(&registry, 9, true).unwrap(), second);
    }

    #[test]
    fn test_parse_version_name() {
        assert_eq!(parse_version_name("8.0"), Some(8.0));
        assert_eq!(parse_version_name(" 10.25 "), Some(10.25));
        assert_eq!(parse_version_name("8,0"), None);
        assert_eq!(parse_version_name("NaN"), None);
    }
}
