//! Per-platform installation layout.
//!
//! Discovery, path normalization and bridge loading differ between Windows
//! and macOS. Each platform implements [`PlatformStrategy`]; the strategy for
//! the running process is chosen once by [`current`].

use crate::bridge;
use crate::error::{BridgeError, InitError, InitResult};
use crate::finder::{self, InstallationCandidate, PlatformKind};
use crate::install_registry::InstallRegistry;
use crate::native::{LibraryLoader, NativeHandle};
use crate::normalize;
use crate::runtime::ManagedRuntime;
use crate::HOST_MAJOR_VERSION;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Windows plugin folder name.
pub const WINDOWS_PLUGINS_DIR: &str = "Plug-ins";

/// macOS bridge binary, relative to the system directory.
pub const MACOS_BRIDGE_LIBRARY: &str = "RhinoLibrary.framework/Versions/A/RhinoLibrary";

/// Name under which the bridge library is requested on macOS.
pub const MACOS_BRIDGE_NAME: &str = "RhinoLibrary";

/// macOS framework resources holding the core assemblies.
pub const MACOS_FRAMEWORK_RESOURCES: &str = "RhCore.framework/Resources";

/// macOS managed plugin folder, relative to the system directory.
pub const MACOS_MANAGED_PLUGINS: &str = "RhCore.framework/Versions/A/Resources/ManagedPlugIns";

/// Windows folder holding .NET Core specific assemblies.
pub const NETCORE_DIR: &str = "netcore";

/// Platform-specific discovery and loading rules.
pub trait PlatformStrategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> PlatformKind;

    /// Installations visible on this machine.
    fn candidates(&self) -> InitResult<Vec<InstallationCandidate>>;

    /// System directory of the installation matching the version policy.
    fn locate(&self, min_major: u32, use_latest: bool) -> InitResult<PathBuf>;

    /// Map a user supplied path onto the system directory. A blank path
    /// falls back to [`locate`](Self::locate) with the default policy.
    fn normalize(&self, raw: &Path) -> InitResult<PathBuf>;

    /// Load the bridge library, running any host preparation first.
    fn load_bridge(
        &self,
        system_dir: &Path,
        loader: &dyn LibraryLoader,
        runtime: &dyn ManagedRuntime,
    ) -> Result<NativeHandle, BridgeError>;

    /// Directories holding the core assemblies.
    fn managed_roots(&self, system_dir: &Path) -> Vec<PathBuf>;

    /// Plugin folders searched for assemblies.
    fn plugin_roots(&self, system_dir: &Path) -> Vec<PathBuf>;

    /// Resolve a native library the generic probe could not find.
    fn native_fallback(
        &self,
        _system_dir: &Path,
        _name: &str,
        _loader: &dyn LibraryLoader,
    ) -> Option<NativeHandle> {
        None
    }
}

/// Strategy for the running process.
pub fn current() -> Arc<dyn PlatformStrategy> {
    static CURRENT: OnceLock<Arc<dyn PlatformStrategy>> = OnceLock::new();
    CURRENT.get_or_init(select).clone()
}

#[cfg(windows)]
fn select() -> Arc<dyn PlatformStrategy> {
    Arc::new(WindowsPlatform::new(Box::new(
        crate::install_registry::WindowsRegistry,
    )))
}

#[cfg(target_os = "macos")]
fn select() -> Arc<dyn PlatformStrategy> {
    Arc::new(MacPlatform::new(finder::default_macos_roots()))
}

#[cfg(not(any(windows, target_os = "macos")))]
fn select() -> Arc<dyn PlatformStrategy> {
    Arc::new(UnsupportedPlatform)
}

/// Rhino for Windows.
pub struct WindowsPlatform {
    registry: Box<dyn InstallRegistry>,
}

impl WindowsPlatform {
    pub fn new(registry: Box<dyn InstallRegistry>) -> Self {
        Self { registry }
    }
}

impl fmt::Debug for WindowsPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowsPlatform").finish_non_exhaustive()
    }
}

impl PlatformStrategy for WindowsPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Windows
    }

    fn candidates(&self) -> InitResult<Vec<InstallationCandidate>> {
        finder::windows_candidates(self.registry.as_ref())
    }

    fn locate(&self, min_major: u32, use_latest: bool) -> InitResult<PathBuf> {
        finder::find_windows(self.registry.as_ref(), min_major, use_latest)
    }

    fn normalize(&self, raw: &Path) -> InitResult<PathBuf> {
        if normalize::is_blank(raw) {
            return self.locate(HOST_MAJOR_VERSION, false);
        }
        Ok(normalize::normalize_windows(raw))
    }

    fn load_bridge(
        &self,
        system_dir: &Path,
        loader: &dyn LibraryLoader,
        _runtime: &dyn ManagedRuntime,
    ) -> Result<NativeHandle, BridgeError> {
        loader.open(&system_dir.join(normalize::WINDOWS_BRIDGE_LIBRARY))
    }

    fn managed_roots(&self, system_dir: &Path) -> Vec<PathBuf> {
        vec![system_dir.join(NETCORE_DIR), system_dir.to_path_buf()]
    }

    fn plugin_roots(&self, system_dir: &Path) -> Vec<PathBuf> {
        let mut roots = vec![system_dir.join(WINDOWS_PLUGINS_DIR)];
        if let Some(install_root) = system_dir.parent() {
            roots.push(install_root.join(WINDOWS_PLUGINS_DIR));
        }
        roots
    }
}

/// Rhino for Mac.
#[derive(Debug, Clone)]
pub struct MacPlatform {
    search_roots: Vec<PathBuf>,
}

impl MacPlatform {
    /// Strategy scanning `search_roots` for application bundles.
    pub fn new(search_roots: Vec<PathBuf>) -> Self {
        Self { search_roots }
    }

    pub fn search_roots(&self) -> &[PathBuf] {
        &self.search_roots
    }
}

impl PlatformStrategy for MacPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::MacOs
    }

    fn candidates(&self) -> InitResult<Vec<InstallationCandidate>> {
        Ok(finder::macos_candidates(&self.search_roots))
    }

    fn locate(&self, min_major: u32, use_latest: bool) -> InitResult<PathBuf> {
        finder::find_macos(&self.search_roots, min_major, use_latest)
    }

    fn normalize(&self, raw: &Path) -> InitResult<PathBuf> {
        if normalize::is_blank(raw) {
            return self.locate(HOST_MAJOR_VERSION, false);
        }
        Ok(normalize::normalize_macos(raw))
    }

    fn load_bridge(
        &self,
        system_dir: &Path,
        loader: &dyn LibraryLoader,
        runtime: &dyn ManagedRuntime,
    ) -> Result<NativeHandle, BridgeError> {
        bridge::attach_host_handle(system_dir, loader, runtime.domain_id())?;
        loader.open(&system_dir.join(MACOS_BRIDGE_LIBRARY))
    }

    fn managed_roots(&self, system_dir: &Path) -> Vec<PathBuf> {
        vec![system_dir.join(MACOS_FRAMEWORK_RESOURCES)]
    }

    fn plugin_roots(&self, system_dir: &Path) -> Vec<PathBuf> {
        vec![system_dir.join(MACOS_MANAGED_PLUGINS)]
    }

    fn native_fallback(
        &self,
        system_dir: &Path,
        name: &str,
        loader: &dyn LibraryLoader,
    ) -> Option<NativeHandle> {
        if name != MACOS_BRIDGE_NAME {
            return None;
        }
        match loader.open(&system_dir.join(MACOS_BRIDGE_LIBRARY)) {
            Ok(handle) => Some(handle),
            Err(e) => {
                debug!("Bridge fallback for {} failed: {}", name, e);
                None
            }
        }
    }
}

/// Any platform Rhino does not ship for.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPlatform;

impl UnsupportedPlatform {
    fn error() -> InitError {
        InitError::UnsupportedPlatform(PlatformKind::current().as_str().to_string())
    }
}

impl PlatformStrategy for UnsupportedPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Other
    }

    fn candidates(&self) -> InitResult<Vec<InstallationCandidate>> {
        Ok(Vec::new())
    }

    fn locate(&self, _min_major: u32, _use_latest: bool) -> InitResult<PathBuf> {
        Err(Self::error())
    }

    fn normalize(&self, raw: &Path) -> InitResult<PathBuf> {
        if normalize::is_blank(raw) {
            return Err(Self::error());
        }
        Ok(raw.to_path_buf())
    }

    fn load_bridge(
        &self,
        _system_dir: &Path,
        _loader: &dyn LibraryLoader,
        _runtime: &dyn ManagedRuntime,
    ) -> Result<NativeHandle, BridgeError> {
        Err(BridgeError::UnsupportedPlatform(format!(
            "no Rhino bridge library for {}",
            PlatformKind::current().as_str()
        )))
    }

    fn managed_roots(&self, _system_dir: &Path) -> Vec<PathBuf> {
        Vec::new()
    }

    fn plugin_roots(&self, _system_dir: &Path) -> Vec<PathBuf> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install_registry::StaticRegistry;

    #[test]
    fn test_windows_plugin_roots() {
        let platform = WindowsPlatform::new(Box::new(StaticRegistry::new()));
        let roots = platform.plugin_roots(Path::new("C:/Rhino 8/System"));
        assert_eq!(
            roots,
            vec![
                PathBuf::from("C:/Rhino 8/System/Plug-ins"),
                PathBuf::from("C:/Rhino 8/Plug-ins"),
            ]
        );
    }

    #[test]
    fn test_windows_blank_path_locates() {
        let platform = WindowsPlatform::new(Box::new(StaticRegistry::new()));
        assert!(matches!(
            platform.normalize(Path::new(" ")),
            Err(InitError::InstallationNotFound(_))
        ));
    }

    #[test]
    fn test_mac_roots() {
        let platform = MacPlatform::new(Vec::new());
        let system = Path::new("/Applications/Rhino 8.app/Contents/Frameworks");
        assert_eq!(
            platform.managed_roots(system),
            vec![system.join("RhCore.framework/Resources")]
        );
        assert_eq!(
            platform.plugin_roots(system),
            vec![system.join("RhCore.framework/Versions/A/Resources/ManagedPlugIns")]
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let platforms: Vec<Box<dyn PlatformStrategy>> = vec![
            Box::new(WindowsPlatform::new(Box::new(StaticRegistry::new()))),
            Box::new(MacPlatform::new(Vec::new())),
            Box::new(UnsupportedPlatform),
        ];

        for platform in platforms {
            for raw in ["/opt/Rhino 8", "/Applications/Rhino 9.app", "C:/Rhino 8/System"] {
                let once = platform.normalize(Path::new(raw)).unwrap();
                assert_eq!(platform.normalize(&once).unwrap(), once, "{:?}", platform);
            }
        }
    }

    #[test]
    fn test_unsupported_platform() {
        assert!(matches!(
            UnsupportedPlatform.locate(8, false),
            Err(InitError::UnsupportedPlatform(_))
        ));
    }
}
