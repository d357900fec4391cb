//! Windows installation records.
//!
//! Each installed Rhino registers a subkey under
//! `HKLM\SOFTWARE\McNeel\Rhinoceros` named after its version (`8.0`,
//! `9.0`, ...). The `Install` subkey of each version holds `CoreDllPath`, the
//! full path of the core library inside the system directory.

use crate::error::InitResult;
use std::path::PathBuf;

/// Registry key listing installed versions.
pub const RHINOCEROS_KEY: &str = r"SOFTWARE\McNeel\Rhinoceros";

/// Value holding the core library path.
pub const CORE_DLL_PATH_VALUE: &str = "CoreDllPath";

/// Read access to the installation records.
pub trait InstallRegistry: Send + Sync {
    /// Version subkey names, in enumeration order.
    fn version_names(&self) -> InitResult<Vec<String>>;

    /// `CoreDllPath` of a version, if recorded.
    fn core_dll_path(&self, version: &str) -> Option<PathBuf>;
}

/// In-memory records, in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    entries: Vec<(String, PathBuf)>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a version and its core library path.
    pub fn with_version(mut self, version: impl Into<String>, core_dll: impl Into<PathBuf>) -> Self {
        self.entries.push((version.into(), core_dll.into()));
        self
    }
}

impl InstallRegistry for StaticRegistry {
    fn version_names(&self) -> InitResult<Vec<String>> {
        Ok(self.entries.iter().map(|(v, _)| v.clone()).collect())
    }

    fn core_dll_path(&self, version: &str) -> Option<PathBuf> {
        self.entries
            .iter()
            .rev()
            .find(|(v, _)| v == version)
            .map(|(_, p)| p.clone())
    }
}

#[cfg(windows)]
pub use self::windows::WindowsRegistry;

#[cfg(windows)]
mod windows {
    use super::{InstallRegistry, CORE_DLL_PATH_VALUE, RHINOCEROS_KEY};
    use crate::error::InitResult;
    use std::path::PathBuf;
    use tracing::debug;
    use winreg::enums::HKEY_LOCAL_MACHINE;
    use winreg::RegKey;

    /// Records read from `HKEY_LOCAL_MACHINE`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct WindowsRegistry;

    impl InstallRegistry for WindowsRegistry {
        fn version_names(&self) -> InitResult<Vec<String>> {
            let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
            let base = match hklm.open_subkey(RHINOCEROS_KEY) {
                Ok(key) => key,
                Err(e) => {
                    debug!("No Rhinoceros key in HKLM: {}", e);
                    return Ok(Vec::new());
                }
            };

            Ok(base.enum_keys().filter_map(Result::ok).collect())
        }

        fn core_dll_path(&self, version: &str) -> Option<PathBuf> {
            let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
            let install = hklm
                .open_subkey(format!(r"{RHINOCEROS_KEY}\{version}\Install"))
                .ok()?;
            install
                .get_value::<String, _>(CORE_DLL_PATH_VALUE)
                .ok()
                .map(PathBuf::from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_registry_keeps_order() {
        let registry = StaticRegistry::new()
            .with_version("9.0", "C:/Rhino 9/System/RhinoCore.dll")
            .with_version("8.0", "C:/Rhino 8/System/RhinoCore.dll");

        assert_eq!(registry.version_names().unwrap(), vec!["9.0", "8.0"]);
        assert_eq!(
            registry.core_dll_path("8.0"),
            Some(PathBuf::from("C:/Rhino 8/System/RhinoCore.dll"))
        );
        assert!(registry.core_dll_path("7.0").is_none());
    }
}
