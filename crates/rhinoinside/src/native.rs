//! Native library loading.

use crate::error::BridgeError;
use libloading::Library;
use std::ffi::c_void;
use std::fmt;
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A loaded native library.
pub trait NativeModule: Send + Sync {
    /// Path (or bare name) the library was opened with.
    fn path(&self) -> &Path;

    /// Address of an exported symbol.
    fn symbol(&self, name: &str) -> Option<*mut c_void>;
}

/// Shared handle to a loaded native library.
#[derive(Clone)]
pub struct NativeHandle(Arc<dyn NativeModule>);

impl NativeHandle {
    pub fn new(module: Arc<dyn NativeModule>) -> Self {
        Self(module)
    }

    pub fn path(&self) -> &Path {
        self.0.path()
    }

    pub fn symbol(&self, name: &str) -> Option<*mut c_void> {
        self.0.symbol(name)
    }

    /// Check whether two handles refer to the same loaded library.
    pub fn same_library(&self, other: &NativeHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeHandle").field(&self.path()).finish()
    }
}

/// Opens native libraries.
pub trait LibraryLoader: Send + Sync {
    /// Open a library by path, or by bare name through the platform search.
    fn open(&self, path: &Path) -> Result<NativeHandle, BridgeError>;
}

/// Loader backed by the platform dynamic linker.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLoader;

impl LibraryLoader for SystemLoader {
    fn open(&self, path: &Path) -> Result<NativeHandle, BridgeError> {
        debug!("Loading native library {:?}", path);
        // SAFETY: Rhino libraries run their initializers on load; loading them
        // is the point of this crate.
        let library = unsafe { Library::new(path) }.map_err(|e| BridgeError::Library {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(NativeHandle::new(Arc::new(DynamicLibrary {
            path: path.to_path_buf(),
            library: ManuallyDrop::new(library),
        })))
    }
}

/// A library opened by [`SystemLoader`].
///
/// Never unloaded: native code keeps raw pointers into it.
struct DynamicLibrary {
    path: PathBuf,
    library: ManuallyDrop<Library>,
}

impl NativeModule for DynamicLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &str) -> Option<*mut c_void> {
        // SAFETY: the symbol is only read as an address here; callers cast it
        // through the export table.
        let symbol = unsafe { self.library.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        let address = *symbol;
        (!address.is_null()).then_some(address)
    }
}
