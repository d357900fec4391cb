//! The embedding .NET runtime, as seen from the bootstrap.
//!
//! The hosting layer implements [`ManagedRuntime`] and [`LoadContext`] on top
//! of its CoreCLR bindings. Hooks registered here stay subscribed for the
//! lifetime of the process and may be invoked from any runtime thread.

use crate::error::RuntimeError;
use crate::native::NativeHandle;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identity of an assembly load context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// An assembly known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Simple assembly name.
    pub name: String,

    /// File the assembly was loaded from. `None` for in-memory assemblies.
    pub location: Option<PathBuf>,

    /// Generated at runtime (Reflection.Emit and friends).
    pub is_dynamic: bool,

    /// Load context owning the assembly.
    pub context: ContextId,
}

impl ModuleInfo {
    /// Directory containing the assembly file.
    pub fn directory(&self) -> Option<&Path> {
        self.location.as_deref().and_then(Path::parent)
    }
}

/// An assembly loaded through a [`LoadContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    pub name: String,
    pub path: PathBuf,
    pub context: ContextId,
}

/// Resolves an unmanaged library name requested by an assembly.
pub type NativeResolveHook = Arc<dyn Fn(&str, &ModuleInfo) -> Option<NativeHandle> + Send + Sync>;

/// Resolves an assembly by simple name inside a load context.
pub type ManagedResolveHook = Arc<dyn Fn(&dyn LoadContext, &str) -> Option<ModuleRef> + Send + Sync>;

/// Observes every assembly loaded into the process.
pub type ModuleLoadedHook = Arc<dyn Fn(&ModuleInfo) + Send + Sync>;

/// An assembly load context.
pub trait LoadContext: Send + Sync {
    fn id(&self) -> ContextId;

    /// Load an assembly file into this context.
    fn load_from_path(&self, path: &Path) -> Result<ModuleRef, RuntimeError>;

    /// Invoke a public static method taking string arguments.
    fn invoke_static(
        &self,
        module: &ModuleRef,
        type_name: &str,
        method: &str,
        args: &[&str],
    ) -> Result<(), RuntimeError>;

    /// Subscribe to unmanaged library resolution failures.
    fn on_resolving_unmanaged(&self, hook: NativeResolveHook);

    /// Subscribe to assembly resolution failures.
    fn on_resolving(&self, hook: ManagedResolveHook);
}

/// The managed runtime hosting this component.
pub trait ManagedRuntime: Send + Sync {
    /// Major version of the runtime (`Environment.Version.Major`).
    fn major_version(&self) -> u32;

    /// Identifier of the current application domain.
    fn domain_id(&self) -> i32;

    /// The assembly this component was loaded as.
    fn own_module(&self) -> ModuleInfo;

    /// Load context owning an assembly.
    fn load_context_of(&self, module: &ModuleInfo) -> Arc<dyn LoadContext>;

    /// The default load context.
    fn default_context(&self) -> Arc<dyn LoadContext>;

    /// Subscribe to assembly loads anywhere in the process.
    fn on_module_loaded(&self, hook: ModuleLoadedHook);

    /// Install the unmanaged import resolver of an assembly.
    fn set_native_resolver(&self, module: &ModuleInfo, hook: NativeResolveHook);
}
