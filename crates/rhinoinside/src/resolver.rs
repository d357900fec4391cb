//! Resolution hooks redirecting library loads into the Rhino installation.
//!
//! Three hooks are installed once the bridge is up:
//!
//! - unmanaged library resolution for this component's load context, backed
//!   by a per-name cache that also remembers misses
//! - assembly resolution by simple name, searching the core and plugin
//!   folders of the installation
//! - an assembly-loaded observer attaching the unmanaged resolver to
//!   assemblies loaded in other contexts
//!
//! The hooks may run concurrently on any runtime thread.

use crate::native::{LibraryLoader, NativeHandle};
use crate::platform::{PlatformStrategy, NETCORE_DIR};
use crate::runtime::{
    ContextId, LoadContext, ManagedRuntime, ModuleInfo, ModuleRef, NativeResolveHook,
};
use dashmap::DashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Assembly file extensions, in priority order.
pub const MANAGED_EXTENSIONS: [&str; 3] = ["dll", "rhp", "gha"];

/// Extension probed for unmanaged libraries.
pub const NATIVE_EXTENSION: &str = "dll";

/// Satellite resource assemblies end with this suffix.
pub const RESOURCE_SUFFIX: &str = ".resources";

/// Must stay in the default context: Xamarin initialization looks for it
/// there.
pub const DEFAULT_CONTEXT_ONLY: &str = "Microsoft.macOS";

/// Grasshopper folder inside a plugin root.
pub const GRASSHOPPER_DIR: &str = "Grasshopper";

/// Grasshopper component folder inside [`GRASSHOPPER_DIR`].
pub const COMPONENTS_DIR: &str = "Components";

/// Find `<dir>/<name>.<ext>` for the first extension that exists.
pub fn find_in_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    MANAGED_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{name}.{ext}")))
        .find(|file| file.is_file())
}

/// Search directories derived from the system directory.
#[derive(Clone)]
pub struct SearchPaths {
    platform: Arc<dyn PlatformStrategy>,
    system_dir: PathBuf,
    own_dir: Option<PathBuf>,
}

impl SearchPaths {
    /// `own_dir` is the directory of this component's assembly.
    pub fn new(
        platform: Arc<dyn PlatformStrategy>,
        system_dir: impl Into<PathBuf>,
        own_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            platform,
            system_dir: system_dir.into(),
            own_dir,
        }
    }

    pub fn system_dir(&self) -> &Path {
        &self.system_dir
    }

    pub fn platform(&self) -> &dyn PlatformStrategy {
        self.platform.as_ref()
    }

    /// Directories probed for an unmanaged library requested by `requesting`.
    pub fn native_dirs(&self, requesting: &ModuleInfo) -> Vec<PathBuf> {
        let mut dirs = Vec::with_capacity(3);
        if let Some(dir) = requesting.directory() {
            dirs.push(dir.to_path_buf());
        }
        dirs.push(self.system_dir.join(NETCORE_DIR));
        dirs.push(self.system_dir.clone());
        dirs
    }

    /// Directories probed for assemblies, in order.
    pub fn managed_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.platform.managed_roots(&self.system_dir);

        for root in self.platform.plugin_roots(&self.system_dir) {
            let grasshopper = root.join(GRASSHOPPER_DIR);
            let components = grasshopper.join(COMPONENTS_DIR);
            dirs.push(root);
            dirs.push(grasshopper);
            dirs.push(components);
        }

        if let Some(own) = &self.own_dir {
            dirs.push(own.clone());
        }
        dirs
    }

    /// First assembly file named `name` along [`managed_dirs`](Self::managed_dirs).
    pub fn find_managed(&self, name: &str) -> Option<PathBuf> {
        self.managed_dirs()
            .iter()
            .find_map(|dir| find_in_dir(dir, name))
    }
}

impl fmt::Debug for SearchPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchPaths")
            .field("platform", &self.platform.kind())
            .field("system_dir", &self.system_dir)
            .field("own_dir", &self.own_dir)
            .finish()
    }
}

/// Result slot for one library name, filled once.
type Slot = Arc<OnceLock<Option<NativeHandle>>>;

/// Unmanaged libraries resolved so far, including misses.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: DashMap<String, Slot>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `name`: `Some(None)` is a remembered miss. `None`
    /// while the name is unknown or still being resolved.
    pub fn get(&self, name: &str) -> Option<Option<NativeHandle>> {
        self.entries
            .get(name)
            .and_then(|entry| entry.value().get().cloned())
    }

    /// Return the cached result or compute it. Concurrent callers for the
    /// same name wait for the first one; `resolve` runs at most once per name.
    ///
    /// The map shard is only locked to find the slot, so `resolve` may itself
    /// resolve other names.
    pub fn get_or_resolve<F>(&self, name: &str, resolve: F) -> Option<NativeHandle>
    where
        F: FnOnce() -> Option<NativeHandle>,
    {
        let existing = self.entries.get(name).map(|entry| Arc::clone(entry.value()));
        let slot: Slot = match existing {
            Some(slot) => slot,
            None => Arc::clone(self.entries.entry(name.to_string()).or_default().value()),
        };
        slot.get_or_init(resolve).clone()
    }

    /// Check whether `name` has a settled result.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of names with a settled result.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The resolution hooks and their shared state.
pub struct ResolutionHookRegistry {
    search: SearchPaths,
    loader: Arc<dyn LibraryLoader>,
    cache: ResolutionCache,
    own_context: OnceLock<ContextId>,
}

impl ResolutionHookRegistry {
    pub fn new(search: SearchPaths, loader: Arc<dyn LibraryLoader>) -> Self {
        Self {
            search,
            loader,
            cache: ResolutionCache::new(),
            own_context: OnceLock::new(),
        }
    }

    pub fn search_paths(&self) -> &SearchPaths {
        &self.search
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Load context the hooks were installed on.
    pub fn own_context(&self) -> Option<ContextId> {
        self.own_context.get().copied()
    }

    /// Resolve an unmanaged library requested by `requesting`.
    pub fn resolve_native(&self, name: &str, requesting: &ModuleInfo) -> Option<NativeHandle> {
        self.cache
            .get_or_resolve(name, || self.probe_native(name, requesting))
    }

    fn probe_native(&self, name: &str, requesting: &ModuleInfo) -> Option<NativeHandle> {
        for dir in self.search.native_dirs(requesting) {
            let file = dir.join(format!("{name}.{NATIVE_EXTENSION}"));
            if !file.is_file() {
                continue;
            }

            return match self.loader.open(&file) {
                Ok(handle) => {
                    debug!("Resolved native library {} to {:?}", name, file);
                    Some(handle)
                }
                Err(e) => {
                    warn!("Failed to load native library {}: {}", name, e);
                    None
                }
            };
        }

        debug!("Native library {} not found in Rhino folders", name);
        None
    }

    /// Platform specific resolution used when the generic probe misses.
    pub fn resolve_native_fallback(&self, name: &str) -> Option<NativeHandle> {
        if name.is_empty() {
            return None;
        }
        self.search
            .platform()
            .native_fallback(self.search.system_dir(), name, self.loader.as_ref())
    }

    /// Resolve an assembly by simple name and load it into `context`.
    pub fn resolve_managed(&self, context: &dyn LoadContext, name: &str) -> Option<ModuleRef> {
        if is_excluded(name) {
            return None;
        }

        let path = self.search.find_managed(name)?;
        match context.load_from_path(&path) {
            Ok(module) => {
                debug!("Resolved assembly {} to {:?}", name, path);
                Some(module)
            }
            Err(e) => {
                warn!("Failed to load assembly {} from {:?}: {}", name, path, e);
                None
            }
        }
    }

    /// Attach the unmanaged resolver to an assembly loaded elsewhere.
    pub fn on_module_loaded(self: &Arc<Self>, runtime: &dyn ManagedRuntime, module: &ModuleInfo) {
        if module.is_dynamic || Some(module.context) == self.own_context() {
            return;
        }
        debug!("Attaching native resolver to {}", module.name);
        runtime.set_native_resolver(module, self.native_hook());
    }

    /// The unmanaged resolver as a runtime hook: generic probe, then the
    /// platform fallback.
    pub fn native_hook(self: &Arc<Self>) -> NativeResolveHook {
        let registry = Arc::clone(self);
        Arc::new(move |name: &str, requesting: &ModuleInfo| {
            registry
                .resolve_native(name, requesting)
                .or_else(|| registry.resolve_native_fallback(name))
        })
    }

    /// Subscribe all hooks. Returns the context the resolvers were attached to.
    pub fn install(self: &Arc<Self>, runtime: &Arc<dyn ManagedRuntime>) -> ContextId {
        let own = runtime.own_module();
        let context = runtime.load_context_of(&own);
        let context_id = context.id();
        if self.own_context.set(context_id).is_err() {
            warn!("Resolution hooks installed more than once");
        }

        context.on_resolving_unmanaged(self.native_hook());

        let registry = Arc::clone(self);
        context.on_resolving(Arc::new(move |ctx: &dyn LoadContext, name: &str| {
            registry.resolve_managed(ctx, name)
        }));

        let registry = Arc::clone(self);
        let weak_runtime = Arc::downgrade(runtime);
        runtime.on_module_loaded(Arc::new(move |module: &ModuleInfo| {
            if let Some(runtime) = weak_runtime.upgrade() {
                registry.on_module_loaded(runtime.as_ref(), module);
            }
        }));

        info!(
            "Resolving Rhino assemblies from {:?}",
            self.search.system_dir()
        );
        context_id
    }
}

impl fmt::Debug for ResolutionHookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionHookRegistry")
            .field("search", &self.search)
            .field("cached", &self.cache.len())
            .field("own_context", &self.own_context.get())
            .finish()
    }
}

fn is_excluded(name: &str) -> bool {
    name.is_empty()
        || name.to_ascii_lowercase().ends_with(RESOURCE_SUFFIX)
        || name == DEFAULT_CONTEXT_ONLY
}
