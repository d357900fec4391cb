//! Test doubles for the managed runtime and the native loader.

#![allow(dead_code)]

use rhinoinside::callback::InitializerCallback;
use rhinoinside::runtime::{ManagedResolveHook, ModuleLoadedHook, NativeResolveHook};
use rhinoinside::{
    BridgeError, ContextId, LibraryLoader, LoadContext, ManagedRuntime, ModuleInfo, ModuleRef,
    NativeHandle, NativeModule, RuntimeError,
};
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uguid::Guid;

pub const DEFAULT_CONTEXT: ContextId = ContextId(1);
pub const OWN_CONTEXT: ContextId = ContextId(2);

// ==============================================================================
// Native side
// ==============================================================================

pub static REGISTER_CALLS: AtomicUsize = AtomicUsize::new(0);
pub static HANDLE_SLOT: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
pub static DOMAIN_SLOT: AtomicI32 = AtomicI32::new(0);
pub const FAKE_HOST_HANDLE: usize = 0x5eed;

pub extern "C" fn register_and_call(callback: InitializerCallback) {
    REGISTER_CALLS.fetch_add(1, Ordering::SeqCst);
    callback();
}

pub extern "C" fn register_and_call_twice(callback: InitializerCallback) {
    REGISTER_CALLS.fetch_add(1, Ordering::SeqCst);
    callback();
    callback();
}

pub extern "C" fn get_host_ok(_riid: *const Guid, host: *mut *mut c_void) -> i32 {
    unsafe { *host = FAKE_HOST_HANDLE as *mut c_void };
    0
}

pub extern "C" fn get_host_fails(_riid: *const Guid, host: *mut *mut c_void) -> i32 {
    unsafe { *host = std::ptr::null_mut() };
    0x8000_4005_u32 as i32
}

/// A library whose exports point at test functions.
pub struct FakeLibrary {
    path: PathBuf,
    symbols: HashMap<String, usize>,
}

impl NativeModule for FakeLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &str) -> Option<*mut c_void> {
        self.symbols.get(name).map(|addr| *addr as *mut c_void)
    }
}

/// Loader handing out [`FakeLibrary`] instances and counting opens.
pub struct FakeLoader {
    exports: HashMap<String, HashMap<String, usize>>,
    opened: Mutex<Vec<PathBuf>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            exports: HashMap::new(),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Loader exporting everything a successful bootstrap needs.
    pub fn rhino() -> Self {
        Self::new()
            .with_export("RhinoLibrary.dll", "RhLibRegisterDotNetInitializer", register_and_call as usize)
            .with_export("RhinoLibrary", "RhLibRegisterDotNetInitializer", register_and_call as usize)
            .with_export("libcoreclr.dylib", "GetCLRRuntimeHost", get_host_ok as usize)
            .with_export("libxamarin-dotnet-coreclr.dylib", "coreclr_handle", HANDLE_SLOT.as_ptr() as usize)
            .with_export("libxamarin-dotnet-coreclr.dylib", "coreclr_domainId", DOMAIN_SLOT.as_ptr() as usize)
    }

    /// Export `symbol` from every library whose file name is `file_name`.
    pub fn with_export(mut self, file_name: &str, symbol: &str, address: usize) -> Self {
        self.exports
            .entry(file_name.to_string())
            .or_default()
            .insert(symbol.to_string(), address);
        self
    }

    pub fn without_exports(mut self, file_name: &str) -> Self {
        self.exports.remove(file_name);
        self
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }
}

impl LibraryLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<NativeHandle, BridgeError> {
        if path.is_absolute() && !path.is_file() {
            return Err(BridgeError::Library {
                path: path.to_path_buf(),
                message: "image not found".to_string(),
            });
        }

        self.opened.lock().unwrap().push(path.to_path_buf());
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(NativeHandle::new(Arc::new(FakeLibrary {
            path: path.to_path_buf(),
            symbols: self.exports.get(&file_name).cloned().unwrap_or_default(),
        })))
    }
}

// ==============================================================================
// Managed side
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub module: PathBuf,
    pub type_name: String,
    pub method: String,
    pub args: Vec<String>,
}

/// Load context recording loads, invocations and subscriptions.
pub struct FakeContext {
    id: ContextId,
    pub loaded: Mutex<Vec<PathBuf>>,
    pub invocations: Mutex<Vec<Invocation>>,
    native_hooks: Mutex<Vec<NativeResolveHook>>,
    managed_hooks: Mutex<Vec<ManagedResolveHook>>,
}

impl FakeContext {
    pub fn new(id: ContextId) -> Self {
        Self {
            id,
            loaded: Mutex::new(Vec::new()),
            invocations: Mutex::new(Vec::new()),
            native_hooks: Mutex::new(Vec::new()),
            managed_hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn native_hook_count(&self) -> usize {
        self.native_hooks.lock().unwrap().len()
    }

    pub fn managed_hook_count(&self) -> usize {
        self.managed_hooks.lock().unwrap().len()
    }

    /// Raise the unmanaged resolving event.
    pub fn resolve_unmanaged(&self, name: &str, requesting: &ModuleInfo) -> Option<NativeHandle> {
        let hooks = self.native_hooks.lock().unwrap().clone();
        hooks.iter().find_map(|hook| hook(name, requesting))
    }

    /// Raise the assembly resolving event.
    pub fn resolve(&self, name: &str) -> Option<ModuleRef> {
        let hooks = self.managed_hooks.lock().unwrap().clone();
        hooks.iter().find_map(|hook| hook(self, name))
    }
}

impl LoadContext for FakeContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn load_from_path(&self, path: &Path) -> Result<ModuleRef, RuntimeError> {
        if !path.is_file() {
            return Err(RuntimeError::new(format!("could not load {}", path.display())));
        }
        self.loaded.lock().unwrap().push(path.to_path_buf());
        Ok(ModuleRef {
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            context: self.id,
        })
    }

    fn invoke_static(
        &self,
        module: &ModuleRef,
        type_name: &str,
        method: &str,
        args: &[&str],
    ) -> Result<(), RuntimeError> {
        self.invocations.lock().unwrap().push(Invocation {
            module: module.path.clone(),
            type_name: type_name.to_string(),
            method: method.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        Ok(())
    }

    fn on_resolving_unmanaged(&self, hook: NativeResolveHook) {
        self.native_hooks.lock().unwrap().push(hook);
    }

    fn on_resolving(&self, hook: ManagedResolveHook) {
        self.managed_hooks.lock().unwrap().push(hook);
    }
}

/// Runtime with a default context and a separate context for this crate.
pub struct FakeRuntime {
    pub major: u32,
    pub domain: i32,
    pub own: ModuleInfo,
    pub own_context: Arc<FakeContext>,
    pub default_context: Arc<FakeContext>,
    loaded_hooks: Mutex<Vec<ModuleLoadedHook>>,
    pub resolvers: Mutex<Vec<(String, NativeResolveHook)>>,
    panic_on_version: bool,
}

impl FakeRuntime {
    pub fn new(major: u32, own_location: PathBuf) -> Self {
        Self {
            major,
            domain: 1,
            own: ModuleInfo {
                name: "RhinoInside".to_string(),
                location: Some(own_location),
                is_dynamic: false,
                context: OWN_CONTEXT,
            },
            own_context: Arc::new(FakeContext::new(OWN_CONTEXT)),
            default_context: Arc::new(FakeContext::new(DEFAULT_CONTEXT)),
            loaded_hooks: Mutex::new(Vec::new()),
            resolvers: Mutex::new(Vec::new()),
            panic_on_version: false,
        }
    }

    /// Runtime that panics when asked for its version, i.e. inside the
    /// initializer callback.
    pub fn panicking(mut self) -> Self {
        self.panic_on_version = true;
        self
    }

    pub fn with_domain(mut self, domain: i32) -> Self {
        self.domain = domain;
        self
    }

    pub fn loaded_hook_count(&self) -> usize {
        self.loaded_hooks.lock().unwrap().len()
    }

    /// Raise the assembly-loaded event.
    pub fn module_loaded(&self, module: &ModuleInfo) {
        let hooks = self.loaded_hooks.lock().unwrap().clone();
        for hook in hooks {
            hook(module);
        }
    }

    pub fn resolver_for(&self, module: &str) -> Option<NativeResolveHook> {
        self.resolvers
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == module)
            .map(|(_, hook)| Arc::clone(hook))
    }
}

impl ManagedRuntime for FakeRuntime {
    fn major_version(&self) -> u32 {
        if self.panic_on_version {
            panic!("runtime version unavailable");
        }
        self.major
    }

    fn domain_id(&self) -> i32 {
        self.domain
    }

    fn own_module(&self) -> ModuleInfo {
        self.own.clone()
    }

    fn load_context_of(&self, module: &ModuleInfo) -> Arc<dyn LoadContext> {
        if module.context == OWN_CONTEXT {
            self.own_context.clone()
        } else {
            self.default_context.clone()
        }
    }

    fn default_context(&self) -> Arc<dyn LoadContext> {
        self.default_context.clone()
    }

    fn on_module_loaded(&self, hook: ModuleLoadedHook) {
        self.loaded_hooks.lock().unwrap().push(hook);
    }

    fn set_native_resolver(&self, module: &ModuleInfo, hook: NativeResolveHook) {
        self.resolvers
            .lock()
            .unwrap()
            .push((module.name.clone(), hook));
    }
}

// ==============================================================================
// Filesystem fixtures
// ==============================================================================

pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"").unwrap();
}

pub fn module(name: &str, location: &Path, context: ContextId) -> ModuleInfo {
    ModuleInfo {
        name: name.to_string(),
        location: Some(location.to_path_buf()),
        is_dynamic: false,
        context,
    }
}
