//! Loading the Rhino bridge library and starting its managed side.
//!
//! The bridge library (`RhinoLibrary`) exports
//! `RhLibRegisterDotNetInitializer`. It is handed a one-shot callback which,
//! when native code calls it, loads the `dotnetstart.<N>` launcher matching
//! the runtime's major version into the default context and runs
//! `dotnetstart.DotNetInitialization.Start("headless")`.

use crate::callback::OneShotCallback;
use crate::error::BridgeError;
use crate::exports::{self, CLR_RUNTIME_HOST_ID, CORECLR_DOMAIN_ID, CORECLR_HANDLE};
use crate::native::{LibraryLoader, NativeHandle};
use crate::platform::PlatformStrategy;
use crate::resolver::SearchPaths;
use crate::runtime::ManagedRuntime;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// CoreCLR host library, found through the dynamic linker search path.
pub const CORECLR_LIBRARY: &str = "libcoreclr.dylib";

/// Xamarin shim expecting the runtime host handle.
pub const XAMARIN_SHIM_LIBRARY: &str = "libxamarin-dotnet-coreclr.dylib";

/// Prefix of the launcher assembly name.
pub const LAUNCHER_PREFIX: &str = "dotnetstart";

/// Type holding the launcher entry point.
pub const LAUNCHER_TYPE: &str = "dotnetstart.DotNetInitialization";

/// Launcher entry point.
pub const LAUNCHER_METHOD: &str = "Start";

/// Launcher mode argument.
pub const LAUNCHER_MODE: &str = "headless";

/// Hand the CoreCLR host handle and domain id to the Xamarin shim.
///
/// The shim normally owns process startup and captures these itself; when
/// Rhino is embedded it must be told about the existing runtime.
pub fn attach_host_handle(
    system_dir: &Path,
    loader: &dyn LibraryLoader,
    domain_id: i32,
) -> Result<(), BridgeError> {
    let coreclr = loader.open(Path::new(CORECLR_LIBRARY))?;
    let get_runtime_host = exports::get_clr_runtime_host(&coreclr)?;

    let mut host: *mut c_void = std::ptr::null_mut();
    // SAFETY: signature checked by the export table; both pointers are valid
    // for the duration of the call.
    let status = unsafe { get_runtime_host(&CLR_RUNTIME_HOST_ID, &mut host) };
    if status != 0 || host.is_null() {
        return Err(BridgeError::HostHandleUnavailable(format!(
            "GetCLRRuntimeHost returned {status:#010x}"
        )));
    }

    let shim = loader.open(&system_dir.join(XAMARIN_SHIM_LIBRARY))?;
    // SAFETY: slot types match the export table.
    unsafe {
        exports::write_data(&shim, &CORECLR_HANDLE, host)?;
        exports::write_data(&shim, &CORECLR_DOMAIN_ID, domain_id)?;
    }

    debug!("Attached CoreCLR host handle for domain {}", domain_id);
    Ok(())
}

/// Start the managed side of Rhino inside `runtime`'s default context.
pub fn start_managed_host(
    runtime: &dyn ManagedRuntime,
    search: &SearchPaths,
) -> Result<(), BridgeError> {
    let major = runtime.major_version();
    let launcher = format!("{LAUNCHER_PREFIX}.{major}");

    let path = search.find_managed(&launcher).ok_or_else(|| {
        BridgeError::UnsupportedHostVersion(format!(
            "{launcher} not found; this Rhino does not support .NET {major}"
        ))
    })?;

    let context = runtime.default_context();
    let module = context.load_from_path(&path)?;
    context.invoke_static(&module, LAUNCHER_TYPE, LAUNCHER_METHOD, &[LAUNCHER_MODE])?;

    info!("Started Rhino managed host with {:?}", path);
    Ok(())
}

/// Loads the bridge library and registers the initializer callback.
pub struct NativeBridgeLoader {
    platform: Arc<dyn PlatformStrategy>,
    loader: Arc<dyn LibraryLoader>,
    runtime: Arc<dyn ManagedRuntime>,
}

impl NativeBridgeLoader {
    pub fn new(
        platform: Arc<dyn PlatformStrategy>,
        loader: Arc<dyn LibraryLoader>,
        runtime: Arc<dyn ManagedRuntime>,
    ) -> Self {
        Self {
            platform,
            loader,
            runtime,
        }
    }

    /// Load the bridge from `search.system_dir()` and run its handshake.
    ///
    /// Errors raised by the callback while native code runs it, including a
    /// panic during managed startup, are reported here. Only a callback the
    /// bridge has not entered yet counts as deferred; it stays armed until
    /// it is called.
    pub fn load(&self, search: &SearchPaths) -> Result<NativeHandle, BridgeError> {
        let system_dir = search.system_dir();
        let library =
            self.platform
                .load_bridge(system_dir, self.loader.as_ref(), self.runtime.as_ref())?;
        let register = exports::register_initializer(&library)?;

        let outcome: Arc<Mutex<Option<Result<(), BridgeError>>>> = Arc::new(Mutex::new(None));
        let callback = {
            let outcome = Arc::clone(&outcome);
            let runtime = Arc::clone(&self.runtime);
            let search = search.clone();
            OneShotCallback::arm(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    start_managed_host(runtime.as_ref(), &search)
                }))
                .unwrap_or_else(|_| {
                    Err(BridgeError::Callback(
                        "managed host startup panicked".to_string(),
                    ))
                });
                *outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
            })?
        };

        debug!("Registering .NET initializer with {:?}", library.path());
        // SAFETY: the callback is a plain `extern "C" fn()` that never unwinds.
        unsafe { register(callback.as_ptr()) };
        let deferred = OneShotCallback::is_pending();
        drop(callback);

        let result = outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match result {
            Some(Err(e)) => Err(e),
            Some(Ok(())) => Ok(library),
            None if deferred => {
                debug!("Initializer callback deferred by the bridge");
                Ok(library)
            }
            None => Err(BridgeError::Callback(
                "initializer ran without reporting an outcome".to_string(),
            )),
        }
    }
}
