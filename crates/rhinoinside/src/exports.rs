//! Native exports used by the bootstrap.
//!
//! Every symbol the bootstrap looks up by name is listed in [`KNOWN_EXPORTS`]
//! together with its owning library and C signature. All lookups go through
//! [`resolve`], so a missing or renamed symbol always surfaces as
//! [`BridgeError::MissingExport`].

use crate::callback::InitializerCallback;
use crate::error::BridgeError;
use crate::native::NativeHandle;
use std::ffi::c_void;
use std::ptr::NonNull;
use uguid::{guid, Guid};

/// Whether an export is code or data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Function,
    Data,
}

/// A symbol exported by a native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Export {
    pub name: &'static str,
    pub library: &'static str,
    pub kind: ExportKind,
    pub signature: &'static str,
}

/// Registers the callback that starts the managed side of Rhino.
pub const REGISTER_DOTNET_INITIALIZER: Export = Export {
    name: "RhLibRegisterDotNetInitializer",
    library: "RhinoLibrary",
    kind: ExportKind::Function,
    signature: "void (*)(void (*)(void))",
};

/// Returns the CoreCLR hosting interface for a host GUID.
pub const GET_CLR_RUNTIME_HOST: Export = Export {
    name: "GetCLRRuntimeHost",
    library: "libcoreclr",
    kind: ExportKind::Function,
    signature: "int32_t (*)(const GUID *, void **)",
};

/// Runtime host handle read by the Xamarin shim.
pub const CORECLR_HANDLE: Export = Export {
    name: "coreclr_handle",
    library: "libxamarin-dotnet-coreclr",
    kind: ExportKind::Data,
    signature: "void *",
};

/// Application domain id read by the Xamarin shim.
pub const CORECLR_DOMAIN_ID: Export = Export {
    name: "coreclr_domainId",
    library: "libxamarin-dotnet-coreclr",
    kind: ExportKind::Data,
    signature: "int32_t",
};

pub const KNOWN_EXPORTS: [Export; 4] = [
    REGISTER_DOTNET_INITIALIZER,
    GET_CLR_RUNTIME_HOST,
    CORECLR_HANDLE,
    CORECLR_DOMAIN_ID,
];

/// `ICLRRuntimeHost4` interface id.
pub const CLR_RUNTIME_HOST_ID: Guid = guid!("64f6d366-d7c2-4f1f-b4b2-e8160cac43af");

pub type RegisterInitializerFn = unsafe extern "C" fn(callback: InitializerCallback);

pub type GetClrRuntimeHostFn =
    unsafe extern "C" fn(riid: *const Guid, host: *mut *mut c_void) -> i32;

/// Look up an export.
pub fn resolve(library: &NativeHandle, export: &Export) -> Result<NonNull<c_void>, BridgeError> {
    library
        .symbol(export.name)
        .and_then(NonNull::new)
        .ok_or_else(|| BridgeError::MissingExport {
            library: library.path().to_path_buf(),
            name: export.name,
            signature: export.signature,
        })
}

fn resolve_function(
    library: &NativeHandle,
    export: &Export,
) -> Result<NonNull<c_void>, BridgeError> {
    if export.kind != ExportKind::Function {
        return Err(BridgeError::ExportKind(export.name));
    }
    resolve(library, export)
}

/// `RhLibRegisterDotNetInitializer` from the bridge library.
pub fn register_initializer(library: &NativeHandle) -> Result<RegisterInitializerFn, BridgeError> {
    let address = resolve_function(library, &REGISTER_DOTNET_INITIALIZER)?;
    // SAFETY: the export table records this C signature for the symbol.
    Ok(unsafe { std::mem::transmute::<*mut c_void, RegisterInitializerFn>(address.as_ptr()) })
}

/// `GetCLRRuntimeHost` from libcoreclr.
pub fn get_clr_runtime_host(library: &NativeHandle) -> Result<GetClrRuntimeHostFn, BridgeError> {
    let address = resolve_function(library, &GET_CLR_RUNTIME_HOST)?;
    // SAFETY: as above.
    Ok(unsafe { std::mem::transmute::<*mut c_void, GetClrRuntimeHostFn>(address.as_ptr()) })
}

/// Store a value into an exported data slot.
///
/// # Safety
///
/// `T` must match the slot's C type as recorded in the export table.
pub unsafe fn write_data<T: Copy>(
    library: &NativeHandle,
    export: &Export,
    value: T,
) -> Result<(), BridgeError> {
    if export.kind != ExportKind::Data {
        return Err(BridgeError::ExportKind(export.name));
    }
    let slot = resolve(library, export)?;
    slot.as_ptr().cast::<T>().write(value);
    Ok(())
}
