//! # rhinoinside
//!
//! Loads Rhino into a process hosting a .NET runtime.
//!
//! This crate provides:
//! - Discovery of installed Rhino versions (Windows registry, macOS bundles)
//! - Normalization of user supplied installation paths
//! - Loading of the native bridge library and its .NET initializer handshake
//! - Resolution hooks redirecting assembly and native library loads into the
//!   installation and its plugin folders
//!
//! ## Usage
//!
//! The hosting layer implements [`ManagedRuntime`] over its CoreCLR bindings
//! and initializes once, early, before any Rhino type is touched:
//!
//! ```rust,ignore
//! let bootstrap = Bootstrap::new(runtime);
//! bootstrap.initialize(None)?;
//! println!("Loading Rhino @ {:?}", bootstrap.system_directory());
//! ```
//!
//! ## Layout
//!
//! | Platform | System directory |
//! |----------|------------------|
//! | Windows  | `C:/Program Files/Rhino 8/System` |
//! | macOS    | `/Applications/Rhino 8.app/Contents/Frameworks` |

pub mod bootstrap;
pub mod bridge;
pub mod callback;
pub mod config;
pub mod error;
pub mod exports;
pub mod finder;
pub mod install_registry;
pub mod native;
pub mod normalize;
pub mod platform;
pub mod resolver;
pub mod runtime;

pub use bootstrap::{Bootstrap, BootstrapState};
pub use config::Config;
pub use error::{BridgeError, InitError, InitResult, RuntimeError};
pub use finder::{find_macos, find_windows, InstallationCandidate, PlatformKind};
pub use native::{LibraryLoader, NativeHandle, NativeModule, SystemLoader};
pub use platform::{MacPlatform, PlatformStrategy, UnsupportedPlatform, WindowsPlatform};
pub use resolver::{ResolutionCache, ResolutionHookRegistry, SearchPaths};
pub use runtime::{ContextId, LoadContext, ManagedRuntime, ModuleInfo, ModuleRef};

/// Major Rhino version this crate is built for.
pub const HOST_MAJOR_VERSION: u32 = parse_major(env!("CARGO_PKG_VERSION_MAJOR"));

/// Oldest Rhino that can be embedded.
pub const MIN_SUPPORTED_MAJOR: u32 = 8;

const fn parse_major(digits: &str) -> u32 {
    let bytes = digits.as_bytes();
    let mut value = 0;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}
