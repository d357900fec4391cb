//! Error types for Rhino discovery and bootstrap.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an initialization attempt.
///
/// None of these are retried automatically. A caller that receives any of
/// them must treat the process as not initialized.
#[derive(Error, Debug)]
pub enum InitError {
    /// A previous call already started (or finished) initialization.
    #[error("Already initialized: {0}")]
    AlreadyInitialized(String),

    /// Rhino only ships 64 bit binaries.
    #[error("Only 64 bit applications can load Rhino")]
    UnsupportedArchitecture,

    /// No installation satisfies the version policy, or the given path does
    /// not exist.
    #[error("Rhino installation not found: {0}")]
    InstallationNotFound(String),

    /// The current operating system is neither Windows nor macOS.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The bridge library is present but cannot host this runtime.
    #[error("Unsupported Rhino version: {0}")]
    UnsupportedHostVersion(String),

    /// The runtime host handle could not be obtained (macOS only).
    #[error("Could not get CLR runtime host: {0}")]
    HostHandleUnavailable(String),

    /// Any other failure while loading or talking to the bridge library.
    #[error("Initialization error: {0}")]
    BridgeLoadFailed(String),

    /// Configuration values are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for discovery and bootstrap operations.
pub type InitResult<T> = std::result::Result<T, InitError>;

/// Errors raised while loading native libraries and wiring the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The dynamic loader refused a library.
    #[error("Failed to load {path:?}: {message}")]
    Library { path: PathBuf, message: String },

    /// A library does not export a symbol listed in the export table.
    #[error("{library:?} does not export `{name}` ({signature})")]
    MissingExport {
        library: PathBuf,
        name: &'static str,
        signature: &'static str,
    },

    /// An export was used as the wrong kind (function vs. data).
    #[error("`{0}` is not usable as requested")]
    ExportKind(&'static str),

    /// `GetCLRRuntimeHost` failed or returned a null handle.
    #[error("{0}")]
    HostHandleUnavailable(String),

    /// The bridge cannot start the managed side for this runtime version.
    #[error("{0}")]
    UnsupportedHostVersion(String),

    /// The initializer callback could not be armed.
    #[error("Initializer callback: {0}")]
    Callback(String),

    /// No bridge library exists for this platform.
    #[error("{0}")]
    UnsupportedPlatform(String),

    /// The managed runtime rejected a request.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<BridgeError> for InitError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::UnsupportedHostVersion(msg) => InitError::UnsupportedHostVersion(msg),
            BridgeError::HostHandleUnavailable(msg) => InitError::HostHandleUnavailable(msg),
            BridgeError::UnsupportedPlatform(msg) => InitError::UnsupportedPlatform(msg),
            other => InitError::BridgeLoadFailed(other.to_string()),
        }
    }
}

/// Failure reported by the embedding managed runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Managed runtime error: {0}")]
pub struct RuntimeError(pub String);

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
