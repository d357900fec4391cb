//! One-time initialization.
//!
//! [`Bootstrap`] owns everything initialization produces: the system
//! directory, the bridge library handle and the resolution hooks. Its state
//! advances by compare-and-set:
//!
//! ```text
//! Uninitialized -> Initializing -> Initialized
//!       ^               |      \-> Failed
//!       +---------------+ (installation not resolved)
//! ```
//!
//! Only the caller that wins the first transition runs initialization. Any
//! call made while it runs, or after it succeeded or failed terminally,
//! fails with [`InitError::AlreadyInitialized`].
//!
//! A failure before any native library is opened (unsupported architecture,
//! no installation, missing system directory) returns the state to
//! `Uninitialized` so a corrected call can succeed. Once the bridge has been
//! touched, failure is terminal.

use crate::bridge::NativeBridgeLoader;
use crate::config::{Config, RHINO_PATH_ENV};
use crate::error::{InitError, InitResult};
use crate::native::{LibraryLoader, NativeHandle, SystemLoader};
use crate::normalize;
use crate::platform::{self, PlatformStrategy};
use crate::resolver::{ResolutionHookRegistry, SearchPaths};
use crate::runtime::ManagedRuntime;
use crate::HOST_MAJOR_VERSION;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

/// Lifecycle of a [`Bootstrap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootstrapState {
    Uninitialized = 0,
    Initializing = 1,
    Initialized = 2,
    Failed = 3,
}

impl BootstrapState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BootstrapState::Uninitialized,
            1 => BootstrapState::Initializing,
            2 => BootstrapState::Initialized,
            _ => BootstrapState::Failed,
        }
    }
}

/// Where the system directory comes from.
enum Source<'a> {
    Explicit(&'a Path),
    Locate { min_major: u32, use_latest: bool },
}

/// Initialization context for loading Rhino into a managed runtime.
pub struct Bootstrap {
    platform: Arc<dyn PlatformStrategy>,
    loader: Arc<dyn LibraryLoader>,
    runtime: Arc<dyn ManagedRuntime>,
    state: AtomicU8,
    system_dir: OnceLock<PathBuf>,
    bridge: OnceLock<NativeHandle>,
    hooks: OnceLock<Arc<ResolutionHookRegistry>>,
}

impl Bootstrap {
    /// Bootstrap for the running platform using the system dynamic linker.
    pub fn new(runtime: Arc<dyn ManagedRuntime>) -> Self {
        Self::with_platform(runtime, platform::current(), Arc::new(SystemLoader))
    }

    pub fn with_platform(
        runtime: Arc<dyn ManagedRuntime>,
        platform: Arc<dyn PlatformStrategy>,
        loader: Arc<dyn LibraryLoader>,
    ) -> Self {
        Self {
            platform,
            loader,
            runtime,
            state: AtomicU8::new(BootstrapState::Uninitialized as u8),
            system_dir: OnceLock::new(),
            bridge: OnceLock::new(),
            hooks: OnceLock::new(),
        }
    }

    /// Initialize from an installation path, or discover the installation.
    ///
    /// Without an explicit path, `RHINOINSIDE_RHINOPATH` is used when set;
    /// otherwise the installation matching this crate's major version is
    /// located.
    pub fn initialize(&self, rhino_path: Option<&Path>) -> InitResult<()> {
        let from_env = match rhino_path {
            Some(_) => None,
            None => std::env::var_os(RHINO_PATH_ENV)
                .map(PathBuf::from)
                .filter(|p| !normalize::is_blank(p)),
        };

        match rhino_path.or(from_env.as_deref()) {
            Some(path) => self.run(Source::Explicit(path)),
            None => self.run(Source::Locate {
                min_major: HOST_MAJOR_VERSION,
                use_latest: false,
            }),
        }
    }

    /// Initialize from the newest installed Rhino.
    pub fn initialize_latest(&self) -> InitResult<()> {
        self.run(Source::Locate {
            min_major: HOST_MAJOR_VERSION,
            use_latest: true,
        })
    }

    /// Initialize as described by `config`.
    pub fn initialize_with(&self, config: &Config) -> InitResult<()> {
        config.validate()?;
        match &config.rhino_path {
            Some(path) => self.run(Source::Explicit(path)),
            None => self.run(Source::Locate {
                min_major: config.min_major(),
                use_latest: config.use_latest,
            }),
        }
    }

    pub fn state(&self) -> BootstrapState {
        BootstrapState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == BootstrapState::Initialized
    }

    /// System directory chosen by initialization.
    ///
    /// May be set after a failed attempt; check
    /// [`is_initialized`](Self::is_initialized) before relying on it.
    pub fn system_directory(&self) -> Option<&Path> {
        self.system_dir.get().map(PathBuf::as_path)
    }

    /// The loaded bridge library.
    pub fn bridge_library(&self) -> Option<&NativeHandle> {
        self.bridge.get()
    }

    /// The installed resolution hooks.
    pub fn hooks(&self) -> Option<&Arc<ResolutionHookRegistry>> {
        self.hooks.get()
    }

    pub fn platform(&self) -> &dyn PlatformStrategy {
        self.platform.as_ref()
    }

    fn run(&self, source: Source<'_>) -> InitResult<()> {
        if let Err(current) = self.state.compare_exchange(
            BootstrapState::Uninitialized as u8,
            BootstrapState::Initializing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            let reason = match BootstrapState::from_u8(current) {
                BootstrapState::Failed => "a previous initialization attempt failed",
                BootstrapState::Initializing => "initialization is in progress",
                _ => "Rhino is already loaded",
            };
            return Err(InitError::AlreadyInitialized(reason.to_string()));
        }

        // Nothing has been loaded yet: a failure here leaves the context
        // retryable.
        let system_dir = match self.resolve_system_dir(source) {
            Ok(dir) => dir,
            Err(e) => {
                self.state
                    .store(BootstrapState::Uninitialized as u8, Ordering::Release);
                warn!("Rhino installation not resolved: {}", e);
                return Err(e);
            }
        };

        match self.load(system_dir) {
            Ok(()) => {
                self.state
                    .store(BootstrapState::Initialized as u8, Ordering::Release);
                info!("Rhino loaded from {:?}", self.system_directory());
                Ok(())
            }
            Err(e) => {
                self.state
                    .store(BootstrapState::Failed as u8, Ordering::Release);
                error!("Rhino initialization failed: {}", e);
                Err(e)
            }
        }
    }

    fn resolve_system_dir(&self, source: Source<'_>) -> InitResult<PathBuf> {
        if std::mem::size_of::<usize>() != 8 {
            return Err(InitError::UnsupportedArchitecture);
        }

        let system_dir = match source {
            Source::Explicit(path) => self.platform.normalize(path)?,
            Source::Locate {
                min_major,
                use_latest,
            } => self.platform.locate(min_major, use_latest)?,
        };

        if !system_dir.is_dir() {
            return Err(InitError::InstallationNotFound(format!(
                "{} does not exist",
                system_dir.display()
            )));
        }
        Ok(system_dir)
    }

    /// Load the bridge from `system_dir` and install the hooks. Native state
    /// loaded here cannot be undone, so any failure is terminal.
    fn load(&self, system_dir: PathBuf) -> InitResult<()> {
        let system_dir = self.system_dir.get_or_init(|| system_dir).clone();
        info!("Loading Rhino from {:?}", system_dir);

        let own_dir = self
            .runtime
            .own_module()
            .directory()
            .map(Path::to_path_buf);
        let search = SearchPaths::new(Arc::clone(&self.platform), system_dir, own_dir);

        let bridge = NativeBridgeLoader::new(
            Arc::clone(&self.platform),
            Arc::clone(&self.loader),
            Arc::clone(&self.runtime),
        );
        let library = bridge.load(&search)?;
        let _ = self.bridge.set(library);

        let hooks = Arc::new(ResolutionHookRegistry::new(search, Arc::clone(&self.loader)));
        hooks.install(&self.runtime);
        let _ = self.hooks.set(hooks);

        Ok(())
    }
}

impl fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrap")
            .field("platform", &self.platform)
            .field("state", &self.state())
            .field("system_dir", &self.system_dir.get())
            .finish_non_exhaustive()
    }
}
