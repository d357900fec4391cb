//! Bootstrap configuration.
//!
//! Configuration can come from a TOML file, from environment variables, or
//! be built in code. Environment variables override file values:
//!
//! - `RHINOINSIDE_RHINOPATH`: Rhino installation path
//!   (e.g. `C:/Program Files/Rhino 8` or `/Applications/Rhino 8.app`)
//! - `RHINOINSIDE_USE_LATEST`: `1`/`true` to pick the newest installation

use crate::error::{InitError, InitResult};
use crate::{HOST_MAJOR_VERSION, MIN_SUPPORTED_MAJOR};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding an explicit installation path.
pub const RHINO_PATH_ENV: &str = "RHINOINSIDE_RHINOPATH";

/// Environment variable selecting the newest installation.
pub const USE_LATEST_ENV: &str = "RHINOINSIDE_USE_LATEST";

/// How the Rhino installation is chosen.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Installation or system directory. When unset, installations are
    /// discovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhino_path: Option<PathBuf>,

    /// Pick the newest installation instead of the one matching
    /// `min_major`.
    #[serde(default)]
    pub use_latest: bool,

    /// Major version to look for. Defaults to this crate's major version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_major: Option<u32>,
}

impl Config {
    /// Load configuration from a TOML file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> InitResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let mut config = Self::parse(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate TOML without consulting the environment.
    pub fn parse(content: &str) -> InitResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(RHINO_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.rhino_path = Some(PathBuf::from(path));
        }

        if let Some(flag) = lookup(USE_LATEST_ENV) {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.use_latest = true,
                "0" | "false" | "no" => self.use_latest = false,
                _ => {}
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> InitResult<()> {
        if let Some(major) = self.min_major {
            if major < MIN_SUPPORTED_MAJOR {
                return Err(InitError::InvalidConfig(format!(
                    "min_major must be at least {MIN_SUPPORTED_MAJOR}, got {major}"
                )));
            }
        }
        Ok(())
    }

    /// Major version used when searching installations.
    pub fn min_major(&self) -> u32 {
        self.min_major.unwrap_or(HOST_MAJOR_VERSION)
    }
}
