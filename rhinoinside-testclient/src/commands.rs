//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rhinoinside::platform::{self, PlatformStrategy};
use rhinoinside::{Config, InstallationCandidate, PlatformKind, SearchPaths};
use serde::Serialize;
use tracing::debug;

use crate::app::GlobalOptions;

/// Print `data` as JSON (if `--json`) or call `display_fn` for human-readable output.
fn print_output<T: Serialize>(
    data: &T,
    opts: &GlobalOptions,
    display_fn: impl FnOnce(&T),
) -> Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(data)?;
        println!("{json}");
    } else {
        display_fn(data);
    }
    Ok(())
}

/// Configuration from `--config`, or from the environment alone.
pub fn load_config(opts: &GlobalOptions) -> Result<Config> {
    match &opts.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(Config::from_env()),
    }
}

#[derive(Debug, Serialize)]
struct LocateReport {
    platform: PlatformKind,
    min_major: u32,
    use_latest: bool,
    candidates: Vec<InstallationCandidate>,
    system_directory: Option<PathBuf>,
}

pub fn locate(opts: &GlobalOptions, latest: bool, min_major: Option<u32>) -> Result<()> {
    let mut config = load_config(opts)?;
    config.use_latest |= latest;
    if min_major.is_some() {
        config.min_major = min_major;
    }
    config.validate()?;

    let platform = platform::current();
    let candidates = platform.candidates()?;
    let located = platform.locate(config.min_major(), config.use_latest);

    let report = LocateReport {
        platform: platform.kind(),
        min_major: config.min_major(),
        use_latest: config.use_latest,
        candidates,
        system_directory: located.as_ref().ok().cloned(),
    };

    print_output(&report, opts, |r| {
        println!("Platform:   {}", r.platform.as_str());
        println!("Looking for Rhino {}{}", r.min_major, if r.use_latest { " or newer" } else { "" });
        println!();
        if r.candidates.is_empty() {
            println!("  (no installations found)");
        }
        for c in &r.candidates {
            let present = if c.is_present() { "" } else { "  [missing]" };
            println!("  {:<12} {}{}", c.version_name, c.root_path.display(), present);
        }
        if let Some(dir) = &r.system_directory {
            println!();
            println!("Selected:   {}", dir.display());
        }
    })?;

    located?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct NormalizeReport {
    input: PathBuf,
    system_directory: PathBuf,
    exists: bool,
}

pub fn normalize(opts: &GlobalOptions, path: &Path) -> Result<()> {
    let platform = platform::current();
    let system_directory = platform.normalize(path)?;

    let report = NormalizeReport {
        input: path.to_path_buf(),
        exists: system_directory.is_dir(),
        system_directory,
    };

    print_output(&report, opts, |r| {
        println!("{}", r.system_directory.display());
        if !r.exists {
            println!("  (directory does not exist)");
        }
    })
}

#[derive(Debug, Serialize)]
struct SearchReport {
    module: String,
    system_directory: PathBuf,
    searched: Vec<PathBuf>,
    found: Option<PathBuf>,
}

pub fn search(opts: &GlobalOptions, module: &str) -> Result<()> {
    let config = load_config(opts)?;
    let platform = platform::current();
    let system_directory = system_directory(platform.as_ref(), &config)?;

    let own_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    debug!("Searching with own directory {:?}", own_dir);

    let search = SearchPaths::new(Arc::clone(&platform), &system_directory, own_dir);
    let report = SearchReport {
        module: module.to_string(),
        searched: search.managed_dirs(),
        found: search.find_managed(module),
        system_directory,
    };

    print_output(&report, opts, |r| {
        for dir in &r.searched {
            println!("  {}", dir.display());
        }
        println!();
        match &r.found {
            Some(file) => println!("{} -> {}", r.module, file.display()),
            None => println!("{} not found", r.module),
        }
    })?;

    if report.found.is_none() {
        bail!("no assembly named {module} under {}", report.system_directory.display());
    }
    Ok(())
}

fn system_directory(platform: &dyn PlatformStrategy, config: &Config) -> Result<PathBuf> {
    config.validate()?;
    let dir = match &config.rhino_path {
        Some(path) => platform.normalize(path)?,
        None => platform.locate(config.min_major(), config.use_latest)?,
    };
    Ok(dir)
}
