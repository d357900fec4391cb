use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// rhinoinside-testclient - inspect Rhino discovery and assembly resolution
#[derive(Debug, Parser)]
#[command(name = "rhinoinside-testclient", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML file with `rhino_path`, `use_latest` and `min_major`.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List installed Rhino versions and the one initialization would pick.
    Locate {
        /// Pick the newest installation.
        #[arg(long)]
        latest: bool,

        /// Major version to look for.
        #[arg(long, value_name = "N")]
        min_major: Option<u32>,
    },

    /// Show the system directory a user supplied path maps to.
    Normalize {
        /// Installation, bundle or system directory.
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Show which file assembly resolution would load for a simple name.
    Search {
        /// Simple assembly name, e.g. RhinoCommon.
        #[arg(value_name = "NAME")]
        module: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locate() {
        let cli = Cli::try_parse_from([
            "rhinoinside-testclient",
            "locate",
            "--latest",
            "--min-major",
            "9",
            "--json",
        ])
        .unwrap();

        assert!(cli.global.json);
        assert!(!cli.global.verbose);
        match cli.command {
            Command::Locate { latest, min_major } => {
                assert!(latest);
                assert_eq!(min_major, Some(9));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_search_with_config() {
        let cli = Cli::try_parse_from([
            "rhinoinside-testclient",
            "--config",
            "rhino.toml",
            "-v",
            "search",
            "RhinoCommon",
        ])
        .unwrap();

        assert!(cli.global.verbose);
        assert_eq!(cli.global.config, Some(PathBuf::from("rhino.toml")));
        assert!(matches!(cli.command, Command::Search { ref module } if module == "RhinoCommon"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["rhinoinside-testclient"]).is_err());
    }
}
