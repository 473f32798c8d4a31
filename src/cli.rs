use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Development build orchestrator for static web projects.
///
/// devbundle copies static assets from a source directory into an output directory,
/// hands the script entry points to an external bundler, and can keep doing so on
/// every change.
#[derive(Parser, Debug)]
#[command(
    name = "devbundle",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root containing devbundle.toml. Relative config paths resolve against it.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the output directory once and print the report.
    ///
    /// Exits non-zero if any file failed to copy or the bundler reported errors.
    Build {
        #[command(flatten)]
        project: ProjectArgs,

        /// Output the report as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },

    /// Build once, then rebuild on every change under the source directory.
    Watch {
        #[command(flatten)]
        project: ProjectArgs,

        /// Override the debounce delay from devbundle.toml (milliseconds).
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Show which files would be copied and which are left to the bundler.
    Plan {
        #[command(flatten)]
        project: ProjectArgs,

        /// Output results as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}
