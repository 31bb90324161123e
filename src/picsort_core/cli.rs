use crate::picsort_core::session::FilterMode;
use clap::{Parser, Subcommand};
use simplelog::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Triage a folder of photos and videos one item at a time")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to picsort.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Folder of media to triage, overriding the config file
    #[arg(long, global = true)]
    pub images_dir: Option<PathBuf>,

    /// Manifest location, overriding the config file
    #[arg(long, global = true)]
    pub manifest: Option<PathBuf>,

    /// Enable file logging to picsort.log
    #[arg(long = "log", global = true)]
    pub log: bool,

    /// Log level for file logging (debug, info, warn, error)
    #[arg(long, default_value_t = LevelFilter::Debug, global = true)]
    pub log_level: LevelFilter,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the manifest if it is missing or out of date
    Build {
        /// Rebuild even if the manifest looks current
        #[arg(long)]
        force: bool,
    },

    /// Show whether the manifest is ready, degraded, or missing
    Status,

    /// Print manifest entries, newest first
    List {
        #[arg(long, value_enum, default_value_t = FilterMode::All)]
        filter: FilterMode,
    },

    /// Assign a disposition to each item, reading one command per line.
    ///
    /// Keys: f/1 favorite, l/2 like, t/3 later, d/4 delete, c/0 clear,
    /// n next, p previous, u undo, a/i/v filter all/images/videos,
    /// s save decisions, q save and quit.
    Triage {
        #[arg(long, value_enum, default_value_t = FilterMode::All)]
        filter: FilterMode,
    },

    /// Sort decided files into one folder per disposition
    Apply {
        /// Copy files instead of moving them
        #[arg(long)]
        copy: bool,

        /// Decisions file to apply (defaults to the configured path)
        #[arg(long)]
        decisions: Option<PathBuf>,

        /// Target folder (defaults to the configured sorted_dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}
