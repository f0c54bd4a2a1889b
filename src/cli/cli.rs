use std::path::PathBuf;

use clap::Parser;

use crate::application::data::LogLevel;
use crate::node::WatchMode;

/// Open filesystem nodes and report how they change.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// Paths to open, in addition to the `nodes` listed in fsnode.yaml
    pub paths: Vec<PathBuf>,

    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    /// The directory holding fsnode.yaml; relative paths are resolved against it
    #[clap(long, short, default_value = ".")]
    pub root: PathBuf,

    /// How long a vanished node waits for its path to come back
    #[clap(long)]
    pub grace_period_ms: Option<u64>,

    /// Watch mode: off, on, transient or persistent
    #[clap(long, short)]
    pub watch: Option<WatchMode>,

    /// Print the opened nodes and exit without watching
    #[clap(long)]
    pub once: bool,
}
