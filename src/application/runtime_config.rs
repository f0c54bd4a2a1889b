use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::config::WatchConfig;
use crate::node::{NodeConfig, WatchMode};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub paths: Vec<PathBuf>,
    pub root: PathBuf,
    pub grace_period: Option<Duration>,
    pub watch: Option<WatchMode>,
    pub once: bool,
}

impl RuntimeConfig {
    /// Node settings from the config file with command line overrides applied.
    pub fn node_config(&self, file: &WatchConfig) -> NodeConfig {
        NodeConfig {
            grace_period: self.grace_period.unwrap_or(file.node.grace_period),
            watch: self.watch.unwrap_or(file.node.watch),
        }
    }

    /// Paths from the config file followed by the command line ones, each
    /// resolved against the root. Duplicates keep their first position.
    pub fn node_paths(&self, file: &WatchConfig) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for path in file.nodes.iter().chain(&self.paths) {
            let path = self.root.join(path);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            paths: cli.paths,
            root: cli.root,
            grace_period: cli.grace_period_ms.map(Duration::from_millis),
            watch: cli.watch,
            once: cli.once,
        }
    }
}
