use compio::{fs::File, io::AsyncReadExt, io::BufReader};
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use std::{
    borrow::Cow,
    io::{Cursor, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use crate::{
    ext::BestEffortPathExt,
    node::{NodeConfig, WatchMode},
};

pub const CONFIG_FILE_NAME: &str = "fsnode.yaml";

fn get_config_file_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

fn key(name: &'static str) -> Yaml<'static> {
    Yaml::Value(Scalar::String(Cow::Borrowed(name)))
}

/// Settings read from `fsnode.yaml`: node tuning plus the paths to open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchConfig {
    pub node: NodeConfig,
    pub nodes: Vec<PathBuf>,
}

impl WatchConfig {
    /// Reads `fsnode.yaml` under `root`. A missing file yields the defaults.
    pub async fn read(root: &Path) -> Result<Self, WatchConfigError> {
        Self::from_path(get_config_file_path(root)).await
    }

    pub async fn from_path(path: PathBuf) -> Result<Self, WatchConfigError> {
        debug!("Opening config file: {}", path.best_effort_path_display());
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).context(ReadSnafu {
                    file_path: path.best_effort_path_display(),
                });
            }
        };

        let cursor = Cursor::new(file);
        let mut reader = BufReader::new(cursor);
        let res = reader.read_to_string(String::new()).await;
        let n = res.0.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        debug!("Successfully read config file: {n} bytes");
        res.1.as_str().try_into()
    }

    fn parse_grace_period(
        top_level: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<Option<Duration>, WatchConfigError> {
        match top_level.get(&key("grace_period_ms")) {
            None => Ok(None),
            Some(Yaml::Value(Scalar::Integer(ms))) => u64::try_from(*ms)
                .map(|ms| Some(Duration::from_millis(ms)))
                .map_err(|_| WatchConfigError::InvalidGracePeriod {
                    value: ms.to_string(),
                }),
            Some(other) => Err(WatchConfigError::InvalidGracePeriod {
                value: format!("{other:?}"),
            }),
        }
    }

    fn parse_watch_mode(
        top_level: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<Option<WatchMode>, WatchConfigError> {
        match top_level.get(&key("watch")) {
            None => Ok(None),
            Some(Yaml::Value(Scalar::Boolean(watch))) => Ok(Some(WatchMode::from(*watch))),
            Some(Yaml::Value(Scalar::String(mode))) => mode
                .parse::<WatchMode>()
                .map(Some)
                .map_err(|_| WatchConfigError::InvalidWatchMode {
                    value: mode.to_string(),
                }),
            Some(other) => Err(WatchConfigError::InvalidWatchMode {
                value: format!("{other:?}"),
            }),
        }
    }

    fn parse_nodes(
        top_level: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<Vec<PathBuf>, WatchConfigError> {
        let Some(nodes) = top_level.get(&key("nodes")) else {
            return Ok(Vec::new());
        };

        let nodes = nodes
            .as_sequence()
            .ok_or(WatchConfigError::NodesNotList)?
            .iter()
            .filter_map(|item| {
                let path = item.as_str().map(PathBuf::from);
                if path.is_none() {
                    debug!("Skipping invalid node entry: {:?}", item);
                }
                path
            })
            .collect();

        Ok(nodes)
    }
}

impl TryFrom<&str> for WatchConfig {
    type Error = WatchConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let contents_vec =
            Yaml::load_from_str(contents).map_err(|e| WatchConfigError::ParseError { source: e })?;
        let Some(contents) = contents_vec.first() else {
            return Ok(Self::default());
        };

        let top_level = contents
            .as_mapping()
            .ok_or(WatchConfigError::TopLevelNotMap)?;

        let mut node = NodeConfig::default();
        if let Some(grace_period) = Self::parse_grace_period(top_level)? {
            node.grace_period = grace_period;
        }
        if let Some(watch) = Self::parse_watch_mode(top_level)? {
            node.watch = watch;
        }
        let nodes = Self::parse_nodes(top_level)?;

        Ok(WatchConfig { node, nodes })
    }
}

#[derive(Debug, Snafu)]
pub enum WatchConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("grace_period_ms should be a non-negative integer, got {}", value))]
    InvalidGracePeriod { value: String },
    #[snafu(display("watch should be one of off, on, transient or persistent, got {}", value))]
    InvalidWatchMode { value: String },
    #[snafu(display("Nodes section should be a list"))]
    NodesNotList,
}
