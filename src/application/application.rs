use std::path::PathBuf;

use futures::StreamExt;
use futures_channel::mpsc::{self, UnboundedSender};
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::application::{EventPrinter, RuntimeConfig};
use crate::config::{WatchConfig, WatchConfigError};
use crate::node::{EventKind, NodeConfig, NodeDescriptor, WatchMode};
use crate::typed::Node;

pub struct Application;

impl Application {
    /// Opens every configured node and prints its events until all of them
    /// have been disposed. With `once` only the opened nodes are printed.
    pub async fn run(app_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();
        let file_config = WatchConfig::read(&app_config.root)
            .await
            .context(WatchConfigSnafu)?;
        debug!("Loaded config: {:?}", file_config);

        let node_config = app_config.node_config(&file_config);
        let paths = app_config.node_paths(&file_config);
        ensure!(!paths.is_empty(), NoPathsSnafu);

        let printer = EventPrinter::for_stdout();
        let nodes = open_nodes(&paths, &node_config, printer).await;
        ensure!(
            !nodes.is_empty(),
            NothingOpenedSnafu {
                requested: paths.len()
            }
        );
        if app_config.once {
            return Ok(());
        }

        let watch = if node_config.watch.is_enabled() {
            node_config.watch
        } else {
            WatchMode::Persistent
        };
        let (sender, mut receiver) = mpsc::unbounded();
        for node in &nodes {
            subscribe(node, &sender, printer);
            node.start_watch(watch.is_persistent());
        }
        drop(sender);
        info!("Watching {} nodes ({watch})", nodes.len());

        // Disposal drops a node's listeners and with them their senders.
        while let Some(line) = receiver.next().await {
            println!("{line}");
        }

        info!("Every node has been disposed");
        Ok(())
    }
}

async fn open_nodes(paths: &[PathBuf], config: &NodeConfig, printer: EventPrinter) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(paths.len());
    for path in paths {
        let descriptor = NodeDescriptor::new(path)
            .with_config(config.clone())
            .with_watch(WatchMode::Off);
        match Node::open(descriptor).await {
            Ok(node) => {
                println!("{}", printer.opened(&node));
                nodes.push(node);
            }
            Err(error) => {
                warn!("Failed to open {}: {error}", path.display());
                println!("{}", printer.failed(path, &error));
            }
        }
    }
    nodes
}

fn subscribe(node: &Node, sender: &UnboundedSender<String>, printer: EventPrinter) {
    for kind in [
        EventKind::Change,
        EventKind::Transform,
        EventKind::Missing,
        EventKind::Error,
    ] {
        let sender = sender.clone();
        let path = node.path().to_path_buf();
        node.listen(kind, move |event| {
            let _ = sender.unbounded_send(printer.event(&path, event));
        });
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered during configuration stage"))]
    WatchConfigError { source: WatchConfigError },
    #[snafu(display("No paths to open: pass some or list them under `nodes` in fsnode.yaml"))]
    NoPathsError,
    #[snafu(display("None of the {requested} requested paths could be opened"))]
    NothingOpenedError { requested: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::config::CONFIG_FILE_NAME;

    fn runtime_config(root: &std::path::Path, paths: &[&str], once: bool) -> RuntimeConfig {
        RuntimeConfig {
            paths: paths.iter().map(PathBuf::from).collect(),
            root: root.to_path_buf(),
            grace_period: Some(Duration::from_millis(50)),
            watch: None,
            once,
        }
    }

    #[compio::test]
    async fn test_once_opens_and_returns() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::write(temp_dir.path().join("a.txt"), "x").expect("Failed to write file");

        Application::run(runtime_config(temp_dir.path(), &["a.txt", "."], true))
            .await
            .expect("Run should succeed");
    }

    #[compio::test]
    async fn test_without_paths_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = Application::run(runtime_config(temp_dir.path(), &[], true)).await;
        assert!(matches!(result, Err(ApplicationError::NoPathsError)));
    }

    #[compio::test]
    async fn test_nothing_opened_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = Application::run(runtime_config(temp_dir.path(), &["missing"], true)).await;
        assert!(matches!(
            result,
            Err(ApplicationError::NothingOpenedError { requested: 1 })
        ));
    }

    #[compio::test]
    async fn test_broken_config_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "- not\n- a map\n")
            .expect("Failed to write config");

        let result = Application::run(runtime_config(temp_dir.path(), &["."], true)).await;
        assert!(matches!(
            result,
            Err(ApplicationError::WatchConfigError { .. })
        ));
    }

    #[compio::test]
    async fn test_run_ends_once_every_node_is_disposed() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("a.txt");
        std::fs::write(&path, "x").expect("Failed to write file");

        compio::runtime::spawn(async move {
            compio::time::sleep(Duration::from_millis(100)).await;
            let _ = std::fs::remove_file(&path);
        })
        .detach();

        let run = Application::run(runtime_config(temp_dir.path(), &["a.txt"], false));
        compio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("Run should end after the grace period")
            .expect("Run should succeed");
    }
}
