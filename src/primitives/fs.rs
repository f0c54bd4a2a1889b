//! Thin wrappers over the platform calls a node delegates to.
//!
//! Every call maps its OS error onto the path it touched, so callers can tell
//! a missing path from any other failure.

use std::io;
use std::path::Path;

use compio::fs::{self, File, OpenOptions};
use tracing::trace;

use crate::node::{Metadata, NodeError, Operation};
use crate::primitives::blocking::run_blocking;

pub async fn stat(path: &Path) -> Result<Metadata, NodeError> {
    trace!("stat {}", path.display());
    fs::metadata(path)
        .await
        .map(|metadata| Metadata::from(&metadata))
        .map_err(|e| NodeError::from_io(path, Operation::Stat, e))
}

pub async fn read(path: &Path) -> Result<Vec<u8>, NodeError> {
    fs::read(path)
        .await
        .map_err(|e| NodeError::from_io(path, Operation::Read, e))
}

pub async fn write(path: &Path, content: Vec<u8>) -> Result<(), NodeError> {
    let result = fs::write(path, content).await;
    result
        .0
        .map_err(|e| NodeError::from_io(path, Operation::Write, e))
}

pub async fn create_dir(path: &Path, recursive: bool) -> Result<(), NodeError> {
    let result = if recursive {
        fs::create_dir_all(path).await
    } else {
        fs::create_dir(path).await
    };
    result.map_err(|e| NodeError::from_io(path, Operation::CreateDir, e))
}

pub async fn remove_file(path: &Path) -> Result<(), NodeError> {
    fs::remove_file(path)
        .await
        .map_err(|e| NodeError::from_io(path, Operation::Remove, e))
}

/// Removes an empty directory.
pub async fn remove_dir(path: &Path) -> Result<(), NodeError> {
    fs::remove_dir(path)
        .await
        .map_err(|e| NodeError::from_io(path, Operation::Remove, e))
}

/// Removes `path` whatever it is; directories go with their contents.
pub async fn remove_all(path: &Path) -> Result<(), NodeError> {
    run_blocking(path, Operation::Remove, |path| {
        let metadata = std::fs::symlink_metadata(&path)?;
        if metadata.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        }
    })
    .await
}

/// Entry names of a directory, sorted.
pub async fn list(path: &Path) -> Result<Vec<String>, NodeError> {
    run_blocking(path, Operation::List, |path| {
        let mut names = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    })
    .await
}

pub async fn open_reader(path: &Path) -> Result<File, NodeError> {
    File::open(path)
        .await
        .map_err(|e| NodeError::from_io(path, Operation::Open, e))
}

/// Opens `path` for writing, creating it and truncating previous content.
pub async fn open_writer(path: &Path) -> Result<File, NodeError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|e| NodeError::from_io(path, Operation::Open, e))
}
