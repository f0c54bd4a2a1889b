use std::path::{Component, Path, PathBuf};

pub fn best_effort_path_display(path: &Path) -> String {
    match path.canonicalize() {
        Ok(canonical_path) => canonical_path.display().to_string(),
        Err(_) => resolve_path(path).display().to_string(),
    }
}

/// Makes `path` absolute against the current directory and folds `.` and `..`
/// components without touching the filesystem.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(current_dir) => current_dir.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    normalize_path(&absolute_path)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root
                if !components.is_empty()
                    && !matches!(
                        components.last(),
                        Some(Component::RootDir | Component::Prefix(_))
                    )
                {
                    components.pop();
                }
            }
            _ => {
                components.push(component);
            }
        }
    }

    components.iter().collect()
}

/// Name, base name and extension of the last path component.
///
/// The extension never carries the leading dot and is empty when the name has
/// none (dotfiles such as `.bashrc` have no extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParts {
    pub name: String,
    pub base_name: String,
    pub extension: String,
}

impl PathParts {
    pub fn of(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let base_name = if extension.is_empty() {
            name.clone()
        } else {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone())
        };

        Self {
            name,
            base_name,
            extension,
        }
    }
}

pub trait BestEffortPathExt {
    fn best_effort_path_display(&self) -> String;
}

impl BestEffortPathExt for Path {
    fn best_effort_path_display(&self) -> String {
        best_effort_path_display(self)
    }
}

impl BestEffortPathExt for PathBuf {
    fn best_effort_path_display(&self) -> String {
        best_effort_path_display(self)
    }
}

impl BestEffortPathExt for &str {
    fn best_effort_path_display(&self) -> String {
        best_effort_path_display(Path::new(self))
    }
}
