//! Canonical on-disk locations.
//!
//! Two trees are involved:
//!
//! - the experiment box `<results_root>/<exp_id>/` with `meta.json` and four
//!   fixed subdirectories;
//! - the project state directory `<project_root>/.expbox/` holding the active
//!   pointer, the per-experiment index and optional project settings.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ExpboxError, Result};

pub const META_FILE: &str = "meta.json";
pub const STATE_DIR: &str = ".expbox";

/// Paths of one experiment box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpPaths {
    pub root: PathBuf,
    pub artifacts: PathBuf,
    pub figures: PathBuf,
    pub logs: PathBuf,
    pub notebooks: PathBuf,
}

impl ExpPaths {
    /// Compute paths without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            artifacts: root.join("artifacts"),
            figures: root.join("figures"),
            logs: root.join("logs"),
            notebooks: root.join("notebooks"),
            root,
        }
    }

    /// Create the root and all subdirectories. Safe to call repeatedly.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let paths = Self::new(absolute(&root.into()));
        for dir in [
            &paths.root,
            &paths.artifacts,
            &paths.figures,
            &paths.logs,
            &paths.notebooks,
        ] {
            create_dir(dir)?;
        }
        Ok(paths)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.logs.join("metrics.jsonl")
    }
}

/// Paths under `<project_root>/.expbox/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub active_path: PathBuf,
    pub index_dir: PathBuf,
    pub settings_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = absolute(&project_root.into());
        let state_dir = project_root.join(STATE_DIR);
        Self {
            active_path: state_dir.join("active"),
            index_dir: state_dir.join("index"),
            settings_path: state_dir.join("config.toml"),
            state_dir,
            project_root,
        }
    }

    pub fn index_path(&self, exp_id: &str) -> PathBuf {
        self.index_dir.join(format!("{exp_id}.json"))
    }

    /// Resolve a path that may be relative to the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

/// Make a path absolute against the current directory without requiring it
/// to exist.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

pub(crate) fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|err| {
        ExpboxError::persistence(format!("create directory {}", path.display()), err)
    })
}
