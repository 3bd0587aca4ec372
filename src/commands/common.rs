//! Shared setup for CLI commands.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{ServicePaths, SyncConfig};

/// Project root, its configuration and derived file paths.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: SyncConfig,
    pub paths: ServicePaths,
}

impl Project {
    /// Resolve the project from CLI overrides, falling back to the current
    /// directory and `<root>/.memwatch/config.toml`.
    pub fn load(root: Option<PathBuf>, config_file: Option<PathBuf>) -> Result<Self> {
        let root = match root {
            Some(root) => root,
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        let root = root
            .canonicalize()
            .with_context(|| format!("Project root not found: {}", root.display()))?;

        let config = match config_file {
            Some(path) => SyncConfig::load(&path)?,
            None => SyncConfig::discover(&root)?,
        };
        Ok(Self::new(&root, config))
    }

    pub fn new(root: &Path, config: SyncConfig) -> Self {
        Self {
            paths: ServicePaths::for_config(root, &config),
            root: root.to_path_buf(),
            config,
        }
    }
}
