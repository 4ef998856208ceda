//! `planet.toml` application configuration.

use anyhow::{Context, Result};
use planet_ipfs::NodeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding planets, drafts and the daemon repository
    pub root: PathBuf,
    /// Whether the local control server is enabled
    pub api_enabled: bool,
    pub node: NodeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        Self {
            root: home.join(".planet"),
            api_enabled: false,
            node: NodeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content)
                .with_context(|| format!("Failed to parse {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Anchor a relative daemon repository path under the data root.
    pub fn resolve(mut self) -> Self {
        if self.node.repo_path.is_relative() {
            self.node.repo_path = self.root.join(&self.node.repo_path);
        }
        self
    }
}
