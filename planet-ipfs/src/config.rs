//! Daemon configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Repository version the bundled daemon understands.
pub const SUPPORTED_REPO_VERSION: u32 = 12;

/// A statically configured peer (`Peering.Peers` entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Addrs", default)]
    pub addrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Daemon executable
    pub ipfs_path: PathBuf,
    /// Repository migration executable
    pub migration_path: PathBuf,
    /// Daemon repository, passed to every invocation through `IPFS_PATH`
    pub repo_path: PathBuf,
    pub repo_version: u32,

    /// Preferred ports; the first free port at or above each is used.
    pub api_port: u16,
    pub gateway_port: u16,
    pub swarm_port: u16,
    /// How many ports above the preferred one to try.
    pub port_span: u16,

    pub peers: Vec<Peer>,

    pub health_timeout_ms: u64,
    pub health_interval_ms: u64,
    pub stop_timeout_ms: u64,
    pub wake_delay_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ipfs_path: PathBuf::from("ipfs"),
            migration_path: PathBuf::from("fs-repo-migrations"),
            repo_path: PathBuf::from("ipfs"),
            repo_version: SUPPORTED_REPO_VERSION,
            api_port: 5981,
            gateway_port: 18181,
            swarm_port: 4001,
            port_span: 100,
            peers: Vec::new(),
            health_timeout_ms: 30_000,
            health_interval_ms: 250,
            stop_timeout_ms: 10_000,
            wake_delay_ms: 1_000,
        }
    }
}

impl NodeConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn wake_delay(&self) -> Duration {
        Duration::from_millis(self.wake_delay_ms)
    }
}
