//! Planet IPFS Node
//!
//! Supervision of the content-addressing daemon:
//! - Command surface and one-shot subprocess runner
//! - Port probing and repository configuration
//! - Repository version detection and migration
//! - Daemon lifecycle state machine with crash detection
//! - Sleep/wake housekeeping for the local control server
//! - `IpfsClient`, the production `ContentNode`

pub mod config;
pub mod command;
pub mod ports;
pub mod migration;
pub mod supervisor;
pub mod power;
pub mod client;

pub use config::{NodeConfig, Peer, SUPPORTED_REPO_VERSION};
pub use command::{CommandOutput, IpfsCommand, Tool};
pub use ports::NodePorts;
pub use migration::{Migrator, read_repo_version};
pub use supervisor::{ControlEndpoint, DaemonState, HttpControl, NodeSupervisor};
pub use power::{ControlServer, PowerMonitor};
pub use client::IpfsClient;
