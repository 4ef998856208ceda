//! Daemon lifecycle.
//!
//! ```text
//! stopped -> [migrating] -> starting -> running -> stopping -> stopped
//!                 \______________\_________\
//!                                           -> error (until the next launch)
//! ```
//!
//! The daemon child is owned by a monitor task. The monitor either sees the
//! process exit on its own (a crash while starting or running moves the
//! supervisor to `error`) or is told to kill it.

use crate::command::{IpfsCommand, Tool};
use crate::config::NodeConfig;
use crate::migration::Migrator;
use crate::ports::NodePorts;
use async_trait::async_trait;
use planet_core::{PlanetError, Result};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};

/// Lines of daemon output kept for diagnostics.
const TAIL_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonState {
    Stopped,
    Migrating,
    Starting,
    Running,
    Stopping,
    Error(String),
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Migrating => write!(f, "migrating"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Health check against the daemon's HTTP control endpoint.
#[async_trait]
pub trait ControlEndpoint: Send + Sync {
    async fn is_healthy(&self, api_port: u16) -> bool;
}

/// Probes `POST /api/v0/id` on the loopback API port.
pub struct HttpControl {
    client: reqwest::Client,
}

impl HttpControl {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| PlanetError::Node(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ControlEndpoint for HttpControl {
    async fn is_healthy(&self, api_port: u16) -> bool {
        let url = format!("http://127.0.0.1:{}/api/v0/id", api_port);
        match self.client.post(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::trace!("health probe failed: {}", e);
                false
            }
        }
    }
}

/// Current state plus a broadcast of every transition.
struct StateCell {
    current: StdMutex<DaemonState>,
    tx: broadcast::Sender<DaemonState>,
}

impl StateCell {
    fn get(&self) -> DaemonState {
        self.current
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn set(&self, next: DaemonState) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *current == next {
            return;
        }
        tracing::info!("daemon {} -> {}", *current, next);
        *current = next.clone();
        let _ = self.tx.send(next);
    }

    /// Move to `Error` only from a state where the process is expected alive.
    fn fail_if_live(&self, reason: String) {
        let live = matches!(self.get(), DaemonState::Starting | DaemonState::Running);
        if live {
            self.set(DaemonState::Error(reason));
        }
    }
}

/// The running child, owned by its monitor task.
struct Process {
    kill: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
    readers: Vec<JoinHandle<()>>,
}

pub struct NodeSupervisor {
    config: NodeConfig,
    ipfs: Tool,
    migrator: Migrator,
    control: Arc<dyn ControlEndpoint>,
    state: Arc<StateCell>,
    ports: StdMutex<Option<NodePorts>>,
    process: Mutex<Option<Process>>,
    tail: Arc<StdMutex<VecDeque<String>>>,
}

impl NodeSupervisor {
    pub fn new(config: NodeConfig, control: Arc<dyn ControlEndpoint>) -> Self {
        let ipfs = Tool::new(&config.ipfs_path, &config.repo_path);
        let migrator = Migrator::new(
            Tool::new(&config.migration_path, &config.repo_path),
            config.repo_version,
        );
        let (tx, _) = broadcast::channel(32);
        Self {
            config,
            ipfs,
            migrator,
            control,
            state: Arc::new(StateCell {
                current: StdMutex::new(DaemonState::Stopped),
                tx,
            }),
            ports: StdMutex::new(None),
            process: Mutex::new(None),
            tail: Arc::new(StdMutex::new(VecDeque::with_capacity(TAIL_CAPACITY))),
        }
    }

    /// Supervisor probing health over HTTP.
    pub fn with_http_control(config: NodeConfig) -> Result<Self> {
        Ok(Self::new(config, Arc::new(HttpControl::new()?)))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Daemon executable bound to the repository.
    pub fn tool(&self) -> &Tool {
        &self.ipfs
    }

    pub fn state(&self) -> DaemonState {
        self.state.get()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonState> {
        self.state.tx.subscribe()
    }

    /// Ports of the current run, once configured.
    pub fn ports(&self) -> Option<NodePorts> {
        self.ports.lock().ok().and_then(|p| *p)
    }

    /// Most recent daemon output lines, oldest first.
    pub fn output_tail(&self) -> Vec<String> {
        self.tail
            .lock()
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Initialize the repository if it does not exist yet.
    pub async fn init_repo(&self) -> Result<()> {
        let repo = &self.config.repo_path;
        if repo.join("config").exists() {
            return Ok(());
        }
        std::fs::create_dir_all(repo)?;
        tracing::info!("initializing daemon repository at {}", repo.display());
        self.ipfs.run(&IpfsCommand::init()).await?;
        Ok(())
    }

    /// Probe ports and write them, plus the static peer list, into the
    /// repository configuration.
    pub async fn configure(&self) -> Result<NodePorts> {
        let ports = NodePorts::probe(
            self.config.api_port,
            self.config.gateway_port,
            self.config.swarm_port,
            self.config.port_span,
        )?;
        self.ipfs.run(&IpfsCommand::update_api_port(ports.api)).await?;
        self.ipfs.run(&IpfsCommand::update_gateway_port(ports.gateway)).await?;
        self.ipfs.run(&IpfsCommand::update_swarm_port(ports.swarm)).await?;
        if !self.config.peers.is_empty() {
            let peers = serde_json::to_string(&self.config.peers)?;
            self.ipfs.run(&IpfsCommand::set_peers(&peers)).await?;
        }
        tracing::info!(
            "daemon ports: api {}, gateway {}, swarm {}",
            ports.api,
            ports.gateway,
            ports.swarm
        );
        if let Ok(mut slot) = self.ports.lock() {
            *slot = Some(ports);
        }
        Ok(ports)
    }

    /// Migrate an existing repository to the supported version without
    /// starting the daemon. A repository that does not exist yet is left
    /// alone. On failure the supervisor moves to `error`.
    pub async fn migrate_repo(&self) -> Result<()> {
        let _process = self.process.lock().await;
        match self.state.get() {
            DaemonState::Stopped | DaemonState::Error(_) => {}
            other => {
                return Err(PlanetError::Invalid(format!("cannot migrate while {}", other)));
            }
        }
        match self.run_migration().await {
            Ok(()) => {
                self.state.set(DaemonState::Stopped);
                Ok(())
            }
            Err(e) => {
                self.state.set(DaemonState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_migration(&self) -> Result<()> {
        if !self.migrator.needed()? {
            return Ok(());
        }
        self.state.set(DaemonState::Migrating);
        let errors = self.migrator.migrate().await;
        if errors > 0 {
            return Err(PlanetError::Migration { errors });
        }
        Ok(())
    }

    /// Bring the daemon up: init, migrate if needed, configure, spawn, and
    /// wait for the control endpoint to answer.
    pub async fn launch(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        match self.state.get() {
            DaemonState::Stopped | DaemonState::Error(_) => {}
            other => {
                return Err(PlanetError::Invalid(format!("cannot launch daemon while {}", other)));
            }
        }
        if let Some(stale) = process.take() {
            self.reap(stale).await;
        }

        match self.bring_up().await {
            Ok(started) => {
                *process = Some(started);
                Ok(())
            }
            Err((e, started)) => {
                if let Some(started) = started {
                    self.reap(started).await;
                }
                self.state.set(DaemonState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn bring_up(&self) -> std::result::Result<Process, (PlanetError, Option<Process>)> {
        self.init_repo().await.map_err(|e| (e, None))?;
        self.run_migration().await.map_err(|e| (e, None))?;

        self.state.set(DaemonState::Starting);
        let ports = self.configure().await.map_err(|e| (e, None))?;
        let started = self.spawn_daemon().map_err(|e| (e, None))?;

        let deadline = Instant::now() + self.config.health_timeout();
        loop {
            if self.control.is_healthy(ports.api).await {
                break;
            }
            if let DaemonState::Error(reason) = self.state.get() {
                return Err((PlanetError::Node(reason), Some(started)));
            }
            if Instant::now() >= deadline {
                return Err((
                    PlanetError::Node("daemon did not become healthy in time".into()),
                    Some(started),
                ));
            }
            sleep(self.config.health_interval()).await;
        }

        // A crash between the probe and here has already moved us to Error.
        if self.state.get() == DaemonState::Starting {
            self.state.set(DaemonState::Running);
        }
        match self.state.get() {
            DaemonState::Running => Ok(started),
            other => Err((PlanetError::Node(format!("daemon {}", other)), Some(started))),
        }
    }

    fn spawn_daemon(&self) -> Result<Process> {
        let mut child: Child = self
            .ipfs
            .command(&IpfsCommand::launch_daemon())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlanetError::Node(format!("failed to start daemon: {}", e)))?;
        tracing::info!("daemon started (pid {:?})", child.id());

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, "stdout", self.tail.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, "stderr", self.tail.clone()));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let state = self.state.clone();
        let monitor = tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let reason = match status {
                        Ok(status) => format!("daemon exited unexpectedly ({})", status),
                        Err(e) => format!("lost daemon process: {}", e),
                    };
                    tracing::warn!("{}", reason);
                    state.fail_if_live(reason);
                }
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!("failed to kill daemon: {}", e);
                    }
                }
            }
        });

        Ok(Process {
            kill: Some(kill_tx),
            monitor,
            readers,
        })
    }

    /// Graceful stop: ask the daemon to shut down, kill it if it has not
    /// exited within the stop timeout.
    pub async fn shutdown(&self) -> Result<()> {
        let mut slot = self.process.lock().await;
        let Some(mut process) = slot.take() else {
            self.state.set(DaemonState::Stopped);
            return Ok(());
        };
        self.state.set(DaemonState::Stopping);

        if let Err(e) = self.ipfs.run(&IpfsCommand::shutdown_daemon()).await {
            tracing::warn!("shutdown command failed: {}", e);
        }
        if timeout(self.config.stop_timeout(), &mut process.monitor).await.is_err() {
            tracing::warn!("daemon did not stop within {:?}, killing", self.config.stop_timeout());
        }
        self.reap(process).await;
        self.state.set(DaemonState::Stopped);
        Ok(())
    }

    /// Terminate the daemon immediately.
    pub async fn kill(&self) {
        let mut slot = self.process.lock().await;
        if let Some(process) = slot.take() {
            self.state.set(DaemonState::Stopping);
            self.reap(process).await;
        }
        self.state.set(DaemonState::Stopped);
    }

    /// Make sure the child is gone and stop forwarding its output.
    async fn reap(&self, mut process: Process) {
        if let Some(kill) = process.kill.take() {
            let _ = kill.send(());
        }
        if !process.monitor.is_finished() {
            let _ = (&mut process.monitor).await;
        }
        for reader in process.readers {
            reader.abort();
        }
        if let Ok(mut slot) = self.ports.lock() {
            *slot = None;
        }
    }
}

fn forward_lines<R>(
    reader: R,
    stream: &'static str,
    tail: Arc<StdMutex<VecDeque<String>>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::debug!(target: "ipfs", "[{}] {}", stream, line);
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == TAIL_CAPACITY {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(target: "ipfs", "[{}] read error: {}", stream, e);
                    break;
                }
            }
        }
    })
}
