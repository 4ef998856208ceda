//! Daemon command surface and the one-shot subprocess runner.
//!
//! Every invocation gets the repository path through `IPFS_PATH`. Output is
//! drained by two reader tasks into accumulator buffers while the caller
//! awaits the exit status; a non-zero status becomes
//! [`PlanetError::Process`] with the captured stderr.

use bytes::{Bytes, BytesMut};
use planet_core::{PlanetError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Environment variable the daemon and migration tool read the repository
/// path from.
pub const REPO_ENV: &str = "IPFS_PATH";

/// Arguments for one daemon invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpfsCommand {
    args: Vec<String>,
}

impl IpfsCommand {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn init() -> Self {
        Self::new(["init"])
    }

    pub fn update_api_port(port: u16) -> Self {
        Self::new([
            "config".to_string(),
            "Addresses.API".to_string(),
            format!("/ip4/127.0.0.1/tcp/{}", port),
        ])
    }

    pub fn update_gateway_port(port: u16) -> Self {
        Self::new([
            "config".to_string(),
            "Addresses.Gateway".to_string(),
            format!("/ip4/127.0.0.1/tcp/{}", port),
        ])
    }

    pub fn update_swarm_port(port: u16) -> Self {
        let addrs = serde_json::json!([
            format!("/ip4/0.0.0.0/tcp/{}", port),
            format!("/ip6/::/tcp/{}", port),
            format!("/ip4/0.0.0.0/udp/{}/quic", port),
            format!("/ip6/::/udp/{}/quic", port),
        ]);
        Self::new([
            "config".to_string(),
            "Addresses.Swarm".to_string(),
            addrs.to_string(),
            "--json".to_string(),
        ])
    }

    pub fn set_peers(peers_json: &str) -> Self {
        Self::new(["config", "Peering.Peers", peers_json, "--json"])
    }

    pub fn launch_daemon() -> Self {
        Self::new(["daemon", "--enable-namesys-pubsub", "--enable-pubsub-experiment"])
    }

    pub fn shutdown_daemon() -> Self {
        Self::new(["shutdown"])
    }

    pub fn add_directory(dir: &Path) -> Self {
        Self::new([
            "add".to_string(),
            "-r".to_string(),
            dir.display().to_string(),
            "--cid-version=1".to_string(),
            "--quieter".to_string(),
        ])
    }

    /// Dry run: compute a file's CID without storing it.
    pub fn file_cid(file: &Path) -> Self {
        Self::new([
            "add".to_string(),
            file.display().to_string(),
            "--cid-version=1".to_string(),
            "--only-hash".to_string(),
        ])
    }

    pub fn export_key(name: &str, target: &Path) -> Self {
        Self::new([
            "key".to_string(),
            "export".to_string(),
            name.to_string(),
            "-o".to_string(),
            target.display().to_string(),
        ])
    }

    pub fn import_key(name: &str, source: &Path) -> Self {
        Self::new([
            "key".to_string(),
            "import".to_string(),
            name.to_string(),
            source.display().to_string(),
        ])
    }

    pub fn resolve_name(name: &str) -> Self {
        Self::new(["name", "resolve", name])
    }

    pub fn generate_key(name: &str) -> Self {
        Self::new(["key", "gen", name])
    }

    pub fn remove_key(name: &str) -> Self {
        Self::new(["key", "rm", name])
    }

    /// Migration tool arguments: no prompt, exact target version, allow
    /// downgrades.
    pub fn migrate_to(version: u32) -> Self {
        Self::new([
            "-y".to_string(),
            "-to".to_string(),
            version.to_string(),
            "-revert-ok".to_string(),
        ])
    }
}

impl std::fmt::Display for IpfsCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

/// Exit status and captured output of a finished invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: Bytes,
    pub stderr: Bytes,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// An executable bound to a repository.
#[derive(Debug, Clone)]
pub struct Tool {
    program: PathBuf,
    repo_path: PathBuf,
}

impl Tool {
    pub fn new(program: impl Into<PathBuf>, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            repo_path: repo_path.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// A ready-to-spawn command with piped output.
    pub fn command(&self, cmd: &IpfsCommand) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(cmd.args())
            .env(REPO_ENV, &self.repo_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    /// Run to completion and capture output, whatever the exit status.
    pub async fn output(&self, cmd: &IpfsCommand) -> Result<CommandOutput> {
        tracing::debug!("running {} {}", self.program.display(), cmd);
        let mut child = self.command(cmd).kill_on_drop(true).spawn().map_err(|e| {
            PlanetError::Node(format!("failed to spawn {}: {}", self.program.display(), e))
        })?;

        let stdout = child.stdout.take().map(accumulate);
        let stderr = child.stderr.take().map(accumulate);
        let status = child.wait().await?;

        Ok(CommandOutput {
            status: status.code().unwrap_or(-1),
            stdout: collect(stdout).await?,
            stderr: collect(stderr).await?,
        })
    }

    /// Run to completion; a non-zero exit status is an error.
    pub async fn run(&self, cmd: &IpfsCommand) -> Result<CommandOutput> {
        let output = self.output(cmd).await?;
        if !output.success() {
            return Err(PlanetError::Process {
                command: cmd.to_string(),
                status: output.status,
                stderr: output.stderr_str(),
            });
        }
        Ok(output)
    }
}

fn accumulate<R>(mut reader: R) -> JoinHandle<std::io::Result<Bytes>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(4096);
        while reader.read_buf(&mut buf).await? != 0 {}
        Ok(buf.freeze())
    })
}

async fn collect(handle: Option<JoinHandle<std::io::Result<Bytes>>>) -> Result<Bytes> {
    match handle {
        Some(handle) => handle
            .await
            .map_err(|e| PlanetError::Node(format!("output reader failed: {}", e)))?
            .map_err(PlanetError::from),
        None => Ok(Bytes::new()),
    }
}
