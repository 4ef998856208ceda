//! `ContentNode` backed by the supervised daemon.
//!
//! Directory adds, name resolution and key management run as subprocesses.
//! Name publishing goes to the daemon's HTTP API and content is fetched from
//! its local gateway.

use crate::command::IpfsCommand;
use crate::supervisor::NodeSupervisor;
use async_trait::async_trait;
use bytes::Bytes;
use planet_core::node::cid_from_path;
use planet_core::{ContentNode, PlanetError, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

static CID_RE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\b(Qm[1-9A-HJ-NP-Za-km-z]{44}|b[a-z2-7]{58,})\b"));

/// Last CID printed by `add`.
pub fn parse_cid(output: &str) -> Result<String> {
    let re = CID_RE
        .as_ref()
        .map_err(|e| PlanetError::Node(format!("bad CID pattern: {}", e)))?;
    re.find_iter(output)
        .last()
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| PlanetError::Node(format!("no CID in output: {:?}", output.trim())))
}

#[derive(Debug, Deserialize)]
struct NamePublishResponse {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value")]
    value: String,
}

pub struct IpfsClient {
    supervisor: Arc<NodeSupervisor>,
    http: reqwest::Client,
}

impl IpfsClient {
    pub fn new(supervisor: Arc<NodeSupervisor>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| PlanetError::Node(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { supervisor, http })
    }

    fn ports(&self) -> Result<crate::ports::NodePorts> {
        self.supervisor
            .ports()
            .ok_or_else(|| PlanetError::Node("daemon is not running".into()))
    }

    async fn run(&self, cmd: IpfsCommand) -> Result<String> {
        let output = self.supervisor.tool().run(&cmd).await?;
        Ok(output.stdout_str())
    }

    /// CID a file would get, without adding it.
    pub async fn file_cid(&self, file: &Path) -> Result<String> {
        let out = self.run(IpfsCommand::file_cid(file)).await?;
        parse_cid(&out)
    }

    /// Write the key `name` to `target`.
    pub async fn export_key(&self, name: &str, target: &Path) -> Result<()> {
        self.run(IpfsCommand::export_key(name, target)).await?;
        Ok(())
    }

    /// Import a key file under `name`. Returns the derived name id.
    pub async fn import_key(&self, name: &str, source: &Path) -> Result<String> {
        self.run(IpfsCommand::import_key(name, source)).await
    }
}

#[async_trait]
impl ContentNode for IpfsClient {
    async fn add_directory(&self, dir: &Path) -> Result<String> {
        let out = self.run(IpfsCommand::add_directory(dir)).await?;
        parse_cid(&out)
    }

    async fn publish_name(&self, key: &str, cid: &str) -> Result<String> {
        let url = format!(
            "http://127.0.0.1:{}/api/v0/name/publish?arg=/ipfs/{}&key={}&allow-offline=true",
            self.ports()?.api,
            cid,
            key
        );
        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| PlanetError::Node(format!("name publish request failed: {}", e)))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PlanetError::Node(format!("name publish failed ({}): {}", status, body)));
        }
        let published: NamePublishResponse = resp
            .json()
            .await
            .map_err(|e| PlanetError::Node(format!("bad name publish response: {}", e)))?;
        tracing::debug!("name {} -> {}", published.name, published.value);
        Ok(published.name)
    }

    async fn resolve_name(&self, name: &str) -> Result<String> {
        let out = self.run(IpfsCommand::resolve_name(name)).await?;
        Ok(cid_from_path(&out).to_string())
    }

    async fn fetch(&self, cid: &str, path: &str) -> Result<Bytes> {
        let url = format!(
            "http://127.0.0.1:{}/ipfs/{}/{}",
            self.ports()?.gateway,
            cid,
            path.trim_start_matches('/')
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PlanetError::Node(format!("failed to fetch {}: {}", url, e)))?;
        if !resp.status().is_success() {
            return Err(PlanetError::Node(format!("GET {} failed ({})", url, resp.status())));
        }
        resp.bytes()
            .await
            .map_err(|e| PlanetError::Node(format!("failed to read {}: {}", url, e)))
    }

    async fn generate_key(&self, name: &str) -> Result<String> {
        let id = self.run(IpfsCommand::generate_key(name)).await?;
        if id.is_empty() {
            return Err(PlanetError::Node(format!("key gen {} printed no id", name)));
        }
        Ok(id)
    }

    async fn remove_key(&self, name: &str) -> Result<()> {
        self.run(IpfsCommand::remove_key(name)).await?;
        Ok(())
    }
}
