//! Daemon wiring for commands that talk to the network.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use planet_ipfs::{ControlServer, IpfsClient, NodeSupervisor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A launched daemon and the client talking to it.
pub struct Node {
    pub supervisor: Arc<NodeSupervisor>,
    pub client: Arc<IpfsClient>,
}

impl Node {
    /// Supervisor for the configured repository, migrated to the supported
    /// version. Stores must not be opened until this succeeds.
    pub async fn prepare(config: &AppConfig) -> Result<Arc<NodeSupervisor>> {
        let supervisor = Arc::new(
            NodeSupervisor::with_http_control(config.node.clone())
                .context("Failed to set up daemon supervisor")?,
        );
        supervisor
            .migrate_repo()
            .await
            .context("Failed to migrate the IPFS repository")?;
        Ok(supervisor)
    }

    pub async fn start(supervisor: Arc<NodeSupervisor>) -> Result<Self> {
        supervisor
            .launch()
            .await
            .context("Failed to start the IPFS daemon")?;
        let client = Arc::new(IpfsClient::new(supervisor.clone())?);
        Ok(Self { supervisor, client })
    }

    pub async fn stop(self) {
        if let Err(e) = self.supervisor.shutdown().await {
            tracing::warn!("daemon shutdown failed: {}", e);
            self.supervisor.kill().await;
        }
    }
}

/// Serving flag of the local control server.
#[derive(Default)]
pub struct LocalApi {
    serving: AtomicBool,
}

impl LocalApi {
    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ControlServer for LocalApi {
    async fn pause(&self) -> planet_core::Result<()> {
        self.serving.store(false, Ordering::Release);
        tracing::info!("control server paused");
        Ok(())
    }

    async fn start(&self) -> planet_core::Result<()> {
        self.serving.store(true, Ordering::Release);
        tracing::info!("control server started");
        Ok(())
    }
}
