//! System sleep/wake housekeeping for the embedded control server.

use async_trait::async_trait;
use planet_core::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// The local HTTP control server, driven from outside this crate.
#[async_trait]
pub trait ControlServer: Send + Sync {
    async fn pause(&self) -> Result<()>;
    async fn start(&self) -> Result<()>;
}

/// Pauses the control server on sleep and restarts it after wake.
///
/// Does nothing unless the server is enabled. Failures are logged, never
/// returned.
pub struct PowerMonitor {
    server: Arc<dyn ControlServer>,
    enabled: bool,
    wake_delay: Duration,
}

impl PowerMonitor {
    pub fn new(server: Arc<dyn ControlServer>, enabled: bool, wake_delay: Duration) -> Self {
        Self {
            server,
            enabled,
            wake_delay,
        }
    }

    pub async fn on_sleep(&self) {
        if !self.enabled {
            return;
        }
        tracing::info!("system going to sleep, pausing control server");
        if let Err(e) = self.server.pause().await {
            tracing::warn!("failed to pause control server: {}", e);
        }
    }

    /// Restart the server after the wake delay, on a background task.
    pub fn on_wake(&self) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }
        let server = self.server.clone();
        let delay = self.wake_delay;
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::info!("system awake, restarting control server");
            if let Err(e) = server.start().await {
                tracing::warn!("failed to restart control server: {}", e);
            }
        }))
    }
}
