//! Scripted content node shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use planet_core::{ContentNode, PlanetError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

#[derive(Default)]
pub struct MockNode {
    names: Mutex<HashMap<String, String>>,
    files: Mutex<HashMap<(String, String), Bytes>>,
    next_cid: Mutex<Option<String>>,
    pub resolve_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub publish_calls: AtomicUsize,
    /// When set, `add_directory` parks until `release` is notified.
    pub gate: Option<(Notify, Notify)>,
    /// When set, `resolve_name` parks until `release` is notified.
    pub resolve_gate: Option<(Notify, Notify)>,
    pub fail_publish: AtomicBool,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some((Notify::new(), Notify::new())),
            ..Self::default()
        }
    }

    pub fn gated_resolve() -> Self {
        Self {
            resolve_gate: Some((Notify::new(), Notify::new())),
            ..Self::default()
        }
    }

    fn gates(&self) -> impl Iterator<Item = &(Notify, Notify)> {
        self.gate.iter().chain(self.resolve_gate.iter())
    }

    /// CID returned by the next `add_directory` calls.
    pub fn set_cid(&self, cid: &str) {
        *self.next_cid.lock().unwrap() = Some(cid.to_string());
    }

    pub fn point(&self, name: &str, cid: &str) {
        self.names.lock().unwrap().insert(name.to_string(), cid.to_string());
    }

    pub fn serve(&self, cid: &str, path: &str, body: impl Into<Bytes>) {
        self.files
            .lock()
            .unwrap()
            .insert((cid.to_string(), path.to_string()), body.into());
    }

    pub async fn wait_entered(&self) {
        for (entered, _) in self.gates() {
            entered.notified().await;
        }
    }

    pub fn release(&self) {
        for (_, release) in self.gates() {
            release.notify_one();
        }
    }
}

#[async_trait]
impl ContentNode for MockNode {
    async fn add_directory(&self, _dir: &Path) -> Result<String> {
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        self.next_cid
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PlanetError::Node("add failed".into()))
    }

    async fn publish_name(&self, key: &str, cid: &str) -> Result<String> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(PlanetError::Node("name publish failed".into()));
        }
        let name = format!("k51{}", key);
        self.point(&name, cid);
        Ok(name)
    }

    async fn resolve_name(&self, name: &str) -> Result<String> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.resolve_gate {
            entered.notify_one();
            release.notified().await;
        }
        self.names
            .lock()
            .unwrap()
            .get(name)
            .map(|cid| format!("/ipfs/{}", cid))
            .ok_or_else(|| PlanetError::Node(format!("cannot resolve {}", name)))
    }

    async fn fetch(&self, cid: &str, path: &str) -> Result<Bytes> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(&(cid.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| PlanetError::Node(format!("404 /ipfs/{}/{}", cid, path)))
    }

    async fn generate_key(&self, name: &str) -> Result<String> {
        Ok(format!("k51{}", name))
    }

    async fn remove_key(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}
