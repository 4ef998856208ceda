//! Interface to the content-addressing daemon.
//!
//! The publisher and the subscription sync only ever talk to the daemon
//! through this trait; `planet-ipfs` provides the production implementation.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

#[async_trait]
pub trait ContentNode: Send + Sync {
    /// Content-address a directory tree. Returns its CID.
    async fn add_directory(&self, dir: &Path) -> Result<String>;

    /// Point the persistent name owned by `key` at `cid`. Returns the name.
    async fn publish_name(&self, key: &str, cid: &str) -> Result<String>;

    /// Resolve a persistent name to the CID it currently points at.
    async fn resolve_name(&self, name: &str) -> Result<String>;

    /// Fetch `path` inside the tree identified by `cid`.
    async fn fetch(&self, cid: &str, path: &str) -> Result<Bytes>;

    /// Create a signing key. Returns the persistent name derived from it.
    async fn generate_key(&self, name: &str) -> Result<String>;

    async fn remove_key(&self, name: &str) -> Result<()>;
}

/// Strip an `/ipfs/` prefix from a resolved path, leaving the bare CID.
pub fn cid_from_path(resolved: &str) -> &str {
    let trimmed = resolved.trim();
    let trimmed = trimmed.strip_prefix("/ipfs/").unwrap_or(trimmed);
    trimmed.split('/').next().unwrap_or(trimmed)
}
