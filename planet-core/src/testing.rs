//! In-memory `ContentNode` for unit tests.

use crate::error::{PlanetError, Result};
use crate::node::ContentNode;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    keys: HashMap<String, String>,
    names: HashMap<String, String>,
    trees: HashMap<String, HashMap<String, Bytes>>,
    publish_calls: usize,
    removed_keys: Vec<String>,
}

/// Derives CIDs from directory contents, so identical trees yield identical
/// CIDs. Names resolve to whatever was last published or scripted.
#[derive(Default)]
pub struct ScriptedNode {
    state: Mutex<State>,
}

impl ScriptedNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `files` under `cid` and point `name` at it.
    pub fn serve(&self, name: &str, cid: &str, files: &[(&str, &[u8])]) {
        let mut state = self.state.lock().unwrap();
        state.names.insert(name.to_string(), cid.to_string());
        state.trees.insert(
            cid.to_string(),
            files
                .iter()
                .map(|(p, b)| (p.to_string(), Bytes::copy_from_slice(b)))
                .collect(),
        );
    }

    pub fn publish_calls(&self) -> usize {
        self.state.lock().unwrap().publish_calls
    }

    pub fn removed_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_keys.clone()
    }
}

fn hash_tree(dir: &Path, hasher: &mut DefaultHasher) -> std::io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        entry.file_name().hash(hasher);
        let path = entry.path();
        if path.is_dir() {
            hash_tree(&path, hasher)?;
        } else {
            std::fs::read(&path)?.hash(hasher);
        }
    }
    Ok(())
}

#[async_trait]
impl ContentNode for ScriptedNode {
    async fn add_directory(&self, dir: &Path) -> Result<String> {
        let mut hasher = DefaultHasher::new();
        hash_tree(dir, &mut hasher)?;
        Ok(format!("bafy{:016x}", hasher.finish()))
    }

    async fn publish_name(&self, key: &str, cid: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let name = state
            .keys
            .get(key)
            .cloned()
            .ok_or_else(|| PlanetError::Node(format!("no key {}", key)))?;
        state.names.insert(name.clone(), cid.to_string());
        state.publish_calls += 1;
        Ok(name)
    }

    async fn resolve_name(&self, name: &str) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .names
            .get(name)
            .cloned()
            .ok_or_else(|| PlanetError::Node(format!("could not resolve {}", name)))
    }

    async fn fetch(&self, cid: &str, path: &str) -> Result<Bytes> {
        self.state
            .lock()
            .unwrap()
            .trees
            .get(cid)
            .and_then(|t| t.get(path))
            .cloned()
            .ok_or_else(|| PlanetError::Node(format!("{}/{} not found", cid, path)))
    }

    async fn generate_key(&self, name: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let ipns = format!("k51{}", name.replace('-', ""));
        state.keys.insert(name.to_string(), ipns.clone());
        Ok(ipns)
    }

    async fn remove_key(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.keys.remove(name);
        state.removed_keys.push(name.to_string());
        Ok(())
    }
}
