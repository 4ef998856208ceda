//! Publishing an owned planet.

use crate::error::Result;
use crate::node::ContentNode;
use crate::persist::write_json;
use crate::render::render_page;
use crate::store::MyPlanetHandle;
use chrono::Utc;
use std::fs;
use std::sync::Arc;

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The name record now points at `cid`.
    Published { cid: String },
    /// Content did not change since the last publish; nothing was re-published.
    Unchanged { cid: String },
}

impl PublishOutcome {
    pub fn cid(&self) -> &str {
        match self {
            Self::Published { cid } | Self::Unchanged { cid } => cid,
        }
    }
}

pub struct Publisher {
    node: Arc<dyn ContentNode>,
}

impl Publisher {
    pub fn new(node: Arc<dyn ContentNode>) -> Self {
        Self { node }
    }

    /// Write the manifest, content-address the public directory and point
    /// the planet's name at it.
    ///
    /// Rejected with [`PlanetError::Busy`](crate::PlanetError::Busy) if a
    /// publish or commit is already running for this planet. On failure the
    /// last published CID and timestamp are left as they were.
    pub async fn publish(&self, handle: &MyPlanetHandle) -> Result<PublishOutcome> {
        let _guard = handle.begin()?;
        let layout = handle.layout();

        let (key, previous) = {
            let planet = handle.planet().read().await;
            fs::create_dir_all(layout.public_dir())?;
            for article in &planet.articles {
                let index = layout.article_index_path(&article.link);
                if !index.exists() {
                    fs::create_dir_all(layout.article_public_dir(&article.link))?;
                    fs::write(&index, render_page(&article.title, &article.content))?;
                }
            }
            write_json(&layout.manifest_path(), &planet.public_planet())?;
            (planet.key_name(), planet.last_published_cid.clone())
        };

        let cid = self.node.add_directory(layout.public_dir()).await?;
        if previous.as_deref() == Some(cid.as_str()) {
            tracing::info!("planet {}: content unchanged at {}", handle.id(), cid);
            return Ok(PublishOutcome::Unchanged { cid });
        }

        let name = self.node.publish_name(&key, &cid).await?;

        let mut planet = handle.planet().write().await;
        planet.last_published_cid = Some(cid.clone());
        planet.last_published = Some(Utc::now());
        planet.save(layout)?;
        tracing::info!("planet {}: published {} to {}", handle.id(), cid, name);
        Ok(PublishOutcome::Published { cid })
    }
}
