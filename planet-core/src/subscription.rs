//! Refreshing subscribed planets from their published manifests.

use crate::article::{FollowingArticle, PublicArticle};
use crate::error::{PlanetError, Result};
use crate::layout::MANIFEST_FILE;
use crate::node::{ContentNode, cid_from_path};
use crate::persist::remove_dir_if_exists;
use crate::planet::{FollowingPlanet, PublicPlanet};
use crate::store::{FollowingPlanetHandle, PlanetStore};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The name still resolves to the last-seen CID. Nothing was fetched.
    Unchanged { cid: String },
    Updated {
        cid: String,
        added: usize,
        refreshed: usize,
    },
}

/// Which local articles a merge created or changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub added: Vec<Uuid>,
    pub refreshed: Vec<Uuid>,
}

impl MergeReport {
    pub fn touched(&self) -> impl Iterator<Item = &Uuid> {
        self.added.iter().chain(self.refreshed.iter())
    }
}

/// Merge a remote article list into the local one.
///
/// Remote articles are matched to local ones by link. Unknown articles get a
/// fresh local id and are placed at the head in remote order; known ones
/// only take the remote title, content and created date. Local articles
/// missing from the remote list are kept. `read` and `starred` are never
/// modified.
pub fn merge_articles(local: &mut Vec<FollowingArticle>, remote: Vec<PublicArticle>) -> MergeReport {
    let by_link: HashMap<String, usize> = local
        .iter()
        .enumerate()
        .map(|(i, a)| (a.link.clone(), i))
        .collect();

    let mut report = MergeReport::default();
    let mut fresh = Vec::new();
    for public in remote {
        match by_link.get(&public.link) {
            Some(&i) => {
                if local[i].refresh_from(&public) {
                    report.refreshed.push(local[i].id);
                }
            }
            None => {
                if fresh.iter().any(|a: &FollowingArticle| a.link == public.link) {
                    continue;
                }
                let article = FollowingArticle::from_public(public);
                report.added.push(article.id);
                fresh.push(article);
            }
        }
    }
    local.splice(0..0, fresh);
    report
}

pub struct SubscriptionSync {
    node: Arc<dyn ContentNode>,
    store: Arc<PlanetStore>,
}

impl SubscriptionSync {
    pub fn new(node: Arc<dyn ContentNode>, store: Arc<PlanetStore>) -> Self {
        Self { node, store }
    }

    /// Follow the planet published under `link`.
    ///
    /// Nothing is kept unless the first update succeeds.
    pub async fn follow(&self, link: &str) -> Result<Arc<FollowingPlanetHandle>> {
        let link = link.trim();
        if link.is_empty() {
            return Err(PlanetError::Invalid("empty planet link".into()));
        }
        if self.store.following_by_link(link).await.is_some() {
            return Err(PlanetError::Invalid(format!("already following {}", link)));
        }

        let planet = FollowingPlanet::new(link.to_string());
        let layout = self.store.layout().following_planet(planet.id);
        let candidate = FollowingPlanetHandle::new(planet, layout);
        if let Err(e) = self.update(&candidate).await {
            remove_dir_if_exists(candidate.layout().base())?;
            return Err(e);
        }

        let planet = candidate.planet().read().await.clone();
        tracing::info!("following {} ({})", planet.name, planet.link);
        self.store.insert_following(planet).await
    }

    /// Refresh one subscribed planet.
    ///
    /// Rejected with [`PlanetError::Busy`] while another update of the same
    /// planet is running.
    pub async fn update(&self, handle: &FollowingPlanetHandle) -> Result<UpdateOutcome> {
        let _guard = handle.begin()?;
        let (link, last_cid) = {
            let planet = handle.planet().read().await;
            (planet.link.clone(), planet.cid.clone())
        };

        let resolved = self.node.resolve_name(&link).await?;
        let cid = cid_from_path(&resolved).to_string();
        if last_cid.as_deref() == Some(cid.as_str()) {
            tracing::debug!("planet {}: {} still at {}", handle.id(), link, cid);
            return Ok(UpdateOutcome::Unchanged { cid });
        }

        let bytes = self.node.fetch(&cid, MANIFEST_FILE).await?;
        let manifest: PublicPlanet = serde_json::from_slice(&bytes).map_err(|e| {
            PlanetError::Node(format!("invalid manifest at /ipfs/{}/{}: {}", cid, MANIFEST_FILE, e))
        })?;

        let layout = handle.layout();
        let mut planet = handle.planet().write().await;
        // Merge into a copy; the in-memory record only changes once disk agrees.
        let mut staged = planet.clone();
        let report = merge_articles(&mut staged.articles, manifest.articles);

        layout.create_dirs()?;
        for id in report.touched() {
            if let Some(article) = staged.article(*id) {
                article.save(&layout.article_path(*id))?;
            }
        }
        staged.name = manifest.name;
        staged.about = manifest.about;
        staged.updated = manifest.updated;
        staged.cid = Some(cid.clone());
        staged.last_retrieved = Some(Utc::now());
        staged.save(layout)?;
        *planet = staged;

        tracing::info!(
            "planet {}: updated to {} ({} new, {} changed)",
            handle.id(),
            cid,
            report.added.len(),
            report.refreshed.len()
        );
        Ok(UpdateOutcome::Updated {
            cid,
            added: report.added.len(),
            refreshed: report.refreshed.len(),
        })
    }

    /// Update every subscribed planet concurrently. Failures are logged.
    /// Returns how many planets picked up new content.
    pub async fn update_all(&self) -> usize {
        let planets = self.store.following_planets().await;
        let results = join_all(planets.iter().map(|h| self.update(h))).await;
        let mut updated = 0;
        for (handle, result) in planets.iter().zip(results) {
            match result {
                Ok(UpdateOutcome::Updated { .. }) => updated += 1,
                Ok(UpdateOutcome::Unchanged { .. }) => {}
                Err(e) => tracing::warn!("failed to update planet {}: {}", handle.id(), e),
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn public(link: &str, title: &str, created: i64) -> PublicArticle {
        PublicArticle {
            link: link.into(),
            title: title.into(),
            content: format!("{} body", title),
            created: at(created),
        }
    }

    #[test]
    fn test_merge_adds_new_at_head_in_remote_order() {
        let mut local = vec![FollowingArticle::from_public(public("old", "Old", 1))];
        let report = merge_articles(
            &mut local,
            vec![public("b", "B", 3), public("a", "A", 2), public("old", "Old", 1)],
        );
        let links: Vec<_> = local.iter().map(|a| a.link.as_str()).collect();
        assert_eq!(links, vec!["b", "a", "old"]);
        assert_eq!(report.added.len(), 2);
        assert!(report.refreshed.is_empty());
    }

    #[test]
    fn test_merge_keeps_articles_missing_remotely() {
        let mut local = vec![FollowingArticle::from_public(public("gone", "Gone", 1))];
        merge_articles(&mut local, vec![]);
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn test_merge_refreshes_remote_fields_only() {
        let mut existing = FollowingArticle::from_public(public("x", "Before", 1));
        existing.read = Some(at(10));
        existing.starred = Some(at(11));
        let id = existing.id;
        let mut local = vec![existing];

        let report = merge_articles(&mut local, vec![public("x", "After", 5)]);
        assert_eq!(report.refreshed, vec![id]);
        assert_eq!(local[0].id, id);
        assert_eq!(local[0].title, "After");
        assert_eq!(local[0].created, at(5));
        assert_eq!(local[0].read, Some(at(10)));
        assert_eq!(local[0].starred, Some(at(11)));
    }

    #[test]
    fn test_merge_ignores_duplicate_remote_links() {
        let mut local = Vec::new();
        merge_articles(&mut local, vec![public("d", "One", 1), public("d", "Two", 2)]);
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].title, "One");
    }

    proptest! {
        #[test]
        fn prop_merge_never_touches_local_flags(
            flags in proptest::collection::vec((any::<bool>(), any::<bool>()), 1..8),
            titles in proptest::collection::vec("[a-z]{1,6}", 1..8),
        ) {
            let mut local: Vec<FollowingArticle> = flags
                .iter()
                .enumerate()
                .map(|(i, (read, starred))| {
                    let mut a = FollowingArticle::from_public(public(&format!("l{}", i), "t", i as i64));
                    a.read = read.then(|| at(100));
                    a.starred = starred.then(|| at(200));
                    a
                })
                .collect();
            let before: HashMap<Uuid, _> = local.iter().map(|a| (a.id, (a.read, a.starred))).collect();

            let remote = titles
                .iter()
                .enumerate()
                .map(|(i, t)| public(&format!("l{}", i), t, 50))
                .collect();
            merge_articles(&mut local, remote);

            for article in &local {
                if let Some(flags) = before.get(&article.id) {
                    prop_assert_eq!(&(article.read, article.starred), flags);
                }
            }
        }
    }
}
