//! Planet records: owned sites and subscriptions.

use crate::article::{FollowingArticle, MyArticle, PublicArticle};
use crate::draft::{Draft, DraftKind};
use crate::error::{PlanetError, Result};
use crate::layout::{FollowingPlanetLayout, MyPlanetLayout};
use crate::persist::{json_files, read_json, subdirectories, uuid_from_path, write_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The published manifest (`planet.json` in the public directory), also the
/// document a subscriber fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicPlanet {
    pub name: String,
    pub about: String,
    pub ipns: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub articles: Vec<PublicArticle>,
}

/// A site authored on this machine.
#[derive(Debug, Serialize, Deserialize)]
pub struct MyPlanet {
    pub id: Uuid,
    pub name: String,
    pub about: String,
    /// Persistent name the site is published under. Fixed at creation.
    pub ipns: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published_cid: Option<String>,

    /// Most recent first.
    #[serde(skip)]
    pub articles: Vec<MyArticle>,
    /// New-article drafts.
    #[serde(skip)]
    pub drafts: Vec<Draft>,
}

impl MyPlanet {
    pub fn new(id: Uuid, name: String, about: String, ipns: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            about,
            ipns,
            created: now,
            updated: now,
            last_published: None,
            last_published_cid: None,
            articles: Vec::new(),
            drafts: Vec::new(),
        }
    }

    /// Name of the daemon key that signs this planet's name records.
    pub fn key_name(&self) -> String {
        self.id.to_string()
    }

    /// Load the record, its articles and any drafts left on disk.
    ///
    /// A malformed planet record fails the whole load. Individual articles or
    /// drafts that fail to load are skipped with a warning.
    pub fn load(layout: &MyPlanetLayout) -> Result<Self> {
        let dir_id = uuid_from_path(layout.base())?;
        let info_path = layout.info_path();
        let mut planet: MyPlanet = read_json(&info_path)?;
        if planet.id != dir_id {
            return Err(PlanetError::persistence(
                &info_path,
                format!("planet id {} does not match directory", planet.id),
            ));
        }

        for path in json_files(&layout.articles_dir())? {
            match MyArticle::load(&path) {
                Ok(article) => planet.articles.push(article),
                Err(e) => tracing::warn!("skipping article {:?}: {}", path, e),
            }
        }
        planet.articles.sort_by(|a, b| b.created.cmp(&a.created));

        for dir in subdirectories(&layout.drafts_dir())? {
            match Draft::load(&dir, DraftKind::NewArticle, None) {
                Ok(draft) => planet.drafts.push(draft),
                Err(e) => tracing::warn!("skipping draft {:?}: {}", dir, e),
            }
        }

        for dir in subdirectories(&layout.article_drafts_dir())? {
            let article_id = match uuid_from_path(&dir) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!("skipping article draft {:?}: {}", dir, e);
                    continue;
                }
            };
            let Some(article) = planet.article_mut(article_id) else {
                tracing::warn!("article draft {:?} has no article", dir);
                continue;
            };
            match Draft::load(&dir, DraftKind::EditArticle, Some(layout.article_public_dir(&article.link))) {
                Ok(draft) => article.draft = Some(draft),
                Err(e) => tracing::warn!("skipping article draft {:?}: {}", dir, e),
            }
        }

        Ok(planet)
    }

    pub fn save(&self, layout: &MyPlanetLayout) -> Result<()> {
        write_json(&layout.info_path(), self)
    }

    /// Bump the updated timestamp.
    pub fn touch(&mut self) {
        self.updated = Utc::now();
    }

    pub fn article(&self, id: Uuid) -> Option<&MyArticle> {
        self.articles.iter().find(|a| a.id == id)
    }

    pub fn article_mut(&mut self, id: Uuid) -> Option<&mut MyArticle> {
        self.articles.iter_mut().find(|a| a.id == id)
    }

    pub fn draft(&self, id: Uuid) -> Option<&Draft> {
        self.drafts.iter().find(|d| d.id() == id)
    }

    pub fn public_planet(&self) -> PublicPlanet {
        PublicPlanet {
            name: self.name.clone(),
            about: self.about.clone(),
            ipns: self.ipns.clone(),
            created: self.created,
            updated: self.updated,
            articles: self.articles.iter().map(MyArticle::public_article).collect(),
        }
    }
}

/// A remote site this machine follows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowingPlanet {
    pub id: Uuid,
    /// Persistent name the planet was followed by. Fixed at follow time.
    pub link: String,
    pub name: String,
    pub about: String,
    pub created: DateTime<Utc>,
    /// `updated` of the last manifest fetched.
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_retrieved: Option<DateTime<Utc>>,
    /// Last content identifier the name resolved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,

    /// Most recent first.
    #[serde(skip)]
    pub articles: Vec<FollowingArticle>,
}

impl FollowingPlanet {
    pub fn new(link: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: link.clone(),
            link,
            about: String::new(),
            created: now,
            updated: now,
            last_retrieved: None,
            cid: None,
            articles: Vec::new(),
        }
    }

    pub fn load(layout: &FollowingPlanetLayout) -> Result<Self> {
        let dir_id = uuid_from_path(layout.base())?;
        let info_path = layout.info_path();
        let mut planet: FollowingPlanet = read_json(&info_path)?;
        if planet.id != dir_id {
            return Err(PlanetError::persistence(
                &info_path,
                format!("planet id {} does not match directory", planet.id),
            ));
        }
        for path in json_files(&layout.articles_dir())? {
            match FollowingArticle::load(&path) {
                Ok(article) => planet.articles.push(article),
                Err(e) => tracing::warn!("skipping article {:?}: {}", path, e),
            }
        }
        planet.articles.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(planet)
    }

    pub fn save(&self, layout: &FollowingPlanetLayout) -> Result<()> {
        write_json(&layout.info_path(), self)
    }

    pub fn article(&self, id: Uuid) -> Option<&FollowingArticle> {
        self.articles.iter().find(|a| a.id == id)
    }

    pub fn article_mut(&mut self, id: Uuid) -> Option<&mut FollowingArticle> {
        self.articles.iter_mut().find(|a| a.id == id)
    }

    pub fn unread_count(&self) -> usize {
        self.articles.iter().filter(|a| a.read.is_none()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::{DraftEngine, DraftRef};
    use crate::layout::RootLayout;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_my_planet_roundtrip_with_articles_and_drafts() {
        let tmp = TempDir::new().unwrap();
        let mut planet = MyPlanet::new(Uuid::new_v4(), "Mine".into(), "".into(), "k51abc".into());
        let layout = RootLayout::new(tmp.path()).my_planet(planet.id);
        layout.create_dirs().unwrap();
        planet.save(&layout).unwrap();

        let (older, pending_edit, pending_new) = {
            let mut engine = DraftEngine::new(&mut planet, &layout);
            let d1 = engine.new_draft().unwrap();
            let older = engine.commit(DraftRef::New(d1)).unwrap();
            let d2 = engine.new_draft().unwrap();
            let newer = engine.commit(DraftRef::New(d2)).unwrap();
            engine.edit_article(newer).unwrap().title = "pending".into();
            engine.draft_mut(DraftRef::Edit(newer)).unwrap().save().unwrap();
            let d3 = engine.new_draft().unwrap();
            (older, newer, d3)
        };

        let loaded = MyPlanet::load(&layout).unwrap();
        assert_eq!(loaded.name, "Mine");
        assert_eq!(loaded.articles.len(), 2);
        assert_eq!(loaded.articles[1].id, older);
        assert_eq!(
            loaded.article(pending_edit).unwrap().draft.as_ref().unwrap().title,
            "pending"
        );
        assert!(loaded.draft(pending_new).is_some());
    }

    #[test]
    fn test_my_planet_mismatched_id_fails() {
        let tmp = TempDir::new().unwrap();
        let planet = MyPlanet::new(Uuid::new_v4(), "Mine".into(), "".into(), "k51abc".into());
        let layout = RootLayout::new(tmp.path()).my_planet(Uuid::new_v4());
        layout.create_dirs().unwrap();
        planet.save(&layout).unwrap();
        assert!(matches!(
            MyPlanet::load(&layout),
            Err(PlanetError::Persistence { .. })
        ));
    }

    #[test]
    fn test_corrupt_article_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let planet = FollowingPlanet::new("k51remote".into());
        let layout = RootLayout::new(tmp.path()).following_planet(planet.id);
        layout.create_dirs().unwrap();
        planet.save(&layout).unwrap();
        fs::write(layout.article_path(Uuid::new_v4()), "garbage").unwrap();

        let loaded = FollowingPlanet::load(&layout).unwrap();
        assert_eq!(loaded.link, "k51remote");
        assert!(loaded.articles.is_empty());
    }

    #[test]
    fn test_public_planet_lists_articles_in_order() {
        let mut planet = MyPlanet::new(Uuid::new_v4(), "P".into(), "A".into(), "k51".into());
        let (b, a) = (Uuid::new_v4(), Uuid::new_v4());
        planet.articles.push(MyArticle::compose(b, "B".into(), "".into()));
        planet.articles.push(MyArticle::compose(a, "A".into(), "".into()));
        let public = planet.public_planet();
        let links: Vec<_> = public.articles.iter().map(|a| a.link.clone()).collect();
        assert_eq!(links, vec![b.to_string(), a.to_string()]);
        assert_eq!(public.ipns, "k51");
    }
}
