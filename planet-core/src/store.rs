//! Registry of loaded planets.
//!
//! Built once at startup and shared by handle. Each planet sits behind its
//! own handle carrying the record and the planet's in-flight flag; every
//! mutation of a planet's files goes through these entry points.

use crate::draft::{DraftEngine, DraftRef};
use crate::error::{PlanetError, Result};
use crate::guard::{InFlight, InFlightGuard};
use crate::layout::{FollowingPlanetLayout, MyPlanetLayout, RootLayout};
use crate::node::ContentNode;
use crate::persist::{remove_dir_if_exists, subdirectories};
use crate::planet::{FollowingPlanet, MyPlanet};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An owned planet and its serialization flag.
#[derive(Debug)]
pub struct MyPlanetHandle {
    id: Uuid,
    layout: MyPlanetLayout,
    planet: RwLock<MyPlanet>,
    busy: InFlight,
}

impl MyPlanetHandle {
    fn new(planet: MyPlanet, layout: MyPlanetLayout) -> Self {
        Self {
            id: planet.id,
            layout,
            planet: RwLock::new(planet),
            busy: InFlight::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn layout(&self) -> &MyPlanetLayout {
        &self.layout
    }

    pub fn planet(&self) -> &RwLock<MyPlanet> {
        &self.planet
    }

    /// True while a publish or commit holds this planet.
    pub fn is_publishing(&self) -> bool {
        self.busy.is_active()
    }

    pub(crate) fn begin(&self) -> Result<InFlightGuard<'_>> {
        self.busy.try_begin().ok_or(PlanetError::Busy(self.id))
    }

    /// Start a new-article draft.
    pub async fn new_draft(&self) -> Result<Uuid> {
        let mut planet = self.planet.write().await;
        DraftEngine::new(&mut planet, &self.layout).new_draft()
    }

    /// Open the edit draft of an article, creating it if needed.
    pub async fn edit_article(&self, article_id: Uuid) -> Result<()> {
        let mut planet = self.planet.write().await;
        DraftEngine::new(&mut planet, &self.layout).edit_article(article_id)?;
        Ok(())
    }

    /// Run `f` against a draft and save it afterwards.
    pub async fn update_draft<T>(
        &self,
        target: DraftRef,
        f: impl FnOnce(&mut crate::draft::Draft) -> Result<T>,
    ) -> Result<T> {
        let mut planet = self.planet.write().await;
        let mut engine = DraftEngine::new(&mut planet, &self.layout);
        let draft = engine.draft_mut(target)?;
        let out = f(draft)?;
        draft.save()?;
        Ok(out)
    }

    /// Commit a draft. Rejected with `Busy` while a publish is running.
    pub async fn commit_draft(&self, target: DraftRef) -> Result<Uuid> {
        let _guard = self.begin()?;
        let mut planet = self.planet.write().await;
        DraftEngine::new(&mut planet, &self.layout).commit(target)
    }

    pub async fn discard_draft(&self, target: DraftRef) -> Result<()> {
        let mut planet = self.planet.write().await;
        DraftEngine::new(&mut planet, &self.layout).discard(target)
    }

    pub async fn set_starred(&self, article_id: Uuid, starred: bool) -> Result<()> {
        let mut planet = self.planet.write().await;
        let article = planet
            .article_mut(article_id)
            .ok_or_else(|| PlanetError::NotFound(format!("article {}", article_id)))?;
        article.starred = starred.then(Utc::now);
        article.save(&self.layout.article_path(article_id))
    }

    /// Remove an article record. Its published directory is kept unless
    /// `purge` is set.
    pub async fn delete_article(&self, article_id: Uuid, purge: bool) -> Result<()> {
        let _guard = self.begin()?;
        let mut planet = self.planet.write().await;
        let idx = planet
            .articles
            .iter()
            .position(|a| a.id == article_id)
            .ok_or_else(|| PlanetError::NotFound(format!("article {}", article_id)))?;
        let article = planet.articles.remove(idx);
        if let Some(draft) = &article.draft {
            draft.delete()?;
        }
        crate::persist::remove_file_if_exists(&self.layout.article_path(article_id))?;
        if purge {
            remove_dir_if_exists(&self.layout.article_public_dir(&article.link))?;
        }
        planet.touch();
        planet.save(&self.layout)
    }
}

/// A subscribed planet and its serialization flag.
#[derive(Debug)]
pub struct FollowingPlanetHandle {
    id: Uuid,
    layout: FollowingPlanetLayout,
    planet: RwLock<FollowingPlanet>,
    busy: InFlight,
}

impl FollowingPlanetHandle {
    pub(crate) fn new(planet: FollowingPlanet, layout: FollowingPlanetLayout) -> Self {
        Self {
            id: planet.id,
            layout,
            planet: RwLock::new(planet),
            busy: InFlight::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn layout(&self) -> &FollowingPlanetLayout {
        &self.layout
    }

    pub fn planet(&self) -> &RwLock<FollowingPlanet> {
        &self.planet
    }

    /// True while an update holds this planet.
    pub fn is_updating(&self) -> bool {
        self.busy.is_active()
    }

    pub(crate) fn begin(&self) -> Result<InFlightGuard<'_>> {
        self.busy.try_begin().ok_or(PlanetError::Busy(self.id))
    }

    pub async fn set_read(&self, article_id: Uuid, read: bool) -> Result<()> {
        self.update_article(article_id, |a| a.read = read.then(Utc::now))
            .await
    }

    pub async fn set_starred(&self, article_id: Uuid, starred: bool) -> Result<()> {
        self.update_article(article_id, |a| a.starred = starred.then(Utc::now))
            .await
    }

    async fn update_article(
        &self,
        article_id: Uuid,
        f: impl FnOnce(&mut crate::article::FollowingArticle),
    ) -> Result<()> {
        let mut planet = self.planet.write().await;
        let article = planet
            .article_mut(article_id)
            .ok_or_else(|| PlanetError::NotFound(format!("article {}", article_id)))?;
        f(article);
        article.save(&self.layout.article_path(article_id))
    }
}

/// All planets known to this machine.
pub struct PlanetStore {
    layout: RootLayout,
    my_planets: RwLock<Vec<Arc<MyPlanetHandle>>>,
    following_planets: RwLock<Vec<Arc<FollowingPlanetHandle>>>,
}

impl PlanetStore {
    /// An empty store rooted at `layout`. Call [`PlanetStore::load`] to read
    /// existing planets.
    pub fn new(layout: RootLayout) -> Self {
        Self {
            layout,
            my_planets: RwLock::new(Vec::new()),
            following_planets: RwLock::new(Vec::new()),
        }
    }

    /// Open the store and load everything under the root.
    pub async fn open(layout: RootLayout) -> Result<Self> {
        let store = Self::new(layout);
        store.load().await?;
        Ok(store)
    }

    pub fn layout(&self) -> &RootLayout {
        &self.layout
    }

    /// (Re)load every planet from disk. A planet that fails to load is
    /// logged and left out; the others still load.
    pub async fn load(&self) -> Result<()> {
        let mut mine = Vec::new();
        for dir in subdirectories(&self.layout.my_planets_dir())? {
            let layout = match crate::persist::uuid_from_path(&dir) {
                Ok(id) => self.layout.my_planet(id),
                Err(e) => {
                    tracing::warn!("skipping planet directory {:?}: {}", dir, e);
                    continue;
                }
            };
            match MyPlanet::load(&layout) {
                Ok(planet) => mine.push(Arc::new(MyPlanetHandle::new(planet, layout))),
                Err(e) => tracing::warn!("failed to load planet {:?}: {}", dir, e),
            }
        }

        let mut following = Vec::new();
        for dir in subdirectories(&self.layout.following_planets_dir())? {
            let layout = match crate::persist::uuid_from_path(&dir) {
                Ok(id) => self.layout.following_planet(id),
                Err(e) => {
                    tracing::warn!("skipping planet directory {:?}: {}", dir, e);
                    continue;
                }
            };
            match FollowingPlanet::load(&layout) {
                Ok(planet) => following.push(Arc::new(FollowingPlanetHandle::new(planet, layout))),
                Err(e) => tracing::warn!("failed to load planet {:?}: {}", dir, e),
            }
        }

        tracing::info!(
            "loaded {} owned and {} followed planets",
            mine.len(),
            following.len()
        );
        *self.my_planets.write().await = mine;
        *self.following_planets.write().await = following;
        Ok(())
    }

    pub async fn my_planets(&self) -> Vec<Arc<MyPlanetHandle>> {
        self.my_planets.read().await.clone()
    }

    pub async fn following_planets(&self) -> Vec<Arc<FollowingPlanetHandle>> {
        self.following_planets.read().await.clone()
    }

    pub async fn my_planet(&self, id: Uuid) -> Result<Arc<MyPlanetHandle>> {
        self.my_planets
            .read()
            .await
            .iter()
            .find(|h| h.id == id)
            .cloned()
            .ok_or_else(|| PlanetError::NotFound(format!("planet {}", id)))
    }

    pub async fn following_planet(&self, id: Uuid) -> Result<Arc<FollowingPlanetHandle>> {
        self.following_planets
            .read()
            .await
            .iter()
            .find(|h| h.id == id)
            .cloned()
            .ok_or_else(|| PlanetError::NotFound(format!("planet {}", id)))
    }

    /// Create an owned planet. A signing key named after the planet id is
    /// generated on the daemon; its persistent name becomes the planet's.
    pub async fn create_my_planet(
        &self,
        node: &dyn ContentNode,
        name: &str,
        about: &str,
    ) -> Result<Arc<MyPlanetHandle>> {
        let id = Uuid::new_v4();
        let ipns = node.generate_key(&id.to_string()).await?;
        let planet = MyPlanet::new(id, name.to_string(), about.to_string(), ipns);
        let layout = self.layout.my_planet(id);
        layout.create_dirs()?;
        planet.save(&layout)?;
        tracing::info!("created planet {} ({}) at {}", name, id, planet.ipns);

        let handle = Arc::new(MyPlanetHandle::new(planet, layout));
        self.my_planets.write().await.insert(0, handle.clone());
        Ok(handle)
    }

    /// Delete an owned planet, its key, and both its private and public trees.
    pub async fn delete_my_planet(&self, node: &dyn ContentNode, id: Uuid) -> Result<()> {
        let handle = self.my_planet(id).await?;
        let _guard = handle.begin()?;
        if let Err(e) = node.remove_key(&id.to_string()).await {
            tracing::warn!("failed to remove key for planet {}: {}", id, e);
        }
        remove_dir_if_exists(handle.layout.base())?;
        remove_dir_if_exists(handle.layout.public_dir())?;
        self.my_planets.write().await.retain(|h| h.id != id);
        tracing::info!("deleted planet {}", id);
        Ok(())
    }

    /// Register a freshly followed planet that has already been fetched once.
    pub(crate) async fn insert_following(
        &self,
        planet: FollowingPlanet,
    ) -> Result<Arc<FollowingPlanetHandle>> {
        let mut list = self.following_planets.write().await;
        if let Some(existing) = list.iter().find(|h| h.id == planet.id) {
            return Ok(existing.clone());
        }
        let layout = self.layout.following_planet(planet.id);
        let handle = Arc::new(FollowingPlanetHandle::new(planet, layout));
        list.insert(0, handle.clone());
        Ok(handle)
    }

    /// Find a followed planet by the link it was followed with.
    pub async fn following_by_link(&self, link: &str) -> Option<Arc<FollowingPlanetHandle>> {
        let list = self.following_planets.read().await.clone();
        for handle in list {
            if handle.planet.read().await.link == link {
                return Some(handle);
            }
        }
        None
    }

    /// Stop following a planet and delete everything stored for it.
    pub async fn unfollow(&self, id: Uuid) -> Result<()> {
        let handle = self.following_planet(id).await?;
        let _guard = handle.begin()?;
        remove_dir_if_exists(handle.layout.base())?;
        self.following_planets.write().await.retain(|h| h.id != id);
        tracing::info!("unfollowed planet {}", id);
        Ok(())
    }
}
