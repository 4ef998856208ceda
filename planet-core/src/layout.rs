//! On-disk layout of the data root.
//!
//! ```text
//! <root>/My/<planet-id>/planet.json                 owned planet record
//! <root>/My/<planet-id>/Articles/<article-id>.json  owned article records
//! <root>/My/<planet-id>/Drafts/<draft-id>/          new-article drafts
//! <root>/My/<planet-id>/ArticleDrafts/<article-id>/ edit drafts
//! <root>/Public/<planet-id>/planet.json             published manifest
//! <root>/Public/<planet-id>/<article-link>/         index.html + attachments
//! <root>/Following/<planet-id>/planet.json          subscribed planet record
//! <root>/Following/<planet-id>/Articles/<id>.json   subscribed article records
//! ```

use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const PLANET_FILE: &str = "planet.json";
pub const MANIFEST_FILE: &str = "planet.json";
pub const INDEX_FILE: &str = "index.html";
pub const DRAFT_FILE: &str = "Draft.json";
pub const ATTACHMENTS_DIR: &str = "Attachments";
pub const PREVIEW_FILE: &str = "preview.html";

/// Top-level directories under the data root.
#[derive(Debug, Clone)]
pub struct RootLayout {
    root: PathBuf,
}

impl RootLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn my_planets_dir(&self) -> PathBuf {
        self.root.join("My")
    }

    pub fn public_dir(&self) -> PathBuf {
        self.root.join("Public")
    }

    pub fn following_planets_dir(&self) -> PathBuf {
        self.root.join("Following")
    }

    pub fn my_planet(&self, id: Uuid) -> MyPlanetLayout {
        MyPlanetLayout {
            base: self.my_planets_dir().join(id.to_string()),
            public: self.public_dir().join(id.to_string()),
        }
    }

    pub fn following_planet(&self, id: Uuid) -> FollowingPlanetLayout {
        FollowingPlanetLayout {
            base: self.following_planets_dir().join(id.to_string()),
        }
    }
}

/// Paths belonging to one owned planet.
#[derive(Debug, Clone)]
pub struct MyPlanetLayout {
    base: PathBuf,
    public: PathBuf,
}

impl MyPlanetLayout {
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn info_path(&self) -> PathBuf {
        self.base.join(PLANET_FILE)
    }

    pub fn articles_dir(&self) -> PathBuf {
        self.base.join("Articles")
    }

    pub fn article_path(&self, article: Uuid) -> PathBuf {
        self.articles_dir().join(format!("{}.json", article))
    }

    pub fn drafts_dir(&self) -> PathBuf {
        self.base.join("Drafts")
    }

    pub fn article_drafts_dir(&self) -> PathBuf {
        self.base.join("ArticleDrafts")
    }

    /// Directory content-addressed on publish.
    pub fn public_dir(&self) -> &Path {
        &self.public
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.public.join(MANIFEST_FILE)
    }

    pub fn article_public_dir(&self, link: &str) -> PathBuf {
        self.public.join(link)
    }

    pub fn article_index_path(&self, link: &str) -> PathBuf {
        self.article_public_dir(link).join(INDEX_FILE)
    }

    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.articles_dir())?;
        std::fs::create_dir_all(self.drafts_dir())?;
        std::fs::create_dir_all(self.article_drafts_dir())?;
        std::fs::create_dir_all(&self.public)?;
        Ok(())
    }
}

/// Paths belonging to one subscribed planet.
#[derive(Debug, Clone)]
pub struct FollowingPlanetLayout {
    base: PathBuf,
}

impl FollowingPlanetLayout {
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn info_path(&self) -> PathBuf {
        self.base.join(PLANET_FILE)
    }

    pub fn articles_dir(&self) -> PathBuf {
        self.base.join("Articles")
    }

    pub fn article_path(&self, article: Uuid) -> PathBuf {
        self.articles_dir().join(format!("{}.json", article))
    }

    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.articles_dir())
    }
}
