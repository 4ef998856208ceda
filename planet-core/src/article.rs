//! Article records.

use crate::draft::Draft;
use crate::error::{PlanetError, Result};
use crate::persist::{read_json, uuid_from_path, write_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Article entry inside a published manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicArticle {
    pub link: String,
    pub title: String,
    #[serde(alias = "body")]
    pub content: String,
    pub created: DateTime<Utc>,
}

/// An article authored on this machine.
///
/// The id is allocated once on first commit and never changes.
#[derive(Debug, Serialize, Deserialize)]
pub struct MyArticle {
    pub id: Uuid,
    /// Public path segment. Names the published directory and is the link
    /// written to the manifest. Defaults to the id.
    pub link: String,
    pub title: String,
    #[serde(alias = "body")]
    pub content: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<DateTime<Utc>>,

    /// Pending edit draft, loaded from `ArticleDrafts/<id>/` when present.
    #[serde(skip)]
    pub draft: Option<Draft>,
}

impl MyArticle {
    pub fn compose(id: Uuid, title: String, content: String) -> Self {
        Self {
            id,
            link: id.to_string(),
            title,
            content,
            created: Utc::now(),
            starred: None,
            draft: None,
        }
    }

    /// Load a record, checking the stored id against the file name.
    pub fn load(path: &Path) -> Result<Self> {
        let id = uuid_from_path(path)?;
        let article: MyArticle = read_json(path)?;
        if article.id != id {
            return Err(PlanetError::persistence(
                path,
                format!("record id {} does not match file name", article.id),
            ));
        }
        if article.link.is_empty()
            || article.link.contains(['/', '\\'])
            || article.link == "."
            || article.link == ".."
        {
            return Err(PlanetError::persistence(
                path,
                format!("link {:?} is not a single path segment", article.link),
            ));
        }
        Ok(article)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    pub fn public_article(&self) -> PublicArticle {
        PublicArticle {
            link: self.link.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            created: self.created,
        }
    }
}

/// An article fetched from a subscribed planet.
///
/// The id is generated locally the first time the article is seen and is
/// stable afterwards; `link` is how the remote manifest identifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowingArticle {
    pub id: Uuid,
    pub link: String,
    pub title: String,
    #[serde(alias = "body")]
    pub content: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<DateTime<Utc>>,
}

impl FollowingArticle {
    /// First sighting of a remote article: new local id, no local flags.
    pub fn from_public(public: PublicArticle) -> Self {
        Self {
            id: Uuid::new_v4(),
            link: public.link,
            title: public.title,
            content: public.content,
            created: public.created,
            read: None,
            starred: None,
        }
    }

    /// Copy remote-owned fields. Local `read`/`starred` are never touched.
    /// Returns whether anything changed.
    pub fn refresh_from(&mut self, public: &PublicArticle) -> bool {
        let changed = self.title != public.title
            || self.content != public.content
            || self.created != public.created;
        if changed {
            self.title = public.title.clone();
            self.content = public.content.clone();
            self.created = public.created;
        }
        changed
    }

    pub fn load(path: &Path) -> Result<Self> {
        let id = uuid_from_path(path)?;
        let article: FollowingArticle = read_json(path)?;
        if article.id != id {
            return Err(PlanetError::persistence(
                path,
                format!("record id {} does not match file name", article.id),
            ));
        }
        if article.link.is_empty()
            || article.link.contains(['/', '\\'])
            || article.link == "."
            || article.link == ".."
        {
            return Err(PlanetError::persistence(
                path,
                format!("link {:?} is not a single path segment", article.link),
            ));
        }
        Ok(article)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }
}
