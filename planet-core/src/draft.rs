//! Drafts and the commit protocol that turns them into articles.
//!
//! A draft is either a brand-new article owned by its planet, or pending
//! edits to one existing article. Either way it lives in its own directory
//! (`Draft.json` plus an `Attachments/` working area) until it is committed
//! or discarded.

use crate::article::MyArticle;
use crate::attachment::{Attachment, AttachmentLedger, AttachmentRoots};
use crate::error::{PlanetError, Result};
use crate::layout::{ATTACHMENTS_DIR, DRAFT_FILE, INDEX_FILE, MyPlanetLayout, PREVIEW_FILE};
use crate::persist::{read_json, remove_dir_if_exists, uuid_from_path, write_json};
use crate::planet::MyPlanet;
use crate::render::render_page;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftKind {
    /// Becomes a new article on commit. Owned by the planet.
    NewArticle,
    /// Edits an existing article. Owned by that article.
    EditArticle,
}

/// Addresses a draft inside a planet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftRef {
    /// A new-article draft, by draft id.
    New(Uuid),
    /// The edit draft of an article, by article id.
    Edit(Uuid),
}

/// Serialized form of `Draft.json`.
#[derive(Serialize, Deserialize)]
struct DraftFile {
    id: Uuid,
    title: String,
    content: String,
    attachments: AttachmentLedger,
}

#[derive(Debug)]
pub struct Draft {
    id: Uuid,
    kind: DraftKind,
    pub title: String,
    pub content: String,
    attachments: AttachmentLedger,
    base_path: PathBuf,
    /// Published directory of the article being edited. `None` for new drafts.
    published_dir: Option<PathBuf>,
}

impl Draft {
    /// Start an empty new-article draft under `Drafts/<id>/`.
    pub fn create_new(layout: &MyPlanetLayout) -> Result<Self> {
        let id = Uuid::new_v4();
        let draft = Self {
            id,
            kind: DraftKind::NewArticle,
            title: String::new(),
            content: String::new(),
            attachments: AttachmentLedger::new(),
            base_path: layout.drafts_dir().join(id.to_string()),
            published_dir: None,
        };
        fs::create_dir_all(draft.attachments_path())?;
        draft.save()?;
        Ok(draft)
    }

    /// Start an edit draft seeded from the article's current state. Every
    /// published file except `index.html` becomes an `existing` attachment.
    pub fn create_for_article(layout: &MyPlanetLayout, article: &MyArticle) -> Result<Self> {
        let published = layout.article_public_dir(&article.link);
        let mut names = Vec::new();
        if published.exists() {
            for entry in fs::read_dir(&published)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    if name != INDEX_FILE {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();

        let draft = Self {
            id: article.id,
            kind: DraftKind::EditArticle,
            title: article.title.clone(),
            content: article.content.clone(),
            attachments: AttachmentLedger::from_published(names),
            base_path: layout.article_drafts_dir().join(article.id.to_string()),
            published_dir: Some(published),
        };
        fs::create_dir_all(draft.attachments_path())?;
        draft.save()?;
        Ok(draft)
    }

    /// Load a draft directory. The directory name must match the stored id.
    pub fn load(base_path: &Path, kind: DraftKind, published_dir: Option<PathBuf>) -> Result<Self> {
        let dir_id = uuid_from_path(base_path)?;
        let info_path = base_path.join(DRAFT_FILE);
        let file: DraftFile = read_json(&info_path)?;
        if file.id != dir_id {
            return Err(PlanetError::persistence(
                &info_path,
                format!("draft id {} does not match directory", file.id),
            ));
        }
        Ok(Self {
            id: file.id,
            kind,
            title: file.title,
            content: file.content,
            attachments: file.attachments,
            base_path: base_path.to_path_buf(),
            published_dir,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> DraftKind {
        self.kind
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn info_path(&self) -> PathBuf {
        self.base_path.join(DRAFT_FILE)
    }

    pub fn attachments_path(&self) -> PathBuf {
        self.base_path.join(ATTACHMENTS_DIR)
    }

    /// The preview sits next to the attachments so relative links resolve.
    pub fn preview_path(&self) -> PathBuf {
        self.attachments_path().join(PREVIEW_FILE)
    }

    pub fn attachments(&self) -> &[Attachment] {
        self.attachments.entries()
    }

    pub fn ledger(&self) -> &AttachmentLedger {
        &self.attachments
    }

    fn roots(&self) -> AttachmentRoots {
        let working = self.attachments_path();
        let published = self
            .published_dir
            .clone()
            .unwrap_or_else(|| working.clone());
        AttachmentRoots::new(working, published)
    }

    pub fn has_attachment(&self, name: &str) -> bool {
        self.attachments.has_attachment(name)
    }

    pub fn add_attachment(&mut self, source: &Path) -> Result<&Attachment> {
        let working = self.attachments_path();
        self.attachments.add(source, &working)
    }

    pub fn delete_attachment(&mut self, name: &str) -> bool {
        let working = self.attachments_path();
        self.attachments.delete(name, &working)
    }

    pub fn revert_attachment(&mut self, name: &str) -> bool {
        self.attachments.revert(name)
    }

    /// Path a preview should read `name` from right now.
    pub fn attachment_path(&self, name: &str) -> Option<PathBuf> {
        self.attachments.resolve_read_path(name, &self.roots())
    }

    pub fn save(&self) -> Result<()> {
        let file = DraftFile {
            id: self.id,
            title: self.title.clone(),
            content: self.content.clone(),
            attachments: self.attachments.clone(),
        };
        write_json(&self.info_path(), &file)
    }

    pub fn render_preview(&self) -> Result<PathBuf> {
        let path = self.preview_path();
        fs::create_dir_all(self.attachments_path())?;
        fs::write(&path, render_page(&self.title, &self.content))?;
        Ok(path)
    }

    /// Remove the draft directory and everything in it.
    pub fn delete(&self) -> Result<()> {
        remove_dir_if_exists(&self.base_path)?;
        Ok(())
    }
}

/// Draft operations on one owned planet.
///
/// Borrowing the planet mutably for the engine's lifetime keeps a single
/// writer on the planet's article list while a commit runs.
pub struct DraftEngine<'a> {
    planet: &'a mut MyPlanet,
    layout: &'a MyPlanetLayout,
}

impl<'a> DraftEngine<'a> {
    pub fn new(planet: &'a mut MyPlanet, layout: &'a MyPlanetLayout) -> Self {
        Self { planet, layout }
    }

    /// Start a new-article draft and return its id.
    pub fn new_draft(&mut self) -> Result<Uuid> {
        let draft = Draft::create_new(self.layout)?;
        let id = draft.id();
        self.planet.drafts.push(draft);
        tracing::debug!("planet {}: new draft {}", self.planet.id, id);
        Ok(id)
    }

    /// Open (or reuse) the edit draft of an article.
    pub fn edit_article(&mut self, article_id: Uuid) -> Result<&mut Draft> {
        let layout = self.layout;
        let article = self
            .planet
            .article_mut(article_id)
            .ok_or_else(|| PlanetError::NotFound(format!("article {}", article_id)))?;
        if article.draft.is_none() {
            article.draft = Some(Draft::create_for_article(layout, article)?);
        }
        article
            .draft
            .as_mut()
            .ok_or_else(|| PlanetError::NotFound(format!("draft for article {}", article_id)))
    }

    pub fn draft_mut(&mut self, target: DraftRef) -> Result<&mut Draft> {
        match target {
            DraftRef::New(id) => self
                .planet
                .drafts
                .iter_mut()
                .find(|d| d.id() == id)
                .ok_or_else(|| PlanetError::NotFound(format!("draft {}", id))),
            DraftRef::Edit(article_id) => self
                .planet
                .article_mut(article_id)
                .and_then(|a| a.draft.as_mut())
                .ok_or_else(|| PlanetError::NotFound(format!("draft for article {}", article_id))),
        }
    }

    /// Commit a draft. Returns the id of the created or updated article.
    ///
    /// If an attachment step fails the draft stays registered and on disk;
    /// steps already applied are not undone.
    pub fn commit(&mut self, target: DraftRef) -> Result<Uuid> {
        match target {
            DraftRef::New(id) => self.commit_new(id),
            DraftRef::Edit(article_id) => self.commit_edit(article_id),
        }
    }

    /// The article takes the draft's id, so re-running a commit that failed
    /// after its article was written replaces that article.
    fn commit_new(&mut self, draft_id: Uuid) -> Result<Uuid> {
        let idx = self
            .planet
            .drafts
            .iter()
            .position(|d| d.id() == draft_id)
            .ok_or_else(|| PlanetError::NotFound(format!("draft {}", draft_id)))?;
        let draft = self.planet.drafts.remove(idx);

        let mut article = MyArticle::compose(draft_id, draft.title.clone(), draft.content.clone());
        let previous = self.planet.articles.iter().position(|a| a.id == draft_id);
        if let Some(pos) = previous {
            article.link = self.planet.articles[pos].link.clone();
            article.created = self.planet.articles[pos].created;
            article.starred = self.planet.articles[pos].starred;
            article.draft = self.planet.articles[pos].draft.take();
        }
        if let Err(e) = self.materialize(&draft, &article) {
            tracing::warn!("planet {}: commit of draft {} failed: {}", self.planet.id, draft_id, e);
            self.planet.drafts.insert(idx, draft);
            return Err(e);
        }

        match previous {
            Some(pos) => self.planet.articles[pos] = article,
            None => self.planet.articles.insert(0, article),
        }
        self.planet.touch();
        if let Err(e) = self.planet.save(self.layout) {
            self.planet.drafts.insert(idx, draft);
            return Err(e);
        }
        draft.delete()?;
        tracing::info!("planet {}: committed new article {}", self.planet.id, draft_id);
        Ok(draft_id)
    }

    fn commit_edit(&mut self, article_id: Uuid) -> Result<Uuid> {
        let layout = self.layout;
        let idx = self
            .planet
            .articles
            .iter()
            .position(|a| a.id == article_id)
            .ok_or_else(|| PlanetError::NotFound(format!("article {}", article_id)))?;
        let draft = self.planet.articles[idx]
            .draft
            .take()
            .ok_or_else(|| PlanetError::NotFound(format!("draft for article {}", article_id)))?;

        let mut updated = MyArticle {
            id: article_id,
            link: self.planet.articles[idx].link.clone(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            created: self.planet.articles[idx].created,
            starred: self.planet.articles[idx].starred,
            draft: None,
        };
        if let Err(e) = self.materialize(&draft, &updated) {
            tracing::warn!("planet {}: commit of edits to {} failed: {}", self.planet.id, article_id, e);
            self.planet.articles[idx].draft = Some(draft);
            return Err(e);
        }

        let article = &mut self.planet.articles[idx];
        article.title = std::mem::take(&mut updated.title);
        article.content = std::mem::take(&mut updated.content);
        self.planet.touch();
        if let Err(e) = self.planet.save(layout) {
            self.planet.articles[idx].draft = Some(draft);
            return Err(e);
        }
        draft.delete()?;
        tracing::info!("planet {}: committed edits to article {}", self.planet.id, article_id);
        Ok(article_id)
    }

    /// Apply attachments, render the page and write the article record.
    fn materialize(&self, draft: &Draft, article: &MyArticle) -> Result<()> {
        let published = self.layout.article_public_dir(&article.link);
        let roots = AttachmentRoots::new(draft.attachments_path(), &published);
        draft.attachments.apply(&roots)?;
        fs::write(
            self.layout.article_index_path(&article.link),
            render_page(&article.title, &article.content),
        )?;
        article.save(&self.layout.article_path(article.id))
    }

    /// Throw a draft away without touching any article.
    pub fn discard(&mut self, target: DraftRef) -> Result<()> {
        let draft = match target {
            DraftRef::New(id) => {
                let idx = self
                    .planet
                    .drafts
                    .iter()
                    .position(|d| d.id() == id)
                    .ok_or_else(|| PlanetError::NotFound(format!("draft {}", id)))?;
                self.planet.drafts.remove(idx)
            }
            DraftRef::Edit(article_id) => self
                .planet
                .article_mut(article_id)
                .and_then(|a| a.draft.take())
                .ok_or_else(|| PlanetError::NotFound(format!("draft for article {}", article_id)))?,
        };
        draft.delete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::AttachmentStatus;
    use crate::layout::RootLayout;
    use tempfile::TempDir;

    fn planet_fixture() -> (TempDir, MyPlanet, MyPlanetLayout) {
        let tmp = TempDir::new().unwrap();
        let planet = MyPlanet::new(Uuid::new_v4(), "Test".into(), "About".into(), "k51test".into());
        let layout = RootLayout::new(tmp.path()).my_planet(planet.id);
        layout.create_dirs().unwrap();
        planet.save(&layout).unwrap();
        (tmp, planet, layout)
    }

    fn write_source(tmp: &TempDir, name: &str, body: &str) -> PathBuf {
        let dir = tmp.path().join("incoming");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_new_draft_commit_inserts_at_head() {
        let (tmp, mut planet, layout) = planet_fixture();
        let before = planet.updated;
        let mut engine = DraftEngine::new(&mut planet, &layout);

        let first = engine.new_draft().unwrap();
        engine.draft_mut(DraftRef::New(first)).unwrap().title = "first".into();
        let first_article = engine.commit(DraftRef::New(first)).unwrap();

        let second = engine.new_draft().unwrap();
        let draft = engine.draft_mut(DraftRef::New(second)).unwrap();
        draft.title = "second".into();
        let src = write_source(&tmp, "pic.png", "png");
        draft.add_attachment(&src).unwrap();
        let draft_dir = draft.base_path().to_path_buf();
        let second_article = engine.commit(DraftRef::New(second)).unwrap();

        assert_eq!(planet.articles[0].id, second_article);
        assert_eq!(planet.articles[1].id, first_article);
        assert!(planet.drafts.is_empty());
        assert!(!draft_dir.exists());
        assert!(planet.updated >= before);
        let link = second_article.to_string();
        assert!(layout.article_public_dir(&link).join("pic.png").exists());
        assert!(layout.article_index_path(&link).exists());
        assert!(layout.article_path(second_article).exists());
    }

    #[test]
    fn test_edit_commit_scenario() {
        let (tmp, mut planet, layout) = planet_fixture();
        let mut engine = DraftEngine::new(&mut planet, &layout);
        let draft_id = engine.new_draft().unwrap();
        let draft = engine.draft_mut(DraftRef::New(draft_id)).unwrap();
        draft.add_attachment(&write_source(&tmp, "b.png", "b")).unwrap();
        draft.add_attachment(&write_source(&tmp, "c.png", "c")).unwrap();
        let article_id = engine.commit(DraftRef::New(draft_id)).unwrap();
        let published = layout.article_public_dir(&article_id.to_string());

        let draft = engine.edit_article(article_id).unwrap();
        assert_eq!(draft.attachments().len(), 2);
        assert!(draft.attachments().iter().all(|a| a.status == AttachmentStatus::Existing));
        draft.add_attachment(&write_source(&tmp, "a.png", "a")).unwrap();
        draft.delete_attachment("c.png");
        draft.title = "edited".into();
        let draft_dir = draft.base_path().to_path_buf();

        assert_eq!(engine.commit(DraftRef::Edit(article_id)).unwrap(), article_id);
        assert!(published.join("a.png").exists());
        assert_eq!(fs::read_to_string(published.join("b.png")).unwrap(), "b");
        assert!(!published.join("c.png").exists());
        assert!(!draft_dir.exists());
        let article = planet.article(article_id).unwrap();
        assert_eq!(article.title, "edited");
        assert!(article.draft.is_none());
    }

    #[test]
    fn test_failed_commit_keeps_draft() {
        let (tmp, mut planet, layout) = planet_fixture();
        let mut engine = DraftEngine::new(&mut planet, &layout);
        let draft_id = engine.new_draft().unwrap();
        let draft = engine.draft_mut(DraftRef::New(draft_id)).unwrap();
        draft.add_attachment(&write_source(&tmp, "gone.png", "x")).unwrap();
        fs::remove_file(draft.attachments_path().join("gone.png")).unwrap();
        let draft_dir = draft.base_path().to_path_buf();

        let err = engine.commit(DraftRef::New(draft_id)).unwrap_err();
        assert!(matches!(err, PlanetError::PartialCommit { .. }));
        assert!(engine.draft_mut(DraftRef::New(draft_id)).is_ok());
        assert!(draft_dir.exists());
        assert!(planet.articles.is_empty());
    }

    #[test]
    fn test_commit_retry_after_record_save_failure() {
        let (_tmp, mut planet, layout) = planet_fixture();
        let info = layout.info_path();
        let mut engine = DraftEngine::new(&mut planet, &layout);
        let draft_id = engine.new_draft().unwrap();
        engine.draft_mut(DraftRef::New(draft_id)).unwrap().title = "once".into();

        // A non-empty directory in place of the record makes the save fail.
        fs::remove_file(&info).unwrap();
        fs::create_dir_all(info.join("blocker")).unwrap();
        assert!(engine.commit(DraftRef::New(draft_id)).is_err());
        assert!(engine.draft_mut(DraftRef::New(draft_id)).is_ok());

        fs::remove_dir_all(&info).unwrap();
        assert_eq!(engine.commit(DraftRef::New(draft_id)).unwrap(), draft_id);
        assert_eq!(planet.articles.len(), 1);
        assert_eq!(planet.articles[0].title, "once");
        assert!(planet.drafts.is_empty());

        let reloaded = MyPlanet::load(&layout).unwrap();
        assert_eq!(reloaded.articles.len(), 1);
        assert!(reloaded.drafts.is_empty());
    }

    #[test]
    fn test_draft_save_and_load() {
        let (tmp, mut planet, layout) = planet_fixture();
        let mut engine = DraftEngine::new(&mut planet, &layout);
        let id = engine.new_draft().unwrap();
        let draft = engine.draft_mut(DraftRef::New(id)).unwrap();
        draft.title = "saved".into();
        draft.content = "text".into();
        draft.add_attachment(&write_source(&tmp, "x.pdf", "pdf")).unwrap();
        draft.save().unwrap();

        let loaded = Draft::load(draft.base_path(), DraftKind::NewArticle, None).unwrap();
        assert_eq!(loaded.title, "saved");
        assert_eq!(loaded.content, "text");
        assert!(loaded.has_attachment("x.pdf"));
        assert_eq!(
            loaded.attachment_path("x.pdf").unwrap(),
            loaded.attachments_path().join("x.pdf")
        );
    }

    #[test]
    fn test_preview_and_discard() {
        let (_tmp, mut planet, layout) = planet_fixture();
        let mut engine = DraftEngine::new(&mut planet, &layout);
        let id = engine.new_draft().unwrap();
        let draft = engine.draft_mut(DraftRef::New(id)).unwrap();
        draft.title = "Preview".into();
        let preview = draft.render_preview().unwrap();
        assert!(fs::read_to_string(&preview).unwrap().contains("<h1>Preview</h1>"));
        let dir = draft.base_path().to_path_buf();

        engine.discard(DraftRef::New(id)).unwrap();
        assert!(!dir.exists());
        assert!(engine.draft_mut(DraftRef::New(id)).is_err());
    }

    #[test]
    fn test_commit_unknown_draft_is_not_found() {
        let (_tmp, mut planet, layout) = planet_fixture();
        let mut engine = DraftEngine::new(&mut planet, &layout);
        assert!(matches!(
            engine.commit(DraftRef::New(Uuid::new_v4())),
            Err(PlanetError::NotFound(_))
        ));
        assert!(matches!(
            engine.commit(DraftRef::Edit(Uuid::new_v4())),
            Err(PlanetError::NotFound(_))
        ));
    }
}
