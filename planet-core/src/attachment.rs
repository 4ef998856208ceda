//! Attachment bookkeeping for drafts.
//!
//! A draft never touches the published directory while it is being edited.
//! Instead every attachment carries a status telling commit what to do with
//! it:
//! - `new`: exists only in the draft's working area
//! - `overwrite`: a working-area file replaces a published one
//! - `existing`: published and unchanged
//! - `deleted`: published, to be removed on commit

use crate::error::{PlanetError, Result};
use crate::persist::remove_file_if_exists;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentStatus {
    New,
    Overwrite,
    Existing,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    File,
}

impl AttachmentKind {
    /// Guess the media kind from a file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "tiff" | "webp" | "svg" => Self::Image,
            "mp4" | "mov" | "m4v" | "webm" => Self::Video,
            "mp3" | "m4a" | "wav" | "aac" | "ogg" | "flac" => Self::Audio,
            _ => Self::File,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub status: AttachmentStatus,
    pub created: DateTime<Utc>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, kind: AttachmentKind, status: AttachmentStatus) -> Self {
        Self {
            name: name.into(),
            kind,
            status,
            created: Utc::now(),
        }
    }

    /// Snippet an editor inserts into the article body.
    pub fn markdown(&self) -> Option<String> {
        match self.kind {
            AttachmentKind::Image => Some(format!("![{}]({})", self.name, self.name)),
            AttachmentKind::File => Some(format!("<a href=\"{}\">{}</a>", self.name, self.name)),
            AttachmentKind::Video | AttachmentKind::Audio => None,
        }
    }
}

/// The two directories an attachment can live in.
#[derive(Debug, Clone)]
pub struct AttachmentRoots {
    /// The draft's `Attachments/` working area.
    pub working: PathBuf,
    /// The article's published directory.
    pub published: PathBuf,
}

impl AttachmentRoots {
    pub fn new(working: impl Into<PathBuf>, published: impl Into<PathBuf>) -> Self {
        Self {
            working: working.into(),
            published: published.into(),
        }
    }
}

/// Ordered attachment entries of one draft, at most one per name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentLedger {
    entries: Vec<Attachment>,
}

impl AttachmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ledger with `existing` entries for already-published files.
    pub fn from_published(names: impl IntoIterator<Item = String>) -> Self {
        let entries = names
            .into_iter()
            .map(|name| {
                let kind = AttachmentKind::from_path(Path::new(&name));
                Attachment::new(name, kind, AttachmentStatus::Existing)
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[Attachment] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Attachment> {
        self.entries.iter().find(|a| a.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Attachment> {
        self.entries.iter_mut().find(|a| a.name == name)
    }

    /// True when an entry exists and is not marked for deletion.
    pub fn has_attachment(&self, name: &str) -> bool {
        self.get(name)
            .map(|a| a.status != AttachmentStatus::Deleted)
            .unwrap_or(false)
    }

    /// Copy `source` into the working area and record it.
    ///
    /// A published entry (`existing` or `deleted`) becomes `overwrite`; an
    /// entry already pending (`new` or `overwrite`) keeps its status and only
    /// its working file is refreshed; an unknown name is appended as `new`.
    pub fn add(&mut self, source: &Path, working_dir: &Path) -> Result<&Attachment> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PlanetError::Invalid(format!("{:?} has no file name", source)))?
            .to_string();

        fs::create_dir_all(working_dir)?;
        let target = working_dir.join(&name);
        if !same_file(source, &target) {
            let partial = working_dir.join(format!(".{}.tmp", name));
            if let Err(e) = fs::copy(source, &partial) {
                let _ = remove_file_if_exists(&partial);
                return Err(e.into());
            }
            fs::rename(&partial, &target)?;
        }

        let kind = AttachmentKind::from_path(source);
        match self.entries.iter().position(|a| a.name == name) {
            Some(idx) => {
                let entry = &mut self.entries[idx];
                if matches!(
                    entry.status,
                    AttachmentStatus::Existing | AttachmentStatus::Deleted
                ) {
                    entry.status = AttachmentStatus::Overwrite;
                }
                entry.kind = kind;
                tracing::debug!("attachment '{}' is now {:?}", name, entry.status);
                Ok(&self.entries[idx])
            }
            None => {
                tracing::debug!("attachment '{}' added as new", name);
                self.entries
                    .push(Attachment::new(name, kind, AttachmentStatus::New));
                Ok(&self.entries[self.entries.len() - 1])
            }
        }
    }

    /// Drop a `new` entry outright, or mark any other entry `deleted`.
    /// Returns false when no entry has this name.
    pub fn delete(&mut self, name: &str, working_dir: &Path) -> bool {
        let Some(idx) = self.entries.iter().position(|a| a.name == name) else {
            return false;
        };
        if self.entries[idx].status == AttachmentStatus::New {
            self.entries.remove(idx);
            if let Err(e) = remove_file_if_exists(&working_dir.join(name)) {
                tracing::warn!("failed to remove working copy of '{}': {}", name, e);
            }
        } else {
            self.entries[idx].status = AttachmentStatus::Deleted;
        }
        true
    }

    /// Restore a `deleted` or `overwrite` entry to `existing`. Any other
    /// status is left alone. Returns whether the status changed.
    pub fn revert(&mut self, name: &str) -> bool {
        match self.get_mut(name) {
            Some(entry)
                if matches!(
                    entry.status,
                    AttachmentStatus::Deleted | AttachmentStatus::Overwrite
                ) =>
            {
                entry.status = AttachmentStatus::Existing;
                true
            }
            _ => false,
        }
    }

    /// Location whose content is currently in effect for `name`.
    pub fn resolve_read_path(&self, name: &str, roots: &AttachmentRoots) -> Option<PathBuf> {
        self.get(name).map(|a| match a.status {
            AttachmentStatus::Existing | AttachmentStatus::Deleted => roots.published.join(name),
            AttachmentStatus::New | AttachmentStatus::Overwrite => roots.working.join(name),
        })
    }

    /// Apply every entry to the published directory, in ledger order.
    ///
    /// Stops at the first failing entry. Entries applied before it stay
    /// applied. Removing a published file that is already gone counts as
    /// success, so a failed commit can be re-run.
    pub fn apply(&self, roots: &AttachmentRoots) -> Result<()> {
        fs::create_dir_all(&roots.published)?;
        for attachment in &self.entries {
            apply_one(attachment, roots).map_err(|source| PlanetError::PartialCommit {
                attachment: attachment.name.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn apply_one(attachment: &Attachment, roots: &AttachmentRoots) -> std::io::Result<()> {
    let source = roots.working.join(&attachment.name);
    let target = roots.published.join(&attachment.name);
    match attachment.status {
        AttachmentStatus::New => {
            fs::copy(&source, &target)?;
        }
        AttachmentStatus::Overwrite => {
            // Already moved by an earlier attempt.
            if !source.exists() && target.exists() {
                return Ok(());
            }
            remove_file_if_exists(&target)?;
            fs::rename(&source, &target)?;
        }
        AttachmentStatus::Deleted => {
            remove_file_if_exists(&target)?;
        }
        AttachmentStatus::Existing => {}
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
