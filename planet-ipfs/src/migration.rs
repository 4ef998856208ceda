//! Repository version detection and migration.

use crate::command::{IpfsCommand, Tool};
use planet_core::{PlanetError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// File inside the repository holding its format version.
pub const VERSION_FILE: &str = "version";

/// Read the repository version. `None` if the repository has no version
/// file yet.
pub fn read_repo_version(repo: &Path) -> Result<Option<u32>> {
    let path = repo.join(VERSION_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    text.trim()
        .parse()
        .map(Some)
        .map_err(|e| PlanetError::persistence(&path, format!("bad repository version: {}", e)))
}

/// Runs the migration tool against one repository.
pub struct Migrator {
    tool: Tool,
    target: u32,
}

impl Migrator {
    pub fn new(tool: Tool, target: u32) -> Self {
        Self { tool, target }
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Whether the repository needs migrating before the daemon can open it.
    pub fn needed(&self) -> Result<bool> {
        Ok(matches!(read_repo_version(self.tool.repo_path())?, Some(v) if v != self.target))
    }

    /// Migrate to the target version. Returns the number of errors; zero
    /// means the repository is now at the target version.
    pub async fn migrate(&self) -> usize {
        let mut errors = 0;
        match self.tool.output(&IpfsCommand::migrate_to(self.target)).await {
            Ok(output) if output.success() => {
                tracing::info!("repository migrated to version {}", self.target);
            }
            Ok(output) => {
                tracing::warn!(
                    "migration exited with status {}: {}",
                    output.status,
                    output.stderr_str()
                );
                errors += 1;
            }
            Err(e) => {
                tracing::warn!("failed to run migration: {}", e);
                errors += 1;
            }
        }

        match read_repo_version(self.tool.repo_path()) {
            Ok(Some(v)) if v == self.target => {}
            Ok(found) => {
                tracing::warn!(
                    "repository at version {:?} after migration, expected {}",
                    found,
                    self.target
                );
                errors += 1;
            }
            Err(e) => {
                tracing::warn!("failed to read repository version: {}", e);
                errors += 1;
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_version() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(read_repo_version(tmp.path()).unwrap(), None);
        fs::write(tmp.path().join(VERSION_FILE), "11\n").unwrap();
        assert_eq!(read_repo_version(tmp.path()).unwrap(), Some(11));
        fs::write(tmp.path().join(VERSION_FILE), "eleven").unwrap();
        assert!(read_repo_version(tmp.path()).is_err());
    }

    #[test]
    fn test_needed_on_upgrade_and_downgrade() {
        let tmp = TempDir::new().unwrap();
        let migrator = Migrator::new(Tool::new("true", tmp.path()), 12);
        assert!(!migrator.needed().unwrap());
        fs::write(tmp.path().join(VERSION_FILE), "10").unwrap();
        assert!(migrator.needed().unwrap());
        fs::write(tmp.path().join(VERSION_FILE), "13").unwrap();
        assert!(migrator.needed().unwrap());
        fs::write(tmp.path().join(VERSION_FILE), "12").unwrap();
        assert!(!migrator.needed().unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tool_success_but_wrong_version_counts() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(VERSION_FILE), "10").unwrap();
        let migrator = Migrator::new(Tool::new("true", tmp.path()), 12);
        assert_eq!(migrator.migrate().await, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_tool_counts_both_steps() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(VERSION_FILE), "10").unwrap();
        let migrator = Migrator::new(Tool::new("false", tmp.path()), 12);
        assert_eq!(migrator.migrate().await, 2);
    }
}
