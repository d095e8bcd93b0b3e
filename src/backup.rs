//! Local README backups.
//!
//! One file per record in a flat directory. The file name encodes the owner,
//! the repository and a millisecond UTC timestamp:
//!
//! ```text
//! acme__widgets__20240102T030405123.md      prior README text
//! demo__empty-repo__20240102T030405124.absent   no README existed
//! ```
//!
//! GitHub logins never contain underscores, so the owner ends at the first
//! `__` and the timestamp starts after the last one. Records are never
//! modified after creation.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tokio::fs as tokio_fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Result, UpdaterError};
use crate::models::{BackupRecord, RepoRef};

const SEPARATOR: &str = "__";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3f";
const CONTENT_EXT: &str = "md";
const ABSENT_EXT: &str = "absent";
const MAX_COLLISION_BUMPS: u32 = 1000;

/// Directory-backed store of [`BackupRecord`]s
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Creates a store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the backup files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Records the current README of `repo`, `None` meaning no README exists
    pub async fn backup(&self, repo: &RepoRef, content: Option<&str>) -> Result<BackupRecord> {
        self.backup_at(repo, content, Utc::now()).await
    }

    /// Same as [`backup`](Self::backup) with an explicit timestamp
    ///
    /// If a record with the same millisecond already exists the timestamp is
    /// moved forward one millisecond at a time until the name is free.
    pub async fn backup_at(
        &self,
        repo: &RepoRef,
        content: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<BackupRecord> {
        tokio_fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| UpdaterError::BackupFailed {
                path: self.dir.clone(),
                source,
            })?;

        let mut timestamp = truncate_to_millis(at);
        for _ in 0..MAX_COLLISION_BUMPS {
            let id = record_id(&repo.owner, &repo.name, timestamp, content.is_some());
            let path = self.dir.join(&id);

            match tokio_fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    write_record(&path, file, content.unwrap_or_default().as_bytes()).await?;

                    info!("Backed up README of {} to {}", repo, path.display());
                    return Ok(BackupRecord {
                        id,
                        owner: repo.owner.clone(),
                        repo: repo.name.clone(),
                        timestamp,
                        stored_path: path,
                        original_content: content.map(str::to_string),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("Backup name {} taken, bumping timestamp", id);
                    timestamp += Duration::milliseconds(1);
                }
                Err(source) => return Err(UpdaterError::BackupFailed { path, source }),
            }
        }

        Err(UpdaterError::BackupFailed {
            path: self.dir.clone(),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "no free backup name"),
        })
    }

    /// Lists records newest first, optionally narrowed to an owner and repository
    pub async fn list(&self, owner: Option<&str>, repo: Option<&str>) -> Result<Vec<BackupRecord>> {
        let mut entries = match tokio_fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(UpdaterError::BackupFailed {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| UpdaterError::BackupFailed {
                path: self.dir.clone(),
                source,
            })?
        {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(parsed) = ParsedId::parse(&file_name) else {
                continue;
            };
            if owner.map_or(false, |o| o != parsed.owner) || repo.map_or(false, |r| r != parsed.repo) {
                continue;
            }
            records.push(self.load(parsed).await?);
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(records)
    }

    /// Reads one record by id
    pub async fn read(&self, id: &str) -> Result<BackupRecord> {
        let parsed = ParsedId::parse(id)
            .ok_or_else(|| UpdaterError::Validation(format!("invalid backup id '{}'", id)))?;
        if !tokio_fs::try_exists(self.dir.join(id)).await.unwrap_or(false) {
            return Err(UpdaterError::NotFound(format!("backup {}", id)));
        }
        self.load(parsed).await
    }

    /// Returns the content captured by `record`, `None` for the absent marker
    ///
    /// Reads the stored file again; the record stays in place and can be
    /// restored any number of times.
    pub async fn restore(&self, record: &BackupRecord) -> Result<Option<String>> {
        Ok(self.read(&record.id).await?.original_content)
    }

    /// Deletes one record
    pub async fn delete(&self, id: &str) -> Result<()> {
        ParsedId::parse(id).ok_or_else(|| UpdaterError::Validation(format!("invalid backup id '{}'", id)))?;
        let path = self.dir.join(id);
        match tokio_fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted backup {}", id);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(UpdaterError::NotFound(format!("backup {}", id)))
            }
            Err(source) => Err(UpdaterError::BackupFailed { path, source }),
        }
    }

    /// Keeps the newest `keep_last` records of each repository and deletes the rest
    ///
    /// Returns the number of deleted records.
    pub async fn cleanup(&self, owner: Option<&str>, repo: Option<&str>, keep_last: usize) -> Result<usize> {
        let records = self.list(owner, repo).await?;
        let mut seen: std::collections::HashMap<(String, String), usize> = std::collections::HashMap::new();
        let mut deleted = 0;

        for record in records {
            let count = seen.entry((record.owner.clone(), record.repo.clone())).or_default();
            *count += 1;
            if *count > keep_last {
                self.delete(&record.id).await?;
                deleted += 1;
            }
        }

        info!("Removed {} old backups", deleted);
        Ok(deleted)
    }

    async fn load(&self, parsed: ParsedId<'_>) -> Result<BackupRecord> {
        let path = self.dir.join(parsed.id);
        let original_content = if parsed.absent {
            None
        } else {
            let text = tokio_fs::read_to_string(&path)
                .await
                .map_err(|source| UpdaterError::BackupFailed {
                    path: path.clone(),
                    source,
                })?;
            Some(text)
        };

        Ok(BackupRecord {
            id: parsed.id.to_string(),
            owner: parsed.owner.to_string(),
            repo: parsed.repo.to_string(),
            timestamp: parsed.timestamp,
            stored_path: path,
            original_content,
        })
    }
}

struct ParsedId<'a> {
    id: &'a str,
    owner: &'a str,
    repo: &'a str,
    timestamp: DateTime<Utc>,
    absent: bool,
}

impl<'a> ParsedId<'a> {
    fn parse(id: &'a str) -> Option<Self> {
        if id.contains(['/', '\\']) || id.starts_with('.') {
            return None;
        }
        let (stem, ext) = id.rsplit_once('.')?;
        let absent = match ext {
            CONTENT_EXT => false,
            ABSENT_EXT => true,
            _ => return None,
        };

        let (owner, rest) = stem.split_once(SEPARATOR)?;
        let (repo, stamp) = rest.rsplit_once(SEPARATOR)?;
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();

        Some(Self {
            id,
            owner,
            repo,
            timestamp,
            absent,
        })
    }
}

/// Fills a freshly created record; a record that cannot be completed is removed
async fn write_record(path: &Path, mut file: tokio_fs::File, bytes: &[u8]) -> Result<()> {
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;
    drop(file);

    if let Err(source) = written {
        if let Err(e) = tokio_fs::remove_file(path).await {
            warn!("Could not remove incomplete backup {}: {}", path.display(), e);
        }
        return Err(UpdaterError::BackupFailed {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn record_id(owner: &str, repo: &str, timestamp: DateTime<Utc>, has_content: bool) -> String {
    format!(
        "{}{SEPARATOR}{}{SEPARATOR}{}.{}",
        sanitize_component(owner),
        sanitize_component(repo),
        timestamp.format(TIMESTAMP_FORMAT),
        if has_content { CONTENT_EXT } else { ABSENT_EXT }
    )
}

fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn at(ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap() + Duration::milliseconds(ms as i64)
    }

    #[tokio::test]
    async fn test_backup_restore_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = BackupStore::new(temp_dir.path());
        let repo = RepoRef::new("acme", "widgets");

        let record = store.backup(&repo, Some("# Widgets\n")).await?;
        assert_eq!(store.restore(&record).await?, Some("# Widgets\n".to_string()));
        // restoring twice yields the same content
        assert_eq!(store.restore(&record).await?, Some("# Widgets\n".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_record() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = BackupStore::new(temp_dir.path());
        let id = record_id("acme", "widgets", at(0), true);
        let path = temp_dir.path().join(&id);
        tokio_fs::write(&path, b"").await?;

        // a read-only handle rejects the write
        let read_only = tokio_fs::File::open(&path).await?;
        let result = write_record(&path, read_only, b"# Widgets\n").await;

        assert!(matches!(result, Err(UpdaterError::BackupFailed { .. })));
        assert!(!path.exists());
        assert!(store.list(None, None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_absent_marker_is_not_empty_content() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = BackupStore::new(temp_dir.path());

        let absent = store.backup(&RepoRef::new("demo", "empty-repo"), None).await?;
        let empty = store.backup(&RepoRef::new("demo", "blank"), Some("")).await?;

        assert!(absent.id.ends_with(".absent"));
        assert_eq!(store.restore(&absent).await?, None);
        assert_eq!(store.restore(&empty).await?, Some(String::new()));
        Ok(())
    }

    #[tokio::test]
    async fn test_same_millisecond_does_not_collide() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = BackupStore::new(temp_dir.path());
        let repo = RepoRef::new("acme", "widgets");

        let first = store.backup_at(&repo, Some("one"), at(7)).await?;
        let second = store.backup_at(&repo, Some("two"), at(7)).await?;

        assert_ne!(first.id, second.id);
        assert_eq!(second.timestamp, at(8));
        assert_eq!(store.restore(&first).await?, Some("one".to_string()));
        assert_eq!(store.restore(&second).await?, Some("two".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_newest_first() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = BackupStore::new(temp_dir.path());
        let widgets = RepoRef::new("acme", "widgets");
        let snake = RepoRef::new("acme", "snake__case");

        store.backup_at(&widgets, Some("old"), at(1)).await?;
        store.backup_at(&widgets, Some("new"), at(2)).await?;
        store.backup_at(&snake, None, at(3)).await?;
        tokio_fs::write(temp_dir.path().join("notes.txt"), "ignored").await?;

        let all = store.list(None, None).await?;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].repo, "snake__case");

        let only_widgets = store.list(Some("acme"), Some("widgets")).await?;
        let contents: Vec<_> = only_widgets
            .iter()
            .map(|r| r.original_content.clone().unwrap_or_default())
            .collect();
        assert_eq!(contents, vec!["new".to_string(), "old".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_read_delete_and_cleanup() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = BackupStore::new(temp_dir.path());
        let repo = RepoRef::new("acme", "widgets");

        for ms in 0..4 {
            store.backup_at(&repo, Some(&format!("v{ms}")), at(ms)).await?;
        }
        let other = store.backup_at(&RepoRef::new("acme", "gadgets"), Some("g"), at(0)).await?;

        assert_eq!(store.cleanup(None, None, 2).await?, 2);
        let remaining = store.list(Some("acme"), Some("widgets")).await?;
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].original_content.as_deref(), Some("v3"));

        assert_eq!(store.read(&other.id).await?, other);
        store.delete(&other.id).await?;
        assert!(matches!(store.read(&other.id).await, Err(UpdaterError::NotFound(_))));
        assert!(matches!(store.delete("../etc/passwd").await, Err(UpdaterError::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = BackupStore::new(temp_dir.path().join("never-created"));
        assert!(store.list(None, None).await?.is_empty());
        Ok(())
    }
}
