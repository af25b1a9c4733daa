//! Durable record store for posts.
//!
//! Records live in memory behind a single lock and are written to one
//! pretty-printed JSON object keyed by post id, safe to inspect and hand-edit
//! between runs. Every mutation rewrites the file through a temp file plus
//! rename before returning, so a crash leaves either the old or the new
//! snapshot on disk.

use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions as StdOpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::paths::lock_file_for;
use crate::domain::{FeedItem, PostRecord, PostStatus, PostUpdate};

/// Errors that can occur with the record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store is locked by another process: {0}")]
    Locked(PathBuf),

    #[error("Store was opened read-only")]
    ReadOnly,
}

/// Post counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub new: usize,
    pub pending_approval: usize,
    pub approved: usize,
    pub posted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StatusCounts {
    /// Count for one status
    pub fn get(&self, status: PostStatus) -> usize {
        match status {
            PostStatus::New => self.new,
            PostStatus::PendingApproval => self.pending_approval,
            PostStatus::Approved => self.approved,
            PostStatus::Posted => self.posted,
            PostStatus::Skipped => self.skipped,
            PostStatus::Failed => self.failed,
        }
    }

    fn bump(&mut self, status: PostStatus) {
        self.total += 1;
        match status {
            PostStatus::New => self.new += 1,
            PostStatus::PendingApproval => self.pending_approval += 1,
            PostStatus::Approved => self.approved += 1,
            PostStatus::Posted => self.posted += 1,
            PostStatus::Skipped => self.skipped += 1,
            PostStatus::Failed => self.failed += 1,
        }
    }
}

/// JSON-file backed post store
pub struct PostStore {
    /// Path to the posts JSON file
    path: PathBuf,

    /// All records keyed by id (BTreeMap keeps the file diff-friendly)
    posts: RwLock<BTreeMap<String, PostRecord>>,

    /// Held for the lifetime of a writable store
    lock_file: Option<std::fs::File>,
}

impl PostStore {
    /// Open (or create) a writable store, taking the process lock
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let lock_path = lock_file_for(&path);
        let lock_file = StdOpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked(lock_path.clone()))?;

        let posts = load_posts(&path).await?;
        info!(path = %path.display(), posts = posts.len(), "Opened post store");

        Ok(Self {
            path,
            posts: RwLock::new(posts),
            lock_file: Some(lock_file),
        })
    }

    /// Load a read-only snapshot (no process lock; used by reporting commands)
    pub async fn open_read_only(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let posts = load_posts(&path).await?;

        Ok(Self {
            path,
            posts: RwLock::new(posts),
            lock_file: None,
        })
    }

    /// Path to the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a NEW record; returns false without mutation if the id exists
    pub async fn insert(&self, id: &str, item: &FeedItem) -> Result<bool, StoreError> {
        self.ensure_writable()?;
        let mut posts = self.posts.write().await;

        if posts.contains_key(id) {
            debug!(post_id = %id, "Post already exists in store");
            return Ok(false);
        }

        posts.insert(id.to_string(), PostRecord::from_item(id, item));

        if let Err(e) = self.flush(&posts).await {
            posts.remove(id);
            return Err(e);
        }

        info!(post_id = %id, "Added new post to store");
        Ok(true)
    }

    /// Get a record by id
    pub async fn find(&self, id: &str) -> Option<PostRecord> {
        self.posts.read().await.get(id).cloned()
    }

    /// Check store membership (the dedup test)
    pub async fn contains(&self, id: &str) -> bool {
        self.posts.read().await.contains_key(id)
    }

    /// Resolve a correlation token to its record.
    ///
    /// A non-terminal holder is preferred over a terminal one, so an open
    /// record always wins the lookup.
    pub async fn find_by_token(&self, token: &str) -> Option<(String, PostRecord)> {
        let posts = self.posts.read().await;
        let mut terminal_match = None;

        for (id, record) in posts.iter() {
            if !record.has_token(token) {
                continue;
            }
            if !record.status.is_terminal() {
                return Some((id.clone(), record.clone()));
            }
            if terminal_match.is_none() {
                terminal_match = Some((id.clone(), record.clone()));
            }
        }

        terminal_match
    }

    /// Whether any record currently holds the token
    pub async fn token_in_use(&self, token: &str) -> bool {
        self.posts
            .read()
            .await
            .values()
            .any(|record| record.has_token(token))
    }

    /// Apply a status change plus field updates atomically.
    ///
    /// Returns the updated record, or None (with a warning) if the id is absent.
    pub async fn transition(
        &self,
        id: &str,
        status: PostStatus,
        update: PostUpdate,
    ) -> Result<Option<PostRecord>, StoreError> {
        self.mutate(id, Some(status), update).await
    }

    /// Apply field updates without changing the status
    pub async fn update_fields(
        &self,
        id: &str,
        update: PostUpdate,
    ) -> Result<Option<PostRecord>, StoreError> {
        self.mutate(id, None, update).await
    }

    async fn mutate(
        &self,
        id: &str,
        status: Option<PostStatus>,
        update: PostUpdate,
    ) -> Result<Option<PostRecord>, StoreError> {
        self.ensure_writable()?;
        let mut posts = self.posts.write().await;

        let Some(record) = posts.get_mut(id) else {
            warn!(post_id = %id, "Cannot update non-existent post");
            return Ok(None);
        };

        let previous = record.clone();
        if let Some(status) = status {
            record.status = status;
        }
        update.apply(record);
        record.updated_at = refreshed(previous.updated_at);
        let updated = record.clone();

        if let Err(e) = self.flush(&posts).await {
            posts.insert(id.to_string(), previous);
            return Err(e);
        }

        if previous.status != updated.status {
            info!(
                post_id = %id,
                from = %previous.status,
                to = %updated.status,
                "Post status updated"
            );
        } else {
            debug!(post_id = %id, status = %updated.status, "Post fields updated");
        }

        Ok(Some(updated))
    }

    /// All records with a status, oldest first
    pub async fn query_by_status(&self, status: PostStatus) -> Vec<PostRecord> {
        let posts = self.posts.read().await;
        let mut matching: Vec<PostRecord> = posts
            .values()
            .filter(|record| record.status == status)
            .cloned()
            .collect();

        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        matching
    }

    /// The newest records by creation time
    pub async fn list_recent(&self, limit: usize) -> Vec<PostRecord> {
        let posts = self.posts.read().await;
        let mut all: Vec<&PostRecord> = posts.values().collect();

        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        all.into_iter().take(limit).cloned().collect()
    }

    /// Counts by status plus total
    pub async fn aggregate_counts(&self) -> StatusCounts {
        let posts = self.posts.read().await;
        let mut counts = StatusCounts::default();
        for record in posts.values() {
            counts.bump(record.status);
        }
        counts
    }

    /// Remove records created before `now - age`, regardless of status
    pub async fn purge_older_than(&self, age: Duration) -> Result<usize, StoreError> {
        self.ensure_writable()?;
        let cutoff = Utc::now() - age;
        let mut posts = self.posts.write().await;

        let expired: Vec<String> = posts
            .iter()
            .filter(|(_, record)| record.created_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let mut removed: HashMap<String, PostRecord> = HashMap::new();
        for id in &expired {
            if let Some(record) = posts.remove(id) {
                removed.insert(id.clone(), record);
            }
        }

        if let Err(e) = self.flush(&posts).await {
            posts.extend(removed);
            return Err(e);
        }

        info!(removed = expired.len(), %cutoff, "Purged old posts");
        Ok(expired.len())
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.posts.read().await.is_empty()
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.lock_file.is_none() {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    /// Write the full snapshot to a temp file, sync, then rename over the store
    async fn flush(&self, posts: &BTreeMap<String, PostRecord>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(posts)?;
        let tmp_path = temp_path(&self.path);

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&json).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

impl Drop for PostStore {
    fn drop(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

/// `updated_at` never moves backwards, even if the wall clock does
fn refreshed(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

async fn load_posts(path: &Path) -> Result<BTreeMap<String, PostRecord>, StoreError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let content = fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut posts: BTreeMap<String, PostRecord> = serde_json::from_str(&content)?;

    // Hand edits may leave key and record id out of sync; the key wins
    for (key, record) in posts.iter_mut() {
        if &record.id != key {
            warn!(key = %key, id = %record.id, "Record id differs from its key, using key");
            record.id = key.clone();
        }
    }

    Ok(posts)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
