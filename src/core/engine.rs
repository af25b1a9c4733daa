//! Workflow engine for the post approval lifecycle.
//!
//! Coordinates ingestion (dedup scan with early exit), commentary
//! enrichment, approval cards, operator command dispatch and the
//! platform-side publish/like actions. All state lives in the
//! [`PostStore`]; the engine itself only keeps runtime counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{ApprovalChannel, CommentaryGenerator};
use crate::domain::{
    ApprovalCard, Command, CommandError, FeedItem, InboundCommand, PostRecord, PostStatus,
    PostUpdate,
};

use super::correlation::{mint_token, token_for};
use super::report::{format_statistics, format_summary, help_text, RecentEntry};
use super::session::PlatformSession;
use super::store::{PostStore, StoreError};

/// Consecutive already-known items that end an ingestion scan
pub const EARLY_EXIT_AFTER: usize = 2;

/// Attempts at saving the POSTED state after a successful publish
const POSTED_WRITE_ATTEMPTS: u32 = 3;

/// Tunables for the engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Maximum items fetched (and processed) per scan
    pub lookback: usize,

    /// Age after which records are purged at the end of a cycle
    pub retention: Option<chrono::Duration>,

    /// Pause between cards when re-sending several posts
    pub resend_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lookback: 10,
            retention: None,
            resend_delay: Duration::from_millis(500),
        }
    }
}

/// Result of one ingestion scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Items returned by the source (after the lookback bound)
    pub fetched: usize,
    /// Items seen for the first time
    pub new_items: usize,
    /// Already-stored items encountered before stopping
    pub known: usize,
    /// New items that reached PENDING_APPROVAL
    pub notified: usize,
    /// New items that ended up FAILED
    pub failed: usize,
    /// Items without any usable identity
    pub invalid: usize,
    /// Whether the early-exit rule ended the scan
    pub stopped_early: bool,
    /// Ids fully processed, in fetch order
    pub processed_ids: Vec<String>,
}

/// Result of one retry sweep over FAILED and stranded NEW records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub attempted: usize,
    /// NEW records left behind by an interrupted cycle
    pub resumed: usize,
    pub recovered: usize,
    pub still_failed: usize,
}

/// Result of a full polling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub retry: RetryReport,
    pub scan: ScanReport,
    pub purged: usize,
}

/// What a dispatched command did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Published { post_id: String, result_url: String },
    PublishFailed { post_id: String, error: String },
    RepostConfirmationRequested { post_id: String },
    RepostCancelled { post_id: String },
    Skipped { post_id: String },
    Regenerated { post_id: String },
    RegenerateFailed { post_id: String, error: String },
    Liked { post_id: String, success: bool },
    NotFound { token: String },
    Refused { post_id: String, reason: String },
    Invalid(CommandError),
    Reported { cards_sent: usize },
}

/// Runtime counters since the engine was created
#[derive(Debug, Default)]
struct Counters {
    found: AtomicU64,
    approved: AtomicU64,
    published: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of the runtime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub found: u64,
    pub approved: u64,
    pub published: u64,
    pub skipped: u64,
    pub errors: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Per-record locks: one workflow step per post at a time.
///
/// An entry lives only while someone holds or waits on it.
#[derive(Default)]
struct RecordLocks {
    inner: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl RecordLocks {
    async fn acquire(&self, id: &str) -> RecordGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(id.to_string()).or_default().clone()
        };
        RecordGuard {
            guard: Some(lock.lock_owned().await),
            id: id.to_string(),
            locks: Arc::clone(&self.inner),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Held record lock; releasing the last holder drops the map entry
struct RecordGuard {
    guard: Option<OwnedMutexGuard<()>>,
    id: String,
    locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if map
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.id);
        }
    }
}

/// How an approval should publish
#[derive(Debug, Clone)]
enum PublishMode {
    /// Use the stored commentary, or replace it first
    WithCommentary { replacement: Option<String> },
    /// Publish without commentary
    Plain,
}

/// Which path produced a card
#[derive(Debug, Clone, Copy)]
enum NotifyPath {
    Fresh,
    Retry,
    Regenerate,
}

/// Main workflow engine
pub struct Engine {
    store: Arc<PostStore>,
    session: Arc<PlatformSession>,
    generator: Arc<dyn CommentaryGenerator>,
    channel: Arc<dyn ApprovalChannel>,
    settings: EngineSettings,
    counters: Counters,
    locks: RecordLocks,
    stopping: AtomicBool,
}

impl Engine {
    /// Create a new engine
    pub fn new(
        store: Arc<PostStore>,
        session: Arc<PlatformSession>,
        generator: Arc<dyn CommentaryGenerator>,
        channel: Arc<dyn ApprovalChannel>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            session,
            generator,
            channel,
            settings,
            counters: Counters::default(),
            locks: RecordLocks::default(),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<PostStore> {
        &self.store
    }

    pub fn channel(&self) -> &Arc<dyn ApprovalChannel> {
        &self.channel
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            found: self.counters.found.load(Ordering::Relaxed),
            approved: self.counters.approved.load(Ordering::Relaxed),
            published: self.counters.published.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Ask an in-progress cycle to stop after the current item
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Polling cycle
    // ========================================================================

    /// Retry sweep, then ingestion scan, then the optional retention purge.
    ///
    /// An error here means the cycle itself could not run (e.g. the source
    /// is unreachable); per-item failures are recorded on the items instead.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        info!("🔍 Checking for new posts");

        let retry = self.retry_failed().await;
        let scan = self.scan().await?;

        let purged = match self.settings.retention {
            Some(age) => self
                .store
                .purge_older_than(age)
                .await
                .context("Retention purge failed")?,
            None => 0,
        };

        info!(
            new = scan.new_items,
            notified = scan.notified,
            failed = scan.failed,
            recovered = retry.recovered,
            purged,
            "Cycle complete"
        );

        Ok(CycleReport {
            retry,
            scan,
            purged,
        })
    }

    /// Walk the feed newest-first and process unseen items.
    ///
    /// Two consecutive already-stored items end the scan: the feed only grows
    /// at the head, so anything older has been seen before.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<ScanReport> {
        let lookback = self.settings.lookback;
        let mut items = self
            .session
            .fetch_recent(lookback)
            .await
            .context("Failed to fetch recent items")?;
        items.truncate(lookback);

        let mut report = ScanReport {
            fetched: items.len(),
            ..Default::default()
        };

        if items.is_empty() {
            info!("No posts found");
            return Ok(report);
        }

        info!(count = items.len(), "Fetched posts");
        self.counters
            .found
            .fetch_add(items.len() as u64, Ordering::Relaxed);

        let mut consecutive_known = 0usize;

        for item in items {
            if self.is_stopping() {
                info!("Stop requested, ending scan early");
                break;
            }

            if item.id.trim().is_empty() && item.url.trim().is_empty() {
                warn!("Skipping feed item without id or url");
                report.invalid += 1;
                continue;
            }

            let id = item.resolved_id();

            if self.store.contains(&id).await {
                consecutive_known += 1;
                report.known += 1;
                debug!(post_id = %id, consecutive_known, "Post already in store");

                if consecutive_known >= EARLY_EXIT_AFTER {
                    info!(consecutive_known, "✋ Caught up with stored posts, stopping scan");
                    report.stopped_early = true;
                    break;
                }
                continue;
            }

            consecutive_known = 0;
            report.new_items += 1;
            report.processed_ids.push(id.clone());

            match self.process_new(&id, &item).await {
                Ok(true) => report.notified += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    error!(post_id = %id, stage = "ingest", error = %e, "Failed to process post");
                    bump(&self.counters.errors);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Insert, enrich and notify one new item. Ok(true) when the card went out.
    async fn process_new(&self, id: &str, item: &FeedItem) -> Result<bool> {
        let _guard = self.locks.acquire(id).await;

        info!(post_id = %id, "📄 Processing new post");
        if !self.store.insert(id, item).await? {
            debug!(post_id = %id, "Post was inserted concurrently");
            return Ok(false);
        }

        let record = self
            .store
            .find(id)
            .await
            .with_context(|| format!("Post {} vanished after insert", id))?;

        self.enrich_and_notify(&record, NotifyPath::Fresh).await
    }

    /// Re-attempt enrichment and notification for every FAILED record.
    ///
    /// Records still NEW were inserted by a cycle that never finished them;
    /// they go through the fresh path. Never re-runs the publish action; a
    /// failed publish comes back as a fresh approval card and needs an
    /// operator command.
    #[instrument(skip(self))]
    pub async fn retry_failed(&self) -> RetryReport {
        let mut candidates = self.store.query_by_status(PostStatus::New).await;
        candidates.extend(self.store.query_by_status(PostStatus::Failed).await);
        let mut report = RetryReport::default();

        if candidates.is_empty() {
            return report;
        }

        info!(count = candidates.len(), "🔄 Retrying unfinished posts");

        for candidate in candidates {
            if self.is_stopping() {
                break;
            }

            // Re-read under the lock; a command may have moved it meanwhile
            let Some((_guard, record)) = self.locked(&candidate.id).await else {
                continue;
            };
            let path = match record.status {
                PostStatus::Failed => NotifyPath::Retry,
                PostStatus::New => {
                    info!(post_id = %record.id, "Resuming post from an interrupted cycle");
                    report.resumed += 1;
                    NotifyPath::Fresh
                }
                _ => continue,
            };

            report.attempted += 1;
            match self.enrich_and_notify(&record, path).await {
                Ok(true) => report.recovered += 1,
                Ok(false) => report.still_failed += 1,
                Err(e) => {
                    error!(post_id = %record.id, stage = "retry", error = %e, "Retry failed");
                    bump(&self.counters.errors);
                    report.still_failed += 1;
                }
            }
        }

        report
    }

    /// Generate commentary, move to PENDING_APPROVAL, send the card.
    ///
    /// Returns Ok(true) when the card was delivered. Must be called with the
    /// record lock held.
    async fn enrich_and_notify(&self, record: &PostRecord, path: NotifyPath) -> Result<bool> {
        let commentary = match self.generator.generate(&record.text).await {
            Ok(c) if !c.trim().is_empty() => c.trim().to_string(),
            Ok(_) => {
                return self
                    .enrichment_failed(record, path, "generator returned empty commentary")
                    .await
            }
            Err(e) => return self.enrichment_failed(record, path, &format!("{:#}", e)).await,
        };

        let token = match path {
            NotifyPath::Fresh => mint_token(&self.store).await,
            NotifyPath::Retry | NotifyPath::Regenerate => {
                token_for(&self.store, record.request_token.as_deref()).await
            }
        };

        let Some(updated) = self
            .store
            .transition(
                &record.id,
                PostStatus::PendingApproval,
                PostUpdate::new()
                    .token(token.clone())
                    .commentary(commentary)
                    .clear_error(),
            )
            .await?
        else {
            return Ok(false);
        };

        let card = ApprovalCard::for_record(&updated, &token);
        match self.channel.send_card(&card).await {
            Ok(()) => {
                info!(post_id = %record.id, %token, "✅ Sent approval card");
                Ok(true)
            }
            Err(e) => {
                error!(post_id = %record.id, stage = "notify", error = %e, "Failed to send approval card");
                bump(&self.counters.errors);
                self.store
                    .transition(
                        &record.id,
                        PostStatus::Failed,
                        PostUpdate::new().error(format!("Approval card delivery failed: {:#}", e)),
                    )
                    .await?;
                Ok(false)
            }
        }
    }

    async fn enrichment_failed(
        &self,
        record: &PostRecord,
        path: NotifyPath,
        reason: &str,
    ) -> Result<bool> {
        bump(&self.counters.errors);

        match path {
            NotifyPath::Fresh => {
                error!(post_id = %record.id, stage = "enrich", error = %reason, "Failed to generate commentary");
                self.store
                    .transition(
                        &record.id,
                        PostStatus::Failed,
                        PostUpdate::new().error(format!("Failed to generate commentary: {}", reason)),
                    )
                    .await?;
            }
            NotifyPath::Retry => {
                // Left FAILED as-is: no store write, no notice
                warn!(post_id = %record.id, stage = "retry", error = %reason, "Still failing to generate commentary");
            }
            NotifyPath::Regenerate => {
                warn!(post_id = %record.id, stage = "regenerate", error = %reason, "Failed to regenerate commentary");
            }
        }

        Ok(false)
    }

    // ========================================================================
    // Command dispatch
    // ========================================================================

    /// Parse and dispatch a raw command, reporting problems to the operator
    pub async fn handle(&self, inbound: InboundCommand) -> Outcome {
        match Command::parse(&inbound) {
            Ok(command) => self.dispatch(command).await,
            Err(e) => {
                warn!(command = %inbound.name, error = %e, "Rejected operator command");
                self.notify(&format!("❌ {}", e)).await;
                Outcome::Invalid(e)
            }
        }
    }

    /// Dispatch a parsed command
    #[instrument(skip(self, command), fields(command = command.kind(), token = command.token().unwrap_or("-")))]
    pub async fn dispatch(&self, command: Command) -> Outcome {
        let result = match command {
            Command::Approve { token } => {
                self.publish(&token, PublishMode::WithCommentary { replacement: None })
                    .await
            }
            Command::Revise { token, commentary } => {
                self.publish(
                    &token,
                    PublishMode::WithCommentary {
                        replacement: Some(commentary),
                    },
                )
                .await
            }
            Command::PublishPlain { token } => self.publish(&token, PublishMode::Plain).await,
            Command::Reject { token } => self.reject(&token).await,
            Command::Regenerate { token } => self.regenerate(&token).await,
            Command::LikeOnly { token } => self.like(&token).await,
            Command::Resend { limit } => {
                let records = self.store.list_recent(limit).await;
                self.resend(records, false).await
            }
            Command::ResendPending => {
                let records = self.store.query_by_status(PostStatus::PendingApproval).await;
                self.resend(records, true).await
            }
            Command::Summary { limit } => {
                let entries: Vec<RecentEntry> = self
                    .store
                    .list_recent(limit)
                    .await
                    .iter()
                    .map(RecentEntry::from)
                    .collect();
                self.notify(&format_summary(&entries)).await;
                Ok(Outcome::Reported { cards_sent: 0 })
            }
            Command::Statistics => {
                let counts = self.store.aggregate_counts().await;
                let counters = self.counters();
                self.notify(&format_statistics(&counts, Some(&counters))).await;
                Ok(Outcome::Reported { cards_sent: 0 })
            }
            Command::Help => {
                self.notify(&help_text()).await;
                Ok(Outcome::Reported { cards_sent: 0 })
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Command handling failed");
                bump(&self.counters.errors);
                self.notify(&format!("❌ Error: {:#}", e)).await;
                Outcome::Refused {
                    post_id: String::new(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Resolve a token, or tell the operator it does not match anything
    async fn resolve(&self, token: &str) -> Option<String> {
        match self.store.find_by_token(token).await {
            Some((id, _)) => Some(id),
            None => {
                warn!(%token, "Post not found for reference");
                self.notify(&format!("❌ Post not found for reference {}", token))
                    .await;
                None
            }
        }
    }

    /// Lock a record and re-read it
    async fn locked(&self, id: &str) -> Option<(RecordGuard, PostRecord)> {
        let guard = self.locks.acquire(id).await;
        let record = self.store.find(id).await?;
        Some((guard, record))
    }

    async fn refuse(&self, post_id: &str, reason: String) -> Outcome {
        warn!(%post_id, %reason, "Command refused");
        self.notify(&format!("⚠️ {}", reason)).await;
        Outcome::Refused {
            post_id: post_id.to_string(),
            reason,
        }
    }

    async fn publish(&self, token: &str, mode: PublishMode) -> Result<Outcome> {
        let Some(id) = self.resolve(token).await else {
            return Ok(Outcome::NotFound {
                token: token.to_string(),
            });
        };
        let Some((_guard, record)) = self.locked(&id).await else {
            return Ok(Outcome::NotFound {
                token: token.to_string(),
            });
        };

        if record.status == PostStatus::Skipped {
            return Ok(self
                .refuse(&id, "This post was skipped and cannot be published".to_string())
                .await);
        }

        let commentary = match &mode {
            PublishMode::WithCommentary { replacement } => {
                match replacement.clone().or_else(|| record.commentary.clone()) {
                    Some(c) if !c.trim().is_empty() => Some(c),
                    _ => {
                        return Ok(self
                            .refuse(
                                &id,
                                format!(
                                    "No commentary yet; use /regenerate {} or /publish_plain {}",
                                    token, token
                                ),
                            )
                            .await)
                    }
                }
            }
            PublishMode::Plain => None,
        };

        // Duplicate-publish gate: the first approve of a published post only warns.
        // APPROVED outside a publish means an earlier attempt never recorded its result.
        let maybe_published =
            matches!(record.status, PostStatus::Posted | PostStatus::Approved);
        if maybe_published && !record.repost_confirmed {
            warn!(post_id = %id, status = %record.status, "⚠️ Post may already be published, awaiting confirmation");
            self.notify(&repost_warning(&record, token)).await;
            self.store
                .update_fields(&id, PostUpdate::new().repost_confirmed(true))
                .await?;
            return Ok(Outcome::RepostConfirmationRequested { post_id: id });
        }

        let mut approve = PostUpdate::new();
        if let PublishMode::WithCommentary {
            replacement: Some(text),
        } = &mode
        {
            approve = approve.commentary(text.clone());
        }
        self.store
            .transition(&id, PostStatus::Approved, approve)
            .await?;
        bump(&self.counters.approved);

        info!(post_id = %id, url = %record.url, "📝 Publishing approved post");
        let result = match &commentary {
            Some(text) => self.session.publish(&record.url, text).await,
            None => self.session.publish_plain(&record.url).await,
        };

        match result {
            Ok(result_url) => {
                bump(&self.counters.published);
                if let Err(e) = self.record_published(&id, &result_url).await {
                    error!(post_id = %id, %result_url, stage = "publish", error = %e, "Published but could not record the result");
                    bump(&self.counters.errors);
                    self.notify(&format!(
                        "⚠️ Post was published but the result could not be saved: {}\n\nOriginal: {}\nPublished: {}",
                        e, record.url, result_url
                    ))
                    .await;
                    return Ok(Outcome::Published {
                        post_id: id,
                        result_url,
                    });
                }
                info!(post_id = %id, %result_url, "✅ Published");

                self.notify(&format!(
                    "✅ Post published successfully!\n\nOriginal: {}\nPublished: {}",
                    record.url, result_url
                ))
                .await;

                Ok(Outcome::Published {
                    post_id: id,
                    result_url,
                })
            }
            Err(e) => {
                let message = format!("Publish failed: {:#}", e);
                error!(post_id = %id, stage = "publish", error = %e, "❌ Failed to publish");
                bump(&self.counters.errors);
                self.store
                    .transition(&id, PostStatus::Failed, PostUpdate::new().error(message.clone()))
                    .await?;
                self.notify(&format!("❌ {}", message)).await;

                Ok(Outcome::PublishFailed {
                    post_id: id,
                    error: message,
                })
            }
        }
    }

    /// Move a published record to POSTED, retrying the write a few times
    async fn record_published(&self, id: &str, result_url: &str) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            let update = PostUpdate::new()
                .result_url(result_url.to_string())
                .clear_error()
                .repost_confirmed(false);
            match self.store.transition(id, PostStatus::Posted, update).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < POSTED_WRITE_ATTEMPTS => {
                    warn!(post_id = %id, attempt, error = %e, "Failed to record published post, retrying");
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn reject(&self, token: &str) -> Result<Outcome> {
        let Some(id) = self.resolve(token).await else {
            return Ok(Outcome::NotFound {
                token: token.to_string(),
            });
        };
        let Some((_guard, record)) = self.locked(&id).await else {
            return Ok(Outcome::NotFound {
                token: token.to_string(),
            });
        };

        match record.status {
            PostStatus::Skipped => {
                debug!(post_id = %id, "Post already skipped");
                self.notify("⏭️ Post was already skipped").await;
                Ok(Outcome::Skipped { post_id: id })
            }
            PostStatus::Posted | PostStatus::Approved if record.repost_confirmed => {
                self.store
                    .update_fields(&id, PostUpdate::new().repost_confirmed(false))
                    .await?;
                info!(post_id = %id, "Re-publish cancelled");
                self.notify("↩️ Re-publish cancelled").await;
                Ok(Outcome::RepostCancelled { post_id: id })
            }
            PostStatus::Posted => Ok(self
                .refuse(&id, "This post is already published and cannot be skipped".to_string())
                .await),
            _ => {
                self.store
                    .transition(&id, PostStatus::Skipped, PostUpdate::new())
                    .await?;
                bump(&self.counters.skipped);
                info!(post_id = %id, "❌ Post rejected and skipped");
                self.notify("⏭️ Post skipped").await;
                Ok(Outcome::Skipped { post_id: id })
            }
        }
    }

    async fn regenerate(&self, token: &str) -> Result<Outcome> {
        let Some(id) = self.resolve(token).await else {
            return Ok(Outcome::NotFound {
                token: token.to_string(),
            });
        };
        let Some((_guard, record)) = self.locked(&id).await else {
            return Ok(Outcome::NotFound {
                token: token.to_string(),
            });
        };

        if record.status.is_terminal() {
            return Ok(self
                .refuse(
                    &id,
                    format!("This post is already {} and cannot be regenerated", record.status),
                )
                .await);
        }

        info!(post_id = %id, "🔄 Regenerating commentary");
        let commentary = match self.generator.generate(&record.text).await {
            Ok(c) if !c.trim().is_empty() => c.trim().to_string(),
            other => {
                let error = match other {
                    Err(e) => format!("{:#}", e),
                    Ok(_) => "generator returned empty commentary".to_string(),
                };
                self.enrichment_failed(&record, NotifyPath::Regenerate, &error)
                    .await?;
                self.notify("❌ Failed to regenerate commentary").await;
                return Ok(Outcome::RegenerateFailed { post_id: id, error });
            }
        };

        let token = token_for(&self.store, record.request_token.as_deref()).await;
        let Some(updated) = self
            .store
            .transition(
                &id,
                PostStatus::PendingApproval,
                PostUpdate::new()
                    .token(token.clone())
                    .commentary(commentary)
                    .clear_error(),
            )
            .await?
        else {
            return Ok(Outcome::NotFound { token });
        };

        let card = ApprovalCard::for_record(&updated, &token);
        if let Err(e) = self.channel.send_card(&card).await {
            error!(post_id = %id, stage = "notify", error = %e, "Failed to send regenerated card");
            bump(&self.counters.errors);
            self.store
                .transition(
                    &id,
                    PostStatus::Failed,
                    PostUpdate::new().error(format!("Approval card delivery failed: {:#}", e)),
                )
                .await?;
            return Ok(Outcome::RegenerateFailed {
                post_id: id,
                error: e.to_string(),
            });
        }

        info!(post_id = %id, %token, "✅ Regenerated commentary and re-sent card");
        Ok(Outcome::Regenerated { post_id: id })
    }

    async fn like(&self, token: &str) -> Result<Outcome> {
        let Some(id) = self.resolve(token).await else {
            return Ok(Outcome::NotFound {
                token: token.to_string(),
            });
        };
        let Some(record) = self.store.find(&id).await else {
            return Ok(Outcome::NotFound {
                token: token.to_string(),
            });
        };

        info!(post_id = %id, url = %record.url, "👍 Liking post");
        let success = match self.session.like(&record.url).await {
            Ok(liked) => liked,
            Err(e) => {
                error!(post_id = %id, stage = "like", error = %e, "Failed to like post");
                false
            }
        };

        if success {
            self.notify("👍 Post liked successfully").await;
        } else {
            bump(&self.counters.errors);
            self.notify("❌ Failed to like the post").await;
        }

        Ok(Outcome::Liked {
            post_id: id,
            success,
        })
    }

    async fn resend(&self, records: Vec<PostRecord>, only_pending: bool) -> Result<Outcome> {
        if records.is_empty() {
            let text = if only_pending {
                "📭 No pending posts found."
            } else {
                "📭 No posts found in the store."
            };
            self.notify(text).await;
            return Ok(Outcome::Reported { cards_sent: 0 });
        }

        self.notify(&format!(
            "📨 Sending {} {}post(s) as individual messages...",
            records.len(),
            if only_pending { "pending " } else { "" }
        ))
        .await;

        let mut sent = 0usize;
        for (idx, candidate) in records.iter().enumerate() {
            if idx > 0 && !self.settings.resend_delay.is_zero() {
                tokio::time::sleep(self.settings.resend_delay).await;
            }

            // The listing is a snapshot; the card is built from the record as it is now
            let Some((_guard, record)) = self.locked(&candidate.id).await else {
                continue;
            };
            if only_pending && record.status != PostStatus::PendingApproval {
                debug!(post_id = %record.id, status = %record.status, "No longer pending, not re-sending");
                continue;
            }

            // Every re-sent card must be actionable, so tokenless records get one
            let token = match record.request_token.as_deref() {
                Some(token) => token.to_string(),
                None => {
                    let token = mint_token(&self.store).await;
                    self.store
                        .update_fields(&record.id, PostUpdate::new().token(token.clone()))
                        .await?;
                    token
                }
            };

            let card = ApprovalCard::for_record(&record, &token).with_status_note(&record);
            match self.channel.send_card(&card).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(post_id = %record.id, stage = "notify", error = %e, "Failed to re-send card")
                }
            }
        }

        info!(sent, total = records.len(), "✅ Re-sent posts");
        Ok(Outcome::Reported { cards_sent: sent })
    }

    /// Send a notice; delivery problems are logged, never propagated
    pub async fn notify(&self, text: &str) -> bool {
        match self.channel.send_notice(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = self.channel.name(), error = %e, "Failed to send notice");
                false
            }
        }
    }
}

fn repost_warning(record: &PostRecord, token: &str) -> String {
    let headline = if record.status == PostStatus::Approved {
        "⚠️ Warning: possibly already published\n\n\
         An earlier publish of this post did not finish recording its result."
    } else {
        "⚠️ Warning: already published\n\n\
         This post was published earlier."
    };
    format!(
        "{}\n\n\
         Original: {}\n\
         Previous: {}\n\n\
         Send /approve {} again to publish it once more, or /reject {} to cancel.",
        headline,
        record.url,
        record.result_url.as_deref().unwrap_or("N/A"),
        token,
        token
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FeedItem;

    #[test]
    fn test_repost_warning_mentions_both_links() {
        let item = FeedItem::new("p1", "text", "https://example.com/p1");
        let mut record = PostRecord::from_item("p1", &item);
        record.result_url = Some("https://example.com/share/1".to_string());

        let text = repost_warning(&record, "tok");
        assert!(text.contains("https://example.com/p1"));
        assert!(text.contains("https://example.com/share/1"));
        assert!(text.contains("/approve tok"));
    }

    #[tokio::test]
    async fn test_record_locks_drop_released_entries() {
        let locks = Arc::new(RecordLocks::default());

        let first = locks.acquire("p1").await;
        let other = locks.acquire("p2").await;
        assert_eq!(locks.len(), 2);
        drop(other);
        assert_eq!(locks.len(), 1);

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("p1").await;
            })
        };
        tokio::task::yield_now().await;
        drop(first);
        waiter.await.unwrap();

        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn test_approved_warning_differs_from_posted() {
        let item = FeedItem::new("p1", "text", "https://example.com/p1");
        let mut record = PostRecord::from_item("p1", &item);
        record.status = PostStatus::Approved;
        assert!(repost_warning(&record, "tok").contains("possibly already published"));

        record.status = PostStatus::Posted;
        assert!(repost_warning(&record, "tok").contains("already published"));
        assert!(!repost_warning(&record, "tok").contains("possibly"));
    }

    #[test]
    fn test_default_settings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.lookback, 10);
        assert!(settings.retention.is_none());
    }
}
