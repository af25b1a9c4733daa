//! Post records and their lifecycle status.
//!
//! A PostRecord is the persisted form of one item discovered on the
//! monitored feed, plus everything the approval workflow has attached to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An item as observed on the content source (newest first when fetched)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Stable identifier from the source (may be empty; see `resolved_id`)
    #[serde(default)]
    pub id: String,

    /// Post body text
    pub text: String,

    /// Link to the original post
    pub url: String,

    /// Author display name
    #[serde(default)]
    pub author: Option<String>,

    /// Publication timestamp as reported by the source
    #[serde(default)]
    pub published_at: Option<String>,
}

impl FeedItem {
    /// Create a feed item with just the required fields
    pub fn new(id: impl Into<String>, text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            url: url.into(),
            author: None,
            published_at: None,
        }
    }

    /// The dedup key for this item.
    ///
    /// Sources that cannot provide an id get one derived from the URL, so the
    /// same post observed twice always maps to the same record.
    pub fn resolved_id(&self) -> String {
        let id = self.id.trim();
        if id.is_empty() {
            derive_post_id(&self.url)
        } else {
            id.to_string()
        }
    }
}

/// Derive a post id from its URL (SHA256(url)[0:16])
pub fn derive_post_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.trim().as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// Workflow status of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    /// Discovered, not yet enriched
    New,

    /// Commentary generated, approval card sent
    PendingApproval,

    /// Operator approved, publish in flight
    Approved,

    /// Published on the platform
    Posted,

    /// Operator rejected
    Skipped,

    /// Enrichment, delivery or publish failed (retryable)
    Failed,
}

impl PostStatus {
    /// All statuses in display order
    pub const ALL: [PostStatus; 6] = [
        PostStatus::New,
        PostStatus::PendingApproval,
        PostStatus::Approved,
        PostStatus::Posted,
        PostStatus::Skipped,
        PostStatus::Failed,
    ];

    /// Terminal states accept no further engine-driven transition
    pub fn is_terminal(self) -> bool {
        matches!(self, PostStatus::Posted | PostStatus::Skipped)
    }

    /// Stable snake_case name (matches the persisted form)
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::New => "new",
            PostStatus::PendingApproval => "pending_approval",
            PostStatus::Approved => "approved",
            PostStatus::Posted => "posted",
            PostStatus::Skipped => "skipped",
            PostStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "new" => Ok(PostStatus::New),
            "pending_approval" | "pending" => Ok(PostStatus::PendingApproval),
            "approved" => Ok(PostStatus::Approved),
            "posted" | "published" => Ok(PostStatus::Posted),
            "skipped" | "rejected" => Ok(PostStatus::Skipped),
            "failed" => Ok(PostStatus::Failed),
            _ => anyhow::bail!("Unknown post status: {}", s),
        }
    }
}

/// A persisted post with its workflow state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Dedup key, never changes once assigned
    pub id: String,

    pub text: String,
    pub url: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,

    /// Current workflow status
    pub status: PostStatus,

    /// Correlation token of the latest approval card
    #[serde(default)]
    pub request_token: Option<String>,

    /// Generated (or operator-supplied) commentary
    #[serde(default)]
    pub commentary: Option<String>,

    /// Link to the published copy (set on success only)
    #[serde(default)]
    pub result_url: Option<String>,

    /// Reason for the FAILED status
    #[serde(default)]
    pub error_message: Option<String>,

    /// Set after a duplicate-publish warning; the next approve goes through
    #[serde(default)]
    pub repost_confirmed: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostRecord {
    /// Create a NEW record from a feed item
    pub fn from_item(id: impl Into<String>, item: &FeedItem) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            text: item.text.clone(),
            url: item.url.clone(),
            author: item.author.clone(),
            published_at: item.published_at.clone(),
            status: PostStatus::New,
            request_token: None,
            commentary: None,
            result_url: None,
            error_message: None,
            repost_confirmed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this record currently holds the given correlation token
    pub fn has_token(&self, token: &str) -> bool {
        self.request_token.as_deref() == Some(token)
    }
}

/// Field updates applied together with a status transition.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostUpdate {
    pub request_token: Option<Option<String>>,
    pub commentary: Option<Option<String>>,
    pub result_url: Option<Option<String>>,
    pub error_message: Option<Option<String>>,
    pub repost_confirmed: Option<bool>,
}

impl PostUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.request_token = Some(Some(token.into()));
        self
    }

    pub fn commentary(mut self, commentary: impl Into<String>) -> Self {
        self.commentary = Some(Some(commentary.into()));
        self
    }

    pub fn result_url(mut self, url: impl Into<String>) -> Self {
        self.result_url = Some(Some(url.into()));
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    pub fn repost_confirmed(mut self, confirmed: bool) -> Self {
        self.repost_confirmed = Some(confirmed);
        self
    }

    /// Apply the updates to a record (payload fields are never touched)
    pub fn apply(self, record: &mut PostRecord) {
        if let Some(token) = self.request_token {
            record.request_token = token;
        }
        if let Some(commentary) = self.commentary {
            record.commentary = commentary;
        }
        if let Some(url) = self.result_url {
            record.result_url = url;
        }
        if let Some(error) = self.error_message {
            record.error_message = error;
        }
        if let Some(confirmed) = self.repost_confirmed {
            record.repost_confirmed = confirmed;
        }
    }
}
