//! Messages exchanged with the approval channel.

use serde::{Deserialize, Serialize};

use super::post::{PostRecord, PostStatus};

/// An approval request for one post.
///
/// The token travels with the card as a structured field, so channels can
/// attach it to buttons or reply indexes instead of embedding it in text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCard {
    pub token: String,
    pub text: String,
    pub url: String,
    pub commentary: Option<String>,
    pub published_at: Option<String>,

    /// Header shown above the card when re-sending a stored post
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_note: Option<String>,
}

impl ApprovalCard {
    /// Build a card for a record under the given token
    pub fn for_record(record: &PostRecord, token: &str) -> Self {
        Self {
            token: token.to_string(),
            text: record.text.clone(),
            url: record.url.clone(),
            commentary: record.commentary.clone(),
            published_at: record.published_at.clone(),
            status_note: None,
        }
    }

    /// Attach a status header derived from the record state
    pub fn with_status_note(mut self, record: &PostRecord) -> Self {
        self.status_note = Some(status_note(record));
        self
    }
}

/// Header text describing a stored record's state
pub fn status_note(record: &PostRecord) -> String {
    match record.status {
        PostStatus::Posted => format!(
            "ALREADY PUBLISHED: {}",
            record.result_url.as_deref().unwrap_or("N/A")
        ),
        PostStatus::PendingApproval => "PENDING APPROVAL".to_string(),
        PostStatus::Approved => "APPROVED (not yet published)".to_string(),
        PostStatus::Skipped => "SKIPPED".to_string(),
        PostStatus::Failed => format!(
            "FAILED: {}",
            record.error_message.as_deref().unwrap_or("unknown error")
        ),
        PostStatus::New => "NEW".to_string(),
    }
}

/// A raw operator command as delivered by a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    /// Command name without any leading slash
    pub name: String,

    /// Correlation token resolved by the channel (button data or reply target)
    pub reference: Option<String>,

    /// Remaining whitespace-separated arguments
    pub args: Vec<String>,
}

impl InboundCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: None,
            args: Vec::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Parse `/name arg1 arg2` text; returns None for non-command text.
    ///
    /// A `@botname` suffix on the command is dropped.
    pub fn from_text(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let head = parts.next()?;
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        if name.is_empty() {
            return None;
        }

        Some(Self {
            name,
            reference: None,
            args: parts.map(str::to_string).collect(),
        })
    }
}
