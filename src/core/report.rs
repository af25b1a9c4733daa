//! Read-only statistics and summaries over the post store.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{PostRecord, PostStatus};

use super::engine::CounterSnapshot;
use super::store::{PostStore, StatusCounts};

/// Characters of post text shown in summaries
pub const SUMMARY_TEXT_LEN: usize = 100;

/// One line of a recent-posts listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentEntry {
    pub id: String,
    pub status: PostStatus,
    pub text: String,
    pub url: String,
    pub result_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PostRecord> for RecentEntry {
    fn from(record: &PostRecord) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            text: truncate_text(&record.text, SUMMARY_TEXT_LEN),
            url: record.url.clone(),
            result_url: record.result_url.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Counts plus a bounded newest-first listing, taken at call time
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub counts: StatusCounts,
    pub recent: Vec<RecentEntry>,
}

impl Report {
    pub async fn collect(store: &PostStore, limit: usize) -> Self {
        let counts = store.aggregate_counts().await;
        let recent = store
            .list_recent(limit)
            .await
            .iter()
            .map(RecentEntry::from)
            .collect();

        Self { counts, recent }
    }
}

/// Cut text to `max` characters, appending "..." when shortened
pub fn truncate_text(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

fn status_marker(status: PostStatus) -> &'static str {
    match status {
        PostStatus::New => "🆕",
        PostStatus::PendingApproval => "⏳",
        PostStatus::Approved => "✅",
        PostStatus::Posted => "📤",
        PostStatus::Skipped => "⏭️",
        PostStatus::Failed => "❌",
    }
}

/// Statistics notice body
pub fn format_statistics(counts: &StatusCounts, counters: Option<&CounterSnapshot>) -> String {
    let mut lines = vec![
        "📊 Post Statistics".to_string(),
        String::new(),
        format!("Total posts: {}", counts.total),
        String::new(),
        "Status breakdown:".to_string(),
    ];

    for status in PostStatus::ALL {
        lines.push(format!(
            "{} {}: {}",
            status_marker(status),
            status,
            counts.get(status)
        ));
    }

    if let Some(c) = counters {
        lines.push(String::new());
        lines.push("Since start:".to_string());
        lines.push(format!("Items found: {}", c.found));
        lines.push(format!("Approved: {}", c.approved));
        lines.push(format!("Published: {}", c.published));
        lines.push(format!("Skipped: {}", c.skipped));
        lines.push(format!("Errors: {}", c.errors));
    }

    lines.join("\n")
}

/// Summary notice body for a newest-first listing
pub fn format_summary(entries: &[RecentEntry]) -> String {
    if entries.is_empty() {
        return "📭 No posts found in the store.".to_string();
    }

    let mut out = format!("📊 Last {} posts:\n", entries.len());

    for (idx, entry) in entries.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {} {}\n   Created: {}\n   Updated: {}\n   Original: {}\n",
            idx + 1,
            status_marker(entry.status),
            entry.status,
            format_timestamp(&entry.created_at),
            format_timestamp(&entry.updated_at),
            entry.url,
        ));
        if let Some(result_url) = &entry.result_url {
            out.push_str(&format!("   Published: {}\n", result_url));
        }
        out.push_str(&format!("   Text: {}\n", entry.text));
    }

    out
}

/// Command reference notice
pub fn help_text() -> String {
    [
        "📖 Commands",
        "",
        "/approve <ref> - publish with the generated commentary (alias /repost)",
        "/reject <ref> - skip this post (alias /skip)",
        "/regenerate <ref> - generate new commentary (alias /redo)",
        "/revise <ref> <text> - publish with your own commentary",
        "/like <ref> - like the post only (alias /just_like)",
        "/publish_plain <ref> - publish without commentary (alias /just_repost)",
        "/resend [n] - re-send the last n posts as cards (default 5, max 50)",
        "/resend_pending - re-send all pending posts",
        "/summary [n] - condensed list of the last n posts",
        "/statistics - counts by status",
        "",
        "<ref> may be omitted when replying to an approval card.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdefghij", 4), "abcd...");
        // Multi-byte characters are never split
        assert_eq!(truncate_text("ääääää", 3), "äää...");
    }

    #[test]
    fn test_statistics_lists_every_status() {
        let counts = StatusCounts {
            total: 3,
            posted: 2,
            failed: 1,
            ..Default::default()
        };
        let text = format_statistics(&counts, None);

        assert!(text.contains("Total posts: 3"));
        assert!(text.contains("posted: 2"));
        assert!(text.contains("failed: 1"));
        assert!(text.contains("pending_approval: 0"));
        assert!(!text.contains("Since start"));
    }

    #[test]
    fn test_summary_shows_both_timestamps() {
        let created = DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let updated = DateTime::parse_from_rfc3339("2024-03-02T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = RecentEntry {
            id: "p1".to_string(),
            status: PostStatus::Posted,
            text: "Hello".to_string(),
            url: "https://example.com/p1".to_string(),
            result_url: Some("https://example.com/share/1".to_string()),
            created_at: created,
            updated_at: updated,
        };

        let text = format_summary(&[entry]);
        assert!(text.contains(&format!("Created: {}", format_timestamp(&created))));
        assert!(text.contains(&format!("Updated: {}", format_timestamp(&updated))));
        assert!(text.contains("Published: https://example.com/share/1"));
    }

    #[test]
    fn test_empty_summary() {
        assert!(format_summary(&[]).contains("No posts"));
    }
}
