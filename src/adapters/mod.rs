//! Adapter interfaces for external systems.
//!
//! The workflow engine depends only on these four traits; concrete
//! adapters (Telegram, OpenAI, Fabric, external automation script) plug in
//! behind them.

pub mod fabric;
pub mod openai;
pub mod script;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{ApprovalCard, FeedItem, InboundCommand};

pub use fabric::FabricCommentary;
pub use openai::{OpenAiCommentary, OpenAiConfig};
pub use script::{ScriptConfig, ScriptPlatform};
pub use telegram::{TelegramChannel, TelegramConfig};

/// The monitored feed
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Up to `max_items` recent items, most recent first. Must not mutate the source.
    async fn fetch_recent(&self, max_items: usize) -> Result<Vec<FeedItem>>;
}

/// Generates commentary for a post
#[async_trait]
pub trait CommentaryGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, text: &str) -> Result<String>;
}

/// Bidirectional operator channel
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver an approval card
    async fn send_card(&self, card: &ApprovalCard) -> Result<()>;

    /// Deliver a plain notice
    async fn send_notice(&self, text: &str) -> Result<()>;

    /// Wait for the next batch of operator commands (may return empty on timeout)
    async fn receive(&self) -> Result<Vec<InboundCommand>>;
}

/// Performs platform-side effects
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Publish with commentary; returns the resulting URL
    async fn publish(&self, url: &str, commentary: &str) -> Result<String>;

    /// Publish without commentary; returns the resulting URL
    async fn publish_plain(&self, url: &str) -> Result<String>;

    /// Like the post
    async fn like(&self, url: &str) -> Result<bool>;
}
