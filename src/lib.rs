//! postwatch - Post approval workflow monitor
//!
//! Watches a social feed, drafts commentary for each new post, asks an
//! operator to approve it over a chat channel, then publishes or likes it
//! on the platform.
//!
//! # Lifecycle
//!
//! ```text
//! NEW -> PENDING_APPROVAL -> APPROVED -> POSTED
//!          |                    |
//!          +-> SKIPPED          +-> FAILED -> (retry) -> PENDING_APPROVAL
//! ```
//!
//! # Modules
//!
//! - `adapters`: External systems (Telegram, OpenAI, Fabric, platform script)
//! - `core`: Store, engine, correlation, scheduler, reporting
//! - `domain`: Records, cards and commands
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Monitor until Ctrl+C
//! postwatch run
//!
//! # One polling cycle
//! postwatch cycle
//!
//! # Inspect the store
//! postwatch stats
//! postwatch recent --limit 20
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{Engine, EngineSettings, Outcome, PlatformSession, PostStore};
pub use domain::{ApprovalCard, Command, FeedItem, InboundCommand, PostRecord, PostStatus};

// Adapter seams
pub use adapters::{ActionExecutor, ApprovalChannel, CommentaryGenerator, ContentSource};
