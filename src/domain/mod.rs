//! Domain types for the postwatch workflow.
//!
//! This module contains the core data structures:
//! - Post: Persisted records and their lifecycle status
//! - Card: Approval cards and raw inbound commands
//! - Command: Parsed operator commands

pub mod card;
pub mod command;
pub mod post;

// Re-export commonly used types
pub use card::{status_note, ApprovalCard, InboundCommand};
pub use command::{Command, CommandError, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
pub use post::{derive_post_id, FeedItem, PostRecord, PostStatus, PostUpdate};
