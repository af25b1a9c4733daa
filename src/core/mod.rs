//! Core workflow logic.
//!
//! This module contains:
//! - PostStore: Durable post records
//! - Correlation: Token minting for approval cards
//! - Engine: Lifecycle state machine and command dispatch
//! - Scheduler: Poll and listener loops
//! - Report: Statistics and summaries

pub mod correlation;
pub mod engine;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use correlation::{mint_token, token_for};
pub use engine::{
    CounterSnapshot, CycleReport, Engine, EngineSettings, Outcome, RetryReport, ScanReport,
};
pub use report::{format_statistics, format_summary, Report, RecentEntry};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerSettings};
pub use session::PlatformSession;
pub use store::{PostStore, StatusCounts, StoreError};
