//! Command-line interface for postwatch.
//!
//! Provides commands for running the monitor, single polling cycles and
//! inspecting or pruning the post store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::core::report::{format_timestamp, truncate_text};
use crate::core::{format_statistics, PostStore, RecentEntry, Report};
use crate::domain::PostStatus;

pub mod monitor;

/// postwatch - Post approval workflow monitor
#[derive(Parser, Debug)]
#[command(name = "postwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the monitor (poll loop and command listener) until Ctrl+C
    Run,

    /// Run a single polling cycle and exit
    Cycle,

    /// Show post counts by status
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the most recently created posts
    Recent {
        /// Maximum number of posts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Only show posts with this status
        #[arg(short, long)]
        status: Option<PostStatus>,
    },

    /// Delete posts older than the given age
    Purge {
        /// Age in days
        #[arg(long)]
        days: u32,
    },

    /// Show one stored post
    Show {
        /// Post ID
        post_id: String,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = crate::config::config()?;

        match self.command {
            Commands::Run => monitor::execute_run(cfg).await,
            Commands::Cycle => monitor::execute_cycle(cfg).await,
            Commands::Stats { json } => show_stats(json).await,
            Commands::Recent { limit, status } => list_recent(limit, status).await,
            Commands::Purge { days } => purge(days).await,
            Commands::Show { post_id } => show_post(&post_id).await,
            Commands::Config => show_config().await,
        }
    }
}

async fn open_snapshot() -> Result<PostStore> {
    let path = crate::config::paths::store_path()?;
    PostStore::open_read_only(&path)
        .await
        .with_context(|| format!("Failed to read store: {}", path.display()))
}

/// Show counts by status
async fn show_stats(json: bool) -> Result<()> {
    let store = open_snapshot().await?;
    let counts = store.aggregate_counts().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!("{}", format_statistics(&counts, None));
    }

    Ok(())
}

/// List recent posts
async fn list_recent(limit: usize, status: Option<PostStatus>) -> Result<()> {
    let store = open_snapshot().await?;

    let entries: Vec<RecentEntry> = match status {
        Some(status) => {
            let mut records = store.query_by_status(status).await;
            records.reverse();
            records.truncate(limit);
            records.iter().map(RecentEntry::from).collect()
        }
        None => Report::collect(&store, limit).await.recent,
    };

    if entries.is_empty() {
        println!("No posts found");
        return Ok(());
    }

    println!("{:<18} {:<18} {:<17} {}", "POST ID", "STATUS", "CREATED", "TEXT");
    println!("{}", "-".repeat(100));

    for entry in entries {
        println!(
            "{:<18} {:<18} {:<17} {}",
            entry.id,
            entry.status,
            format_timestamp(&entry.created_at),
            truncate_text(&entry.text, 40)
        );
    }

    Ok(())
}

/// Purge old records
async fn purge(days: u32) -> Result<()> {
    let path = crate::config::paths::store_path()?;
    let store = PostStore::open(&path)
        .await
        .with_context(|| format!("Failed to open store: {}", path.display()))?;

    let removed = store
        .purge_older_than(chrono::Duration::days(i64::from(days)))
        .await?;

    println!("🧹 Removed {} post(s) older than {} day(s)", removed, days);
    Ok(())
}

/// Show a single post
async fn show_post(post_id: &str) -> Result<()> {
    let store = open_snapshot().await?;
    let record = store
        .find(post_id)
        .await
        .with_context(|| format!("Post not found: {}", post_id))?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Show resolved configuration (secrets are not printed)
async fn show_config() -> Result<()> {
    let cfg = crate::config::config()?;

    println!("postwatch configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:  {}", cfg.home.display());
    println!("  Store: {}", cfg.store_path.display());
    println!();
    println!("Workflow:");
    println!("  Poll interval:   {} min", cfg.workflow.poll_interval_minutes);
    println!("  Lookback:        {}", cfg.workflow.lookback);
    println!("  Error cooldown:  {}s", cfg.workflow.error_cooldown_seconds);
    println!("  Immediate fetch: {}", cfg.workflow.immediate_fetch);
    match cfg.workflow.retention_days {
        Some(days) => println!("  Retention:       {} days", days),
        None => println!("  Retention:       (keep forever)"),
    }
    println!();
    println!("Adapters:");
    println!(
        "  Telegram:   {}",
        cfg.telegram
            .as_ref()
            .map(|t| format!("chat {}", t.chat_id))
            .unwrap_or_else(|| "(not configured)".to_string())
    );
    println!(
        "  Enrichment: {:?} (key {})",
        cfg.enrichment.backend,
        if cfg.enrichment.openai.api_key.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    println!(
        "  Platform:   {}",
        cfg.platform
            .as_ref()
            .map(|p| p.program.clone())
            .unwrap_or_else(|| "(not configured)".to_string())
    );

    Ok(())
}
