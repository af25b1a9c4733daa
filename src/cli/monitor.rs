//! Wiring for the monitor: adapters, engine and loops.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use crate::adapters::{
    ApprovalChannel, CommentaryGenerator, FabricCommentary, OpenAiCommentary, ScriptPlatform,
    TelegramChannel,
};
use crate::config::{EnrichmentBackend, ResolvedConfig};
use crate::core::{Engine, PlatformSession, PostStore, Scheduler};

/// Build the engine from resolved configuration
pub async fn build_engine(cfg: &ResolvedConfig) -> Result<Arc<Engine>> {
    let platform_config = cfg
        .platform
        .clone()
        .context("No platform program configured (set platform.program in config.yaml)")?;
    let telegram_config = cfg.telegram.clone().context(
        "Telegram is not configured (set POSTWATCH_TELEGRAM_TOKEN and POSTWATCH_TELEGRAM_CHAT_ID)",
    )?;

    let store = Arc::new(
        PostStore::open(&cfg.store_path)
            .await
            .with_context(|| format!("Failed to open store: {}", cfg.store_path.display()))?,
    );

    let session = Arc::new(PlatformSession::shared(Arc::new(ScriptPlatform::new(
        platform_config,
    ))));

    let generator: Arc<dyn CommentaryGenerator> = match cfg.enrichment.backend {
        EnrichmentBackend::Openai => {
            // Not fatal: posts fail enrichment and are retried once a key is set
            if cfg.enrichment.openai.api_key.is_none() {
                warn!("OpenAI API key is not configured; commentary generation will fail");
            }
            Arc::new(OpenAiCommentary::new(cfg.enrichment.openai.clone()))
        }
        EnrichmentBackend::Fabric => Arc::new(
            FabricCommentary::new(cfg.enrichment.fabric_pattern.clone())
                .with_binary_path(cfg.enrichment.fabric_binary.clone()),
        ),
    };

    let channel: Arc<dyn ApprovalChannel> = Arc::new(TelegramChannel::new(telegram_config));

    Ok(Arc::new(Engine::new(
        store,
        session,
        generator,
        channel,
        cfg.engine_settings(),
    )))
}

/// Run until Ctrl+C
pub async fn execute_run(cfg: &ResolvedConfig) -> Result<()> {
    let engine = build_engine(cfg).await?;
    let handle = Scheduler::new(engine, cfg.scheduler_settings()).start().await;

    println!("👁️  Monitoring every {} minute(s)", cfg.workflow.poll_interval_minutes);
    println!("    Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!();
    println!("🛑 Stopping monitor...");
    handle.stop().await
}

/// One polling cycle, then exit
pub async fn execute_cycle(cfg: &ResolvedConfig) -> Result<()> {
    let engine = build_engine(cfg).await?;
    let report = engine.run_cycle().await?;

    println!("Cycle complete:");
    println!("  Fetched:           {}", report.scan.fetched);
    println!("  New:               {}", report.scan.new_items);
    println!("  Sent for approval: {}", report.scan.notified);
    if report.scan.failed > 0 {
        println!("  Failed:            {}", report.scan.failed);
    }
    if report.retry.attempted > 0 {
        println!(
            "  Retried:           {} ({} recovered)",
            report.retry.attempted, report.retry.recovered
        );
    }
    if report.retry.resumed > 0 {
        println!("  Resumed:           {}", report.retry.resumed);
    }
    if report.purged > 0 {
        println!("  Purged:            {}", report.purged);
    }
    if report.scan.stopped_early {
        println!("  (stopped early at already-known posts)");
    }

    Ok(())
}
