//! Background loops driving the engine.
//!
//! Two tasks run side by side: a poll loop calling [`Engine::run_cycle`] on
//! an interval, and a listener loop pulling operator commands from the
//! approval channel. Per-record locks inside the engine keep them from
//! stepping on each other.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::engine::Engine;

/// Loop timing
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    /// Wait after a cycle that failed as a whole
    pub error_cooldown: Duration,
    /// Run the first cycle right away instead of after one interval
    pub immediate_fetch: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10 * 60),
            error_cooldown: Duration::from_secs(60),
            immediate_fetch: true,
        }
    }
}

/// Starts the loops
pub struct Scheduler {
    engine: Arc<Engine>,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, settings: SchedulerSettings) -> Self {
        Self { engine, settings }
    }

    /// Announce startup and spawn both loops
    pub async fn start(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);

        let interval_minutes = self.settings.poll_interval.as_secs() / 60;
        info!(
            interval_minutes,
            lookback = self.engine.settings().lookback,
            "🚀 Starting post monitor"
        );
        self.engine
            .notify(&format!(
                "🚀 Post monitor started\n\nChecking every {} minute(s), looking at the last {} posts.",
                interval_minutes,
                self.engine.settings().lookback
            ))
            .await;

        let poll_task = tokio::spawn(run_poll_loop(
            self.engine.clone(),
            self.settings.clone(),
            stop_rx.clone(),
        ));
        let listen_task = tokio::spawn(run_listen_loop(
            self.engine.clone(),
            self.settings.error_cooldown,
            stop_rx,
        ));

        SchedulerHandle {
            engine: self.engine,
            stop_tx,
            poll_task,
            listen_task,
        }
    }
}

/// Handle to control the running loops
pub struct SchedulerHandle {
    engine: Arc<Engine>,
    stop_tx: watch::Sender<bool>,
    poll_task: JoinHandle<()>,
    listen_task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop both loops, waiting for the current cycle to wind down
    pub async fn stop(self) -> Result<()> {
        info!("⏹️ Stopping post monitor");
        self.engine.request_stop();
        let _ = self.stop_tx.send(true);

        self.poll_task.await?;
        self.listen_task.await?;

        self.engine.notify("🛑 Post monitor stopped").await;
        Ok(())
    }
}

async fn run_poll_loop(
    engine: Arc<Engine>,
    settings: SchedulerSettings,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut delay = if settings.immediate_fetch {
        Duration::ZERO
    } else {
        settings.poll_interval
    };

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop_rx.changed() => break,
        }
        if *stop_rx.borrow() {
            break;
        }

        delay = match engine.run_cycle().await {
            Ok(_) => settings.poll_interval,
            Err(e) => {
                error!(error = %e, "Polling cycle failed");
                settings.error_cooldown
            }
        };
    }

    info!("Poll loop stopped");
}

async fn run_listen_loop(
    engine: Arc<Engine>,
    error_cooldown: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let channel = engine.channel().clone();

    loop {
        let batch = tokio::select! {
            batch = channel.receive() => batch,
            _ = stop_rx.changed() => break,
        };

        match batch {
            Ok(commands) => {
                for command in commands {
                    info!(command = %command.name, "📨 Received operator command");
                    engine.handle(command).await;
                }
            }
            Err(e) => {
                warn!(channel = channel.name(), error = %e, "Failed to receive commands");
                tokio::select! {
                    _ = tokio::time::sleep(error_cooldown) => {}
                    _ = stop_rx.changed() => break,
                }
            }
        }

        if *stop_rx.borrow() {
            break;
        }
    }

    info!("Command listener stopped");
}
