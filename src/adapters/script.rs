//! Platform adapter backed by an external automation program.
//!
//! Browser automation lives outside this crate. The configured program is
//! invoked once per operation with a subcommand:
//!
//! - `fetch --max <n>`: print a JSON array of feed items, newest first
//! - `publish <url>`: commentary on stdin, print the resulting URL
//! - `publish_plain <url>`: print the resulting URL
//! - `like <url>`: exit status reports success

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{ActionExecutor, ContentSource};
use crate::domain::FeedItem;

/// How to invoke the automation program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    120
}

struct ScriptOutput {
    success: bool,
    code: i32,
    stdout: String,
    stderr: String,
}

/// Content source and action executor over one program
pub struct ScriptPlatform {
    config: ScriptConfig,
}

impl ScriptPlatform {
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    async fn run(&self, operation: &[&str], stdin: Option<&str>) -> Result<ScriptOutput> {
        let step_timeout = Duration::from_secs(self.config.timeout_seconds);
        let op = operation.first().copied().unwrap_or_default();

        debug!(program = %self.config.program, ?operation, "Running platform script");
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .args(operation)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!("Failed to spawn platform program '{}'", self.config.program)
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .context("Failed to write to platform program stdin")?;
        }

        let output = timeout(step_timeout, child.wait_with_output())
            .await
            .with_context(|| format!("Platform '{}' timed out after {:?}", op, step_timeout))?
            .with_context(|| format!("Failed to wait for platform '{}'", op))?;

        Ok(ScriptOutput {
            success: output.status.success(),
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_checked(&self, operation: &[&str], stdin: Option<&str>) -> Result<String> {
        let op = operation.first().copied().unwrap_or_default();
        let output = self.run(operation, stdin).await?;
        if !output.success {
            anyhow::bail!(
                "Platform '{}' failed with exit code {}: {}",
                op,
                output.code,
                output.stderr.trim()
            );
        }
        Ok(output.stdout)
    }
}

fn result_url(stdout: &str, op: &str) -> Result<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .with_context(|| format!("Platform '{}' printed no result URL", op))
}

#[async_trait]
impl ContentSource for ScriptPlatform {
    fn name(&self) -> &str {
        "script"
    }

    async fn fetch_recent(&self, max_items: usize) -> Result<Vec<FeedItem>> {
        let max = max_items.to_string();
        let stdout = self.run_checked(&["fetch", "--max", &max], None).await?;

        let mut items: Vec<FeedItem> = serde_json::from_str(stdout.trim())
            .context("Platform 'fetch' did not print a JSON array of items")?;
        items.truncate(max_items);
        Ok(items)
    }
}

#[async_trait]
impl ActionExecutor for ScriptPlatform {
    fn name(&self) -> &str {
        "script"
    }

    async fn publish(&self, url: &str, commentary: &str) -> Result<String> {
        let stdout = self.run_checked(&["publish", url], Some(commentary)).await?;
        result_url(&stdout, "publish")
    }

    async fn publish_plain(&self, url: &str) -> Result<String> {
        let stdout = self.run_checked(&["publish_plain", url], None).await?;
        result_url(&stdout, "publish_plain")
    }

    async fn like(&self, url: &str) -> Result<bool> {
        let output = self.run(&["like", url], None).await?;
        if !output.success {
            debug!(code = output.code, stderr = %output.stderr.trim(), "Like reported failure");
        }
        Ok(output.success)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const FAKE: &str = r#"#!/bin/sh
case "$1" in
  fetch)
    echo '[{"id":"p2","text":"second","url":"https://example.com/p2"},{"id":"p1","text":"first","url":"https://example.com/p1"}]'
    ;;
  publish)
    read commentary
    echo "https://example.com/share/$(echo "$commentary" | tr ' ' '-')"
    ;;
  publish_plain)
    echo ""
    echo "https://example.com/share/plain"
    ;;
  like)
    [ "$2" = "https://example.com/ok" ]
    ;;
  *)
    exit 2
    ;;
esac
"#;

    fn platform(dir: &TempDir) -> ScriptPlatform {
        let path = dir.path().join("platform.sh");
        std::fs::write(&path, FAKE).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        ScriptPlatform::new(ScriptConfig {
            program: path.to_string_lossy().to_string(),
            args: vec![],
            timeout_seconds: 10,
        })
    }

    #[tokio::test]
    async fn test_fetch_parses_items() {
        let dir = TempDir::new().unwrap();
        let items = platform(&dir).fetch_recent(1).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "p2");
    }

    #[tokio::test]
    async fn test_publish_passes_commentary() {
        let dir = TempDir::new().unwrap();
        let platform = platform(&dir);
        let url = platform.publish("https://example.com/p1", "so good\n").await.unwrap();
        assert_eq!(url, "https://example.com/share/so-good");

        let plain = platform.publish_plain("https://example.com/p1").await.unwrap();
        assert_eq!(plain, "https://example.com/share/plain");
    }

    #[tokio::test]
    async fn test_like_uses_exit_status() {
        let dir = TempDir::new().unwrap();
        let platform = platform(&dir);
        assert!(platform.like("https://example.com/ok").await.unwrap());
        assert!(!platform.like("https://example.com/nope").await.unwrap());
    }

    #[test]
    fn test_result_url_requires_output() {
        assert!(result_url("\n  \n", "publish").is_err());
    }
}
