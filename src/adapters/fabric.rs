//! Fabric commentary generator.
//!
//! Spawns `fabric -p <pattern>`, pipes the post text to stdin and takes the
//! trimmed stdout as commentary.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::openai::clean_commentary;
use super::CommentaryGenerator;

/// Commentary through a Fabric pattern
pub struct FabricCommentary {
    binary_path: String,
    pattern: String,
    timeout: Duration,
}

impl FabricCommentary {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            binary_path: "fabric".to_string(),
            pattern: pattern.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_binary_path(mut self, binary_path: impl Into<String>) -> Self {
        self.binary_path = binary_path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn execute_subprocess(&self, input: &str) -> Result<String> {
        let mut child = Command::new(&self.binary_path)
            .args(["-p", &self.pattern])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!("Failed to spawn fabric process for pattern '{}'", self.pattern)
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .context("Failed to write to fabric stdin")?;
        }

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "Fabric pattern '{}' timed out after {:?}",
                    self.pattern, self.timeout
                )
            })?
            .with_context(|| {
                format!("Failed to wait for fabric process for pattern '{}'", self.pattern)
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Fabric pattern '{}' failed with exit code {}: {}",
                self.pattern,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout).context("Fabric output is not valid UTF-8")
    }
}

#[async_trait]
impl CommentaryGenerator for FabricCommentary {
    fn name(&self) -> &str {
        "fabric"
    }

    async fn generate(&self, text: &str) -> Result<String> {
        let commentary = clean_commentary(&self.execute_subprocess(text).await?);
        if commentary.is_empty() {
            anyhow::bail!("Fabric pattern '{}' produced no output", self.pattern);
        }
        Ok(commentary)
    }
}
