//! OpenAI chat-completions commentary generator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CommentaryGenerator;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Placeholder replaced by the post text
pub const TEXT_PLACEHOLDER: &str = "[Text]";

pub const DEFAULT_PROMPT: &str = "Write a short, thoughtful comment (one to three sentences) \
to accompany a re-share of the following post. Do not use hashtags or quotation marks.\n\n[Text]";

/// Configuration for the OpenAI generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

fn default_max_tokens() -> u32 {
    150
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            prompt: default_prompt(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Generates commentary through the chat-completions endpoint
pub struct OpenAiCommentary {
    config: OpenAiConfig,
    api_base: String,
    client: reqwest::Client,
}

impl OpenAiCommentary {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_key(&self) -> Result<&str> {
        match self.config.api_key.as_deref().map(str::trim) {
            Some(key) if key.starts_with("sk-") => Ok(key),
            Some(key) if !key.is_empty() => anyhow::bail!("OpenAI API key looks malformed"),
            _ => anyhow::bail!("OpenAI API key is not configured"),
        }
    }

    /// Fill the prompt template with the post text
    pub fn render_prompt(&self, text: &str) -> String {
        if self.config.prompt.contains(TEXT_PLACEHOLDER) {
            self.config.prompt.replace(TEXT_PLACEHOLDER, text)
        } else {
            format!("{}\n\n{}", self.config.prompt, text)
        }
    }
}

#[async_trait]
impl CommentaryGenerator for OpenAiCommentary {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, text: &str) -> Result<String> {
        let api_key = self.api_key()?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: self.render_prompt(text),
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!(model = %self.config.model, "Requesting commentary");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to call OpenAI")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            anyhow::bail!("OpenAI API error ({}): {}", status, detail.trim());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("OpenAI returned no choices")?;

        let commentary = clean_commentary(&content);
        if commentary.is_empty() {
            anyhow::bail!("OpenAI returned empty commentary");
        }
        Ok(commentary)
    }
}

/// Trim whitespace and surrounding quotes
pub fn clean_commentary(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '“' || c == '”')
        .trim()
        .to_string()
}
