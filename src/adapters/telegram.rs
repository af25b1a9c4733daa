//! Telegram Bot API adapter for the approval channel.
//!
//! Cards go out as HTML messages with an inline keyboard whose callback data
//! carries `command:token`. Typed commands are read through long-polled
//! `getUpdates`; a reply to a card resolves to that card's token through a
//! message-id index. Updates from any chat other than the configured one are
//! ignored.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::ApprovalChannel;
use crate::domain::{ApprovalCard, InboundCommand};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects messages longer than 4096 characters
const MAX_MESSAGE_CHARS: usize = 4000;

/// Card text is cut to keep the whole card under the message limit
const MAX_CARD_TEXT_CHARS: usize = 1500;

/// Sent cards remembered for reply correlation
const REPLY_INDEX_CAPACITY: usize = 1000;

/// Configuration for the Telegram channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
}

fn default_poll_timeout() -> u64 {
    30
}

/// Response envelope from the Bot API
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResult {
    message_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    text: Option<String>,
    reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Clone, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct CallbackQuery {
    id: String,
    data: Option<String>,
    message: Option<Message>,
}

/// Telegram Bot API approval channel
pub struct TelegramChannel {
    config: TelegramConfig,
    api_base: String,
    client: reqwest::Client,
    /// Next update id to request
    offset: Mutex<i64>,
    /// message_id of a sent card -> its token
    replies: Mutex<BTreeMap<i64, String>>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
            offset: Mutex::new(0),
            replies: Mutex::new(BTreeMap::new()),
        }
    }

    /// Point the client at a different Bot API server
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.config.bot_token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        request_timeout: Option<Duration>,
    ) -> Result<T> {
        let mut request = self.client.post(self.api_url(method)).json(&body);
        if let Some(t) = request_timeout {
            request = request.timeout(t);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to call Telegram {}", method))?;

        let result: TelegramResponse<T> = response
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            );
        }

        result
            .result
            .with_context(|| format!("Telegram {} returned no result", method))
    }

    /// Send one text message, returning its message id
    async fn send_message(&self, text: &str, extra: serde_json::Value) -> Result<i64> {
        let mut body = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                body.insert(k.clone(), v.clone());
            }
        }

        let message: MessageResult = self.call("sendMessage", body, None).await?;
        Ok(message.message_id)
    }

    async fn remember_card(&self, message_id: i64, token: &str) {
        let mut replies = self.replies.lock().await;
        replies.insert(message_id, token.to_string());
        while replies.len() > REPLY_INDEX_CAPACITY {
            replies.pop_first();
        }
    }

    async fn answer_callback(&self, callback_id: &str) {
        let result: Result<bool> = self
            .call(
                "answerCallbackQuery",
                serde_json::json!({ "callback_query_id": callback_id }),
                None,
            )
            .await;
        if let Err(e) = result {
            debug!(error = %e, "Failed to answer callback query");
        }
    }

    fn is_own_chat(&self, chat: &Chat) -> bool {
        chat.id.to_string() == self.config.chat_id.trim()
    }

    /// Turn one update into a command, if it carries one for our chat
    async fn convert_update(&self, update: Update) -> Option<InboundCommand> {
        if let Some(query) = update.callback_query {
            let own = query
                .message
                .as_ref()
                .map(|m| self.is_own_chat(&m.chat))
                .unwrap_or(false);
            if !own {
                debug!(update_id = update.update_id, "Ignoring callback from another chat");
                return None;
            }

            self.answer_callback(&query.id).await;
            return query.data.as_deref().and_then(parse_callback_data);
        }

        let message = update.message?;
        if !self.is_own_chat(&message.chat) {
            debug!(update_id = update.update_id, "Ignoring message from another chat");
            return None;
        }

        let mut command = InboundCommand::from_text(message.text.as_deref()?)?;

        if let Some(parent) = &message.reply_to_message {
            if let Some(token) = self.replies.lock().await.get(&parent.message_id) {
                command = command.with_reference(token.clone());
            }
        }

        Some(command)
    }
}

#[async_trait]
impl ApprovalChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_card(&self, card: &ApprovalCard) -> Result<()> {
        let text = format_card_html(card);
        let message_id = self
            .send_message(
                &text,
                serde_json::json!({
                    "parse_mode": "HTML",
                    "reply_markup": inline_keyboard(&card.token),
                }),
            )
            .await
            .context("Failed to send approval card")?;

        self.remember_card(message_id, &card.token).await;
        debug!(message_id, token = %card.token, "Sent approval card");
        Ok(())
    }

    async fn send_notice(&self, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            self.send_message(&chunk, serde_json::json!({}))
                .await
                .context("Failed to send notice")?;
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<InboundCommand>> {
        let offset = *self.offset.lock().await;
        let poll_timeout = self.config.poll_timeout_seconds;

        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                serde_json::json!({
                    "offset": offset,
                    "timeout": poll_timeout,
                    "allowed_updates": ["message", "callback_query"],
                }),
                Some(Duration::from_secs(poll_timeout + 10)),
            )
            .await?;

        let mut commands = Vec::new();
        for update in updates {
            {
                let mut next = self.offset.lock().await;
                *next = (*next).max(update.update_id + 1);
            }
            if let Some(command) = self.convert_update(update).await {
                commands.push(command);
            }
        }

        Ok(commands)
    }
}

/// Parse `command:token` callback data
fn parse_callback_data(data: &str) -> Option<InboundCommand> {
    let (name, token) = data.split_once(':')?;
    if name.is_empty() || token.is_empty() {
        warn!(%data, "Malformed callback data");
        return None;
    }
    Some(InboundCommand::new(name).with_reference(token))
}

fn inline_keyboard(token: &str) -> serde_json::Value {
    let button = |label: &str, command: &str| {
        serde_json::json!({
            "text": label,
            "callback_data": format!("{}:{}", command, token),
        })
    };

    serde_json::json!({
        "inline_keyboard": [
            [button("✅ Approve", "approve"), button("❌ Reject", "reject")],
            [button("🔄 Regenerate", "regenerate"), button("👍 Like only", "like")],
            [button("📤 Publish without commentary", "publish_plain")],
        ]
    })
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut)
}

fn format_card_html(card: &ApprovalCard) -> String {
    let mut out = String::new();

    if let Some(note) = &card.status_note {
        out.push_str(&format!("📌 <b>{}</b>\n\n", escape_html(note)));
    }

    out.push_str("🔔 <b>New post to review</b>\n");
    if let Some(published) = &card.published_at {
        out.push_str(&format!("📅 {}\n", escape_html(published)));
    }

    out.push_str(&format!(
        "\n📄 <b>Post</b>\n{}\n",
        escape_html(&truncate_chars(&card.text, MAX_CARD_TEXT_CHARS))
    ));

    match &card.commentary {
        Some(commentary) => out.push_str(&format!(
            "\n💬 <b>Suggested commentary</b>\n<i>{}</i>\n",
            escape_html(commentary)
        )),
        None => out.push_str("\n💬 <i>No commentary yet</i>\n"),
    }

    out.push_str(&format!("\n🔗 {}\n", escape_html(&card.url)));
    out.push_str(&format!(
        "\nReference: <code>{}</code>",
        escape_html(&card.token)
    ));

    out
}

/// Split on line boundaries into chunks of at most `max` characters
fn split_message(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        let mut line = line.to_string();
        while line.chars().count() > max {
            let head: String = line.chars().take(max).collect();
            line = line.chars().skip(max).collect();
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(head);
        }

        if current.chars().count() + line.chars().count() > max {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(&line);
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }

    chunks
}
