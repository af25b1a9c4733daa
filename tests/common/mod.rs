//! In-memory adapters for driving the engine without a network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use postwatch::adapters::{ActionExecutor, ApprovalChannel, CommentaryGenerator, ContentSource};
use postwatch::core::{Engine, EngineSettings, PlatformSession, PostStore};
use postwatch::domain::{ApprovalCard, FeedItem, InboundCommand};

pub fn item(id: &str) -> FeedItem {
    FeedItem::new(id, format!("Text of {}", id), format!("https://example.com/{}", id))
}

/// Feed returning whatever was last set, newest first
#[derive(Default)]
pub struct FakeSource {
    pub items: Mutex<Vec<FeedItem>>,
    pub fetches: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeSource {
    pub fn set(&self, ids: &[&str]) {
        *self.items.lock().unwrap() = ids.iter().map(|id| item(id)).collect();
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    fn name(&self) -> &str {
        "fake-source"
    }

    async fn fetch_recent(&self, max_items: usize) -> Result<Vec<FeedItem>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("feed unreachable");
        }
        let items = self.items.lock().unwrap();
        Ok(items.iter().take(max_items).cloned().collect())
    }
}

/// Generator answering "Commentary #n for <text>", or failing on demand.
///
/// Holding a write guard on `gate` parks every call until it is released.
#[derive(Default)]
pub struct FakeGenerator {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub gate: tokio::sync::RwLock<()>,
}

#[async_trait]
impl CommentaryGenerator for FakeGenerator {
    fn name(&self) -> &str {
        "fake-generator"
    }

    async fn generate(&self, text: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let _open = self.gate.read().await;
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("generator offline");
        }
        Ok(format!("Commentary #{} for {}", n, text))
    }
}

/// Records every card and notice; optionally refuses cards
#[derive(Default)]
pub struct FakeChannel {
    pub cards: Mutex<Vec<ApprovalCard>>,
    pub notices: Mutex<Vec<String>>,
    pub inbox: Mutex<VecDeque<InboundCommand>>,
    pub fail_cards: AtomicBool,
}

impl FakeChannel {
    pub fn cards(&self) -> Vec<ApprovalCard> {
        self.cards.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    pub fn last_notice(&self) -> String {
        self.notices.lock().unwrap().last().cloned().unwrap_or_default()
    }

    pub fn card_for(&self, url_suffix: &str) -> Option<ApprovalCard> {
        self.cards()
            .into_iter()
            .rev()
            .find(|card| card.url.ends_with(url_suffix))
    }

    pub fn push_inbound(&self, command: InboundCommand) {
        self.inbox.lock().unwrap().push_back(command);
    }
}

#[async_trait]
impl ApprovalChannel for FakeChannel {
    fn name(&self) -> &str {
        "fake-channel"
    }

    async fn send_card(&self, card: &ApprovalCard) -> Result<()> {
        if self.fail_cards.load(Ordering::SeqCst) {
            anyhow::bail!("chat unreachable");
        }
        self.cards.lock().unwrap().push(card.clone());
        Ok(())
    }

    async fn send_notice(&self, text: &str) -> Result<()> {
        self.notices.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<InboundCommand>> {
        let batch: Vec<InboundCommand> = self.inbox.lock().unwrap().drain(..).collect();
        if batch.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(batch)
    }
}

/// One recorded platform action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Publish { url: String, commentary: String },
    PublishPlain { url: String },
    Like { url: String },
}

/// Executor logging every call
#[derive(Default)]
pub struct FakeExecutor {
    pub actions: Mutex<Vec<Action>>,
    pub fail_publish: AtomicBool,
    pub fail_like: AtomicBool,
}

impl FakeExecutor {
    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.actions()
            .iter()
            .filter(|a| matches!(a, Action::Publish { .. } | Action::PublishPlain { .. }))
            .count()
    }
}

#[async_trait]
impl ActionExecutor for FakeExecutor {
    fn name(&self) -> &str {
        "fake-executor"
    }

    async fn publish(&self, url: &str, commentary: &str) -> Result<String> {
        if self.fail_publish.load(Ordering::SeqCst) {
            anyhow::bail!("share button missing");
        }
        let mut actions = self.actions.lock().unwrap();
        actions.push(Action::Publish {
            url: url.to_string(),
            commentary: commentary.to_string(),
        });
        Ok(format!("https://example.com/share/{}", actions.len()))
    }

    async fn publish_plain(&self, url: &str) -> Result<String> {
        if self.fail_publish.load(Ordering::SeqCst) {
            anyhow::bail!("share button missing");
        }
        let mut actions = self.actions.lock().unwrap();
        actions.push(Action::PublishPlain {
            url: url.to_string(),
        });
        Ok(format!("https://example.com/share/{}", actions.len()))
    }

    async fn like(&self, url: &str) -> Result<bool> {
        self.actions.lock().unwrap().push(Action::Like {
            url: url.to_string(),
        });
        Ok(!self.fail_like.load(Ordering::SeqCst))
    }
}

/// Engine wired to fakes over a temp store
pub struct Harness {
    pub _temp: TempDir,
    pub store: Arc<PostStore>,
    pub source: Arc<FakeSource>,
    pub generator: Arc<FakeGenerator>,
    pub channel: Arc<FakeChannel>,
    pub executor: Arc<FakeExecutor>,
    pub engine: Arc<Engine>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(EngineSettings {
            lookback: 10,
            retention: None,
            resend_delay: Duration::ZERO,
        })
        .await
    }

    pub async fn with_settings(settings: EngineSettings) -> Self {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(PostStore::open(temp.path().join("posts.json")).await.unwrap());
        let source = Arc::new(FakeSource::default());
        let generator = Arc::new(FakeGenerator::default());
        let channel = Arc::new(FakeChannel::default());
        let executor = Arc::new(FakeExecutor::default());

        let session = Arc::new(PlatformSession::new(source.clone(), executor.clone()));
        let engine = Arc::new(Engine::new(
            store.clone(),
            session,
            generator.clone(),
            channel.clone(),
            settings,
        ));

        Self {
            _temp: temp,
            store,
            source,
            generator,
            channel,
            executor,
            engine,
        }
    }

    /// Token on the newest card for a post id
    pub fn token_of(&self, id: &str) -> String {
        self.channel
            .card_for(&format!("/{}", id))
            .map(|card| card.token)
            .unwrap_or_else(|| panic!("no card sent for {}", id))
    }

    pub async fn command(&self, name: &str, args: &[&str]) -> postwatch::Outcome {
        self.engine
            .handle(InboundCommand::new(name).with_args(args.iter().copied()))
            .await
    }
}
