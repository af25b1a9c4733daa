//! Serialized access to the platform session.
//!
//! Fetching, publishing and liking share one underlying automation session
//! (a single browser, typically), so at most one of them may be in flight.
//! Every call funnels through the gate below.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::debug;

use crate::adapters::{ActionExecutor, ContentSource};
use crate::domain::FeedItem;

/// Source and executor behind one mutex
pub struct PlatformSession {
    source: Arc<dyn ContentSource>,
    executor: Arc<dyn ActionExecutor>,
    gate: Mutex<()>,
}

impl PlatformSession {
    pub fn new(source: Arc<dyn ContentSource>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            source,
            executor,
            gate: Mutex::new(()),
        }
    }

    /// Build from one adapter that implements both sides
    pub fn shared<P>(platform: Arc<P>) -> Self
    where
        P: ContentSource + ActionExecutor + 'static,
    {
        Self::new(platform.clone(), platform)
    }

    pub async fn fetch_recent(&self, max_items: usize) -> Result<Vec<FeedItem>> {
        let _guard = self.gate.lock().await;
        debug!(source = self.source.name(), max_items, "Fetching recent items");
        self.source.fetch_recent(max_items).await
    }

    pub async fn publish(&self, url: &str, commentary: &str) -> Result<String> {
        let _guard = self.gate.lock().await;
        debug!(executor = self.executor.name(), %url, "Publishing with commentary");
        self.executor.publish(url, commentary).await
    }

    pub async fn publish_plain(&self, url: &str) -> Result<String> {
        let _guard = self.gate.lock().await;
        debug!(executor = self.executor.name(), %url, "Publishing without commentary");
        self.executor.publish_plain(url).await
    }

    pub async fn like(&self, url: &str) -> Result<bool> {
        let _guard = self.gate.lock().await;
        debug!(executor = self.executor.name(), %url, "Liking");
        self.executor.like(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records the peak number of concurrent calls
    #[derive(Default)]
    struct Busy {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Busy {
        async fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ContentSource for Busy {
        fn name(&self) -> &str {
            "busy"
        }

        async fn fetch_recent(&self, _max_items: usize) -> Result<Vec<FeedItem>> {
            self.enter().await;
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl ActionExecutor for Busy {
        fn name(&self) -> &str {
            "busy"
        }

        async fn publish(&self, _url: &str, _commentary: &str) -> Result<String> {
            self.enter().await;
            Ok("https://example.com/share/1".to_string())
        }

        async fn publish_plain(&self, _url: &str) -> Result<String> {
            self.enter().await;
            Ok("https://example.com/share/2".to_string())
        }

        async fn like(&self, _url: &str) -> Result<bool> {
            self.enter().await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_calls_never_overlap() {
        let busy = Arc::new(Busy::default());
        let session = Arc::new(PlatformSession::shared(busy.clone()));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move {
                match i % 4 {
                    0 => {
                        session.fetch_recent(3).await.unwrap();
                    }
                    1 => {
                        session.publish("u", "c").await.unwrap();
                    }
                    2 => {
                        session.publish_plain("u").await.unwrap();
                    }
                    _ => {
                        session.like("u").await.unwrap();
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(busy.peak.load(Ordering::SeqCst), 1);
    }
}
