// =============================================================================
// Notifications — Outbound alert channels
// =============================================================================
//
// A sink reports delivery as a plain bool: a failed push is logged by the
// sink and never interrupts the scan loop.

pub mod format;
pub mod serverchan;
pub mod telegram;

pub use serverchan::ServerChanSink;
pub use telegram::TelegramSink;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver `text`; `true` when the channel accepted it.
    async fn send(&self, text: &str) -> bool;

    /// Channel name for logging.
    fn name(&self) -> &'static str;
}

/// Writes every message through `tracing`. Always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, text: &str) -> bool {
        info!(channel = "log", message = %text, "notification");
        true
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Sends to every inner sink; succeeds if any of them did.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Log sink plus every channel whose secret is present in the environment.
    pub fn from_env(timeout: Duration) -> Self {
        let mut fanout = Self::new().with(LogSink);
        match TelegramSink::from_env(timeout) {
            Some(sink) => fanout.push(Box::new(sink)),
            None => info!("TELEGRAM_TOKEN / TELEGRAM_CHAT_ID not set, telegram disabled"),
        }
        match ServerChanSink::from_env(timeout) {
            Some(sink) => fanout.push(Box::new(sink)),
            None => info!("SERVERCHAN_KEY not set, serverchan disabled"),
        }
        fanout
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn send(&self, text: &str) -> bool {
        let mut delivered = false;
        for sink in &self.sinks {
            if sink.send(text).await {
                delivered = true;
            } else {
                warn!(channel = sink.name(), "notification not delivered");
            }
        }
        delivered
    }

    fn name(&self) -> &'static str {
        "fanout"
    }
}

/// Read a non-empty env var.
pub(crate) fn env_secret(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    #[async_trait]
    impl NotificationSink for Refusing {
        async fn send(&self, _text: &str) -> bool {
            false
        }
        fn name(&self) -> &'static str {
            "refusing"
        }
    }

    #[tokio::test]
    async fn fanout_succeeds_when_any_sink_does() {
        let fanout = FanoutSink::new().with(Refusing).with(LogSink);
        assert!(fanout.send("hello").await);
    }

    #[tokio::test]
    async fn fanout_fails_when_all_refuse() {
        let fanout = FanoutSink::new().with(Refusing).with(Refusing);
        assert!(!fanout.send("hello").await);
        assert!(!FanoutSink::new().send("nobody").await);
    }
}
