// =============================================================================
// Telegram Sink — Bot API sendMessage
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::{env_secret, NotificationSink};

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct TelegramSink {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(token: String, chat_id: String, timeout: Duration) -> Option<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
        Some(Self {
            client,
            token,
            chat_id,
        })
    }

    /// `None` unless both `TELEGRAM_TOKEN` and `TELEGRAM_CHAT_ID` are set.
    pub fn from_env(timeout: Duration) -> Option<Self> {
        let token = env_secret("TELEGRAM_TOKEN")?;
        let chat_id = env_secret("TELEGRAM_CHAT_ID")?;
        Self::new(token, chat_id, timeout)
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, text: &str) -> bool {
        let url = format!("{TELEGRAM_API}/bot{}/sendMessage", self.token);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        match self.client.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("telegram message delivered");
                true
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "telegram rejected message");
                false
            }
            Err(e) => {
                // The token is part of the URL; log without it.
                warn!(error = %e.without_url(), "telegram send failed");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

impl std::fmt::Debug for TelegramSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSink")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}
