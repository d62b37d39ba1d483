// =============================================================================
// ServerChan Sink — WeChat push via sctapi.ftqq.com
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::{env_secret, NotificationSink};

const SERVERCHAN_API: &str = "https://sctapi.ftqq.com";
const MESSAGE_TITLE: &str = "Short squeeze radar";

pub struct ServerChanSink {
    client: reqwest::Client,
    send_key: String,
}

impl ServerChanSink {
    pub fn new(send_key: String, timeout: Duration) -> Option<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
        Some(Self { client, send_key })
    }

    /// `None` unless `SERVERCHAN_KEY` is set.
    pub fn from_env(timeout: Duration) -> Option<Self> {
        Self::new(env_secret("SERVERCHAN_KEY")?, timeout)
    }
}

#[async_trait]
impl NotificationSink for ServerChanSink {
    async fn send(&self, text: &str) -> bool {
        let url = format!("{SERVERCHAN_API}/{}.send", self.send_key);
        let title = text
            .lines()
            .next()
            .map(|l| l.trim_matches(|c| c == '*' || c == ' '))
            .filter(|l| !l.is_empty())
            .unwrap_or(MESSAGE_TITLE);
        let payload = json!({ "title": title, "desp": text });

        match self.client.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("serverchan message delivered");
                true
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "serverchan rejected message");
                false
            }
            Err(e) => {
                warn!(error = %e.without_url(), "serverchan send failed");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "serverchan"
    }
}

impl std::fmt::Debug for ServerChanSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerChanSink").finish_non_exhaustive()
    }
}
