//! Discord REST delivery.

use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde_json::json;

use crate::config::DiscordConfig;
use crate::logutil::escape_log;

#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn send(&self, content: &str) -> Result<()>;
}

/// Posts to one channel as the configured bot.
pub struct DiscordNotifier {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(anyhow!("discord.bot_token and discord.channel_id are required"));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: format!(
                "{}/channels/{}/messages",
                config.api_base.trim_end_matches('/'),
                config.channel_id
            ),
            token: config.bot_token.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for DiscordNotifier {
    async fn send(&self, content: &str) -> Result<()> {
        // No pings from forwarded player text.
        let body = json!({
            "content": content,
            "allowed_mentions": { "parse": [] },
        });
        let resp = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bot {}", self.token))
            .header(USER_AGENT, concat!("fierycms/", env!("CARGO_PKG_VERSION")))
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("discord http={} {}", status.as_u16(), escape_log(&text));
        }
        Ok(())
    }
}

/// Keeps every message; used by `fierycms bridge --dry-run` and tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every send fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    async fn send(&self, content: &str) -> Result<()> {
        if self.fail {
            bail!("delivery disabled");
        }
        log::info!("[discord] {}", escape_log(content));
        if let Ok(mut guard) = self.sent.lock() {
            guard.push(content.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_token_and_channel() {
        assert!(DiscordNotifier::new(&DiscordConfig::default()).is_err());
        let cfg = DiscordConfig {
            bot_token: "tok".into(),
            channel_id: "123".into(),
            api_base: "https://discord.test/api/".into(),
            ..DiscordConfig::default()
        };
        let n = DiscordNotifier::new(&cfg).unwrap();
        assert_eq!(n.url(), "https://discord.test/api/channels/123/messages");
    }
}
