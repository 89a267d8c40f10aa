//! Redis → Discord event bridge.
//!
//! The game publishes `{type, timestamp, data}` JSON on three pub/sub
//! channels. Each event is routed by `type` to a Discord message or dropped.
//! When several bridge processes run, only the one that claims an event's
//! digest forwards it.
//!
//! Delivery is best effort: nothing is retried or reordered.

pub mod dedupe;
pub mod discord;

use std::time::Duration;

use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::{BridgeConfig, Config};
use crate::logutil::{escape_log, truncate_chars};
use crate::metrics;
use dedupe::{ClaimStore, RedisClaimStore};
use discord::Notifier;

pub const CHAT_CHANNEL: &str = "fierymud:events:chat";
pub const PLAYER_CHANNEL: &str = "fierymud:events:player";
pub const ADMIN_CHANNEL: &str = "fierymud:events:admin";

/// Discord rejects longer message bodies.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub data: Value,
}

impl BridgeEvent {
    pub fn parse(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    fn text(&self, field: &str) -> Option<&str> {
        self.data
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Message for `event`, or `None` when the event is not forwarded.
pub fn route(event: &BridgeEvent) -> Option<String> {
    let message = match event.kind.as_str() {
        "gossip" | "chat" => {
            let player = event.text("player")?;
            let message = event.text("message")?;
            format!("**{}** gossips, '{}'", player, message)
        }
        "player_login" => format!("{} has entered FieryMUD.", event.text("player")?),
        "player_logout" => format!("{} has left FieryMUD.", event.text("player")?),
        "level_up" => {
            let player = event.text("player")?;
            let level = event.data.get("level").and_then(Value::as_u64)?;
            format!("{} has reached level {}!", player, level)
        }
        "player_death" => {
            let player = event.text("player")?;
            match event.text("killer") {
                Some(killer) => format!("{} was slain by {}.", player, killer),
                None => format!("{} has died.", player),
            }
        }
        "admin_broadcast" | "announcement" => format!("📢 {}", event.text("message")?),
        "server_startup" => "FieryMUD is online.".to_string(),
        "server_shutdown" => match event.text("reason") {
            Some(reason) => format!("FieryMUD is shutting down: {}", reason),
            None => "FieryMUD is shutting down.".to_string(),
        },
        _ => return None,
    };
    Some(truncate_chars(&message, DISCORD_MESSAGE_LIMIT))
}

/// Stable identity of one published event, shared by every bridge instance.
pub fn event_digest(channel: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(channel.as_bytes());
    hasher.update(b"\n");
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Exponential reconnect schedule with a ceiling and an attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl From<&BridgeConfig> for ReconnectPolicy {
    fn from(cfg: &BridgeConfig) -> Self {
        Self {
            max_attempts: cfg.max_reconnect_attempts,
            base_ms: cfg.backoff_base_ms,
            cap_ms: cfg.backoff_cap_ms,
        }
    }
}

impl ReconnectPolicy {
    /// `min(base * 2^attempt, cap)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.cap_ms))
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Forwarded,
    Dropped,
    Duplicate,
    Failed,
}

/// Parses, routes, claims and delivers individual pub/sub messages.
pub struct Forwarder<'a, C, N> {
    claims: C,
    notifier: &'a N,
    dedupe_ttl_ms: u64,
}

impl<'a, C: ClaimStore, N: Notifier> Forwarder<'a, C, N> {
    pub fn new(claims: C, notifier: &'a N, dedupe_ttl_ms: u64) -> Self {
        Self {
            claims,
            notifier,
            dedupe_ttl_ms,
        }
    }

    pub async fn process(&mut self, channel: &str, payload: &str) -> Outcome {
        let event = match BridgeEvent::parse(payload) {
            Ok(e) => e,
            Err(e) => {
                warn!("Unparseable event on {}: {} ({})", channel, escape_log(payload), e);
                metrics::inc_bridge_dropped();
                return Outcome::Dropped;
            }
        };
        let Some(message) = route(&event) else {
            debug!("Dropping {} event on {}", escape_log(&event.kind), channel);
            metrics::inc_bridge_dropped();
            return Outcome::Dropped;
        };

        let digest = event_digest(channel, payload);
        match self.claims.claim(&digest, self.dedupe_ttl_ms).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Event {} already forwarded by another instance", &digest[..12]);
                metrics::inc_bridge_duplicates();
                return Outcome::Duplicate;
            }
            // Unclaimed events still go out.
            Err(e) => warn!("Dedupe claim failed, forwarding unclaimed: {}", e),
        }

        match self.notifier.send(&message).await {
            Ok(()) => {
                metrics::inc_bridge_forwarded();
                Outcome::Forwarded
            }
            Err(e) => {
                warn!("Discord delivery failed for {} event: {}", escape_log(&event.kind), e);
                metrics::inc_bridge_dropped();
                Outcome::Failed
            }
        }
    }
}

/// Subscribe and forward until the connection budget is spent.
pub async fn run<N: Notifier>(config: &Config, notifier: &N) -> Result<()> {
    let policy = ReconnectPolicy::from(&config.bridge);
    let client = redis::Client::open(config.redis.url.as_str())?;
    let mut attempt = 0u32;
    loop {
        match session(&client, config, notifier, &mut attempt).await {
            Ok(()) => warn!("Redis subscription closed"),
            Err(e) => warn!("Redis connection failed: {}", e),
        }
        if policy.exhausted(attempt) {
            error!("Bridge giving up after {} reconnect attempts", attempt);
            return Err(anyhow!("redis unavailable after {} attempts", attempt));
        }
        let delay = policy.delay(attempt);
        attempt += 1;
        metrics::inc_bridge_reconnects();
        info!("Reconnecting to Redis in {:?} (attempt {})", delay, attempt);
        tokio::time::sleep(delay).await;
    }
}

async fn session<N: Notifier>(
    client: &redis::Client,
    config: &Config,
    notifier: &N,
    attempt: &mut u32,
) -> Result<()> {
    let conn = client.get_multiplexed_async_connection().await?;
    let mut pubsub = client.get_async_pubsub().await?;
    for channel in &config.redis.channels {
        pubsub.subscribe(channel.as_str()).await?;
    }
    info!("Subscribed to {}", config.redis.channels.join(", "));
    *attempt = 0;

    let mut forwarder = Forwarder::new(RedisClaimStore::new(conn), notifier, config.redis.dedupe_ttl_ms);
    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let channel = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!("Non-text payload on {}: {}", channel, e);
                metrics::inc_bridge_dropped();
                continue;
            }
        };
        forwarder.process(&channel, &payload).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: &str, data: Value) -> BridgeEvent {
        BridgeEvent {
            kind: kind.into(),
            timestamp: Some(json!("2024-01-01T00:00:00Z")),
            data,
        }
    }

    #[test]
    fn routes_known_events() {
        let gossip = event("gossip", json!({"player": "Zela", "message": "hi all"}));
        assert_eq!(route(&gossip).as_deref(), Some("**Zela** gossips, 'hi all'"));
        let level = event("level_up", json!({"player": "Zela", "level": 30}));
        assert_eq!(route(&level).as_deref(), Some("Zela has reached level 30!"));
        let death = event("player_death", json!({"player": "Zela"}));
        assert_eq!(route(&death).as_deref(), Some("Zela has died."));
    }

    #[test]
    fn drops_unknown_or_incomplete_events() {
        assert_eq!(route(&event("weather_change", json!({}))), None);
        assert_eq!(route(&event("gossip", json!({"player": "Zela"}))), None);
        assert_eq!(route(&event("player_login", json!({"player": "  "}))), None);
    }

    #[test]
    fn long_messages_fit_discord_limit() {
        let long = "x".repeat(5000);
        let e = event("announcement", json!({"message": long}));
        let msg = route(&e).unwrap();
        assert_eq!(msg.chars().count(), DISCORD_MESSAGE_LIMIT);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let p = ReconnectPolicy::from(&BridgeConfig::default());
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(4), Duration::from_millis(1600));
        assert_eq!(p.delay(5), Duration::from_millis(3000));
        assert_eq!(p.delay(200), Duration::from_millis(3000));
        assert!(!p.exhausted(9));
        assert!(p.exhausted(10));
    }

    #[test]
    fn digest_depends_on_channel_and_payload() {
        let a = event_digest(CHAT_CHANNEL, "{}");
        assert_eq!(a, event_digest(CHAT_CHANNEL, "{}"));
        assert_ne!(a, event_digest(ADMIN_CHANNEL, "{}"));
        assert_eq!(a.len(), 64);
    }
}
