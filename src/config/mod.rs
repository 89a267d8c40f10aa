//! # Configuration
//!
//! TOML configuration for the API server, the content store and the Discord
//! bridge. Values are resolved in this order: environment > config file >
//! defaults.
//!
//! ## Sections
//!
//! - [`ServerConfig`] - API listener address and request line cap
//! - [`StorageConfig`] - sled data directory and bootstrap admin
//! - [`LoggingConfig`] - log file and security log
//! - [`ApiConfig`] - operation listing and error detail switches
//! - [`RedisConfig`] - game event source
//! - [`DiscordConfig`] - bot credentials and target channel
//! - [`BridgeConfig`] - reconnect policy
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fierycms::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("API bind: {}", config.server.bind);
//!     Ok(())
//! }
//! ```
//!
//! ## File format
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:4050"
//! max_line_bytes = 1048576
//!
//! [storage]
//! data_dir = "./data"
//! bootstrap_admin = "admin"
//!
//! [redis]
//! url = "redis://127.0.0.1:6379"
//! ```
//!
//! ## Environment
//!
//! `GRAPHQL_PLAYGROUND`, `GRAPHQL_DEBUG`, `REDIS_URL`, `DISCORD_BOT_TOKEN`,
//! `DISCORD_CLIENT_ID`, `DISCORD_GUILD_ID` and `DISCORD_CHANNEL_ID` override
//! the matching file values after load.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::fs;

use crate::api::server::DEFAULT_MAX_LINE_BYTES;
use crate::bridge::{ADMIN_CHANNEL, CHAT_CHANNEL, PLAYER_CHANNEL};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Created as a GOD account when the store has no users yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_admin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    /// Security events (authorization denials) are mirrored here.
    pub security_file: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// Enables the `operations` listing.
    #[serde(default)]
    pub playground: bool,
    /// Include internal error detail in responses.
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedisConfig {
    pub url: String,
    pub channels: Vec<String>,
    /// How long a forwarded event's claim is held for cross-instance dedupe.
    pub dedupe_ttl_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            channels: vec![
                CHAT_CHANNEL.to_string(),
                PLAYER_CHANNEL.to_string(),
                ADMIN_CHANNEL.to_string(),
            ],
            dedupe_ttl_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub guild_id: String,
    /// Channel that receives forwarded events.
    #[serde(default)]
    pub channel_id: String,
    #[serde(default = "default_discord_api_base")]
    pub api_base: String,
}

fn default_discord_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            client_id: String::new(),
            guild_id: String::new(),
            channel_id: String::new(),
            api_base: default_discord_api_base(),
        }
    }
}

impl DiscordConfig {
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.channel_id.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Consecutive failed connects before the bridge stops for good.
    pub max_reconnect_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 10,
            backoff_base_ms: 100,
            backoff_cap_ms: 3000,
        }
    }
}

impl Config {
    /// Load, apply environment overrides and validate.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Overlay environment values. `lookup` is `std::env::var` outside tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GRAPHQL_PLAYGROUND") {
            self.api.playground = parse_flag(&v);
        }
        if let Some(v) = lookup("GRAPHQL_DEBUG") {
            self.api.debug = parse_flag(&v);
        }
        if let Some(v) = lookup("REDIS_URL") {
            self.redis.url = v;
        }
        if let Some(v) = lookup("DISCORD_BOT_TOKEN") {
            self.discord.bot_token = v;
        }
        if let Some(v) = lookup("DISCORD_CLIENT_ID") {
            self.discord.client_id = v;
        }
        if let Some(v) = lookup("DISCORD_GUILD_ID") {
            self.discord.guild_id = v;
        }
        if let Some(v) = lookup("DISCORD_CHANNEL_ID") {
            self.discord.channel_id = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            bail!("server.bind must not be empty");
        }
        self.bind_addr()?;
        if self.server.max_line_bytes == 0 {
            bail!("server.max_line_bytes must be positive");
        }
        if self.storage.data_dir.trim().is_empty() {
            bail!("storage.data_dir must not be empty");
        }
        if self.bridge.backoff_cap_ms == 0 {
            bail!("bridge.backoff_cap_ms must be positive");
        }
        if self.bridge.backoff_base_ms == 0 || self.bridge.backoff_base_ms > self.bridge.backoff_cap_ms {
            bail!("bridge.backoff_base_ms must be between 1 and backoff_cap_ms");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .map_err(|e| anyhow!("Invalid server.bind '{}': {}", self.server.bind, e))
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                bind: "127.0.0.1:4050".to_string(),
                max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                bootstrap_admin: Some("admin".to_string()),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("fierycms.log".to_string()),
                security_file: Some("fierycms-security.log".to_string()),
            },
            api: ApiConfig::default(),
            redis: RedisConfig::default(),
            discord: DiscordConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bridge.max_reconnect_attempts, 10);
        assert_eq!(config.bridge.backoff_cap_ms, 3000);
        assert_eq!(config.redis.channels.len(), 3);
    }

    #[test]
    fn minimal_file_fills_optional_sections() {
        let text = r#"
[server]
bind = "0.0.0.0:5000"

[storage]
data_dir = "/tmp/cms"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.server.max_line_bytes, DEFAULT_MAX_LINE_BYTES);
        assert!(!config.api.playground);
        assert_eq!(config.discord.api_base, "https://discord.com/api/v10");
        assert_eq!(config.redis, RedisConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = Config::default();
        config.redis.url = "redis://file:6379".into();
        let env: HashMap<&str, &str> = [
            ("GRAPHQL_PLAYGROUND", "true"),
            ("GRAPHQL_DEBUG", "0"),
            ("REDIS_URL", "redis://env:6379"),
            ("DISCORD_BOT_TOKEN", "tok"),
            ("DISCORD_CHANNEL_ID", "42"),
        ]
        .into_iter()
        .collect();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert!(config.api.playground);
        assert!(!config.api.debug);
        assert_eq!(config.redis.url, "redis://env:6379");
        assert!(config.discord.is_configured());
        assert!(config.discord.guild_id.is_empty());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.server.bind = " ".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.data_dir.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bridge.backoff_cap_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.bind = "not-an-address".into();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn create_default_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.server, Config::default().server);
        assert_eq!(loaded.storage, Config::default().storage);
    }
}
