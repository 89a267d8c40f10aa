//! # fierycms - World content management for FieryMUD
//!
//! fierycms is the builder-facing back end of FieryMUD. It stores zones and
//! everything that lives in them, exposes create/read/update/delete
//! operations guarded by staff roles and per-zone grants, and relays game
//! events from Redis into a Discord channel.
//!
//! ## Features
//!
//! - **Composite identity**: every zone-scoped record is addressed by
//!   `(zone_id, id)` and every reference carries both halves.
//! - **Integrity in the store**: foreign-key checks, restrict rules and
//!   delete cascades are enforced inside sled transactions.
//! - **Quest graph**: quests with ordered phases, objectives, rewards and
//!   prerequisite edges across zones.
//! - **Resets**: mob and object spawn rules with nested equipment and spawn
//!   conditions, updated without dropping omitted rows.
//! - **Zone permissions**: elevated roles edit anywhere; builders need an
//!   unexpired grant for the zone they touch.
//! - **Line JSON server**: one request per line over TCP.
//! - **Discord bridge**: Redis pub/sub subscriber with capped backoff and
//!   cross-instance dedupe.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fierycms::api::{Api, ApiOptions};
//! use fierycms::cms::CmsStoreBuilder;
//! use fierycms::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let store = CmsStoreBuilder::new(&config.storage.data_dir).open()?;
//!     let api = Arc::new(Api::new(Arc::new(store), ApiOptions::default()));
//!     fierycms::api::server::run(api, config.bind_addr()?, config.server.max_line_bytes).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`cms`] - content records, composite keys and the sled store
//! - [`auth`] - actor resolution and the zone-write guard
//! - [`api`] - operation dispatch and the TCP server
//! - [`bridge`] - Redis → Discord forwarding
//! - [`config`] - configuration loading and validation
//! - [`validation`] - input checks shared by the services
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │  api::server    │     │     bridge      │ ← Redis pub/sub
//! └─────────────────┘     └─────────────────┘
//!          │                       │
//! ┌─────────────────┐              ▼
//! │ api + auth      │           Discord
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ cms services    │
//! │ cms::storage    │ ← sled
//! └─────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod bridge;
pub mod cms;
pub mod config;
pub mod logutil;
pub mod metrics;
pub mod validation;
