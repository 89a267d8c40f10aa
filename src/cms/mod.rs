//! World content model and persistence.
//! Records live in sled trees keyed by fixed-width composite keys; the
//! service modules translate between API-shaped inputs/DTOs and those rows.

pub mod catalog;
pub mod dto;
pub mod errors;
pub mod keys;
pub mod quest;
pub mod resets;
pub mod storage;
pub mod types;
pub mod world;

pub use dto::EntitySummary;
pub use errors::CmsError;
pub use keys::{EntityKey, ObjectiveKey, PhaseKey, PrerequisiteKey, RewardKey, ZoneId};
pub use storage::{CmsStore, CmsStoreBuilder, StoreCounts};
pub use types::*;
