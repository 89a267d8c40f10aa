//! Shared pieces of the API-facing shapes.
//!
//! Rows in [`crate::cms::types`] are bincode-encoded and never skip fields.
//! The shapes here are JSON: field names are camelCase, absent optionals are
//! omitted rather than written as `null`, and composite references arrive as
//! separate `xxxZoneId` / `xxxId` arguments.

use serde::{Deserialize, Deserializer, Serialize};

use crate::cms::errors::CmsError;
use crate::cms::keys::{EntityKey, ZoneId};

/// Resolved view of a referenced room, mob or object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntitySummary {
    pub zone_id: ZoneId,
    pub id: u32,
    /// Display name; absent when the target row no longer exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntitySummary {
    pub fn new(key: EntityKey, name: Option<String>) -> Self {
        Self {
            zone_id: key.zone_id,
            id: key.id,
            name,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.zone_id, self.id)
    }
}

/// Distinguishes "field omitted" (`None`) from "field set to null"
/// (`Some(None)`) in patch inputs.
pub fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

/// Combine a `xxxZoneId` / `xxxId` argument pair into one key.
/// Supplying only half of a pair is an input error.
pub fn key_pair(field: &str, zone_id: Option<ZoneId>, id: Option<u32>) -> Result<Option<EntityKey>, CmsError> {
    match (zone_id, id) {
        (Some(zone_id), Some(id)) => Ok(Some(EntityKey::new(zone_id, id))),
        (None, None) => Ok(None),
        _ => Err(CmsError::Validation(format!(
            "{0}ZoneId and {0}Id must be supplied together",
            field
        ))),
    }
}

/// Patch form of [`key_pair`]: omitted pair keeps the current value, a pair
/// of nulls clears it.
pub fn patch_key_pair(
    field: &str,
    zone_id: Option<Option<ZoneId>>,
    id: Option<Option<u32>>,
) -> Result<Option<Option<EntityKey>>, CmsError> {
    match (zone_id, id) {
        (None, None) => Ok(None),
        (Some(None), Some(None)) => Ok(Some(None)),
        (Some(Some(zone_id)), Some(Some(id))) => Ok(Some(Some(EntityKey::new(zone_id, id)))),
        _ => Err(CmsError::Validation(format!(
            "{0}ZoneId and {0}Id must be updated together",
            field
        ))),
    }
}

/// Assign `value` into `slot` when the patch supplied it.
pub fn apply<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        description: Option<Option<String>>,
    }

    #[test]
    fn omitted_and_null_are_distinct() {
        let omitted: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(omitted.description, None);
        let cleared: Patch = serde_json::from_str(r#"{"description":null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));
        let set: Patch = serde_json::from_str(r#"{"description":"x"}"#).unwrap();
        assert_eq!(set.description, Some(Some("x".to_string())));
    }

    #[test]
    fn half_pairs_are_rejected() {
        assert!(key_pair("mob", Some(1), None).is_err());
        assert_eq!(key_pair("mob", None, None).unwrap(), None);
        assert_eq!(
            key_pair("mob", Some(5), Some(22)).unwrap(),
            Some(EntityKey::new(5, 22))
        );
        assert!(patch_key_pair("giverMob", Some(None), None).is_err());
        assert_eq!(patch_key_pair("giverMob", Some(None), Some(None)).unwrap(), Some(None));
    }

    #[test]
    fn missing_summary_name_is_omitted() {
        let json = serde_json::to_value(EntitySummary::new(EntityKey::new(1, 2), None)).unwrap();
        assert!(json.get("name").is_none());
        assert_eq!(json["zoneId"], 1);
    }
}
