//! Global catalogs (abilities, socials) and zone-scoped Lua triggers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cms::dto::{apply, double_option, key_pair, patch_key_pair, EntitySummary};
use crate::cms::errors::CmsError;
use crate::cms::keys::{EntityKey, ZoneId};
use crate::cms::storage::CmsStore;
use crate::cms::types::*;
use crate::cms::world::{mob_summary, object_summary, room_summary};
use crate::validation::{require_text, validate_social_name};

// ============================================================================
// Abilities
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityInput {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub ability_type: Option<AbilityType>,
    #[serde(default)]
    pub min_position: Option<Position>,
    #[serde(default)]
    pub violent: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub lua_script: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityPatch {
    pub name: Option<String>,
    pub ability_type: Option<AbilityType>,
    pub min_position: Option<Position>,
    pub violent: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub lua_script: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AbilityDto {
    pub id: u32,
    pub name: String,
    pub ability_type: AbilityType,
    pub min_position: Position,
    pub violent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lua_script: Option<String>,
}

impl From<AbilityRecord> for AbilityDto {
    fn from(a: AbilityRecord) -> Self {
        Self {
            id: a.id,
            name: a.name,
            ability_type: a.ability_type,
            min_position: a.min_position,
            violent: a.violent,
            description: a.description,
            lua_script: a.lua_script,
        }
    }
}

pub fn list_abilities(store: &CmsStore) -> Result<Vec<AbilityDto>, CmsError> {
    Ok(store.list_abilities()?.into_iter().map(AbilityDto::from).collect())
}

pub fn find_ability(store: &CmsStore, id: u32) -> Result<AbilityDto, CmsError> {
    store.get_ability(id).map(AbilityDto::from)
}

pub fn create_ability(store: &CmsStore, input: AbilityInput) -> Result<AbilityDto, CmsError> {
    let ability = AbilityRecord {
        id: input.id,
        name: require_text("name", &input.name)?.to_ascii_lowercase(),
        ability_type: input.ability_type.unwrap_or_default(),
        min_position: input.min_position.unwrap_or_default(),
        violent: input.violent,
        description: input.description,
        lua_script: input.lua_script,
        schema_version: CATALOG_SCHEMA_VERSION,
    };
    store.create_ability(ability).map(AbilityDto::from)
}

pub fn update_ability(store: &CmsStore, id: u32, patch: AbilityPatch) -> Result<AbilityDto, CmsError> {
    let mut ability = store.get_ability(id)?;
    if let Some(name) = patch.name {
        ability.name = require_text("name", &name)?.to_ascii_lowercase();
    }
    apply(&mut ability.ability_type, patch.ability_type);
    apply(&mut ability.min_position, patch.min_position);
    apply(&mut ability.violent, patch.violent);
    apply(&mut ability.description, patch.description);
    apply(&mut ability.lua_script, patch.lua_script);
    store.update_ability(ability).map(AbilityDto::from)
}

pub fn delete_ability(store: &CmsStore, id: u32) -> Result<(), CmsError> {
    store.delete_ability(id)
}

// ============================================================================
// Socials
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialInput {
    pub name: String,
    #[serde(default)]
    pub hide: bool,
    #[serde(default)]
    pub min_victim_position: Option<Position>,
    #[serde(default)]
    pub char_no_arg: Option<String>,
    #[serde(default)]
    pub others_no_arg: Option<String>,
    #[serde(default)]
    pub char_found: Option<String>,
    #[serde(default)]
    pub others_found: Option<String>,
    #[serde(default)]
    pub vict_found: Option<String>,
    #[serde(default)]
    pub not_found: Option<String>,
    #[serde(default)]
    pub char_auto: Option<String>,
    #[serde(default)]
    pub others_auto: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPatch {
    pub hide: Option<bool>,
    pub min_victim_position: Option<Position>,
    #[serde(default, deserialize_with = "double_option")]
    pub char_no_arg: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub others_no_arg: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub char_found: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub others_found: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub vict_found: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub not_found: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub char_auto: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub others_auto: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocialDto {
    pub name: String,
    pub hide: bool,
    pub min_victim_position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_no_arg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub others_no_arg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_found: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub others_found: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vict_found: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_found: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_auto: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub others_auto: Option<String>,
}

impl From<SocialRecord> for SocialDto {
    fn from(s: SocialRecord) -> Self {
        Self {
            name: s.name,
            hide: s.hide,
            min_victim_position: s.min_victim_position,
            char_no_arg: s.char_no_arg,
            others_no_arg: s.others_no_arg,
            char_found: s.char_found,
            others_found: s.others_found,
            vict_found: s.vict_found,
            not_found: s.not_found,
            char_auto: s.char_auto,
            others_auto: s.others_auto,
        }
    }
}

pub fn list_socials(store: &CmsStore) -> Result<Vec<SocialDto>, CmsError> {
    Ok(store.list_socials()?.into_iter().map(SocialDto::from).collect())
}

pub fn find_social(store: &CmsStore, name: &str) -> Result<SocialDto, CmsError> {
    store.get_social(&name.to_ascii_lowercase()).map(SocialDto::from)
}

pub fn create_social(store: &CmsStore, input: SocialInput) -> Result<SocialDto, CmsError> {
    let social = SocialRecord {
        name: validate_social_name(&input.name)?,
        hide: input.hide,
        min_victim_position: input.min_victim_position.unwrap_or_default(),
        char_no_arg: input.char_no_arg,
        others_no_arg: input.others_no_arg,
        char_found: input.char_found,
        others_found: input.others_found,
        vict_found: input.vict_found,
        not_found: input.not_found,
        char_auto: input.char_auto,
        others_auto: input.others_auto,
        schema_version: CATALOG_SCHEMA_VERSION,
    };
    store.create_social(social).map(SocialDto::from)
}

pub fn update_social(store: &CmsStore, name: &str, patch: SocialPatch) -> Result<SocialDto, CmsError> {
    let mut social = store.get_social(&name.to_ascii_lowercase())?;
    apply(&mut social.hide, patch.hide);
    apply(&mut social.min_victim_position, patch.min_victim_position);
    apply(&mut social.char_no_arg, patch.char_no_arg);
    apply(&mut social.others_no_arg, patch.others_no_arg);
    apply(&mut social.char_found, patch.char_found);
    apply(&mut social.others_found, patch.others_found);
    apply(&mut social.vict_found, patch.vict_found);
    apply(&mut social.not_found, patch.not_found);
    apply(&mut social.char_auto, patch.char_auto);
    apply(&mut social.others_auto, patch.others_auto);
    store.update_social(social).map(SocialDto::from)
}

pub fn delete_social(store: &CmsStore, name: &str) -> Result<(), CmsError> {
    store.delete_social(&name.to_ascii_lowercase())
}

// ============================================================================
// Triggers
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInput {
    pub zone_id: ZoneId,
    pub name: String,
    pub attach_type: TriggerAttachType,
    #[serde(default)]
    pub target_zone_id: Option<ZoneId>,
    #[serde(default)]
    pub target_id: Option<u32>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub num_args: u32,
    #[serde(default)]
    pub arg_list: Vec<String>,
    #[serde(default)]
    pub script: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPatch {
    pub name: Option<String>,
    pub attach_type: Option<TriggerAttachType>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_zone_id: Option<Option<ZoneId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_id: Option<Option<u32>>,
    pub flags: Option<Vec<String>>,
    pub num_args: Option<u32>,
    pub arg_list: Option<Vec<String>>,
    pub script: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDto {
    pub id: u64,
    pub zone_id: ZoneId,
    pub name: String,
    pub attach_type: TriggerAttachType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<EntitySummary>,
    pub flags: Vec<String>,
    pub num_args: u32,
    pub arg_list: Vec<String>,
    pub script: String,
    pub updated_at: DateTime<Utc>,
}

fn trigger_dto(store: &CmsStore, t: TriggerRecord) -> Result<TriggerDto, CmsError> {
    let target = match t.target {
        Some(key) => Some(match t.attach_type {
            TriggerAttachType::Mob => mob_summary(store, key)?,
            TriggerAttachType::Object => object_summary(store, key)?,
            TriggerAttachType::World => room_summary(store, key)?,
        }),
        None => None,
    };
    Ok(TriggerDto {
        id: t.id,
        zone_id: t.zone_id,
        name: t.name,
        attach_type: t.attach_type,
        target,
        flags: t.flags,
        num_args: t.num_args,
        arg_list: t.arg_list,
        script: t.script,
        updated_at: t.updated_at,
    })
}

fn triggers_where<F>(store: &CmsStore, pred: F) -> Result<Vec<TriggerDto>, CmsError>
where
    F: Fn(&TriggerRecord) -> bool,
{
    store
        .list_triggers()?
        .into_iter()
        .filter(|t| pred(t))
        .map(|t| trigger_dto(store, t))
        .collect()
}

pub fn list_triggers(store: &CmsStore) -> Result<Vec<TriggerDto>, CmsError> {
    triggers_where(store, |_| true)
}

pub fn triggers_by_zone(store: &CmsStore, zone_id: ZoneId) -> Result<Vec<TriggerDto>, CmsError> {
    triggers_where(store, |t| t.zone_id == zone_id)
}

pub fn triggers_by_target(store: &CmsStore, target: EntityKey) -> Result<Vec<TriggerDto>, CmsError> {
    triggers_where(store, |t| t.target == Some(target))
}

pub fn find_trigger(store: &CmsStore, id: u64) -> Result<TriggerDto, CmsError> {
    let trigger = store.get_trigger(id)?;
    trigger_dto(store, trigger)
}

pub fn trigger_zone(store: &CmsStore, id: u64) -> Result<ZoneId, CmsError> {
    Ok(store.get_trigger(id)?.zone_id)
}

pub fn create_trigger(store: &CmsStore, input: TriggerInput) -> Result<TriggerDto, CmsError> {
    let trigger = TriggerRecord {
        id: 0,
        zone_id: input.zone_id,
        name: require_text("name", &input.name)?,
        attach_type: input.attach_type,
        target: key_pair("target", input.target_zone_id, input.target_id)?,
        flags: input.flags,
        num_args: input.num_args,
        arg_list: input.arg_list,
        script: input.script,
        updated_at: Utc::now(),
        schema_version: CATALOG_SCHEMA_VERSION,
    };
    let trigger = store.create_trigger(trigger)?;
    trigger_dto(store, trigger)
}

pub fn update_trigger(store: &CmsStore, id: u64, patch: TriggerPatch) -> Result<TriggerDto, CmsError> {
    let mut trigger = store.get_trigger(id)?;
    if let Some(name) = patch.name {
        trigger.name = require_text("name", &name)?;
    }
    apply(&mut trigger.attach_type, patch.attach_type);
    apply(
        &mut trigger.target,
        patch_key_pair("target", patch.target_zone_id, patch.target_id)?,
    );
    apply(&mut trigger.flags, patch.flags);
    apply(&mut trigger.num_args, patch.num_args);
    apply(&mut trigger.arg_list, patch.arg_list);
    apply(&mut trigger.script, patch.script);
    trigger.updated_at = Utc::now();
    let trigger = store.update_trigger(trigger)?;
    trigger_dto(store, trigger)
}

pub fn delete_trigger(store: &CmsStore, id: u64) -> Result<(), CmsError> {
    store.delete_trigger(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::storage::CmsStoreBuilder;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (CmsStore, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let store = CmsStoreBuilder::new(dir.path()).open().expect("store");
        (store, dir)
    }

    #[test]
    fn social_names_are_case_insensitive() {
        let (store, _dir) = store();
        let input: SocialInput =
            serde_json::from_value(json!({"name": "Bow", "charNoArg": "You bow deeply."})).unwrap();
        create_social(&store, input).unwrap();
        let dto = find_social(&store, "BOW").unwrap();
        assert_eq!(dto.name, "bow");
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("othersNoArg").is_none());
    }

    #[test]
    fn ability_used_as_reward_cannot_be_deleted() {
        let (store, _dir) = store();
        create_ability(
            &store,
            serde_json::from_value(json!({"id": 42, "name": "Fireball", "violent": true})).unwrap(),
        )
        .unwrap();
        store.create_zone(ZoneRecord::new(1, "Academy")).unwrap();
        crate::cms::quest::create_quest(
            &store,
            serde_json::from_value(json!({"zoneId": 1, "id": 1, "name": "Study"})).unwrap(),
        )
        .unwrap();
        crate::cms::quest::create_reward(
            &store,
            serde_json::from_value(json!({
                "questZoneId": 1, "questId": 1, "id": 1, "rewardType": "ABILITY", "abilityId": 42
            }))
            .unwrap(),
        )
        .unwrap();
        assert!(matches!(delete_ability(&store, 42), Err(CmsError::Constraint(_))));
    }

    #[test]
    fn triggers_found_by_zone_and_target() {
        let (store, _dir) = store();
        store.create_zone(ZoneRecord::new(8, "Keep")).unwrap();
        crate::cms::world::create_mob(
            &store,
            serde_json::from_value(json!({"zoneId": 8, "id": 4, "shortDescription": "the guard"})).unwrap(),
        )
        .unwrap();
        let input: TriggerInput = serde_json::from_value(json!({
            "zoneId": 8, "name": "greet", "attachType": "MOB",
            "targetZoneId": 8, "targetId": 4, "script": "say('Halt!')"
        }))
        .unwrap();
        let dto = create_trigger(&store, input).unwrap();
        assert!(dto.id > 0);
        assert_eq!(dto.target.as_ref().and_then(|t| t.name.as_deref()), Some("the guard"));
        assert_eq!(triggers_by_zone(&store, 8).unwrap().len(), 1);
        assert_eq!(triggers_by_target(&store, EntityKey::new(8, 4)).unwrap().len(), 1);
        assert!(triggers_by_zone(&store, 9).unwrap().is_empty());
    }
}
