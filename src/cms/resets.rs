//! Spawn rules: mob resets (with equipment) and object resets (with spawn
//! conditions).
//!
//! Updates are non-destructive for nested rows: a row carrying an `id` is
//! patched, a row without one is inserted, and rows the payload leaves out
//! stay where they are. Removing a nested row takes its own call.

use serde::{Deserialize, Serialize};

use crate::cms::dto::{apply, double_option, key_pair, EntitySummary};
use crate::cms::errors::CmsError;
use crate::cms::keys::{EntityKey, ZoneId};
use crate::cms::storage::CmsStore;
use crate::cms::types::*;
use crate::cms::world::{mob_summary, object_summary, room_summary};
use crate::validation::{validate_at_least_one, validate_condition_parameters, validate_probability};

const DEFAULT_PROBABILITY: f64 = 1.0;
const DEFAULT_MAX_INSTANCES: u32 = 1;

fn probability(value: Option<f64>) -> Result<f64, CmsError> {
    validate_probability("probability", value.unwrap_or(DEFAULT_PROBABILITY))
}

fn max_instances(value: Option<u32>) -> Result<u32, CmsError> {
    validate_at_least_one("maxInstances", value.unwrap_or(DEFAULT_MAX_INSTANCES))
}

// ============================================================================
// Mob resets
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentInput {
    pub object_zone_id: ZoneId,
    pub object_id: u32,
    #[serde(default)]
    pub wear_location: Option<WearLocation>,
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub max_instances: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobResetInput {
    pub mob_zone_id: ZoneId,
    pub mob_id: u32,
    pub room_zone_id: ZoneId,
    pub room_id: u32,
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub max_instances: Option<u32>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub equipment: Vec<EquipmentInput>,
}

/// Equipment element of an update. With `id` it patches that row; without,
/// it is a new row and the object pair is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentUpsert {
    pub id: Option<u64>,
    pub object_zone_id: Option<ZoneId>,
    pub object_id: Option<u32>,
    #[serde(default, deserialize_with = "double_option")]
    pub wear_location: Option<Option<WearLocation>>,
    pub probability: Option<f64>,
    pub max_instances: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobResetUpdate {
    pub mob_zone_id: Option<ZoneId>,
    pub mob_id: Option<u32>,
    pub room_zone_id: Option<ZoneId>,
    pub room_id: Option<u32>,
    pub probability: Option<f64>,
    pub max_instances: Option<u32>,
    #[serde(default, deserialize_with = "double_option")]
    pub comment: Option<Option<String>>,
    pub equipment: Option<Vec<EquipmentUpsert>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentDto {
    pub id: u64,
    pub object: EntitySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wear_location: Option<WearLocation>,
    pub probability: f64,
    pub max_instances: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MobResetDto {
    pub id: u64,
    pub mob: EntitySummary,
    pub room: EntitySummary,
    pub probability: f64,
    pub max_instances: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub equipment: Vec<EquipmentDto>,
}

fn equipment_row(input: EquipmentInput) -> Result<MobResetEquipmentRecord, CmsError> {
    Ok(MobResetEquipmentRecord {
        id: 0,
        reset_id: 0,
        object: EntityKey::new(input.object_zone_id, input.object_id),
        wear_location: input.wear_location,
        probability: probability(input.probability)?,
        max_instances: max_instances(input.max_instances)?,
        schema_version: RESET_SCHEMA_VERSION,
    })
}

fn mob_reset_dto(
    store: &CmsStore,
    reset: MobResetRecord,
    equipment: Vec<MobResetEquipmentRecord>,
) -> Result<MobResetDto, CmsError> {
    let mut items = Vec::with_capacity(equipment.len());
    for row in equipment {
        items.push(EquipmentDto {
            id: row.id,
            object: object_summary(store, row.object)?,
            wear_location: row.wear_location,
            probability: row.probability,
            max_instances: row.max_instances,
        });
    }
    Ok(MobResetDto {
        id: reset.id,
        mob: mob_summary(store, reset.mob)?,
        room: room_summary(store, reset.room)?,
        probability: reset.probability,
        max_instances: reset.max_instances,
        comment: reset.comment,
        equipment: items,
    })
}

fn load_mob_reset(store: &CmsStore, reset: MobResetRecord) -> Result<MobResetDto, CmsError> {
    let equipment = store.mob_reset_equipment(reset.id)?;
    mob_reset_dto(store, reset, equipment)
}

fn mob_resets_where<F>(store: &CmsStore, pred: F) -> Result<Vec<MobResetDto>, CmsError>
where
    F: Fn(&MobResetRecord) -> bool,
{
    store
        .list_mob_resets()?
        .into_iter()
        .filter(|r| pred(r))
        .map(|r| load_mob_reset(store, r))
        .collect()
}

pub fn list_mob_resets(store: &CmsStore) -> Result<Vec<MobResetDto>, CmsError> {
    mob_resets_where(store, |_| true)
}

pub fn find_mob_reset(store: &CmsStore, id: u64) -> Result<MobResetDto, CmsError> {
    let reset = store.get_mob_reset(id)?;
    load_mob_reset(store, reset)
}

pub fn find_mob_resets_by_mob(store: &CmsStore, mob: EntityKey) -> Result<Vec<MobResetDto>, CmsError> {
    mob_resets_where(store, |r| r.mob == mob)
}

pub fn find_mob_resets_by_room(store: &CmsStore, room: EntityKey) -> Result<Vec<MobResetDto>, CmsError> {
    mob_resets_where(store, |r| r.room == room)
}

/// Resets belong to the zone of the room they spawn into.
pub fn find_mob_resets_by_zone(store: &CmsStore, zone_id: ZoneId) -> Result<Vec<MobResetDto>, CmsError> {
    mob_resets_where(store, |r| r.room.zone_id == zone_id)
}

/// Zone that owns an existing mob reset; used to scope write checks.
pub fn mob_reset_zone(store: &CmsStore, id: u64) -> Result<ZoneId, CmsError> {
    Ok(store.get_mob_reset(id)?.room.zone_id)
}

pub fn create_mob_reset(store: &CmsStore, input: MobResetInput) -> Result<MobResetDto, CmsError> {
    let reset = MobResetRecord {
        id: 0,
        mob: EntityKey::new(input.mob_zone_id, input.mob_id),
        room: EntityKey::new(input.room_zone_id, input.room_id),
        probability: probability(input.probability)?,
        max_instances: max_instances(input.max_instances)?,
        comment: input.comment,
        schema_version: RESET_SCHEMA_VERSION,
    };
    let equipment = input
        .equipment
        .into_iter()
        .map(equipment_row)
        .collect::<Result<Vec<_>, _>>()?;
    let (reset, _) = store.create_mob_reset(reset, equipment)?;
    load_mob_reset(store, reset)
}

fn upsert_equipment(
    existing: &[MobResetEquipmentRecord],
    reset_id: u64,
    item: EquipmentUpsert,
) -> Result<MobResetEquipmentRecord, CmsError> {
    let object = key_pair("object", item.object_zone_id, item.object_id)?;
    match item.id {
        Some(id) => {
            let mut row = existing
                .iter()
                .find(|row| row.id == id)
                .cloned()
                .ok_or_else(|| {
                    CmsError::NotFound(format!("mob reset equipment {} on reset {}", id, reset_id))
                })?;
            apply(&mut row.object, object);
            apply(&mut row.wear_location, item.wear_location);
            if let Some(p) = item.probability {
                row.probability = validate_probability("probability", p)?;
            }
            if let Some(m) = item.max_instances {
                row.max_instances = validate_at_least_one("maxInstances", m)?;
            }
            Ok(row)
        }
        None => {
            let object = object.ok_or_else(|| {
                CmsError::Validation("new equipment rows need objectZoneId and objectId".to_string())
            })?;
            Ok(MobResetEquipmentRecord {
                id: 0,
                reset_id,
                object,
                wear_location: item.wear_location.flatten(),
                probability: probability(item.probability)?,
                max_instances: max_instances(item.max_instances)?,
                schema_version: RESET_SCHEMA_VERSION,
            })
        }
    }
}

pub fn update_mob_reset(store: &CmsStore, id: u64, patch: MobResetUpdate) -> Result<MobResetDto, CmsError> {
    let mut reset = store.get_mob_reset(id)?;
    apply(&mut reset.mob, key_pair("mob", patch.mob_zone_id, patch.mob_id)?);
    apply(&mut reset.room, key_pair("room", patch.room_zone_id, patch.room_id)?);
    if let Some(p) = patch.probability {
        reset.probability = validate_probability("probability", p)?;
    }
    if let Some(m) = patch.max_instances {
        reset.max_instances = validate_at_least_one("maxInstances", m)?;
    }
    apply(&mut reset.comment, patch.comment);

    let existing = store.mob_reset_equipment(id)?;
    let rows = patch
        .equipment
        .unwrap_or_default()
        .into_iter()
        .map(|item| upsert_equipment(&existing, id, item))
        .collect::<Result<Vec<_>, _>>()?;
    let (reset, _) = store.update_mob_reset(reset, rows)?;
    load_mob_reset(store, reset)
}

pub fn delete_mob_reset(store: &CmsStore, id: u64) -> Result<(), CmsError> {
    store.delete_mob_reset(id)
}

pub fn delete_mob_reset_equipment(store: &CmsStore, id: u64) -> Result<(), CmsError> {
    store.delete_mob_reset_equipment(id)
}

/// Zone of the reset that owns an equipment row.
pub fn equipment_zone(store: &CmsStore, equipment_id: u64) -> Result<ZoneId, CmsError> {
    for reset in store.list_mob_resets()? {
        if store
            .mob_reset_equipment(reset.id)?
            .iter()
            .any(|row| row.id == equipment_id)
        {
            return Ok(reset.room.zone_id);
        }
    }
    Err(CmsError::NotFound(format!("mob reset equipment: {}", equipment_id)))
}

// ============================================================================
// Object resets
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnConditionInput {
    pub condition_type: SpawnConditionType,
    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,
}

fn empty_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResetInput {
    pub object_zone_id: ZoneId,
    pub object_id: u32,
    pub room_zone_id: ZoneId,
    pub room_id: u32,
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub max_instances: Option<u32>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub conditions: Vec<SpawnConditionInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnConditionUpsert {
    pub id: Option<u64>,
    pub condition_type: Option<SpawnConditionType>,
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResetUpdate {
    pub object_zone_id: Option<ZoneId>,
    pub object_id: Option<u32>,
    pub room_zone_id: Option<ZoneId>,
    pub room_id: Option<u32>,
    pub probability: Option<f64>,
    pub max_instances: Option<u32>,
    #[serde(default, deserialize_with = "double_option")]
    pub comment: Option<Option<String>>,
    pub conditions: Option<Vec<SpawnConditionUpsert>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpawnConditionDto {
    pub id: u64,
    pub condition_type: SpawnConditionType,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResetDto {
    pub id: u64,
    pub object: EntitySummary,
    pub room: EntitySummary,
    pub probability: f64,
    pub max_instances: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub conditions: Vec<SpawnConditionDto>,
}

fn encode_parameters(value: &serde_json::Value) -> Result<String, CmsError> {
    validate_condition_parameters(value)?;
    Ok(serde_json::to_string(value)?)
}

fn condition_row(input: SpawnConditionInput) -> Result<SpawnConditionRecord, CmsError> {
    Ok(SpawnConditionRecord {
        id: 0,
        reset_id: 0,
        condition_type: input.condition_type,
        parameters: encode_parameters(&input.parameters)?,
        schema_version: RESET_SCHEMA_VERSION,
    })
}

fn object_reset_dto(
    store: &CmsStore,
    reset: ObjectResetRecord,
    conditions: Vec<SpawnConditionRecord>,
) -> Result<ObjectResetDto, CmsError> {
    let conditions = conditions
        .into_iter()
        .map(|c| {
            Ok(SpawnConditionDto {
                id: c.id,
                condition_type: c.condition_type,
                parameters: serde_json::from_str(&c.parameters)?,
            })
        })
        .collect::<Result<Vec<_>, CmsError>>()?;
    Ok(ObjectResetDto {
        id: reset.id,
        object: object_summary(store, reset.object)?,
        room: room_summary(store, reset.room)?,
        probability: reset.probability,
        max_instances: reset.max_instances,
        comment: reset.comment,
        conditions,
    })
}

fn load_object_reset(store: &CmsStore, reset: ObjectResetRecord) -> Result<ObjectResetDto, CmsError> {
    let conditions = store.spawn_conditions(reset.id)?;
    object_reset_dto(store, reset, conditions)
}

fn object_resets_where<F>(store: &CmsStore, pred: F) -> Result<Vec<ObjectResetDto>, CmsError>
where
    F: Fn(&ObjectResetRecord) -> bool,
{
    store
        .list_object_resets()?
        .into_iter()
        .filter(|r| pred(r))
        .map(|r| load_object_reset(store, r))
        .collect()
}

pub fn list_object_resets(store: &CmsStore) -> Result<Vec<ObjectResetDto>, CmsError> {
    object_resets_where(store, |_| true)
}

pub fn find_object_reset(store: &CmsStore, id: u64) -> Result<ObjectResetDto, CmsError> {
    let reset = store.get_object_reset(id)?;
    load_object_reset(store, reset)
}

pub fn find_object_resets_by_object(
    store: &CmsStore,
    object: EntityKey,
) -> Result<Vec<ObjectResetDto>, CmsError> {
    object_resets_where(store, |r| r.object == object)
}

pub fn find_object_resets_by_room(store: &CmsStore, room: EntityKey) -> Result<Vec<ObjectResetDto>, CmsError> {
    object_resets_where(store, |r| r.room == room)
}

pub fn find_object_resets_by_zone(store: &CmsStore, zone_id: ZoneId) -> Result<Vec<ObjectResetDto>, CmsError> {
    object_resets_where(store, |r| r.room.zone_id == zone_id)
}

pub fn object_reset_zone(store: &CmsStore, id: u64) -> Result<ZoneId, CmsError> {
    Ok(store.get_object_reset(id)?.room.zone_id)
}

pub fn create_object_reset(store: &CmsStore, input: ObjectResetInput) -> Result<ObjectResetDto, CmsError> {
    let reset = ObjectResetRecord {
        id: 0,
        object: EntityKey::new(input.object_zone_id, input.object_id),
        room: EntityKey::new(input.room_zone_id, input.room_id),
        probability: probability(input.probability)?,
        max_instances: max_instances(input.max_instances)?,
        comment: input.comment,
        schema_version: RESET_SCHEMA_VERSION,
    };
    let conditions = input
        .conditions
        .into_iter()
        .map(condition_row)
        .collect::<Result<Vec<_>, _>>()?;
    let (reset, _) = store.create_object_reset(reset, conditions)?;
    load_object_reset(store, reset)
}

fn upsert_condition(
    existing: &[SpawnConditionRecord],
    reset_id: u64,
    item: SpawnConditionUpsert,
) -> Result<SpawnConditionRecord, CmsError> {
    match item.id {
        Some(id) => {
            let mut row = existing
                .iter()
                .find(|row| row.id == id)
                .cloned()
                .ok_or_else(|| CmsError::NotFound(format!("spawn condition {} on reset {}", id, reset_id)))?;
            apply(&mut row.condition_type, item.condition_type);
            if let Some(parameters) = item.parameters {
                row.parameters = encode_parameters(&parameters)?;
            }
            Ok(row)
        }
        None => {
            let condition_type = item.condition_type.ok_or_else(|| {
                CmsError::Validation("new spawn conditions need a conditionType".to_string())
            })?;
            let mut row = condition_row(SpawnConditionInput {
                condition_type,
                parameters: item.parameters.unwrap_or_else(empty_parameters),
            })?;
            row.reset_id = reset_id;
            Ok(row)
        }
    }
}

pub fn update_object_reset(
    store: &CmsStore,
    id: u64,
    patch: ObjectResetUpdate,
) -> Result<ObjectResetDto, CmsError> {
    let mut reset = store.get_object_reset(id)?;
    apply(&mut reset.object, key_pair("object", patch.object_zone_id, patch.object_id)?);
    apply(&mut reset.room, key_pair("room", patch.room_zone_id, patch.room_id)?);
    if let Some(p) = patch.probability {
        reset.probability = validate_probability("probability", p)?;
    }
    if let Some(m) = patch.max_instances {
        reset.max_instances = validate_at_least_one("maxInstances", m)?;
    }
    apply(&mut reset.comment, patch.comment);

    let existing = store.spawn_conditions(id)?;
    let rows = patch
        .conditions
        .unwrap_or_default()
        .into_iter()
        .map(|item| upsert_condition(&existing, id, item))
        .collect::<Result<Vec<_>, _>>()?;
    let (reset, _) = store.update_object_reset(reset, rows)?;
    load_object_reset(store, reset)
}

pub fn delete_object_reset(store: &CmsStore, id: u64) -> Result<(), CmsError> {
    store.delete_object_reset(id)
}

pub fn delete_spawn_condition(store: &CmsStore, id: u64) -> Result<(), CmsError> {
    store.delete_spawn_condition(id)
}

pub fn condition_zone(store: &CmsStore, condition_id: u64) -> Result<ZoneId, CmsError> {
    for reset in store.list_object_resets()? {
        if store
            .spawn_conditions(reset.id)?
            .iter()
            .any(|row| row.id == condition_id)
        {
            return Ok(reset.room.zone_id);
        }
    }
    Err(CmsError::NotFound(format!("spawn condition: {}", condition_id)))
}
