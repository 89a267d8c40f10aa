//! Zones, rooms, mobs, objects and shops.
//!
//! Each entity follows the same shape: a create input carrying the full
//! caller-assigned key, a sparse patch where omitted fields stay untouched,
//! and a DTO that is what the API returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cms::dto::{apply, double_option, key_pair, patch_key_pair, EntitySummary};
use crate::cms::errors::CmsError;
use crate::cms::keys::{EntityKey, ZoneId};
use crate::cms::storage::CmsStore;
use crate::cms::types::*;
use crate::validation::require_text;

// ============================================================================
// Zones
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneInput {
    pub id: ZoneId,
    pub name: String,
    #[serde(default)]
    pub lifespan: Option<u32>,
    #[serde(default)]
    pub bottom: Option<u32>,
    #[serde(default)]
    pub top: Option<u32>,
    #[serde(default)]
    pub reset_mode: Option<ResetMode>,
    #[serde(default)]
    pub climate: Option<Climate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZonePatch {
    pub name: Option<String>,
    pub lifespan: Option<u32>,
    pub bottom: Option<u32>,
    pub top: Option<u32>,
    pub reset_mode: Option<ResetMode>,
    pub climate: Option<Climate>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneDto {
    pub id: ZoneId,
    pub name: String,
    pub lifespan: u32,
    pub bottom: u32,
    pub top: u32,
    pub reset_mode: ResetMode,
    pub climate: Climate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ZoneRecord> for ZoneDto {
    fn from(z: ZoneRecord) -> Self {
        Self {
            id: z.id,
            name: z.name,
            lifespan: z.lifespan,
            bottom: z.bottom,
            top: z.top,
            reset_mode: z.reset_mode,
            climate: z.climate,
            created_at: z.created_at,
            updated_at: z.updated_at,
        }
    }
}

fn check_zone_bounds(zone: &ZoneRecord) -> Result<(), CmsError> {
    if zone.bottom > zone.top {
        return Err(CmsError::Validation(format!(
            "zone bottom ({}) cannot exceed top ({})",
            zone.bottom, zone.top
        )));
    }
    Ok(())
}

pub fn list_zones(store: &CmsStore) -> Result<Vec<ZoneDto>, CmsError> {
    Ok(store.list_zones()?.into_iter().map(ZoneDto::from).collect())
}

pub fn find_zone(store: &CmsStore, id: ZoneId) -> Result<ZoneDto, CmsError> {
    store.get_zone(id).map(ZoneDto::from)
}

pub fn create_zone(store: &CmsStore, input: ZoneInput) -> Result<ZoneDto, CmsError> {
    let name = require_text("name", &input.name)?;
    let mut zone = ZoneRecord::new(input.id, &name);
    apply(&mut zone.lifespan, input.lifespan);
    apply(&mut zone.bottom, input.bottom);
    apply(&mut zone.top, input.top);
    apply(&mut zone.reset_mode, input.reset_mode);
    apply(&mut zone.climate, input.climate);
    check_zone_bounds(&zone)?;
    store.create_zone(zone).map(ZoneDto::from)
}

pub fn update_zone(store: &CmsStore, id: ZoneId, patch: ZonePatch) -> Result<ZoneDto, CmsError> {
    let mut zone = store.get_zone(id)?;
    if let Some(name) = patch.name {
        zone.name = require_text("name", &name)?;
    }
    apply(&mut zone.lifespan, patch.lifespan);
    apply(&mut zone.bottom, patch.bottom);
    apply(&mut zone.top, patch.top);
    apply(&mut zone.reset_mode, patch.reset_mode);
    apply(&mut zone.climate, patch.climate);
    check_zone_bounds(&zone)?;
    store.update_zone(zone).map(ZoneDto::from)
}

pub fn delete_zone(store: &CmsStore, id: ZoneId) -> Result<(), CmsError> {
    store.delete_zone(id)
}

// ============================================================================
// Rooms
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitInput {
    pub direction: Direction,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub key_object_zone_id: Option<ZoneId>,
    #[serde(default)]
    pub key_object_id: Option<u32>,
    #[serde(default)]
    pub destination_zone_id: Option<ZoneId>,
    #[serde(default)]
    pub destination_id: Option<u32>,
}

impl ExitInput {
    fn into_exit(self) -> Result<RoomExit, CmsError> {
        Ok(RoomExit {
            direction: self.direction,
            description: self.description,
            keywords: self.keywords,
            key_object: key_pair("keyObject", self.key_object_zone_id, self.key_object_id)?,
            destination: key_pair("destination", self.destination_zone_id, self.destination_id)?,
        })
    }
}

fn collect_exits(inputs: Vec<ExitInput>) -> Result<Vec<RoomExit>, CmsError> {
    let mut exits: Vec<RoomExit> = Vec::with_capacity(inputs.len());
    for input in inputs {
        let exit = input.into_exit()?;
        if exits.iter().any(|e| e.direction == exit.direction) {
            return Err(CmsError::Validation(format!(
                "duplicate exit direction {:?}",
                exit.direction
            )));
        }
        exits.push(exit);
    }
    Ok(exits)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInput {
    pub zone_id: ZoneId,
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sector: Option<Sector>,
    #[serde(default)]
    pub flags: Vec<RoomFlag>,
    #[serde(default)]
    pub exits: Vec<ExitInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sector: Option<Sector>,
    pub flags: Option<Vec<RoomFlag>>,
    /// Replaces the full exit list when present.
    pub exits: Option<Vec<ExitInput>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExitDto {
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_object: Option<EntitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<EntitySummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomDto {
    pub zone_id: ZoneId,
    pub id: u32,
    pub name: String,
    pub description: String,
    pub sector: Sector,
    pub flags: Vec<RoomFlag>,
    pub exits: Vec<ExitDto>,
    pub updated_at: DateTime<Utc>,
}

/// Summary of a room reference; missing targets keep their key without a name.
pub fn room_summary(store: &CmsStore, key: EntityKey) -> Result<EntitySummary, CmsError> {
    Ok(EntitySummary::new(key, store.find_room(&key)?.map(|r| r.name)))
}

pub fn mob_summary(store: &CmsStore, key: EntityKey) -> Result<EntitySummary, CmsError> {
    Ok(EntitySummary::new(key, store.find_mob(&key)?.map(|m| m.short_desc)))
}

pub fn object_summary(store: &CmsStore, key: EntityKey) -> Result<EntitySummary, CmsError> {
    Ok(EntitySummary::new(key, store.find_object(&key)?.map(|o| o.short_desc)))
}

fn room_dto(store: &CmsStore, room: RoomRecord) -> Result<RoomDto, CmsError> {
    let mut exits = Vec::with_capacity(room.exits.len());
    for exit in room.exits {
        exits.push(ExitDto {
            direction: exit.direction,
            description: exit.description,
            keywords: exit.keywords,
            key_object: exit.key_object.map(|k| object_summary(store, k)).transpose()?,
            destination: exit.destination.map(|k| room_summary(store, k)).transpose()?,
        });
    }
    Ok(RoomDto {
        zone_id: room.key.zone_id,
        id: room.key.id,
        name: room.name,
        description: room.description,
        sector: room.sector,
        flags: room.flags,
        exits,
        updated_at: room.updated_at,
    })
}

fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

pub fn list_rooms(store: &CmsStore) -> Result<Vec<RoomDto>, CmsError> {
    store.list_rooms()?.into_iter().map(|r| room_dto(store, r)).collect()
}

pub fn rooms_by_zone(store: &CmsStore, zone_id: ZoneId) -> Result<Vec<RoomDto>, CmsError> {
    store
        .list_rooms_in_zone(zone_id)?
        .into_iter()
        .map(|r| room_dto(store, r))
        .collect()
}

pub fn find_room(store: &CmsStore, key: EntityKey) -> Result<RoomDto, CmsError> {
    let room = store.get_room(&key)?;
    room_dto(store, room)
}

pub fn create_room(store: &CmsStore, input: RoomInput) -> Result<RoomDto, CmsError> {
    let room = RoomRecord {
        key: EntityKey::new(input.zone_id, input.id),
        name: require_text("name", &input.name)?,
        description: input.description,
        sector: input.sector.unwrap_or_default(),
        flags: dedup(input.flags),
        exits: collect_exits(input.exits)?,
        updated_at: Utc::now(),
        schema_version: ROOM_SCHEMA_VERSION,
    };
    let room = store.create_room(room)?;
    room_dto(store, room)
}

pub fn update_room(store: &CmsStore, key: EntityKey, patch: RoomPatch) -> Result<RoomDto, CmsError> {
    let mut room = store.get_room(&key)?;
    if let Some(name) = patch.name {
        room.name = require_text("name", &name)?;
    }
    apply(&mut room.description, patch.description);
    apply(&mut room.sector, patch.sector);
    apply(&mut room.flags, patch.flags.map(dedup));
    if let Some(exits) = patch.exits {
        room.exits = collect_exits(exits)?;
    }
    room.updated_at = Utc::now();
    let room = store.update_room(room)?;
    room_dto(store, room)
}

pub fn delete_room(store: &CmsStore, key: EntityKey) -> Result<(), CmsError> {
    store.delete_room(&key)
}

// ============================================================================
// Mobs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobInput {
    pub zone_id: ZoneId,
    pub id: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub short_description: String,
    #[serde(default)]
    pub long_description: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub alignment: Option<i32>,
    #[serde(default)]
    pub armor_class: Option<i32>,
    #[serde(default)]
    pub hit_roll: Option<i32>,
    #[serde(default)]
    pub damage_dice: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub race: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub mob_flags: Vec<MobFlag>,
    #[serde(default)]
    pub wealth: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobPatch {
    pub keywords: Option<Vec<String>>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub description: Option<String>,
    pub level: Option<u32>,
    pub alignment: Option<i32>,
    pub armor_class: Option<i32>,
    pub hit_roll: Option<i32>,
    pub damage_dice: Option<String>,
    pub gender: Option<Gender>,
    pub race: Option<String>,
    pub class: Option<String>,
    pub position: Option<Position>,
    pub mob_flags: Option<Vec<MobFlag>>,
    pub wealth: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MobDto {
    pub zone_id: ZoneId,
    pub id: u32,
    pub keywords: Vec<String>,
    pub short_description: String,
    pub long_description: String,
    pub description: String,
    pub level: u32,
    pub alignment: i32,
    pub armor_class: i32,
    pub hit_roll: i32,
    pub damage_dice: String,
    pub gender: Gender,
    pub race: String,
    pub class: String,
    pub position: Position,
    pub mob_flags: Vec<MobFlag>,
    pub wealth: u32,
    pub updated_at: DateTime<Utc>,
}

impl From<MobRecord> for MobDto {
    fn from(m: MobRecord) -> Self {
        Self {
            zone_id: m.key.zone_id,
            id: m.key.id,
            keywords: m.keywords,
            short_description: m.short_desc,
            long_description: m.long_desc,
            description: m.description,
            level: m.level,
            alignment: m.alignment,
            armor_class: m.armor_class,
            hit_roll: m.hit_roll,
            damage_dice: m.damage_dice,
            gender: m.gender,
            race: m.race,
            class: m.class,
            position: m.position,
            mob_flags: m.mob_flags,
            wealth: m.wealth,
            updated_at: m.updated_at,
        }
    }
}

/// Flags are a set; stored sorted so equality does not depend on input order.
fn normalize_flags(mut flags: Vec<MobFlag>) -> Vec<MobFlag> {
    flags.sort();
    flags.dedup();
    flags
}

fn normalize_keywords(keywords: Vec<String>) -> Vec<String> {
    keywords
        .into_iter()
        .map(|k| k.trim().to_ascii_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn check_alignment(alignment: i32) -> Result<(), CmsError> {
    if !(-1000..=1000).contains(&alignment) {
        return Err(CmsError::Validation(format!(
            "alignment must be between -1000 and 1000 (got {})",
            alignment
        )));
    }
    Ok(())
}

pub fn list_mobs(store: &CmsStore) -> Result<Vec<MobDto>, CmsError> {
    Ok(store.list_mobs()?.into_iter().map(MobDto::from).collect())
}

pub fn mobs_by_zone(store: &CmsStore, zone_id: ZoneId) -> Result<Vec<MobDto>, CmsError> {
    Ok(store.list_mobs_in_zone(zone_id)?.into_iter().map(MobDto::from).collect())
}

pub fn find_mob(store: &CmsStore, key: EntityKey) -> Result<MobDto, CmsError> {
    store.get_mob(&key).map(MobDto::from)
}

pub fn create_mob(store: &CmsStore, input: MobInput) -> Result<MobDto, CmsError> {
    let alignment = input.alignment.unwrap_or(0);
    check_alignment(alignment)?;
    let mob = MobRecord {
        key: EntityKey::new(input.zone_id, input.id),
        keywords: normalize_keywords(input.keywords),
        short_desc: require_text("shortDescription", &input.short_description)?,
        long_desc: input.long_description,
        description: input.description,
        level: input.level.unwrap_or(1),
        alignment,
        armor_class: input.armor_class.unwrap_or(10),
        hit_roll: input.hit_roll.unwrap_or(0),
        damage_dice: input.damage_dice.unwrap_or_else(|| "1d4".to_string()),
        gender: input.gender.unwrap_or_default(),
        race: input.race.unwrap_or_else(|| "HUMAN".to_string()),
        class: input.class.unwrap_or_else(|| "WARRIOR".to_string()),
        position: input.position.unwrap_or_default(),
        mob_flags: normalize_flags(input.mob_flags),
        wealth: input.wealth.unwrap_or(0),
        updated_at: Utc::now(),
        schema_version: MOB_SCHEMA_VERSION,
    };
    store.create_mob(mob).map(MobDto::from)
}

pub fn update_mob(store: &CmsStore, key: EntityKey, patch: MobPatch) -> Result<MobDto, CmsError> {
    let mut mob = store.get_mob(&key)?;
    apply(&mut mob.keywords, patch.keywords.map(normalize_keywords));
    if let Some(short) = patch.short_description {
        mob.short_desc = require_text("shortDescription", &short)?;
    }
    apply(&mut mob.long_desc, patch.long_description);
    apply(&mut mob.description, patch.description);
    apply(&mut mob.level, patch.level);
    if let Some(alignment) = patch.alignment {
        check_alignment(alignment)?;
        mob.alignment = alignment;
    }
    apply(&mut mob.armor_class, patch.armor_class);
    apply(&mut mob.hit_roll, patch.hit_roll);
    apply(&mut mob.damage_dice, patch.damage_dice);
    apply(&mut mob.gender, patch.gender);
    apply(&mut mob.race, patch.race);
    apply(&mut mob.class, patch.class);
    apply(&mut mob.position, patch.position);
    apply(&mut mob.mob_flags, patch.mob_flags.map(normalize_flags));
    apply(&mut mob.wealth, patch.wealth);
    mob.updated_at = Utc::now();
    store.update_mob(mob).map(MobDto::from)
}

pub fn delete_mob(store: &CmsStore, key: EntityKey) -> Result<(), CmsError> {
    store.delete_mob(&key)
}

// ============================================================================
// Objects
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInput {
    pub zone_id: ZoneId,
    pub id: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub short_description: String,
    #[serde(default)]
    pub ground_description: String,
    #[serde(default)]
    pub action_description: Option<String>,
    #[serde(default)]
    pub object_type: Option<ObjectType>,
    #[serde(default)]
    pub flags: Vec<ObjectFlag>,
    #[serde(default)]
    pub wear_flags: Vec<WearLocation>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub cost: Option<u32>,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub timer: Option<u32>,
    #[serde(default)]
    pub values: Vec<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPatch {
    pub keywords: Option<Vec<String>>,
    pub short_description: Option<String>,
    pub ground_description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub action_description: Option<Option<String>>,
    pub object_type: Option<ObjectType>,
    pub flags: Option<Vec<ObjectFlag>>,
    pub wear_flags: Option<Vec<WearLocation>>,
    pub weight: Option<f64>,
    pub cost: Option<u32>,
    pub level: Option<u32>,
    pub timer: Option<u32>,
    pub values: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDto {
    pub zone_id: ZoneId,
    pub id: u32,
    pub keywords: Vec<String>,
    pub short_description: String,
    pub ground_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_description: Option<String>,
    pub object_type: ObjectType,
    pub flags: Vec<ObjectFlag>,
    pub wear_flags: Vec<WearLocation>,
    pub weight: f64,
    pub cost: u32,
    pub level: u32,
    pub timer: u32,
    pub values: Vec<i32>,
    pub updated_at: DateTime<Utc>,
}

impl From<ObjectRecord> for ObjectDto {
    fn from(o: ObjectRecord) -> Self {
        Self {
            zone_id: o.key.zone_id,
            id: o.key.id,
            keywords: o.keywords,
            short_description: o.short_desc,
            ground_description: o.ground_desc,
            action_description: o.action_desc,
            object_type: o.object_type,
            flags: o.flags,
            wear_flags: o.wear_flags,
            weight: o.weight,
            cost: o.cost,
            level: o.level,
            timer: o.timer,
            values: o.values,
            updated_at: o.updated_at,
        }
    }
}

fn check_weight(weight: f64) -> Result<f64, CmsError> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(CmsError::Validation(format!("weight must be >= 0 (got {})", weight)));
    }
    Ok(weight)
}

pub fn list_objects(store: &CmsStore) -> Result<Vec<ObjectDto>, CmsError> {
    Ok(store.list_objects()?.into_iter().map(ObjectDto::from).collect())
}

pub fn objects_by_zone(store: &CmsStore, zone_id: ZoneId) -> Result<Vec<ObjectDto>, CmsError> {
    Ok(store
        .list_objects_in_zone(zone_id)?
        .into_iter()
        .map(ObjectDto::from)
        .collect())
}

pub fn find_object(store: &CmsStore, key: EntityKey) -> Result<ObjectDto, CmsError> {
    store.get_object(&key).map(ObjectDto::from)
}

pub fn create_object(store: &CmsStore, input: ObjectInput) -> Result<ObjectDto, CmsError> {
    let object = ObjectRecord {
        key: EntityKey::new(input.zone_id, input.id),
        keywords: normalize_keywords(input.keywords),
        short_desc: require_text("shortDescription", &input.short_description)?,
        ground_desc: input.ground_description,
        action_desc: input.action_description,
        object_type: input.object_type.unwrap_or_default(),
        flags: dedup(input.flags),
        wear_flags: dedup(input.wear_flags),
        weight: check_weight(input.weight.unwrap_or(0.0))?,
        cost: input.cost.unwrap_or(0),
        level: input.level.unwrap_or(0),
        timer: input.timer.unwrap_or(0),
        values: input.values,
        updated_at: Utc::now(),
        schema_version: OBJECT_SCHEMA_VERSION,
    };
    store.create_object(object).map(ObjectDto::from)
}

pub fn update_object(store: &CmsStore, key: EntityKey, patch: ObjectPatch) -> Result<ObjectDto, CmsError> {
    let mut object = store.get_object(&key)?;
    apply(&mut object.keywords, patch.keywords.map(normalize_keywords));
    if let Some(short) = patch.short_description {
        object.short_desc = require_text("shortDescription", &short)?;
    }
    apply(&mut object.ground_desc, patch.ground_description);
    apply(&mut object.action_desc, patch.action_description);
    apply(&mut object.object_type, patch.object_type);
    apply(&mut object.flags, patch.flags.map(dedup));
    apply(&mut object.wear_flags, patch.wear_flags.map(dedup));
    if let Some(weight) = patch.weight {
        object.weight = check_weight(weight)?;
    }
    apply(&mut object.cost, patch.cost);
    apply(&mut object.level, patch.level);
    apply(&mut object.timer, patch.timer);
    apply(&mut object.values, patch.values);
    object.updated_at = Utc::now();
    store.update_object(object).map(ObjectDto::from)
}

pub fn delete_object(store: &CmsStore, key: EntityKey) -> Result<(), CmsError> {
    store.delete_object(&key)
}

// ============================================================================
// Shops
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopStockInput {
    pub object_zone_id: ZoneId,
    pub object_id: u32,
    #[serde(default)]
    pub amount: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopRoomInput {
    pub room_zone_id: ZoneId,
    pub room_id: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopInput {
    pub zone_id: ZoneId,
    pub id: u32,
    #[serde(default)]
    pub keeper_zone_id: Option<ZoneId>,
    #[serde(default)]
    pub keeper_id: Option<u32>,
    #[serde(default)]
    pub buy_profit: Option<f64>,
    #[serde(default)]
    pub sell_profit: Option<f64>,
    #[serde(default)]
    pub temper: Option<i32>,
    #[serde(default)]
    pub items: Vec<ShopStockInput>,
    #[serde(default)]
    pub accepts: Vec<ObjectType>,
    #[serde(default)]
    pub rooms: Vec<ShopRoomInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopPatch {
    #[serde(default, deserialize_with = "double_option")]
    pub keeper_zone_id: Option<Option<ZoneId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub keeper_id: Option<Option<u32>>,
    pub buy_profit: Option<f64>,
    pub sell_profit: Option<f64>,
    pub temper: Option<i32>,
    pub items: Option<Vec<ShopStockInput>>,
    pub accepts: Option<Vec<ObjectType>>,
    pub rooms: Option<Vec<ShopRoomInput>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShopItemDto {
    pub object: EntitySummary,
    pub amount: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShopDto {
    pub zone_id: ZoneId,
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keeper: Option<EntitySummary>,
    pub buy_profit: f64,
    pub sell_profit: f64,
    pub temper: i32,
    pub items: Vec<ShopItemDto>,
    pub accepts: Vec<ObjectType>,
    pub rooms: Vec<EntitySummary>,
    pub updated_at: DateTime<Utc>,
}

fn check_profit(field: &str, value: f64) -> Result<f64, CmsError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CmsError::Validation(format!("{} must be positive (got {})", field, value)));
    }
    Ok(value)
}

fn stock_from(items: Vec<ShopStockInput>) -> Vec<ShopStock> {
    items
        .into_iter()
        .map(|i| ShopStock {
            object: EntityKey::new(i.object_zone_id, i.object_id),
            amount: i.amount,
        })
        .collect()
}

fn rooms_from(rooms: Vec<ShopRoomInput>) -> Vec<EntityKey> {
    dedup(
        rooms
            .into_iter()
            .map(|r| EntityKey::new(r.room_zone_id, r.room_id))
            .collect(),
    )
}

fn shop_dto(store: &CmsStore, shop: ShopRecord) -> Result<ShopDto, CmsError> {
    let mut items = Vec::with_capacity(shop.stock.len());
    for stock in shop.stock {
        items.push(ShopItemDto {
            object: object_summary(store, stock.object)?,
            amount: stock.amount,
        });
    }
    let rooms = shop
        .rooms
        .into_iter()
        .map(|k| room_summary(store, k))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ShopDto {
        zone_id: shop.key.zone_id,
        id: shop.key.id,
        keeper: shop.keeper.map(|k| mob_summary(store, k)).transpose()?,
        buy_profit: shop.buy_profit,
        sell_profit: shop.sell_profit,
        temper: shop.temper,
        items,
        accepts: shop.accepts,
        rooms,
        updated_at: shop.updated_at,
    })
}

pub fn list_shops(store: &CmsStore) -> Result<Vec<ShopDto>, CmsError> {
    store.list_shops()?.into_iter().map(|s| shop_dto(store, s)).collect()
}

pub fn shops_by_zone(store: &CmsStore, zone_id: ZoneId) -> Result<Vec<ShopDto>, CmsError> {
    store
        .list_shops_in_zone(zone_id)?
        .into_iter()
        .map(|s| shop_dto(store, s))
        .collect()
}

pub fn find_shop(store: &CmsStore, key: EntityKey) -> Result<ShopDto, CmsError> {
    let shop = store.get_shop(&key)?;
    shop_dto(store, shop)
}

pub fn create_shop(store: &CmsStore, input: ShopInput) -> Result<ShopDto, CmsError> {
    let shop = ShopRecord {
        key: EntityKey::new(input.zone_id, input.id),
        keeper: key_pair("keeper", input.keeper_zone_id, input.keeper_id)?,
        buy_profit: check_profit("buyProfit", input.buy_profit.unwrap_or(1.1))?,
        sell_profit: check_profit("sellProfit", input.sell_profit.unwrap_or(0.9))?,
        temper: input.temper.unwrap_or(0),
        stock: stock_from(input.items),
        accepts: dedup(input.accepts),
        rooms: rooms_from(input.rooms),
        updated_at: Utc::now(),
        schema_version: SHOP_SCHEMA_VERSION,
    };
    let shop = store.create_shop(shop)?;
    shop_dto(store, shop)
}

pub fn update_shop(store: &CmsStore, key: EntityKey, patch: ShopPatch) -> Result<ShopDto, CmsError> {
    let mut shop = store.get_shop(&key)?;
    apply(
        &mut shop.keeper,
        patch_key_pair("keeper", patch.keeper_zone_id, patch.keeper_id)?,
    );
    if let Some(v) = patch.buy_profit {
        shop.buy_profit = check_profit("buyProfit", v)?;
    }
    if let Some(v) = patch.sell_profit {
        shop.sell_profit = check_profit("sellProfit", v)?;
    }
    apply(&mut shop.temper, patch.temper);
    apply(&mut shop.stock, patch.items.map(stock_from));
    apply(&mut shop.accepts, patch.accepts.map(dedup));
    apply(&mut shop.rooms, patch.rooms.map(rooms_from));
    shop.updated_at = Utc::now();
    let shop = store.update_shop(shop)?;
    shop_dto(store, shop)
}

pub fn delete_shop(store: &CmsStore, key: EntityKey) -> Result<(), CmsError> {
    store.delete_shop(&key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with_zone() -> (CmsStore, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let store = crate::cms::storage::CmsStoreBuilder::new(dir.path())
            .open()
            .expect("store");
        create_zone(
            &store,
            ZoneInput {
                id: 30,
                name: "Mielikki".into(),
                lifespan: None,
                bottom: None,
                top: None,
                reset_mode: None,
                climate: None,
            },
        )
        .expect("zone");
        (store, dir)
    }

    #[test]
    fn room_exits_resolve_destination_names() {
        let (store, _dir) = store_with_zone();
        let square: RoomInput = serde_json::from_value(serde_json::json!({
            "zoneId": 30, "id": 1, "name": "Town Square"
        }))
        .unwrap();
        create_room(&store, square).unwrap();
        let gate: RoomInput = serde_json::from_value(serde_json::json!({
            "zoneId": 30, "id": 2, "name": "North Gate",
            "exits": [{"direction": "SOUTH", "destinationZoneId": 30, "destinationId": 1}]
        }))
        .unwrap();
        let dto = create_room(&store, gate).unwrap();
        let dest = dto.exits[0].destination.as_ref().unwrap();
        assert_eq!(dest.name.as_deref(), Some("Town Square"));

        let json = serde_json::to_value(&dto).unwrap();
        assert!(json["exits"][0].get("keyObject").is_none());
        assert!(json["exits"][0].get("description").is_none());
    }

    #[test]
    fn duplicate_exit_direction_rejected() {
        let (store, _dir) = store_with_zone();
        let input: RoomInput = serde_json::from_value(serde_json::json!({
            "zoneId": 30, "id": 3, "name": "Loop",
            "exits": [{"direction": "UP"}, {"direction": "UP"}]
        }))
        .unwrap();
        assert!(matches!(create_room(&store, input), Err(CmsError::Validation(_))));
    }

    #[test]
    fn room_in_missing_zone_is_constraint() {
        let (store, _dir) = store_with_zone();
        let input: RoomInput = serde_json::from_value(serde_json::json!({
            "zoneId": 31, "id": 1, "name": "Nowhere"
        }))
        .unwrap();
        assert!(matches!(create_room(&store, input), Err(CmsError::Constraint(_))));
    }

    #[test]
    fn object_patch_can_clear_action_description() {
        let (store, _dir) = store_with_zone();
        let input: ObjectInput = serde_json::from_value(serde_json::json!({
            "zoneId": 30, "id": 10, "shortDescription": "a lantern",
            "actionDescription": "It flickers."
        }))
        .unwrap();
        create_object(&store, input).unwrap();

        let untouched: ObjectPatch = serde_json::from_value(serde_json::json!({"cost": 5})).unwrap();
        let dto = update_object(&store, EntityKey::new(30, 10), untouched).unwrap();
        assert_eq!(dto.action_description.as_deref(), Some("It flickers."));
        assert_eq!(dto.cost, 5);

        let cleared: ObjectPatch =
            serde_json::from_value(serde_json::json!({"actionDescription": null})).unwrap();
        let dto = update_object(&store, EntityKey::new(30, 10), cleared).unwrap();
        assert_eq!(dto.action_description, None);
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("actionDescription").is_none());
    }

    #[test]
    fn shop_keeper_must_exist() {
        let (store, _dir) = store_with_zone();
        let input: ShopInput = serde_json::from_value(serde_json::json!({
            "zoneId": 30, "id": 1, "keeperZoneId": 30, "keeperId": 99
        }))
        .unwrap();
        assert!(matches!(create_shop(&store, input), Err(CmsError::Constraint(_))));
    }
}
