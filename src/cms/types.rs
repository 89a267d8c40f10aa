use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cms::keys::{EntityKey, ObjectiveKey, PhaseKey, PrerequisiteKey, RewardKey, ZoneId};

pub const ZONE_SCHEMA_VERSION: u8 = 1;
pub const ROOM_SCHEMA_VERSION: u8 = 1;
pub const MOB_SCHEMA_VERSION: u8 = 1;
pub const OBJECT_SCHEMA_VERSION: u8 = 1;
pub const SHOP_SCHEMA_VERSION: u8 = 1;
pub const RESET_SCHEMA_VERSION: u8 = 1;
pub const QUEST_SCHEMA_VERSION: u8 = 1;
pub const CATALOG_SCHEMA_VERSION: u8 = 1;
pub const USER_SCHEMA_VERSION: u8 = 1;

// ============================================================================
// Zones and rooms
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetMode {
    Never,
    #[default]
    Empty,
    Normal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Climate {
    #[default]
    None,
    Semiarid,
    Arid,
    Oceanic,
    Temperate,
    Subtropical,
    Tropical,
    Subarctic,
    Arctic,
    Alpine,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneRecord {
    pub id: ZoneId,
    pub name: String,
    /// Minutes between resets.
    pub lifespan: u32,
    pub bottom: u32,
    pub top: u32,
    pub reset_mode: ResetMode,
    pub climate: Climate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl ZoneRecord {
    pub fn new(id: ZoneId, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.to_string(),
            lifespan: 30,
            bottom: id * 100,
            top: id * 100 + 99,
            reset_mode: ResetMode::default(),
            climate: Climate::default(),
            created_at: now,
            updated_at: now,
            schema_version: ZONE_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    North,
    East,
    South,
    West,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sector {
    #[default]
    Structure,
    City,
    Field,
    Forest,
    Hills,
    Mountain,
    ShallowWater,
    DeepWater,
    Underwater,
    Air,
    Road,
    Grassland,
    Cave,
    Ruins,
    Swamp,
    Beach,
    Underdark,
    AstralPlane,
    AirPlane,
    FirePlane,
    EarthPlane,
    EtherealPlane,
    Avernus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomFlag {
    Dark,
    Death,
    Nomob,
    Indoors,
    Peaceful,
    Soundproof,
    Notrack,
    Nomagic,
    Tunnel,
    Private,
    Godroom,
    House,
    Atrium,
    Large,
    Underdark,
    Isolated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomExit {
    pub direction: Direction,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub key_object: Option<EntityKey>,
    pub destination: Option<EntityKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomRecord {
    pub key: EntityKey,
    pub name: String,
    pub description: String,
    pub sector: Sector,
    pub flags: Vec<RoomFlag>,
    pub exits: Vec<RoomExit>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

// ============================================================================
// Mobs and objects
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MobFlag {
    Spec,
    Sentinel,
    Scavenger,
    Isnpc,
    Aware,
    Aggressive,
    StayZone,
    Wimpy,
    AggroEvil,
    AggroGood,
    AggroNeutral,
    Memory,
    Helper,
    NoCharm,
    NoSummon,
    NoSleep,
    NoBash,
    NoBlind,
    Mount,
    Teacher,
    Peaceful,
    Protector,
    Illusion,
    Hunter,
    NoKill,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    #[default]
    Neutral,
    Male,
    Female,
    NonBinary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Position {
    Dead,
    MortallyWounded,
    Incapacitated,
    Stunned,
    Sleeping,
    Resting,
    Sitting,
    Fighting,
    #[default]
    Standing,
    Flying,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MobRecord {
    pub key: EntityKey,
    pub keywords: Vec<String>,
    pub short_desc: String,
    pub long_desc: String,
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
    pub schema_version: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Light,
    Scroll,
    Wand,
    Staff,
    Weapon,
    Treasure,
    Armor,
    Potion,
    #[default]
    Other,
    Trash,
    Container,
    Note,
    DrinkContainer,
    Key,
    Food,
    Money,
    Portal,
    Board,
    Spellbook,
    Instrument,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectFlag {
    Glow,
    Hum,
    NoRent,
    NoDonate,
    NoInvisible,
    Invisible,
    Magic,
    NoDrop,
    Permanent,
    AntiGood,
    AntiEvil,
    AntiNeutral,
    NoSell,
    TwoHanded,
    Float,
    NoFall,
}

/// Equipment slot. Also used as an object's list of allowed wear positions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WearLocation {
    Light,
    FingerRight,
    FingerLeft,
    Neck1,
    Neck2,
    Body,
    Head,
    Legs,
    Feet,
    Hands,
    Arms,
    Shield,
    About,
    Waist,
    WristRight,
    WristLeft,
    Wield,
    Wield2,
    Hold,
    Hold2,
    TwoHandWield,
    Eyes,
    Face,
    Ear1,
    Ear2,
    Badge,
    Belt1,
    Belt2,
    Belt3,
    Hover,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectRecord {
    pub key: EntityKey,
    pub keywords: Vec<String>,
    pub short_desc: String,
    pub ground_desc: String,
    pub action_desc: Option<String>,
    pub object_type: ObjectType,
    pub flags: Vec<ObjectFlag>,
    pub wear_flags: Vec<WearLocation>,
    pub weight: f64,
    pub cost: u32,
    pub level: u32,
    pub timer: u32,
    pub values: Vec<i32>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

// ============================================================================
// Shops
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShopStock {
    pub object: EntityKey,
    /// Number kept in stock; 0 means unlimited.
    pub amount: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopRecord {
    pub key: EntityKey,
    pub keeper: Option<EntityKey>,
    pub buy_profit: f64,
    pub sell_profit: f64,
    pub temper: i32,
    pub stock: Vec<ShopStock>,
    pub accepts: Vec<ObjectType>,
    pub rooms: Vec<EntityKey>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

// ============================================================================
// Resets
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MobResetRecord {
    pub id: u64,
    pub mob: EntityKey,
    pub room: EntityKey,
    pub probability: f64,
    pub max_instances: u32,
    pub comment: Option<String>,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MobResetEquipmentRecord {
    pub id: u64,
    pub reset_id: u64,
    pub object: EntityKey,
    pub wear_location: Option<WearLocation>,
    pub probability: f64,
    pub max_instances: u32,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectResetRecord {
    pub id: u64,
    pub object: EntityKey,
    pub room: EntityKey,
    pub probability: f64,
    pub max_instances: u32,
    pub comment: Option<String>,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpawnConditionType {
    TimeOfDay,
    Weather,
    Season,
    PlayerCount,
    QuestState,
    CustomLua,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpawnConditionRecord {
    pub id: u64,
    pub reset_id: u64,
    pub condition_type: SpawnConditionType,
    /// Opaque JSON document; kept as text because bincode is not self-describing.
    pub parameters: String,
    pub schema_version: u8,
}

// ============================================================================
// Quests
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestTriggerType {
    #[default]
    Mob,
    Object,
    Room,
    Level,
    Automatic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestRecord {
    pub key: EntityKey,
    pub name: String,
    pub description: Option<String>,
    pub min_level: u32,
    pub max_level: u32,
    pub trigger_type: QuestTriggerType,
    pub repeatable: bool,
    pub hidden: bool,
    pub giver: Option<EntityKey>,
    pub completer: Option<EntityKey>,
    pub time_limit_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestPhaseRecord {
    pub key: PhaseKey,
    pub name: String,
    pub description: Option<String>,
    /// Caller-assigned; gaps and duplicates are allowed.
    pub order: i32,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectiveType {
    KillMob,
    CollectItem,
    DeliverItem,
    VisitRoom,
    TalkToNpc,
    UseSkill,
    CustomLua,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestObjectiveRecord {
    pub key: ObjectiveKey,
    pub objective_type: ObjectiveType,
    pub player_description: String,
    pub internal_note: Option<String>,
    pub required_count: u32,
    pub show_progress: bool,
    pub target_mob: Option<EntityKey>,
    pub target_object: Option<EntityKey>,
    pub target_room: Option<EntityKey>,
    pub deliver_to_mob: Option<EntityKey>,
    pub target_skill: Option<String>,
    pub lua_expression: Option<String>,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardType {
    Experience,
    Gold,
    Item,
    Ability,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestRewardRecord {
    pub key: RewardKey,
    pub reward_type: RewardType,
    pub amount: Option<u32>,
    pub object: Option<EntityKey>,
    pub ability_id: Option<u32>,
    /// Rewards sharing a group are alternatives; advisory only.
    pub choice_group: Option<u32>,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestPrerequisiteRecord {
    pub key: PrerequisiteKey,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

// ============================================================================
// Abilities, socials, triggers
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbilityType {
    #[default]
    Spell,
    Skill,
    Chant,
    Song,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AbilityRecord {
    pub id: u32,
    pub name: String,
    pub ability_type: AbilityType,
    pub min_position: Position,
    pub violent: bool,
    pub description: Option<String>,
    pub lua_script: Option<String>,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialRecord {
    pub name: String,
    pub hide: bool,
    pub min_victim_position: Position,
    pub char_no_arg: Option<String>,
    pub others_no_arg: Option<String>,
    pub char_found: Option<String>,
    pub others_found: Option<String>,
    pub vict_found: Option<String>,
    pub not_found: Option<String>,
    pub char_auto: Option<String>,
    pub others_auto: Option<String>,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerAttachType {
    Mob,
    Object,
    World,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerRecord {
    pub id: u64,
    pub zone_id: ZoneId,
    pub name: String,
    pub attach_type: TriggerAttachType,
    /// Mob, object or room this script is attached to, if any.
    pub target: Option<EntityKey>,
    pub flags: Vec<String>,
    pub num_args: u32,
    pub arg_list: Vec<String>,
    /// Lua source. Stored verbatim; never executed here.
    pub script: String,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

// ============================================================================
// Users and zone grants
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Player,
    Immortal,
    Builder,
    HeadBuilder,
    Coder,
    God,
}

impl Role {
    /// Roles that bypass per-zone grants entirely.
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::God | Role::Coder | Role::HeadBuilder)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZonePermission {
    Read,
    Write,
    Admin,
}

impl ZonePermission {
    pub fn allows_write(self) -> bool {
        matches!(self, ZonePermission::Write | ZonePermission::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl UserRecord {
    pub fn new(username: &str, role: Role) -> Self {
        Self {
            username: username.to_ascii_lowercase(),
            role,
            created_at: Utc::now(),
            schema_version: USER_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneGrantRecord {
    pub username: String,
    pub zone_id: ZoneId,
    pub permission: ZonePermission,
    pub granted_by: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub schema_version: u8,
}

impl ZoneGrantRecord {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}
