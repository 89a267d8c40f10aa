use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionResult, Transactional};
use sled::IVec;

use crate::cms::errors::CmsError;
use crate::cms::keys::{EntityKey, ObjectiveKey, PhaseKey, PrerequisiteKey, RewardKey, ZoneId};
use crate::cms::types::*;
use crate::validation::validate_username;

const TREE_ZONES: &str = "zones";
const TREE_ROOMS: &str = "rooms";
const TREE_MOBS: &str = "mobs";
const TREE_OBJECTS: &str = "objects";
const TREE_SHOPS: &str = "shops";
const TREE_MOB_RESETS: &str = "mob_resets";
const TREE_MOB_RESET_EQUIPMENT: &str = "mob_reset_equipment";
const TREE_OBJECT_RESETS: &str = "object_resets";
const TREE_SPAWN_CONDITIONS: &str = "spawn_conditions";
const TREE_QUESTS: &str = "quests";
const TREE_QUEST_PHASES: &str = "quest_phases";
const TREE_QUEST_OBJECTIVES: &str = "quest_objectives";
const TREE_QUEST_REWARDS: &str = "quest_rewards";
const TREE_QUEST_PREREQUISITES: &str = "quest_prerequisites";
const TREE_ABILITIES: &str = "abilities";
const TREE_SOCIALS: &str = "socials";
const TREE_TRIGGERS: &str = "triggers";
const TREE_USERS: &str = "users";
const TREE_GRANTS: &str = "zone_grants";

/// Rows persisted through [`CmsStore`] carry a schema version that is stamped on
/// write and checked on read.
pub trait StoredRecord: Serialize + DeserializeOwned {
    const ENTITY: &'static str;
    const SCHEMA_VERSION: u8;
    fn schema_version(&self) -> u8;
    fn stamp_schema_version(&mut self);
}

macro_rules! stored_record {
    ($ty:ty, $entity:literal, $version:ident) => {
        impl StoredRecord for $ty {
            const ENTITY: &'static str = $entity;
            const SCHEMA_VERSION: u8 = $version;
            fn schema_version(&self) -> u8 {
                self.schema_version
            }
            fn stamp_schema_version(&mut self) {
                self.schema_version = $version;
            }
        }
    };
}

stored_record!(ZoneRecord, "zone", ZONE_SCHEMA_VERSION);
stored_record!(RoomRecord, "room", ROOM_SCHEMA_VERSION);
stored_record!(MobRecord, "mob", MOB_SCHEMA_VERSION);
stored_record!(ObjectRecord, "object", OBJECT_SCHEMA_VERSION);
stored_record!(ShopRecord, "shop", SHOP_SCHEMA_VERSION);
stored_record!(MobResetRecord, "mob reset", RESET_SCHEMA_VERSION);
stored_record!(MobResetEquipmentRecord, "mob reset equipment", RESET_SCHEMA_VERSION);
stored_record!(ObjectResetRecord, "object reset", RESET_SCHEMA_VERSION);
stored_record!(SpawnConditionRecord, "spawn condition", RESET_SCHEMA_VERSION);
stored_record!(QuestRecord, "quest", QUEST_SCHEMA_VERSION);
stored_record!(QuestPhaseRecord, "quest phase", QUEST_SCHEMA_VERSION);
stored_record!(QuestObjectiveRecord, "quest objective", QUEST_SCHEMA_VERSION);
stored_record!(QuestRewardRecord, "quest reward", QUEST_SCHEMA_VERSION);
stored_record!(QuestPrerequisiteRecord, "quest prerequisite", QUEST_SCHEMA_VERSION);
stored_record!(AbilityRecord, "ability", CATALOG_SCHEMA_VERSION);
stored_record!(SocialRecord, "social", CATALOG_SCHEMA_VERSION);
stored_record!(TriggerRecord, "trigger", CATALOG_SCHEMA_VERSION);
stored_record!(UserRecord, "user", USER_SCHEMA_VERSION);
stored_record!(ZoneGrantRecord, "zone grant", USER_SCHEMA_VERSION);

fn serial_key(id: u64) -> Vec<u8> {
    format!("{:020}", id).into_bytes()
}

fn child_key(parent: u64, id: u64) -> Vec<u8> {
    format!("{:020}:{:020}", parent, id).into_bytes()
}

fn child_prefix(parent: u64) -> Vec<u8> {
    format!("{:020}:", parent).into_bytes()
}

fn numeric_key(id: ZoneId) -> Vec<u8> {
    format!("{:010}", id).into_bytes()
}

fn user_key(username: &str) -> Vec<u8> {
    username.to_ascii_lowercase().into_bytes()
}

fn grant_key(username: &str, zone_id: ZoneId) -> Vec<u8> {
    format!("{}:{:010}", username.to_ascii_lowercase(), zone_id).into_bytes()
}

fn social_key(name: &str) -> Vec<u8> {
    name.to_ascii_lowercase().into_bytes()
}

/// Row counts per entity family, reported by `fierycms status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub zones: usize,
    pub rooms: usize,
    pub mobs: usize,
    pub objects: usize,
    pub shops: usize,
    pub mob_resets: usize,
    pub object_resets: usize,
    pub quests: usize,
    pub abilities: usize,
    pub socials: usize,
    pub triggers: usize,
    pub users: usize,
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct CmsStoreBuilder {
    path: PathBuf,
    bootstrap_admin: Option<String>,
}

impl CmsStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            bootstrap_admin: None,
        }
    }

    /// Create `username` as a GOD account when the user table is empty.
    pub fn with_bootstrap_admin(mut self, username: impl Into<String>) -> Self {
        self.bootstrap_admin = Some(username.into());
        self
    }

    pub fn open(self) -> Result<CmsStore, CmsError> {
        let store = CmsStore::open(self.path)?;
        if let Some(admin) = self.bootstrap_admin {
            store.seed_admin_if_needed(&admin)?;
        }
        Ok(store)
    }
}

/// Sled-backed persistence for world content.
///
/// The store plays the role of the relational schema: composite primary keys,
/// foreign-key existence checks, restrict rules and delete cascades all live
/// here so the services above it only translate between inputs and rows.
pub struct CmsStore {
    db: sled::Db,
    zones: sled::Tree,
    rooms: sled::Tree,
    mobs: sled::Tree,
    objects: sled::Tree,
    shops: sled::Tree,
    mob_resets: sled::Tree,
    mob_reset_equipment: sled::Tree,
    object_resets: sled::Tree,
    spawn_conditions: sled::Tree,
    quests: sled::Tree,
    quest_phases: sled::Tree,
    quest_objectives: sled::Tree,
    quest_rewards: sled::Tree,
    quest_prerequisites: sled::Tree,
    abilities: sled::Tree,
    socials: sled::Tree,
    triggers: sled::Tree,
    users: sled::Tree,
    grants: sled::Tree,
}

impl CmsStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CmsError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        Ok(Self {
            zones: db.open_tree(TREE_ZONES)?,
            rooms: db.open_tree(TREE_ROOMS)?,
            mobs: db.open_tree(TREE_MOBS)?,
            objects: db.open_tree(TREE_OBJECTS)?,
            shops: db.open_tree(TREE_SHOPS)?,
            mob_resets: db.open_tree(TREE_MOB_RESETS)?,
            mob_reset_equipment: db.open_tree(TREE_MOB_RESET_EQUIPMENT)?,
            object_resets: db.open_tree(TREE_OBJECT_RESETS)?,
            spawn_conditions: db.open_tree(TREE_SPAWN_CONDITIONS)?,
            quests: db.open_tree(TREE_QUESTS)?,
            quest_phases: db.open_tree(TREE_QUEST_PHASES)?,
            quest_objectives: db.open_tree(TREE_QUEST_OBJECTIVES)?,
            quest_rewards: db.open_tree(TREE_QUEST_REWARDS)?,
            quest_prerequisites: db.open_tree(TREE_QUEST_PREREQUISITES)?,
            abilities: db.open_tree(TREE_ABILITIES)?,
            socials: db.open_tree(TREE_SOCIALS)?,
            triggers: db.open_tree(TREE_TRIGGERS)?,
            users: db.open_tree(TREE_USERS)?,
            grants: db.open_tree(TREE_GRANTS)?,
            db,
        })
    }

    // ------------------------------------------------------------------
    // Generic row helpers
    // ------------------------------------------------------------------

    fn encode<T: StoredRecord>(record: &mut T) -> Result<Vec<u8>, CmsError> {
        record.stamp_schema_version();
        Ok(bincode::serialize(record)?)
    }

    fn decode<T: StoredRecord>(bytes: &IVec) -> Result<T, CmsError> {
        let record: T = bincode::deserialize(bytes)?;
        if record.schema_version() != T::SCHEMA_VERSION {
            return Err(CmsError::SchemaMismatch {
                entity: T::ENTITY,
                expected: T::SCHEMA_VERSION,
                found: record.schema_version(),
            });
        }
        Ok(record)
    }

    fn fetch<T: StoredRecord>(tree: &sled::Tree, key: &[u8], label: &dyn Fn() -> String) -> Result<T, CmsError> {
        let Some(bytes) = tree.get(key)? else {
            return Err(CmsError::NotFound(format!("{}: {}", T::ENTITY, label())));
        };
        Self::decode(&bytes)
    }

    fn fetch_opt<T: StoredRecord>(tree: &sled::Tree, key: &[u8]) -> Result<Option<T>, CmsError> {
        tree.get(key)?.map(|bytes| Self::decode(&bytes)).transpose()
    }

    /// Insert a row whose key must not exist yet.
    fn insert_new<T: StoredRecord>(
        tree: &sled::Tree,
        key: Vec<u8>,
        mut record: T,
        label: &dyn Fn() -> String,
    ) -> Result<T, CmsError> {
        let bytes = Self::encode(&mut record)?;
        match tree.compare_and_swap(key, None::<&[u8]>, Some(bytes))? {
            Ok(()) => {
                tree.flush()?;
                Ok(record)
            }
            Err(_) => Err(CmsError::AlreadyExists(format!("{}: {}", T::ENTITY, label()))),
        }
    }

    /// Overwrite a row that must already exist.
    fn replace<T: StoredRecord>(
        tree: &sled::Tree,
        key: Vec<u8>,
        mut record: T,
        label: &dyn Fn() -> String,
    ) -> Result<T, CmsError> {
        if !tree.contains_key(&key)? {
            return Err(CmsError::NotFound(format!("{}: {}", T::ENTITY, label())));
        }
        let bytes = Self::encode(&mut record)?;
        tree.insert(key, bytes)?;
        tree.flush()?;
        Ok(record)
    }

    fn remove<T: StoredRecord>(tree: &sled::Tree, key: &[u8], label: &dyn Fn() -> String) -> Result<(), CmsError> {
        if tree.remove(key)?.is_none() {
            return Err(CmsError::NotFound(format!("{}: {}", T::ENTITY, label())));
        }
        tree.flush()?;
        Ok(())
    }

    fn scan<T: StoredRecord>(tree: &sled::Tree, prefix: &[u8]) -> Result<Vec<T>, CmsError> {
        tree.scan_prefix(prefix)
            .map(|entry| {
                let (_key, value) = entry?;
                Self::decode(&value)
            })
            .collect()
    }

    fn scan_keys(tree: &sled::Tree, prefix: &[u8]) -> Result<Vec<IVec>, CmsError> {
        tree.scan_prefix(prefix)
            .map(|entry| entry.map(|(key, _)| key).map_err(CmsError::from))
            .collect()
    }

    fn require_exists(tree: &sled::Tree, key: &[u8], what: &str, label: &dyn Fn() -> String) -> Result<(), CmsError> {
        if tree.contains_key(key)? {
            Ok(())
        } else {
            Err(CmsError::Constraint(format!("{} {} does not exist", what, label())))
        }
    }

    fn require_zone(&self, zone_id: ZoneId) -> Result<(), CmsError> {
        Self::require_exists(&self.zones, &numeric_key(zone_id), "zone", &|| zone_id.to_string())
    }

    fn require_key(tree: &sled::Tree, key: &EntityKey, what: &str) -> Result<(), CmsError> {
        Self::require_exists(tree, &key.storage_key(), what, &|| key.to_string())
    }

    fn require_optional_mob(&self, key: Option<&EntityKey>) -> Result<(), CmsError> {
        match key {
            Some(k) => Self::require_key(&self.mobs, k, "mob"),
            None => Ok(()),
        }
    }

    fn require_optional_object(&self, key: Option<&EntityKey>) -> Result<(), CmsError> {
        match key {
            Some(k) => Self::require_key(&self.objects, k, "object"),
            None => Ok(()),
        }
    }

    fn require_optional_room(&self, key: Option<&EntityKey>) -> Result<(), CmsError> {
        match key {
            Some(k) => Self::require_key(&self.rooms, k, "room"),
            None => Ok(()),
        }
    }

    /// Monotonic id for rows without caller-assigned identity.
    pub fn generate_id(&self) -> Result<u64, CmsError> {
        // sled ids start at 0; keep 0 free so "no id" is never a valid row.
        Ok(self.db.generate_id()? + 1)
    }

    pub fn flush(&self) -> Result<(), CmsError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            zones: self.zones.len(),
            rooms: self.rooms.len(),
            mobs: self.mobs.len(),
            objects: self.objects.len(),
            shops: self.shops.len(),
            mob_resets: self.mob_resets.len(),
            object_resets: self.object_resets.len(),
            quests: self.quests.len(),
            abilities: self.abilities.len(),
            socials: self.socials.len(),
            triggers: self.triggers.len(),
            users: self.users.len(),
        }
    }

    // ------------------------------------------------------------------
    // Zones
    // ------------------------------------------------------------------

    pub fn create_zone(&self, zone: ZoneRecord) -> Result<ZoneRecord, CmsError> {
        let id = zone.id;
        Self::insert_new(&self.zones, numeric_key(id), zone, &|| id.to_string())
    }

    pub fn update_zone(&self, mut zone: ZoneRecord) -> Result<ZoneRecord, CmsError> {
        zone.touch();
        let id = zone.id;
        Self::replace(&self.zones, numeric_key(id), zone, &|| id.to_string())
    }

    pub fn get_zone(&self, id: ZoneId) -> Result<ZoneRecord, CmsError> {
        Self::fetch(&self.zones, &numeric_key(id), &|| id.to_string())
    }

    pub fn zone_exists(&self, id: ZoneId) -> Result<bool, CmsError> {
        Ok(self.zones.contains_key(numeric_key(id))?)
    }

    pub fn list_zones(&self) -> Result<Vec<ZoneRecord>, CmsError> {
        Self::scan(&self.zones, b"")
    }

    /// Zones are only removable once empty.
    pub fn delete_zone(&self, id: ZoneId) -> Result<(), CmsError> {
        if !self.zone_exists(id)? {
            return Err(CmsError::NotFound(format!("zone: {}", id)));
        }
        let prefix = EntityKey::zone_prefix(id);
        for (tree, what) in [
            (&self.rooms, "rooms"),
            (&self.mobs, "mobs"),
            (&self.objects, "objects"),
            (&self.shops, "shops"),
            (&self.quests, "quests"),
        ] {
            if tree.scan_prefix(&prefix).next().is_some() {
                return Err(CmsError::Constraint(format!("zone {} still has {}", id, what)));
            }
        }
        if self.list_triggers()?.iter().any(|t| t.zone_id == id) {
            return Err(CmsError::Constraint(format!("zone {} still has triggers", id)));
        }
        Self::remove::<ZoneRecord>(&self.zones, &numeric_key(id), &|| id.to_string())?;
        for key in self.grants.iter().keys() {
            let key = key?;
            if key.ends_with(format!(":{:010}", id).as_bytes()) {
                self.grants.remove(key)?;
            }
        }
        self.grants.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rooms, mobs, objects, shops
    // ------------------------------------------------------------------

    fn check_room_refs(&self, room: &RoomRecord) -> Result<(), CmsError> {
        for exit in &room.exits {
            // Exits may point at rooms in zones not yet built; only keys are checked.
            self.require_optional_object(exit.key_object.as_ref())?;
        }
        Ok(())
    }

    pub fn create_room(&self, room: RoomRecord) -> Result<RoomRecord, CmsError> {
        self.require_zone(room.key.zone_id)?;
        self.check_room_refs(&room)?;
        let key = room.key;
        Self::insert_new(&self.rooms, key.storage_key(), room, &|| key.to_string())
    }

    pub fn update_room(&self, room: RoomRecord) -> Result<RoomRecord, CmsError> {
        self.check_room_refs(&room)?;
        let key = room.key;
        Self::replace(&self.rooms, key.storage_key(), room, &|| key.to_string())
    }

    pub fn get_room(&self, key: &EntityKey) -> Result<RoomRecord, CmsError> {
        Self::fetch(&self.rooms, &key.storage_key(), &|| key.to_string())
    }

    pub fn find_room(&self, key: &EntityKey) -> Result<Option<RoomRecord>, CmsError> {
        Self::fetch_opt(&self.rooms, &key.storage_key())
    }

    pub fn list_rooms(&self) -> Result<Vec<RoomRecord>, CmsError> {
        Self::scan(&self.rooms, b"")
    }

    pub fn list_rooms_in_zone(&self, zone_id: ZoneId) -> Result<Vec<RoomRecord>, CmsError> {
        Self::scan(&self.rooms, &EntityKey::zone_prefix(zone_id))
    }

    pub fn delete_room(&self, key: &EntityKey) -> Result<(), CmsError> {
        if self.list_mob_resets()?.iter().any(|r| r.room == *key) {
            return Err(CmsError::Constraint(format!("room {} is used by mob resets", key)));
        }
        if self.list_object_resets()?.iter().any(|r| r.room == *key) {
            return Err(CmsError::Constraint(format!("room {} is used by object resets", key)));
        }
        if self.list_shops()?.iter().any(|s| s.rooms.contains(key)) {
            return Err(CmsError::Constraint(format!("room {} hosts a shop", key)));
        }
        if self.objectives()?.iter().any(|o| o.target_room.as_ref() == Some(key)) {
            return Err(CmsError::Constraint(format!("room {} is a quest objective target", key)));
        }
        if self.has_trigger_on(TriggerAttachType::World, key)? {
            return Err(CmsError::Constraint(format!("room {} has triggers attached", key)));
        }
        Self::remove::<RoomRecord>(&self.rooms, &key.storage_key(), &|| key.to_string())
    }

    pub fn create_mob(&self, mob: MobRecord) -> Result<MobRecord, CmsError> {
        self.require_zone(mob.key.zone_id)?;
        let key = mob.key;
        Self::insert_new(&self.mobs, key.storage_key(), mob, &|| key.to_string())
    }

    pub fn update_mob(&self, mob: MobRecord) -> Result<MobRecord, CmsError> {
        let key = mob.key;
        Self::replace(&self.mobs, key.storage_key(), mob, &|| key.to_string())
    }

    pub fn get_mob(&self, key: &EntityKey) -> Result<MobRecord, CmsError> {
        Self::fetch(&self.mobs, &key.storage_key(), &|| key.to_string())
    }

    pub fn find_mob(&self, key: &EntityKey) -> Result<Option<MobRecord>, CmsError> {
        Self::fetch_opt(&self.mobs, &key.storage_key())
    }

    pub fn list_mobs(&self) -> Result<Vec<MobRecord>, CmsError> {
        Self::scan(&self.mobs, b"")
    }

    pub fn list_mobs_in_zone(&self, zone_id: ZoneId) -> Result<Vec<MobRecord>, CmsError> {
        Self::scan(&self.mobs, &EntityKey::zone_prefix(zone_id))
    }

    pub fn delete_mob(&self, key: &EntityKey) -> Result<(), CmsError> {
        if self.list_mob_resets()?.iter().any(|r| r.mob == *key) {
            return Err(CmsError::Constraint(format!("mob {} is used by mob resets", key)));
        }
        if self.list_shops()?.iter().any(|s| s.keeper.as_ref() == Some(key)) {
            return Err(CmsError::Constraint(format!("mob {} keeps a shop", key)));
        }
        if self
            .list_quests()?
            .iter()
            .any(|q| q.giver.as_ref() == Some(key) || q.completer.as_ref() == Some(key))
        {
            return Err(CmsError::Constraint(format!("mob {} gives or completes a quest", key)));
        }
        if self
            .objectives()?
            .iter()
            .any(|o| o.target_mob.as_ref() == Some(key) || o.deliver_to_mob.as_ref() == Some(key))
        {
            return Err(CmsError::Constraint(format!("mob {} is a quest objective target", key)));
        }
        if self.has_trigger_on(TriggerAttachType::Mob, key)? {
            return Err(CmsError::Constraint(format!("mob {} has triggers attached", key)));
        }
        Self::remove::<MobRecord>(&self.mobs, &key.storage_key(), &|| key.to_string())
    }

    pub fn create_object(&self, object: ObjectRecord) -> Result<ObjectRecord, CmsError> {
        self.require_zone(object.key.zone_id)?;
        let key = object.key;
        Self::insert_new(&self.objects, key.storage_key(), object, &|| key.to_string())
    }

    pub fn update_object(&self, object: ObjectRecord) -> Result<ObjectRecord, CmsError> {
        let key = object.key;
        Self::replace(&self.objects, key.storage_key(), object, &|| key.to_string())
    }

    pub fn get_object(&self, key: &EntityKey) -> Result<ObjectRecord, CmsError> {
        Self::fetch(&self.objects, &key.storage_key(), &|| key.to_string())
    }

    pub fn find_object(&self, key: &EntityKey) -> Result<Option<ObjectRecord>, CmsError> {
        Self::fetch_opt(&self.objects, &key.storage_key())
    }

    pub fn list_objects(&self) -> Result<Vec<ObjectRecord>, CmsError> {
        Self::scan(&self.objects, b"")
    }

    pub fn list_objects_in_zone(&self, zone_id: ZoneId) -> Result<Vec<ObjectRecord>, CmsError> {
        Self::scan(&self.objects, &EntityKey::zone_prefix(zone_id))
    }

    pub fn delete_object(&self, key: &EntityKey) -> Result<(), CmsError> {
        if self.list_object_resets()?.iter().any(|r| r.object == *key) {
            return Err(CmsError::Constraint(format!("object {} is used by object resets", key)));
        }
        let equipment: Vec<MobResetEquipmentRecord> = Self::scan(&self.mob_reset_equipment, b"")?;
        if equipment.iter().any(|e| e.object == *key) {
            return Err(CmsError::Constraint(format!("object {} is equipped by mob resets", key)));
        }
        if self
            .list_shops()?
            .iter()
            .any(|s| s.stock.iter().any(|item| item.object == *key))
        {
            return Err(CmsError::Constraint(format!("object {} is stocked by a shop", key)));
        }
        let rewards: Vec<QuestRewardRecord> = Self::scan(&self.quest_rewards, b"")?;
        if rewards.iter().any(|r| r.object.as_ref() == Some(key)) {
            return Err(CmsError::Constraint(format!("object {} is a quest reward", key)));
        }
        if self.objectives()?.iter().any(|o| o.target_object.as_ref() == Some(key)) {
            return Err(CmsError::Constraint(format!("object {} is a quest objective target", key)));
        }
        if self
            .list_rooms()?
            .iter()
            .any(|r| r.exits.iter().any(|e| e.key_object.as_ref() == Some(key)))
        {
            return Err(CmsError::Constraint(format!("object {} is a door key", key)));
        }
        if self.has_trigger_on(TriggerAttachType::Object, key)? {
            return Err(CmsError::Constraint(format!("object {} has triggers attached", key)));
        }
        Self::remove::<ObjectRecord>(&self.objects, &key.storage_key(), &|| key.to_string())
    }

    fn objectives(&self) -> Result<Vec<QuestObjectiveRecord>, CmsError> {
        Self::scan(&self.quest_objectives, b"")
    }

    fn has_trigger_on(&self, attach: TriggerAttachType, key: &EntityKey) -> Result<bool, CmsError> {
        Ok(self
            .list_triggers()?
            .iter()
            .any(|t| t.attach_type == attach && t.target.as_ref() == Some(key)))
    }

    fn check_shop_refs(&self, shop: &ShopRecord) -> Result<(), CmsError> {
        self.require_optional_mob(shop.keeper.as_ref())?;
        for item in &shop.stock {
            Self::require_key(&self.objects, &item.object, "object")?;
        }
        for room in &shop.rooms {
            Self::require_key(&self.rooms, room, "room")?;
        }
        Ok(())
    }

    pub fn create_shop(&self, shop: ShopRecord) -> Result<ShopRecord, CmsError> {
        self.require_zone(shop.key.zone_id)?;
        self.check_shop_refs(&shop)?;
        let key = shop.key;
        Self::insert_new(&self.shops, key.storage_key(), shop, &|| key.to_string())
    }

    pub fn update_shop(&self, shop: ShopRecord) -> Result<ShopRecord, CmsError> {
        self.check_shop_refs(&shop)?;
        let key = shop.key;
        Self::replace(&self.shops, key.storage_key(), shop, &|| key.to_string())
    }

    pub fn get_shop(&self, key: &EntityKey) -> Result<ShopRecord, CmsError> {
        Self::fetch(&self.shops, &key.storage_key(), &|| key.to_string())
    }

    pub fn list_shops(&self) -> Result<Vec<ShopRecord>, CmsError> {
        Self::scan(&self.shops, b"")
    }

    pub fn list_shops_in_zone(&self, zone_id: ZoneId) -> Result<Vec<ShopRecord>, CmsError> {
        Self::scan(&self.shops, &EntityKey::zone_prefix(zone_id))
    }

    pub fn delete_shop(&self, key: &EntityKey) -> Result<(), CmsError> {
        Self::remove::<ShopRecord>(&self.shops, &key.storage_key(), &|| key.to_string())
    }

    // ------------------------------------------------------------------
    // Mob resets
    // ------------------------------------------------------------------

    fn check_mob_reset_refs(
        &self,
        reset: &MobResetRecord,
        equipment: &[MobResetEquipmentRecord],
    ) -> Result<(), CmsError> {
        Self::require_key(&self.mobs, &reset.mob, "mob")?;
        Self::require_key(&self.rooms, &reset.room, "room")?;
        for item in equipment {
            Self::require_key(&self.objects, &item.object, "object")?;
        }
        Ok(())
    }

    /// Write a reset row together with equipment rows in one transaction.
    /// Existing equipment rows not listed are left untouched.
    fn write_mob_reset(
        &self,
        mut reset: MobResetRecord,
        mut equipment: Vec<MobResetEquipmentRecord>,
    ) -> Result<(MobResetRecord, Vec<MobResetEquipmentRecord>), CmsError> {
        let reset_bytes = Self::encode(&mut reset)?;
        let reset_row = serial_key(reset.id);
        let mut rows = Vec::with_capacity(equipment.len());
        for item in equipment.iter_mut() {
            item.reset_id = reset.id;
            rows.push((child_key(reset.id, item.id), Self::encode(item)?));
        }
        (&self.mob_resets, &self.mob_reset_equipment)
            .transaction(|(resets, equip)| -> ConflictableTransactionResult<(), CmsError> {
                resets.insert(reset_row.as_slice(), reset_bytes.as_slice())?;
                for (key, bytes) in &rows {
                    equip.insert(key.as_slice(), bytes.as_slice())?;
                }
                Ok(())
            })?;
        self.db.flush()?;
        Ok((reset, equipment))
    }

    /// Persist a new reset; ids are allocated for the reset and every equipment row.
    pub fn create_mob_reset(
        &self,
        mut reset: MobResetRecord,
        mut equipment: Vec<MobResetEquipmentRecord>,
    ) -> Result<(MobResetRecord, Vec<MobResetEquipmentRecord>), CmsError> {
        self.check_mob_reset_refs(&reset, &equipment)?;
        reset.id = self.generate_id()?;
        for item in equipment.iter_mut() {
            item.id = self.generate_id()?;
        }
        self.write_mob_reset(reset, equipment)
    }

    /// Replace the reset row and upsert the given equipment rows. Rows with
    /// `id == 0` are new and receive an id; rows with an id must already
    /// belong to this reset.
    pub fn update_mob_reset(
        &self,
        reset: MobResetRecord,
        mut equipment: Vec<MobResetEquipmentRecord>,
    ) -> Result<(MobResetRecord, Vec<MobResetEquipmentRecord>), CmsError> {
        if !self.mob_resets.contains_key(serial_key(reset.id))? {
            return Err(CmsError::NotFound(format!("mob reset: {}", reset.id)));
        }
        self.check_mob_reset_refs(&reset, &equipment)?;
        for item in equipment.iter_mut() {
            if item.id == 0 {
                item.id = self.generate_id()?;
            } else if !self.mob_reset_equipment.contains_key(child_key(reset.id, item.id))? {
                return Err(CmsError::NotFound(format!(
                    "mob reset equipment {} on reset {}",
                    item.id, reset.id
                )));
            }
        }
        self.write_mob_reset(reset, equipment)
    }

    pub fn get_mob_reset(&self, id: u64) -> Result<MobResetRecord, CmsError> {
        Self::fetch(&self.mob_resets, &serial_key(id), &|| id.to_string())
    }

    pub fn list_mob_resets(&self) -> Result<Vec<MobResetRecord>, CmsError> {
        Self::scan(&self.mob_resets, b"")
    }

    pub fn mob_reset_equipment(&self, reset_id: u64) -> Result<Vec<MobResetEquipmentRecord>, CmsError> {
        Self::scan(&self.mob_reset_equipment, &child_prefix(reset_id))
    }

    pub fn delete_mob_reset(&self, id: u64) -> Result<(), CmsError> {
        let reset_row = serial_key(id);
        if !self.mob_resets.contains_key(&reset_row)? {
            return Err(CmsError::NotFound(format!("mob reset: {}", id)));
        }
        let children = Self::scan_keys(&self.mob_reset_equipment, &child_prefix(id))?;
        (&self.mob_resets, &self.mob_reset_equipment)
            .transaction(|(resets, equip)| -> ConflictableTransactionResult<(), CmsError> {
                resets.remove(reset_row.as_slice())?;
                for key in &children {
                    equip.remove(key.as_ref())?;
                }
                Ok(())
            })?;
        self.db.flush()?;
        Ok(())
    }

    pub fn delete_mob_reset_equipment(&self, id: u64) -> Result<(), CmsError> {
        let suffix = format!(":{:020}", id);
        for key in self.mob_reset_equipment.iter().keys() {
            let key = key?;
            if key.ends_with(suffix.as_bytes()) {
                self.mob_reset_equipment.remove(key)?;
                self.mob_reset_equipment.flush()?;
                return Ok(());
            }
        }
        Err(CmsError::NotFound(format!("mob reset equipment: {}", id)))
    }

    // ------------------------------------------------------------------
    // Object resets
    // ------------------------------------------------------------------

    fn check_object_reset_refs(&self, reset: &ObjectResetRecord) -> Result<(), CmsError> {
        Self::require_key(&self.objects, &reset.object, "object")?;
        Self::require_key(&self.rooms, &reset.room, "room")
    }

    fn write_object_reset(
        &self,
        mut reset: ObjectResetRecord,
        mut conditions: Vec<SpawnConditionRecord>,
    ) -> Result<(ObjectResetRecord, Vec<SpawnConditionRecord>), CmsError> {
        let reset_bytes = Self::encode(&mut reset)?;
        let reset_row = serial_key(reset.id);
        let mut rows = Vec::with_capacity(conditions.len());
        for condition in conditions.iter_mut() {
            condition.reset_id = reset.id;
            rows.push((child_key(reset.id, condition.id), Self::encode(condition)?));
        }
        (&self.object_resets, &self.spawn_conditions)
            .transaction(|(resets, conds)| -> ConflictableTransactionResult<(), CmsError> {
                resets.insert(reset_row.as_slice(), reset_bytes.as_slice())?;
                for (key, bytes) in &rows {
                    conds.insert(key.as_slice(), bytes.as_slice())?;
                }
                Ok(())
            })?;
        self.db.flush()?;
        Ok((reset, conditions))
    }

    pub fn create_object_reset(
        &self,
        mut reset: ObjectResetRecord,
        mut conditions: Vec<SpawnConditionRecord>,
    ) -> Result<(ObjectResetRecord, Vec<SpawnConditionRecord>), CmsError> {
        self.check_object_reset_refs(&reset)?;
        reset.id = self.generate_id()?;
        for condition in conditions.iter_mut() {
            condition.id = self.generate_id()?;
        }
        self.write_object_reset(reset, conditions)
    }

    pub fn update_object_reset(
        &self,
        reset: ObjectResetRecord,
        mut conditions: Vec<SpawnConditionRecord>,
    ) -> Result<(ObjectResetRecord, Vec<SpawnConditionRecord>), CmsError> {
        if !self.object_resets.contains_key(serial_key(reset.id))? {
            return Err(CmsError::NotFound(format!("object reset: {}", reset.id)));
        }
        self.check_object_reset_refs(&reset)?;
        for condition in conditions.iter_mut() {
            if condition.id == 0 {
                condition.id = self.generate_id()?;
            } else if !self.spawn_conditions.contains_key(child_key(reset.id, condition.id))? {
                return Err(CmsError::NotFound(format!(
                    "spawn condition {} on reset {}",
                    condition.id, reset.id
                )));
            }
        }
        self.write_object_reset(reset, conditions)
    }

    pub fn get_object_reset(&self, id: u64) -> Result<ObjectResetRecord, CmsError> {
        Self::fetch(&self.object_resets, &serial_key(id), &|| id.to_string())
    }

    pub fn list_object_resets(&self) -> Result<Vec<ObjectResetRecord>, CmsError> {
        Self::scan(&self.object_resets, b"")
    }

    pub fn spawn_conditions(&self, reset_id: u64) -> Result<Vec<SpawnConditionRecord>, CmsError> {
        Self::scan(&self.spawn_conditions, &child_prefix(reset_id))
    }

    pub fn delete_object_reset(&self, id: u64) -> Result<(), CmsError> {
        let reset_row = serial_key(id);
        if !self.object_resets.contains_key(&reset_row)? {
            return Err(CmsError::NotFound(format!("object reset: {}", id)));
        }
        let children = Self::scan_keys(&self.spawn_conditions, &child_prefix(id))?;
        (&self.object_resets, &self.spawn_conditions)
            .transaction(|(resets, conds)| -> ConflictableTransactionResult<(), CmsError> {
                resets.remove(reset_row.as_slice())?;
                for key in &children {
                    conds.remove(key.as_ref())?;
                }
                Ok(())
            })?;
        self.db.flush()?;
        Ok(())
    }

    pub fn delete_spawn_condition(&self, id: u64) -> Result<(), CmsError> {
        let suffix = format!(":{:020}", id);
        for key in self.spawn_conditions.iter().keys() {
            let key = key?;
            if key.ends_with(suffix.as_bytes()) {
                self.spawn_conditions.remove(key)?;
                self.spawn_conditions.flush()?;
                return Ok(());
            }
        }
        Err(CmsError::NotFound(format!("spawn condition: {}", id)))
    }

    // ------------------------------------------------------------------
    // Quests
    // ------------------------------------------------------------------

    fn check_quest_refs(&self, quest: &QuestRecord) -> Result<(), CmsError> {
        self.require_optional_mob(quest.giver.as_ref())?;
        self.require_optional_mob(quest.completer.as_ref())
    }

    pub fn create_quest(&self, quest: QuestRecord) -> Result<QuestRecord, CmsError> {
        self.require_zone(quest.key.zone_id)?;
        self.check_quest_refs(&quest)?;
        let key = quest.key;
        Self::insert_new(&self.quests, key.storage_key(), quest, &|| key.to_string())
    }

    pub fn update_quest(&self, quest: QuestRecord) -> Result<QuestRecord, CmsError> {
        self.check_quest_refs(&quest)?;
        let key = quest.key;
        Self::replace(&self.quests, key.storage_key(), quest, &|| key.to_string())
    }

    pub fn get_quest(&self, key: &EntityKey) -> Result<QuestRecord, CmsError> {
        Self::fetch(&self.quests, &key.storage_key(), &|| key.to_string())
    }

    pub fn quest_exists(&self, key: &EntityKey) -> Result<bool, CmsError> {
        Ok(self.quests.contains_key(key.storage_key())?)
    }

    pub fn list_quests(&self) -> Result<Vec<QuestRecord>, CmsError> {
        Self::scan(&self.quests, b"")
    }

    pub fn list_quests_in_zone(&self, zone_id: ZoneId) -> Result<Vec<QuestRecord>, CmsError> {
        Self::scan(&self.quests, &EntityKey::zone_prefix(zone_id))
    }

    /// Remove a quest with its phases, objectives, rewards and prerequisite
    /// edges (its own and those naming it) in one transaction.
    pub fn delete_quest(&self, key: &EntityKey) -> Result<(), CmsError> {
        let quest_row = key.storage_key();
        if !self.quests.contains_key(&quest_row)? {
            return Err(CmsError::NotFound(format!("quest: {}", key)));
        }
        let phases = Self::scan_keys(&self.quest_phases, &quest_row)?;
        let objectives = Self::scan_keys(&self.quest_objectives, &quest_row)?;
        let rewards = Self::scan_keys(&self.quest_rewards, &quest_row)?;
        let mut edges = Self::scan_keys(&self.quest_prerequisites, &quest_row)?;
        for edge in Self::scan::<QuestPrerequisiteRecord>(&self.quest_prerequisites, b"")? {
            if edge.key.requires == *key {
                edges.push(IVec::from(edge.key.storage_key()));
            }
        }

        (
            &self.quests,
            &self.quest_phases,
            &self.quest_objectives,
            &self.quest_rewards,
            &self.quest_prerequisites,
        )
            .transaction(
                |(quests, phase_tree, objective_tree, reward_tree, edge_tree)| -> ConflictableTransactionResult<(), CmsError> {
                    quests.remove(quest_row.as_slice())?;
                    for k in &phases {
                        phase_tree.remove(k.as_ref())?;
                    }
                    for k in &objectives {
                        objective_tree.remove(k.as_ref())?;
                    }
                    for k in &rewards {
                        reward_tree.remove(k.as_ref())?;
                    }
                    for k in &edges {
                        edge_tree.remove(k.as_ref())?;
                    }
                    Ok(())
                },
            )?;
        self.db.flush()?;
        Ok(())
    }

    pub fn create_phase(&self, phase: QuestPhaseRecord) -> Result<QuestPhaseRecord, CmsError> {
        Self::require_key(&self.quests, &phase.key.quest, "quest")?;
        let key = phase.key;
        Self::insert_new(&self.quest_phases, key.storage_key(), phase, &|| key.to_string())
    }

    pub fn update_phase(&self, phase: QuestPhaseRecord) -> Result<QuestPhaseRecord, CmsError> {
        let key = phase.key;
        Self::replace(&self.quest_phases, key.storage_key(), phase, &|| key.to_string())
    }

    pub fn get_phase(&self, key: &PhaseKey) -> Result<QuestPhaseRecord, CmsError> {
        Self::fetch(&self.quest_phases, &key.storage_key(), &|| key.to_string())
    }

    /// Phases of a quest in caller-assigned `order`, ties broken by id.
    pub fn phases_for_quest(&self, quest: &EntityKey) -> Result<Vec<QuestPhaseRecord>, CmsError> {
        let mut phases: Vec<QuestPhaseRecord> = Self::scan(&self.quest_phases, &quest.storage_key())?;
        phases.sort_by_key(|p| (p.order, p.key.id));
        Ok(phases)
    }

    pub fn delete_phase(&self, key: &PhaseKey) -> Result<(), CmsError> {
        let phase_row = key.storage_key();
        if !self.quest_phases.contains_key(&phase_row)? {
            return Err(CmsError::NotFound(format!("quest phase: {}", key)));
        }
        let objectives = Self::scan_keys(&self.quest_objectives, &phase_row)?;
        (&self.quest_phases, &self.quest_objectives)
            .transaction(|(phase_tree, objective_tree)| -> ConflictableTransactionResult<(), CmsError> {
                phase_tree.remove(phase_row.as_slice())?;
                for k in &objectives {
                    objective_tree.remove(k.as_ref())?;
                }
                Ok(())
            })?;
        self.db.flush()?;
        Ok(())
    }

    fn check_objective_refs(&self, objective: &QuestObjectiveRecord) -> Result<(), CmsError> {
        self.require_optional_mob(objective.target_mob.as_ref())?;
        self.require_optional_mob(objective.deliver_to_mob.as_ref())?;
        self.require_optional_object(objective.target_object.as_ref())?;
        self.require_optional_room(objective.target_room.as_ref())
    }

    pub fn create_objective(&self, objective: QuestObjectiveRecord) -> Result<QuestObjectiveRecord, CmsError> {
        let phase = objective.key.phase;
        Self::require_exists(&self.quest_phases, &phase.storage_key(), "quest phase", &|| phase.to_string())?;
        self.check_objective_refs(&objective)?;
        let key = objective.key;
        Self::insert_new(&self.quest_objectives, key.storage_key(), objective, &|| key.to_string())
    }

    pub fn update_objective(&self, objective: QuestObjectiveRecord) -> Result<QuestObjectiveRecord, CmsError> {
        self.check_objective_refs(&objective)?;
        let key = objective.key;
        Self::replace(&self.quest_objectives, key.storage_key(), objective, &|| key.to_string())
    }

    pub fn get_objective(&self, key: &ObjectiveKey) -> Result<QuestObjectiveRecord, CmsError> {
        Self::fetch(&self.quest_objectives, &key.storage_key(), &|| key.to_string())
    }

    pub fn objectives_for_phase(&self, phase: &PhaseKey) -> Result<Vec<QuestObjectiveRecord>, CmsError> {
        Self::scan(&self.quest_objectives, &phase.storage_key())
    }

    pub fn objectives_for_quest(&self, quest: &EntityKey) -> Result<Vec<QuestObjectiveRecord>, CmsError> {
        Self::scan(&self.quest_objectives, &quest.storage_key())
    }

    pub fn delete_objective(&self, key: &ObjectiveKey) -> Result<(), CmsError> {
        Self::remove::<QuestObjectiveRecord>(&self.quest_objectives, &key.storage_key(), &|| key.to_string())
    }

    fn check_reward_refs(&self, reward: &QuestRewardRecord) -> Result<(), CmsError> {
        self.require_optional_object(reward.object.as_ref())?;
        if let Some(ability_id) = reward.ability_id {
            Self::require_exists(&self.abilities, &numeric_key(ability_id), "ability", &|| ability_id.to_string())?;
        }
        Ok(())
    }

    pub fn create_reward(&self, reward: QuestRewardRecord) -> Result<QuestRewardRecord, CmsError> {
        Self::require_key(&self.quests, &reward.key.quest, "quest")?;
        self.check_reward_refs(&reward)?;
        let key = reward.key;
        Self::insert_new(&self.quest_rewards, key.storage_key(), reward, &|| key.to_string())
    }

    pub fn update_reward(&self, reward: QuestRewardRecord) -> Result<QuestRewardRecord, CmsError> {
        self.check_reward_refs(&reward)?;
        let key = reward.key;
        Self::replace(&self.quest_rewards, key.storage_key(), reward, &|| key.to_string())
    }

    pub fn get_reward(&self, key: &RewardKey) -> Result<QuestRewardRecord, CmsError> {
        Self::fetch(&self.quest_rewards, &key.storage_key(), &|| key.to_string())
    }

    pub fn rewards_for_quest(&self, quest: &EntityKey) -> Result<Vec<QuestRewardRecord>, CmsError> {
        Self::scan(&self.quest_rewards, &quest.storage_key())
    }

    pub fn delete_reward(&self, key: &RewardKey) -> Result<(), CmsError> {
        Self::remove::<QuestRewardRecord>(&self.quest_rewards, &key.storage_key(), &|| key.to_string())
    }

    /// Store a prerequisite edge. Self references never reach storage and an
    /// existing edge is reported as `AlreadyExists`.
    pub fn add_prerequisite(&self, edge: QuestPrerequisiteRecord) -> Result<QuestPrerequisiteRecord, CmsError> {
        let key = edge.key;
        if key.is_self_reference() {
            return Err(CmsError::Validation(format!("quest {} cannot require itself", key.quest)));
        }
        Self::require_key(&self.quests, &key.quest, "quest")?;
        Self::require_key(&self.quests, &key.requires, "prerequisite quest")?;
        Self::insert_new(&self.quest_prerequisites, key.storage_key(), edge, &|| key.to_string())
    }

    pub fn prerequisites_for_quest(&self, quest: &EntityKey) -> Result<Vec<QuestPrerequisiteRecord>, CmsError> {
        Self::scan(&self.quest_prerequisites, &quest.storage_key())
    }

    pub fn remove_prerequisite(&self, key: &PrerequisiteKey) -> Result<(), CmsError> {
        Self::remove::<QuestPrerequisiteRecord>(&self.quest_prerequisites, &key.storage_key(), &|| key.to_string())
    }

    // ------------------------------------------------------------------
    // Abilities, socials, triggers
    // ------------------------------------------------------------------

    pub fn create_ability(&self, ability: AbilityRecord) -> Result<AbilityRecord, CmsError> {
        let id = ability.id;
        Self::insert_new(&self.abilities, numeric_key(id), ability, &|| id.to_string())
    }

    pub fn update_ability(&self, ability: AbilityRecord) -> Result<AbilityRecord, CmsError> {
        let id = ability.id;
        Self::replace(&self.abilities, numeric_key(id), ability, &|| id.to_string())
    }

    pub fn get_ability(&self, id: u32) -> Result<AbilityRecord, CmsError> {
        Self::fetch(&self.abilities, &numeric_key(id), &|| id.to_string())
    }

    pub fn list_abilities(&self) -> Result<Vec<AbilityRecord>, CmsError> {
        Self::scan(&self.abilities, b"")
    }

    pub fn delete_ability(&self, id: u32) -> Result<(), CmsError> {
        let rewards: Vec<QuestRewardRecord> = Self::scan(&self.quest_rewards, b"")?;
        if rewards.iter().any(|r| r.ability_id == Some(id)) {
            return Err(CmsError::Constraint(format!("ability {} is a quest reward", id)));
        }
        Self::remove::<AbilityRecord>(&self.abilities, &numeric_key(id), &|| id.to_string())
    }

    pub fn create_social(&self, social: SocialRecord) -> Result<SocialRecord, CmsError> {
        let name = social.name.clone();
        Self::insert_new(&self.socials, social_key(&name), social, &|| name.clone())
    }

    pub fn update_social(&self, social: SocialRecord) -> Result<SocialRecord, CmsError> {
        let name = social.name.clone();
        Self::replace(&self.socials, social_key(&name), social, &|| name.clone())
    }

    pub fn get_social(&self, name: &str) -> Result<SocialRecord, CmsError> {
        Self::fetch(&self.socials, &social_key(name), &|| name.to_string())
    }

    pub fn list_socials(&self) -> Result<Vec<SocialRecord>, CmsError> {
        Self::scan(&self.socials, b"")
    }

    pub fn delete_social(&self, name: &str) -> Result<(), CmsError> {
        Self::remove::<SocialRecord>(&self.socials, &social_key(name), &|| name.to_string())
    }

    fn check_trigger_refs(&self, trigger: &TriggerRecord) -> Result<(), CmsError> {
        self.require_zone(trigger.zone_id)?;
        match trigger.attach_type {
            TriggerAttachType::Mob => self.require_optional_mob(trigger.target.as_ref()),
            TriggerAttachType::Object => self.require_optional_object(trigger.target.as_ref()),
            TriggerAttachType::World => self.require_optional_room(trigger.target.as_ref()),
        }
    }

    pub fn create_trigger(&self, mut trigger: TriggerRecord) -> Result<TriggerRecord, CmsError> {
        self.check_trigger_refs(&trigger)?;
        trigger.id = self.generate_id()?;
        let id = trigger.id;
        Self::insert_new(&self.triggers, serial_key(id), trigger, &|| id.to_string())
    }

    pub fn update_trigger(&self, trigger: TriggerRecord) -> Result<TriggerRecord, CmsError> {
        self.check_trigger_refs(&trigger)?;
        let id = trigger.id;
        Self::replace(&self.triggers, serial_key(id), trigger, &|| id.to_string())
    }

    pub fn get_trigger(&self, id: u64) -> Result<TriggerRecord, CmsError> {
        Self::fetch(&self.triggers, &serial_key(id), &|| id.to_string())
    }

    pub fn list_triggers(&self) -> Result<Vec<TriggerRecord>, CmsError> {
        Self::scan(&self.triggers, b"")
    }

    pub fn delete_trigger(&self, id: u64) -> Result<(), CmsError> {
        Self::remove::<TriggerRecord>(&self.triggers, &serial_key(id), &|| id.to_string())
    }

    // ------------------------------------------------------------------
    // Users and grants
    // ------------------------------------------------------------------

    pub fn create_user(&self, user: UserRecord) -> Result<UserRecord, CmsError> {
        let name = user.username.clone();
        Self::insert_new(&self.users, user_key(&name), user, &|| name.clone())
    }

    pub fn put_user(&self, mut user: UserRecord) -> Result<(), CmsError> {
        let bytes = Self::encode(&mut user)?;
        self.users.insert(user_key(&user.username), bytes)?;
        self.users.flush()?;
        Ok(())
    }

    pub fn get_user(&self, username: &str) -> Result<UserRecord, CmsError> {
        Self::fetch(&self.users, &user_key(username), &|| username.to_string())
    }

    pub fn find_user(&self, username: &str) -> Result<Option<UserRecord>, CmsError> {
        Self::fetch_opt(&self.users, &user_key(username))
    }

    pub fn list_users(&self) -> Result<Vec<UserRecord>, CmsError> {
        Self::scan(&self.users, b"")
    }

    pub fn seed_admin_if_needed(&self, username: &str) -> Result<bool, CmsError> {
        if !self.users.is_empty() {
            return Ok(false);
        }
        let name = validate_username(username, true)?;
        self.put_user(UserRecord::new(&name, Role::God))?;
        Ok(true)
    }

    pub fn put_grant(&self, grant: ZoneGrantRecord) -> Result<ZoneGrantRecord, CmsError> {
        Self::require_exists(&self.users, &user_key(&grant.username), "user", &|| grant.username.clone())?;
        self.require_zone(grant.zone_id)?;
        let mut grant = grant;
        let bytes = Self::encode(&mut grant)?;
        self.grants.insert(grant_key(&grant.username, grant.zone_id), bytes)?;
        self.grants.flush()?;
        Ok(grant)
    }

    pub fn find_grant(&self, username: &str, zone_id: ZoneId) -> Result<Option<ZoneGrantRecord>, CmsError> {
        Self::fetch_opt(&self.grants, &grant_key(username, zone_id))
    }

    pub fn grants_for_user(&self, username: &str) -> Result<Vec<ZoneGrantRecord>, CmsError> {
        let prefix = format!("{}:", username.to_ascii_lowercase());
        Self::scan(&self.grants, prefix.as_bytes())
    }

    pub fn remove_grant(&self, username: &str, zone_id: ZoneId) -> Result<(), CmsError> {
        Self::remove::<ZoneGrantRecord>(&self.grants, &grant_key(username, zone_id), &|| {
            format!("{} in zone {}", username, zone_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn open_store() -> (CmsStore, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let store = CmsStoreBuilder::new(dir.path()).open().expect("store");
        (store, dir)
    }

    fn quest(zone_id: ZoneId, id: u32) -> QuestRecord {
        let now = Utc::now();
        QuestRecord {
            key: EntityKey::new(zone_id, id),
            name: format!("quest {}", id),
            description: None,
            min_level: 1,
            max_level: 100,
            trigger_type: QuestTriggerType::default(),
            repeatable: false,
            hidden: false,
            giver: None,
            completer: None,
            time_limit_minutes: None,
            created_at: now,
            updated_at: now,
            schema_version: 0,
        }
    }

    #[test]
    fn duplicate_zone_is_typed_error() {
        let (store, _dir) = open_store();
        store.create_zone(ZoneRecord::new(30, "Mielikki")).expect("create");
        let err = store.create_zone(ZoneRecord::new(30, "Again")).unwrap_err();
        assert!(matches!(err, CmsError::AlreadyExists(_)), "{err}");
    }

    #[test]
    fn zone_with_quests_cannot_be_deleted() {
        let (store, _dir) = open_store();
        store.create_zone(ZoneRecord::new(30, "Mielikki")).expect("zone");
        store.create_quest(quest(30, 1)).expect("quest");
        let err = store.delete_zone(30).unwrap_err();
        assert!(matches!(err, CmsError::Constraint(_)), "{err}");
        store.delete_quest(&EntityKey::new(30, 1)).expect("delete quest");
        store.delete_zone(30).expect("delete zone");
        assert!(!store.zone_exists(30).unwrap());
    }

    #[test]
    fn missing_delete_is_not_found() {
        let (store, _dir) = open_store();
        let err = store.delete_mob_reset(99).unwrap_err();
        assert!(matches!(err, CmsError::NotFound(_)));
    }

    #[test]
    fn bootstrap_admin_only_seeds_empty_store() {
        let dir = TempDir::new().expect("tempdir");
        {
            let store = CmsStoreBuilder::new(dir.path())
                .with_bootstrap_admin("Root")
                .open()
                .expect("store");
            assert_eq!(store.get_user("root").unwrap().role, Role::God);
        }
        let store = CmsStoreBuilder::new(dir.path()).open().expect("reopen");
        assert!(!store.seed_admin_if_needed("other").unwrap());
        assert_eq!(store.list_users().unwrap().len(), 1);
    }

    #[test]
    fn bootstrap_admin_name_is_validated() {
        let (store, _dir) = open_store();
        let err = store.seed_admin_if_needed("bad name!").unwrap_err();
        assert!(matches!(err, CmsError::Validation(_)));
        assert!(store.list_users().unwrap().is_empty());
        assert!(store.seed_admin_if_needed("admin").unwrap());
    }
}
