//! Operation dispatch.
//!
//! A request names an operation (`rooms`, `createRoom`, `questPhases`, ...),
//! the acting username and a JSON argument object. Composite keys always
//! travel as separate arguments (`zoneId` + `id`, `questZoneId` + `questId`
//! + `phaseId`); create/update payloads travel under `data`.
//!
//! ```text
//! {"operation":"updateRoom","actor":"brick","args":{"zoneId":30,"id":1,"data":{"name":"Gate"}}}
//! {"data":{...}}                       on success
//! {"errors":[{"message":"...","code":"FORBIDDEN"}]}   on failure
//! ```

pub mod server;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{self, Actor, ZoneScope};
use crate::cms::errors::CmsError;
use crate::cms::keys::{EntityKey, ObjectiveKey, PhaseKey, RewardKey, ZoneId};
use crate::cms::storage::CmsStore;
use crate::cms::types::Role;
use crate::cms::{catalog, quest, resets, world};
use crate::logutil::escape_log;
use crate::metrics;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRequest {
    /// Echoed back so clients can match responses on a shared connection.
    #[serde(default)]
    pub id: Option<Value>,
    pub operation: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    pub message: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ApiError>>,
}

impl ApiResponse {
    pub fn ok(id: Option<Value>, data: Value) -> Self {
        Self {
            id,
            data: Some(data),
            errors: None,
        }
    }

    pub fn error(id: Option<Value>, message: impl Into<String>, code: &str) -> Self {
        Self {
            id,
            data: None,
            errors: Some(vec![ApiError {
                message: message.into(),
                code: code.to_string(),
            }]),
        }
    }

    /// First error code, if the call failed.
    pub fn error_code(&self) -> Option<&str> {
        self.errors
            .as_ref()
            .and_then(|errs| errs.first())
            .map(|e| e.code.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApiOptions {
    /// Enables the `operations` listing.
    pub playground: bool,
    /// Includes internal error detail in responses.
    pub debug: bool,
}

/// Every operation `handle` understands.
pub const OPERATIONS: &[&str] = &[
    "operations", "me",
    "zones", "zone", "createZone", "updateZone", "deleteZone",
    "rooms", "room", "roomsByZone", "createRoom", "updateRoom", "deleteRoom",
    "mobs", "mob", "mobsByZone", "createMob", "updateMob", "deleteMob",
    "objects", "object", "objectsByZone", "createObject", "updateObject", "deleteObject",
    "shops", "shop", "shopsByZone", "createShop", "updateShop", "deleteShop",
    "mobResets", "mobReset", "mobResetsByMob", "mobResetsByRoom", "mobResetsByZone",
    "createMobReset", "updateMobReset", "deleteMobReset", "deleteMobResetEquipment",
    "objectResets", "objectReset", "objectResetsByObject", "objectResetsByRoom", "objectResetsByZone",
    "createObjectReset", "updateObjectReset", "deleteObjectReset", "deleteSpawnCondition",
    "quests", "quest", "questsByZone", "createQuest", "updateQuest", "deleteQuest",
    "questPhases", "questPhase", "createQuestPhase", "updateQuestPhase", "deleteQuestPhase",
    "questObjectives", "questObjectivesByQuest", "questObjective",
    "createQuestObjective", "updateQuestObjective", "deleteQuestObjective",
    "questRewards", "questRewardChoiceGroups", "questReward",
    "createQuestReward", "updateQuestReward", "deleteQuestReward",
    "questPrerequisites", "addQuestPrerequisite", "removeQuestPrerequisite",
    "abilities", "ability", "createAbility", "updateAbility", "deleteAbility",
    "socials", "social", "createSocial", "updateSocial", "deleteSocial",
    "triggers", "trigger", "triggersByZone", "triggersByTarget",
    "createTrigger", "updateTrigger", "deleteTrigger",
    "users", "createUser", "setUserRole", "zoneGrants", "grantZone", "revokeZone",
];

fn parse<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, CmsError> {
    serde_json::from_value(value).map_err(|e| CmsError::Validation(format!("{}: {}", what, e)))
}

fn arg<T: DeserializeOwned>(args: &Value, name: &str) -> Result<T, CmsError> {
    let value = args.get(name).cloned().unwrap_or(Value::Null);
    parse(value, name)
}

fn data<T: DeserializeOwned>(args: &Value) -> Result<T, CmsError> {
    let value = args
        .get("data")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    parse(value, "data")
}

fn entity_key(args: &Value) -> Result<EntityKey, CmsError> {
    Ok(EntityKey::new(arg(args, "zoneId")?, arg(args, "id")?))
}

fn quest_key(args: &Value) -> Result<EntityKey, CmsError> {
    Ok(EntityKey::new(arg(args, "questZoneId")?, arg(args, "questId")?))
}

fn phase_key(args: &Value, id_field: &str) -> Result<PhaseKey, CmsError> {
    Ok(PhaseKey::new(quest_key(args)?, arg(args, id_field)?))
}

fn out<T: Serialize>(value: T) -> Result<Value, CmsError> {
    Ok(serde_json::to_value(value)?)
}

fn deleted(result: Result<(), CmsError>) -> Result<Value, CmsError> {
    result.map(|()| Value::Bool(true))
}

pub struct Api {
    store: Arc<CmsStore>,
    options: ApiOptions,
}

impl Api {
    pub fn new(store: Arc<CmsStore>, options: ApiOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &CmsStore {
        &self.store
    }

    pub fn options(&self) -> ApiOptions {
        self.options
    }

    /// Run one request to completion. Blocking; the server calls this from
    /// `spawn_blocking`.
    pub fn handle(&self, request: ApiRequest) -> ApiResponse {
        metrics::inc_requests();
        let result = self.execute(&request);
        let name = if OPERATIONS.contains(&request.operation.as_str()) {
            request.operation.as_str()
        } else {
            "(unknown)"
        };
        metrics::record_operation(name, result.is_err());
        match result {
            Ok(data) => ApiResponse::ok(request.id, data),
            Err(err) => {
                metrics::inc_request_errors();
                self.error_response(request, err)
            }
        }
    }

    fn error_response(&self, request: ApiRequest, err: CmsError) -> ApiResponse {
        let code = err.code();
        if err.is_client_error() {
            log::debug!("{} failed: {}", escape_log(&request.operation), err);
            ApiResponse::error(request.id, err.to_string(), code)
        } else {
            log::error!("{} failed: {}", escape_log(&request.operation), err);
            let message = if self.options.debug {
                err.to_string()
            } else {
                "internal error".to_string()
            };
            ApiResponse::error(request.id, message, code)
        }
    }

    fn execute(&self, request: &ApiRequest) -> Result<Value, CmsError> {
        let op = request.operation.as_str();
        if op == "operations" {
            if !self.options.playground {
                return Err(CmsError::Validation("unknown operation 'operations'".to_string()));
            }
            return out(OPERATIONS);
        }
        let actor = auth::resolve_actor(&self.store, request.actor.as_deref())?;
        let args = &request.args;
        if let Some(v) = self.world_op(op, &actor, args)? {
            return Ok(v);
        }
        if let Some(v) = self.reset_op(op, &actor, args)? {
            return Ok(v);
        }
        if let Some(v) = self.quest_op(op, &actor, args)? {
            return Ok(v);
        }
        if let Some(v) = self.catalog_op(op, &actor, args)? {
            return Ok(v);
        }
        if let Some(v) = self.admin_op(op, &actor, args)? {
            return Ok(v);
        }
        Err(CmsError::Validation(format!("unknown operation '{}'", escape_log(op))))
    }

    fn zone_write(&self, actor: &Actor, zone_id: ZoneId) -> Result<(), CmsError> {
        auth::authorize_zone_write(&self.store, actor, ZoneScope(zone_id))
    }

    fn world_op(&self, op: &str, actor: &Actor, a: &Value) -> Result<Option<Value>, CmsError> {
        let s = self.store.as_ref();
        let v = match op {
            "zones" => out(world::list_zones(s)?)?,
            "zone" => out(world::find_zone(s, arg(a, "id")?)?)?,
            "createZone" => {
                auth::authorize_global_write(actor)?;
                out(world::create_zone(s, data(a)?)?)?
            }
            "updateZone" => {
                let id: ZoneId = arg(a, "id")?;
                self.zone_write(actor, id)?;
                out(world::update_zone(s, id, data(a)?)?)?
            }
            "deleteZone" => {
                auth::authorize_global_write(actor)?;
                deleted(world::delete_zone(s, arg(a, "id")?))?
            }

            "rooms" => out(world::list_rooms(s)?)?,
            "room" => out(world::find_room(s, entity_key(a)?)?)?,
            "roomsByZone" => out(world::rooms_by_zone(s, arg(a, "zoneId")?)?)?,
            "createRoom" => {
                let input: world::RoomInput = data(a)?;
                self.zone_write(actor, input.zone_id)?;
                out(world::create_room(s, input)?)?
            }
            "updateRoom" => {
                let key = entity_key(a)?;
                self.zone_write(actor, key.zone_id)?;
                out(world::update_room(s, key, data(a)?)?)?
            }
            "deleteRoom" => {
                let key = entity_key(a)?;
                self.zone_write(actor, key.zone_id)?;
                deleted(world::delete_room(s, key))?
            }

            "mobs" => out(world::list_mobs(s)?)?,
            "mob" => out(world::find_mob(s, entity_key(a)?)?)?,
            "mobsByZone" => out(world::mobs_by_zone(s, arg(a, "zoneId")?)?)?,
            "createMob" => {
                let input: world::MobInput = data(a)?;
                self.zone_write(actor, input.zone_id)?;
                out(world::create_mob(s, input)?)?
            }
            "updateMob" => {
                let key = entity_key(a)?;
                self.zone_write(actor, key.zone_id)?;
                out(world::update_mob(s, key, data(a)?)?)?
            }
            "deleteMob" => {
                let key = entity_key(a)?;
                self.zone_write(actor, key.zone_id)?;
                deleted(world::delete_mob(s, key))?
            }

            "objects" => out(world::list_objects(s)?)?,
            "object" => out(world::find_object(s, entity_key(a)?)?)?,
            "objectsByZone" => out(world::objects_by_zone(s, arg(a, "zoneId")?)?)?,
            "createObject" => {
                let input: world::ObjectInput = data(a)?;
                self.zone_write(actor, input.zone_id)?;
                out(world::create_object(s, input)?)?
            }
            "updateObject" => {
                let key = entity_key(a)?;
                self.zone_write(actor, key.zone_id)?;
                out(world::update_object(s, key, data(a)?)?)?
            }
            "deleteObject" => {
                let key = entity_key(a)?;
                self.zone_write(actor, key.zone_id)?;
                deleted(world::delete_object(s, key))?
            }

            "shops" => out(world::list_shops(s)?)?,
            "shop" => out(world::find_shop(s, entity_key(a)?)?)?,
            "shopsByZone" => out(world::shops_by_zone(s, arg(a, "zoneId")?)?)?,
            "createShop" => {
                let input: world::ShopInput = data(a)?;
                self.zone_write(actor, input.zone_id)?;
                out(world::create_shop(s, input)?)?
            }
            "updateShop" => {
                let key = entity_key(a)?;
                self.zone_write(actor, key.zone_id)?;
                out(world::update_shop(s, key, data(a)?)?)?
            }
            "deleteShop" => {
                let key = entity_key(a)?;
                self.zone_write(actor, key.zone_id)?;
                deleted(world::delete_shop(s, key))?
            }
            _ => return Ok(None),
        };
        Ok(Some(v))
    }

    fn reset_op(&self, op: &str, actor: &Actor, a: &Value) -> Result<Option<Value>, CmsError> {
        let s = self.store.as_ref();
        let v = match op {
            "mobResets" => out(resets::list_mob_resets(s)?)?,
            "mobReset" => out(resets::find_mob_reset(s, arg(a, "id")?)?)?,
            "mobResetsByMob" => out(resets::find_mob_resets_by_mob(s, entity_key(a)?)?)?,
            "mobResetsByRoom" => out(resets::find_mob_resets_by_room(s, entity_key(a)?)?)?,
            "mobResetsByZone" => out(resets::find_mob_resets_by_zone(s, arg(a, "zoneId")?)?)?,
            "createMobReset" => {
                let input: resets::MobResetInput = data(a)?;
                self.zone_write(actor, input.room_zone_id)?;
                out(resets::create_mob_reset(s, input)?)?
            }
            "updateMobReset" => {
                let id: u64 = arg(a, "id")?;
                self.zone_write(actor, resets::mob_reset_zone(s, id)?)?;
                let patch: resets::MobResetUpdate = data(a)?;
                if let Some(zone) = patch.room_zone_id {
                    self.zone_write(actor, zone)?;
                }
                out(resets::update_mob_reset(s, id, patch)?)?
            }
            "deleteMobReset" => {
                let id: u64 = arg(a, "id")?;
                self.zone_write(actor, resets::mob_reset_zone(s, id)?)?;
                deleted(resets::delete_mob_reset(s, id))?
            }
            "deleteMobResetEquipment" => {
                let id: u64 = arg(a, "id")?;
                self.zone_write(actor, resets::equipment_zone(s, id)?)?;
                deleted(resets::delete_mob_reset_equipment(s, id))?
            }

            "objectResets" => out(resets::list_object_resets(s)?)?,
            "objectReset" => out(resets::find_object_reset(s, arg(a, "id")?)?)?,
            "objectResetsByObject" => out(resets::find_object_resets_by_object(s, entity_key(a)?)?)?,
            "objectResetsByRoom" => out(resets::find_object_resets_by_room(s, entity_key(a)?)?)?,
            "objectResetsByZone" => out(resets::find_object_resets_by_zone(s, arg(a, "zoneId")?)?)?,
            "createObjectReset" => {
                let input: resets::ObjectResetInput = data(a)?;
                self.zone_write(actor, input.room_zone_id)?;
                out(resets::create_object_reset(s, input)?)?
            }
            "updateObjectReset" => {
                let id: u64 = arg(a, "id")?;
                self.zone_write(actor, resets::object_reset_zone(s, id)?)?;
                let patch: resets::ObjectResetUpdate = data(a)?;
                if let Some(zone) = patch.room_zone_id {
                    self.zone_write(actor, zone)?;
                }
                out(resets::update_object_reset(s, id, patch)?)?
            }
            "deleteObjectReset" => {
                let id: u64 = arg(a, "id")?;
                self.zone_write(actor, resets::object_reset_zone(s, id)?)?;
                deleted(resets::delete_object_reset(s, id))?
            }
            "deleteSpawnCondition" => {
                let id: u64 = arg(a, "id")?;
                self.zone_write(actor, resets::condition_zone(s, id)?)?;
                deleted(resets::delete_spawn_condition(s, id))?
            }
            _ => return Ok(None),
        };
        Ok(Some(v))
    }

    fn quest_op(&self, op: &str, actor: &Actor, a: &Value) -> Result<Option<Value>, CmsError> {
        let s = self.store.as_ref();
        let v = match op {
            "quests" => out(quest::list_quests(s)?)?,
            "quest" => out(quest::find_quest(s, entity_key(a)?)?)?,
            "questsByZone" => out(quest::quests_by_zone(s, arg(a, "zoneId")?)?)?,
            "createQuest" => {
                let input: quest::QuestInput = data(a)?;
                self.zone_write(actor, input.zone_id)?;
                out(quest::create_quest(s, input)?)?
            }
            "updateQuest" => {
                let key = entity_key(a)?;
                self.zone_write(actor, key.zone_id)?;
                out(quest::update_quest(s, key, data(a)?)?)?
            }
            "deleteQuest" => {
                let key = entity_key(a)?;
                self.zone_write(actor, key.zone_id)?;
                deleted(quest::delete_quest(s, key))?
            }

            "questPhases" => out(quest::phases_by_quest(s, quest_key(a)?)?)?,
            "questPhase" => out(quest::find_phase(s, phase_key(a, "id")?)?)?,
            "createQuestPhase" => {
                let input: quest::PhaseInput = data(a)?;
                self.zone_write(actor, input.quest_zone_id)?;
                out(quest::create_phase(s, input)?)?
            }
            "updateQuestPhase" => {
                let key = phase_key(a, "id")?;
                self.zone_write(actor, key.quest.zone_id)?;
                out(quest::update_phase(s, key, data(a)?)?)?
            }
            "deleteQuestPhase" => {
                let key = phase_key(a, "id")?;
                self.zone_write(actor, key.quest.zone_id)?;
                deleted(quest::delete_phase(s, key))?
            }

            "questObjectives" => out(quest::objectives_by_phase(s, phase_key(a, "phaseId")?)?)?,
            "questObjectivesByQuest" => out(quest::objectives_by_quest(s, quest_key(a)?)?)?,
            "questObjective" => {
                let key = ObjectiveKey::new(phase_key(a, "phaseId")?, arg(a, "id")?);
                out(quest::find_objective(s, key)?)?
            }
            "createQuestObjective" => {
                let input: quest::ObjectiveInput = data(a)?;
                self.zone_write(actor, input.quest_zone_id)?;
                out(quest::create_objective(s, input)?)?
            }
            "updateQuestObjective" => {
                let key = ObjectiveKey::new(phase_key(a, "phaseId")?, arg(a, "id")?);
                self.zone_write(actor, key.phase.quest.zone_id)?;
                out(quest::update_objective(s, key, data(a)?)?)?
            }
            "deleteQuestObjective" => {
                let key = ObjectiveKey::new(phase_key(a, "phaseId")?, arg(a, "id")?);
                self.zone_write(actor, key.phase.quest.zone_id)?;
                deleted(quest::delete_objective(s, key))?
            }

            "questRewards" => out(quest::rewards_by_quest(s, quest_key(a)?)?)?,
            "questRewardChoiceGroups" => {
                let rewards = quest::rewards_by_quest(s, quest_key(a)?)?;
                out(quest::reward_choice_groups(rewards))?
            }
            "questReward" => {
                let key = RewardKey::new(quest_key(a)?, arg(a, "id")?);
                out(quest::find_reward(s, key)?)?
            }
            "createQuestReward" => {
                let input: quest::RewardInput = data(a)?;
                self.zone_write(actor, input.quest_zone_id)?;
                out(quest::create_reward(s, input)?)?
            }
            "updateQuestReward" => {
                let key = RewardKey::new(quest_key(a)?, arg(a, "id")?);
                self.zone_write(actor, key.quest.zone_id)?;
                out(quest::update_reward(s, key, data(a)?)?)?
            }
            "deleteQuestReward" => {
                let key = RewardKey::new(quest_key(a)?, arg(a, "id")?);
                self.zone_write(actor, key.quest.zone_id)?;
                deleted(quest::delete_reward(s, key))?
            }

            "questPrerequisites" => out(quest::prerequisites_by_quest(s, quest_key(a)?)?)?,
            "addQuestPrerequisite" => {
                let input: quest::PrerequisiteInput = data(a)?;
                self.zone_write(actor, input.quest_zone_id)?;
                out(quest::add_prerequisite(s, input)?)?
            }
            "removeQuestPrerequisite" => {
                let input: quest::PrerequisiteInput = data(a)?;
                self.zone_write(actor, input.quest_zone_id)?;
                deleted(quest::remove_prerequisite(s, input))?
            }
            _ => return Ok(None),
        };
        Ok(Some(v))
    }

    fn catalog_op(&self, op: &str, actor: &Actor, a: &Value) -> Result<Option<Value>, CmsError> {
        let s = self.store.as_ref();
        let v = match op {
            "abilities" => out(catalog::list_abilities(s)?)?,
            "ability" => out(catalog::find_ability(s, arg(a, "id")?)?)?,
            "createAbility" => {
                auth::authorize_global_write(actor)?;
                out(catalog::create_ability(s, data(a)?)?)?
            }
            "updateAbility" => {
                auth::authorize_global_write(actor)?;
                out(catalog::update_ability(s, arg(a, "id")?, data(a)?)?)?
            }
            "deleteAbility" => {
                auth::authorize_global_write(actor)?;
                deleted(catalog::delete_ability(s, arg(a, "id")?))?
            }

            "socials" => out(catalog::list_socials(s)?)?,
            "social" => out(catalog::find_social(s, &arg::<String>(a, "name")?)?)?,
            "createSocial" => {
                auth::authorize_global_write(actor)?;
                out(catalog::create_social(s, data(a)?)?)?
            }
            "updateSocial" => {
                auth::authorize_global_write(actor)?;
                out(catalog::update_social(s, &arg::<String>(a, "name")?, data(a)?)?)?
            }
            "deleteSocial" => {
                auth::authorize_global_write(actor)?;
                deleted(catalog::delete_social(s, &arg::<String>(a, "name")?))?
            }

            "triggers" => out(catalog::list_triggers(s)?)?,
            "trigger" => out(catalog::find_trigger(s, arg(a, "id")?)?)?,
            "triggersByZone" => out(catalog::triggers_by_zone(s, arg(a, "zoneId")?)?)?,
            "triggersByTarget" => out(catalog::triggers_by_target(s, entity_key(a)?)?)?,
            "createTrigger" => {
                let input: catalog::TriggerInput = data(a)?;
                self.zone_write(actor, input.zone_id)?;
                out(catalog::create_trigger(s, input)?)?
            }
            "updateTrigger" => {
                let id: u64 = arg(a, "id")?;
                self.zone_write(actor, catalog::trigger_zone(s, id)?)?;
                out(catalog::update_trigger(s, id, data(a)?)?)?
            }
            "deleteTrigger" => {
                let id: u64 = arg(a, "id")?;
                self.zone_write(actor, catalog::trigger_zone(s, id)?)?;
                deleted(catalog::delete_trigger(s, id))?
            }
            _ => return Ok(None),
        };
        Ok(Some(v))
    }

    fn admin_op(&self, op: &str, actor: &Actor, a: &Value) -> Result<Option<Value>, CmsError> {
        let s = self.store.as_ref();
        let v = match op {
            "me" => {
                auth::authorize_read(actor)?;
                serde_json::json!({ "username": actor.username, "role": actor.role })
            }
            "users" => {
                auth::authorize_global_write(actor)?;
                out(auth::list_users(s)?)?
            }
            "createUser" => {
                auth::authorize_global_write(actor)?;
                let role: Option<Role> = arg(a, "role")?;
                out(auth::create_user(s, actor, &arg::<String>(a, "username")?, role.unwrap_or(Role::Builder))?)?
            }
            "setUserRole" => {
                auth::authorize_global_write(actor)?;
                out(auth::set_role(s, actor, &arg::<String>(a, "username")?, arg(a, "role")?)?)?
            }
            "zoneGrants" => {
                let username: String = arg(a, "username")?;
                if !username.eq_ignore_ascii_case(&actor.username) {
                    auth::authorize_global_write(actor)?;
                }
                out(auth::list_grants(s, &username)?)?
            }
            "grantZone" => {
                auth::authorize_global_write(actor)?;
                out(auth::grant_zone(s, actor, data(a)?)?)?
            }
            "revokeZone" => {
                auth::authorize_global_write(actor)?;
                deleted(auth::revoke_zone(
                    s,
                    actor,
                    &arg::<String>(a, "username")?,
                    arg(a, "zoneId")?,
                ))?
            }
            _ => return Ok(None),
        };
        Ok(Some(v))
    }
}
