//! Quest hierarchy: quests, their ordered phases, phase objectives, rewards
//! and prerequisite edges between quests.
//!
//! Every level is addressed by its full key chain supplied by the caller.
//! Parents must exist before children are created; deletes cascade downward
//! inside the store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cms::dto::{apply, double_option, key_pair, patch_key_pair, EntitySummary};
use crate::cms::errors::CmsError;
use crate::cms::keys::{EntityKey, ObjectiveKey, PhaseKey, PrerequisiteKey, RewardKey, ZoneId};
use crate::cms::storage::CmsStore;
use crate::cms::types::*;
use crate::cms::world::{mob_summary, object_summary, room_summary};
use crate::validation::{require_text, validate_at_least_one, validate_level_range};

const DEFAULT_MAX_LEVEL: u32 = 100;

// ============================================================================
// Quests
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestInput {
    pub zone_id: ZoneId,
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub min_level: Option<u32>,
    #[serde(default)]
    pub max_level: Option<u32>,
    #[serde(default)]
    pub trigger_type: Option<QuestTriggerType>,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub giver_mob_zone_id: Option<ZoneId>,
    #[serde(default)]
    pub giver_mob_id: Option<u32>,
    #[serde(default)]
    pub completer_mob_zone_id: Option<ZoneId>,
    #[serde(default)]
    pub completer_mob_id: Option<u32>,
    #[serde(default)]
    pub time_limit_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub min_level: Option<u32>,
    pub max_level: Option<u32>,
    pub trigger_type: Option<QuestTriggerType>,
    pub repeatable: Option<bool>,
    pub hidden: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub giver_mob_zone_id: Option<Option<ZoneId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub giver_mob_id: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub completer_mob_zone_id: Option<Option<ZoneId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub completer_mob_id: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub time_limit_minutes: Option<Option<u32>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestDto {
    pub zone_id: ZoneId,
    pub id: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub min_level: u32,
    pub max_level: u32,
    pub trigger_type: QuestTriggerType,
    pub repeatable: bool,
    pub hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub giver_mob: Option<EntitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completer_mob: Option<EntitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn quest_dto(store: &CmsStore, quest: QuestRecord) -> Result<QuestDto, CmsError> {
    Ok(QuestDto {
        zone_id: quest.key.zone_id,
        id: quest.key.id,
        name: quest.name,
        description: quest.description,
        min_level: quest.min_level,
        max_level: quest.max_level,
        trigger_type: quest.trigger_type,
        repeatable: quest.repeatable,
        hidden: quest.hidden,
        giver_mob: quest.giver.map(|k| mob_summary(store, k)).transpose()?,
        completer_mob: quest.completer.map(|k| mob_summary(store, k)).transpose()?,
        time_limit_minutes: quest.time_limit_minutes,
        created_at: quest.created_at,
        updated_at: quest.updated_at,
    })
}

pub fn list_quests(store: &CmsStore) -> Result<Vec<QuestDto>, CmsError> {
    store.list_quests()?.into_iter().map(|q| quest_dto(store, q)).collect()
}

pub fn quests_by_zone(store: &CmsStore, zone_id: ZoneId) -> Result<Vec<QuestDto>, CmsError> {
    store
        .list_quests_in_zone(zone_id)?
        .into_iter()
        .map(|q| quest_dto(store, q))
        .collect()
}

pub fn find_quest(store: &CmsStore, key: EntityKey) -> Result<QuestDto, CmsError> {
    let quest = store.get_quest(&key)?;
    quest_dto(store, quest)
}

pub fn create_quest(store: &CmsStore, input: QuestInput) -> Result<QuestDto, CmsError> {
    let min_level = input.min_level.unwrap_or(1);
    let max_level = input.max_level.unwrap_or(DEFAULT_MAX_LEVEL);
    validate_level_range(min_level, max_level)?;
    let now = Utc::now();
    let quest = QuestRecord {
        key: EntityKey::new(input.zone_id, input.id),
        name: require_text("name", &input.name)?,
        description: input.description,
        min_level,
        max_level,
        trigger_type: input.trigger_type.unwrap_or_default(),
        repeatable: input.repeatable,
        hidden: input.hidden,
        giver: key_pair("giverMob", input.giver_mob_zone_id, input.giver_mob_id)?,
        completer: key_pair("completerMob", input.completer_mob_zone_id, input.completer_mob_id)?,
        time_limit_minutes: input.time_limit_minutes,
        created_at: now,
        updated_at: now,
        schema_version: QUEST_SCHEMA_VERSION,
    };
    let quest = store.create_quest(quest)?;
    log::debug!("Created quest {}", quest.key);
    quest_dto(store, quest)
}

pub fn update_quest(store: &CmsStore, key: EntityKey, patch: QuestPatch) -> Result<QuestDto, CmsError> {
    let mut quest = store.get_quest(&key)?;
    if let Some(name) = patch.name {
        quest.name = require_text("name", &name)?;
    }
    apply(&mut quest.description, patch.description);
    apply(&mut quest.min_level, patch.min_level);
    apply(&mut quest.max_level, patch.max_level);
    validate_level_range(quest.min_level, quest.max_level)?;
    apply(&mut quest.trigger_type, patch.trigger_type);
    apply(&mut quest.repeatable, patch.repeatable);
    apply(&mut quest.hidden, patch.hidden);
    apply(
        &mut quest.giver,
        patch_key_pair("giverMob", patch.giver_mob_zone_id, patch.giver_mob_id)?,
    );
    apply(
        &mut quest.completer,
        patch_key_pair("completerMob", patch.completer_mob_zone_id, patch.completer_mob_id)?,
    );
    apply(&mut quest.time_limit_minutes, patch.time_limit_minutes);
    quest.updated_at = Utc::now();
    let quest = store.update_quest(quest)?;
    quest_dto(store, quest)
}

pub fn delete_quest(store: &CmsStore, key: EntityKey) -> Result<(), CmsError> {
    store.delete_quest(&key)?;
    log::debug!("Deleted quest {} and its hierarchy", key);
    Ok(())
}

// ============================================================================
// Phases
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseInput {
    pub quest_zone_id: ZoneId,
    pub quest_id: u32,
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to the phase id when omitted.
    #[serde(default)]
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhasePatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDto {
    pub quest_zone_id: ZoneId,
    pub quest_id: u32,
    pub id: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub order: i32,
}

impl From<QuestPhaseRecord> for PhaseDto {
    fn from(p: QuestPhaseRecord) -> Self {
        Self {
            quest_zone_id: p.key.quest.zone_id,
            quest_id: p.key.quest.id,
            id: p.key.id,
            name: p.name,
            description: p.description,
            order: p.order,
        }
    }
}

/// Phases ordered by `order`, then id. Gaps and duplicate orders are kept.
pub fn phases_by_quest(store: &CmsStore, quest: EntityKey) -> Result<Vec<PhaseDto>, CmsError> {
    Ok(store.phases_for_quest(&quest)?.into_iter().map(PhaseDto::from).collect())
}

pub fn find_phase(store: &CmsStore, key: PhaseKey) -> Result<PhaseDto, CmsError> {
    store.get_phase(&key).map(PhaseDto::from)
}

pub fn create_phase(store: &CmsStore, input: PhaseInput) -> Result<PhaseDto, CmsError> {
    let key = PhaseKey::new(EntityKey::new(input.quest_zone_id, input.quest_id), input.id);
    let order = match input.order {
        Some(order) => order,
        None => i32::try_from(input.id).map_err(|_| {
            CmsError::Validation(format!("phase id {} needs an explicit order", input.id))
        })?,
    };
    let phase = QuestPhaseRecord {
        key,
        name: require_text("name", &input.name)?,
        description: input.description,
        order,
        schema_version: QUEST_SCHEMA_VERSION,
    };
    store.create_phase(phase).map(PhaseDto::from)
}

pub fn update_phase(store: &CmsStore, key: PhaseKey, patch: PhasePatch) -> Result<PhaseDto, CmsError> {
    let mut phase = store.get_phase(&key)?;
    if let Some(name) = patch.name {
        phase.name = require_text("name", &name)?;
    }
    apply(&mut phase.description, patch.description);
    apply(&mut phase.order, patch.order);
    store.update_phase(phase).map(PhaseDto::from)
}

pub fn delete_phase(store: &CmsStore, key: PhaseKey) -> Result<(), CmsError> {
    store.delete_phase(&key)
}

// ============================================================================
// Objectives
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveInput {
    pub quest_zone_id: ZoneId,
    pub quest_id: u32,
    pub phase_id: u32,
    pub id: u32,
    pub objective_type: ObjectiveType,
    pub player_description: String,
    #[serde(default)]
    pub internal_note: Option<String>,
    #[serde(default)]
    pub required_count: Option<u32>,
    #[serde(default)]
    pub show_progress: Option<bool>,
    #[serde(default)]
    pub target_mob_zone_id: Option<ZoneId>,
    #[serde(default)]
    pub target_mob_id: Option<u32>,
    #[serde(default)]
    pub target_object_zone_id: Option<ZoneId>,
    #[serde(default)]
    pub target_object_id: Option<u32>,
    #[serde(default)]
    pub target_room_zone_id: Option<ZoneId>,
    #[serde(default)]
    pub target_room_id: Option<u32>,
    #[serde(default)]
    pub deliver_to_mob_zone_id: Option<ZoneId>,
    #[serde(default)]
    pub deliver_to_mob_id: Option<u32>,
    #[serde(default)]
    pub target_skill: Option<String>,
    #[serde(default)]
    pub lua_expression: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectivePatch {
    pub objective_type: Option<ObjectiveType>,
    pub player_description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub internal_note: Option<Option<String>>,
    pub required_count: Option<u32>,
    pub show_progress: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_mob_zone_id: Option<Option<ZoneId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_mob_id: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_object_zone_id: Option<Option<ZoneId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_object_id: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_room_zone_id: Option<Option<ZoneId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_room_id: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub deliver_to_mob_zone_id: Option<Option<ZoneId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub deliver_to_mob_id: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_skill: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub lua_expression: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveDto {
    pub quest_zone_id: ZoneId,
    pub quest_id: u32,
    pub phase_id: u32,
    pub id: u32,
    pub objective_type: ObjectiveType,
    pub player_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_note: Option<String>,
    pub required_count: u32,
    pub show_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_mob: Option<EntitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_object: Option<EntitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_room: Option<EntitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliver_to_mob: Option<EntitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_skill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lua_expression: Option<String>,
}

fn objective_dto(store: &CmsStore, o: QuestObjectiveRecord) -> Result<ObjectiveDto, CmsError> {
    Ok(ObjectiveDto {
        quest_zone_id: o.key.phase.quest.zone_id,
        quest_id: o.key.phase.quest.id,
        phase_id: o.key.phase.id,
        id: o.key.id,
        objective_type: o.objective_type,
        player_description: o.player_description,
        internal_note: o.internal_note,
        required_count: o.required_count,
        show_progress: o.show_progress,
        target_mob: o.target_mob.map(|k| mob_summary(store, k)).transpose()?,
        target_object: o.target_object.map(|k| object_summary(store, k)).transpose()?,
        target_room: o.target_room.map(|k| room_summary(store, k)).transpose()?,
        deliver_to_mob: o.deliver_to_mob.map(|k| mob_summary(store, k)).transpose()?,
        target_skill: o.target_skill,
        lua_expression: o.lua_expression,
    })
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |s| !s.trim().is_empty())
}

/// Each objective type names the target fields it needs.
pub fn check_objective_targets(o: &QuestObjectiveRecord) -> Result<(), CmsError> {
    let missing = match o.objective_type {
        ObjectiveType::KillMob | ObjectiveType::TalkToNpc if o.target_mob.is_none() => Some("targetMob"),
        ObjectiveType::CollectItem if o.target_object.is_none() => Some("targetObject"),
        ObjectiveType::DeliverItem if o.target_object.is_none() => Some("targetObject"),
        ObjectiveType::DeliverItem if o.deliver_to_mob.is_none() => Some("deliverToMob"),
        ObjectiveType::VisitRoom if o.target_room.is_none() => Some("targetRoom"),
        ObjectiveType::UseSkill if !has_text(&o.target_skill) => Some("targetSkill"),
        ObjectiveType::CustomLua if !has_text(&o.lua_expression) => Some("luaExpression"),
        _ => None,
    };
    match missing {
        Some(field) => Err(CmsError::Validation(format!(
            "{:?} objective requires {}",
            o.objective_type, field
        ))),
        None => Ok(()),
    }
}

pub fn objectives_by_phase(store: &CmsStore, phase: PhaseKey) -> Result<Vec<ObjectiveDto>, CmsError> {
    store
        .objectives_for_phase(&phase)?
        .into_iter()
        .map(|o| objective_dto(store, o))
        .collect()
}

pub fn objectives_by_quest(store: &CmsStore, quest: EntityKey) -> Result<Vec<ObjectiveDto>, CmsError> {
    store
        .objectives_for_quest(&quest)?
        .into_iter()
        .map(|o| objective_dto(store, o))
        .collect()
}

pub fn find_objective(store: &CmsStore, key: ObjectiveKey) -> Result<ObjectiveDto, CmsError> {
    let objective = store.get_objective(&key)?;
    objective_dto(store, objective)
}

pub fn create_objective(store: &CmsStore, input: ObjectiveInput) -> Result<ObjectiveDto, CmsError> {
    let phase = PhaseKey::new(EntityKey::new(input.quest_zone_id, input.quest_id), input.phase_id);
    let objective = QuestObjectiveRecord {
        key: ObjectiveKey::new(phase, input.id),
        objective_type: input.objective_type,
        player_description: require_text("playerDescription", &input.player_description)?,
        internal_note: input.internal_note,
        required_count: validate_at_least_one("requiredCount", input.required_count.unwrap_or(1))?,
        show_progress: input.show_progress.unwrap_or(true),
        target_mob: key_pair("targetMob", input.target_mob_zone_id, input.target_mob_id)?,
        target_object: key_pair("targetObject", input.target_object_zone_id, input.target_object_id)?,
        target_room: key_pair("targetRoom", input.target_room_zone_id, input.target_room_id)?,
        deliver_to_mob: key_pair("deliverToMob", input.deliver_to_mob_zone_id, input.deliver_to_mob_id)?,
        target_skill: input.target_skill,
        lua_expression: input.lua_expression,
        schema_version: QUEST_SCHEMA_VERSION,
    };
    check_objective_targets(&objective)?;
    let objective = store.create_objective(objective)?;
    objective_dto(store, objective)
}

pub fn update_objective(
    store: &CmsStore,
    key: ObjectiveKey,
    patch: ObjectivePatch,
) -> Result<ObjectiveDto, CmsError> {
    let mut o = store.get_objective(&key)?;
    apply(&mut o.objective_type, patch.objective_type);
    if let Some(text) = patch.player_description {
        o.player_description = require_text("playerDescription", &text)?;
    }
    apply(&mut o.internal_note, patch.internal_note);
    if let Some(count) = patch.required_count {
        o.required_count = validate_at_least_one("requiredCount", count)?;
    }
    apply(&mut o.show_progress, patch.show_progress);
    apply(
        &mut o.target_mob,
        patch_key_pair("targetMob", patch.target_mob_zone_id, patch.target_mob_id)?,
    );
    apply(
        &mut o.target_object,
        patch_key_pair("targetObject", patch.target_object_zone_id, patch.target_object_id)?,
    );
    apply(
        &mut o.target_room,
        patch_key_pair("targetRoom", patch.target_room_zone_id, patch.target_room_id)?,
    );
    apply(
        &mut o.deliver_to_mob,
        patch_key_pair("deliverToMob", patch.deliver_to_mob_zone_id, patch.deliver_to_mob_id)?,
    );
    apply(&mut o.target_skill, patch.target_skill);
    apply(&mut o.lua_expression, patch.lua_expression);
    check_objective_targets(&o)?;
    let o = store.update_objective(o)?;
    objective_dto(store, o)
}

pub fn delete_objective(store: &CmsStore, key: ObjectiveKey) -> Result<(), CmsError> {
    store.delete_objective(&key)
}

// ============================================================================
// Rewards
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardInput {
    pub quest_zone_id: ZoneId,
    pub quest_id: u32,
    pub id: u32,
    pub reward_type: RewardType,
    #[serde(default)]
    pub amount: Option<u32>,
    #[serde(default)]
    pub object_zone_id: Option<ZoneId>,
    #[serde(default)]
    pub object_id: Option<u32>,
    #[serde(default)]
    pub ability_id: Option<u32>,
    #[serde(default)]
    pub choice_group: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardPatch {
    pub reward_type: Option<RewardType>,
    #[serde(default, deserialize_with = "double_option")]
    pub amount: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub object_zone_id: Option<Option<ZoneId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub object_id: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ability_id: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub choice_group: Option<Option<u32>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RewardDto {
    pub quest_zone_id: ZoneId,
    pub quest_id: u32,
    pub id: u32,
    pub reward_type: RewardType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<EntitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ability_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice_group: Option<u32>,
}

/// Rewards sharing a choice group. `choice_group == None` collects the
/// rewards that are always granted.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RewardChoiceGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice_group: Option<u32>,
    pub rewards: Vec<RewardDto>,
}

fn reward_dto(store: &CmsStore, r: QuestRewardRecord) -> Result<RewardDto, CmsError> {
    Ok(RewardDto {
        quest_zone_id: r.key.quest.zone_id,
        quest_id: r.key.quest.id,
        id: r.key.id,
        reward_type: r.reward_type,
        amount: r.amount,
        object: r.object.map(|k| object_summary(store, k)).transpose()?,
        ability_id: r.ability_id,
        choice_group: r.choice_group,
    })
}

fn check_reward_payload(r: &QuestRewardRecord) -> Result<(), CmsError> {
    let ok = match r.reward_type {
        RewardType::Experience | RewardType::Gold => r.amount.map_or(false, |a| a > 0),
        RewardType::Item => r.object.is_some(),
        RewardType::Ability => r.ability_id.is_some(),
    };
    if !ok {
        let needs = match r.reward_type {
            RewardType::Experience | RewardType::Gold => "a positive amount",
            RewardType::Item => "objectZoneId and objectId",
            RewardType::Ability => "abilityId",
        };
        return Err(CmsError::Validation(format!("{:?} reward requires {}", r.reward_type, needs)));
    }
    Ok(())
}

pub fn rewards_by_quest(store: &CmsStore, quest: EntityKey) -> Result<Vec<RewardDto>, CmsError> {
    store
        .rewards_for_quest(&quest)?
        .into_iter()
        .map(|r| reward_dto(store, r))
        .collect()
}

/// Group a quest's rewards by choice group for display. Ungrouped rewards
/// come first.
pub fn reward_choice_groups(rewards: Vec<RewardDto>) -> Vec<RewardChoiceGroup> {
    let mut groups: BTreeMap<Option<u32>, Vec<RewardDto>> = BTreeMap::new();
    for reward in rewards {
        groups.entry(reward.choice_group).or_default().push(reward);
    }
    groups
        .into_iter()
        .map(|(choice_group, rewards)| RewardChoiceGroup { choice_group, rewards })
        .collect()
}

pub fn find_reward(store: &CmsStore, key: RewardKey) -> Result<RewardDto, CmsError> {
    let reward = store.get_reward(&key)?;
    reward_dto(store, reward)
}

pub fn create_reward(store: &CmsStore, input: RewardInput) -> Result<RewardDto, CmsError> {
    let reward = QuestRewardRecord {
        key: RewardKey::new(EntityKey::new(input.quest_zone_id, input.quest_id), input.id),
        reward_type: input.reward_type,
        amount: input.amount,
        object: key_pair("object", input.object_zone_id, input.object_id)?,
        ability_id: input.ability_id,
        choice_group: input.choice_group,
        schema_version: QUEST_SCHEMA_VERSION,
    };
    check_reward_payload(&reward)?;
    let reward = store.create_reward(reward)?;
    reward_dto(store, reward)
}

pub fn update_reward(store: &CmsStore, key: RewardKey, patch: RewardPatch) -> Result<RewardDto, CmsError> {
    let mut r = store.get_reward(&key)?;
    apply(&mut r.reward_type, patch.reward_type);
    apply(&mut r.amount, patch.amount);
    apply(&mut r.object, patch_key_pair("object", patch.object_zone_id, patch.object_id)?);
    apply(&mut r.ability_id, patch.ability_id);
    apply(&mut r.choice_group, patch.choice_group);
    check_reward_payload(&r)?;
    let r = store.update_reward(r)?;
    reward_dto(store, r)
}

pub fn delete_reward(store: &CmsStore, key: RewardKey) -> Result<(), CmsError> {
    store.delete_reward(&key)
}

// ============================================================================
// Prerequisites
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteInput {
    pub quest_zone_id: ZoneId,
    pub quest_id: u32,
    pub prerequisite_quest_zone_id: ZoneId,
    pub prerequisite_quest_id: u32,
}

impl PrerequisiteInput {
    pub fn key(&self) -> PrerequisiteKey {
        PrerequisiteKey::new(
            EntityKey::new(self.quest_zone_id, self.quest_id),
            EntityKey::new(self.prerequisite_quest_zone_id, self.prerequisite_quest_id),
        )
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteDto {
    pub quest_zone_id: ZoneId,
    pub quest_id: u32,
    pub prerequisite: EntitySummary,
    pub created_at: DateTime<Utc>,
}

fn prerequisite_dto(store: &CmsStore, edge: QuestPrerequisiteRecord) -> Result<PrerequisiteDto, CmsError> {
    let name = store
        .quest_exists(&edge.key.requires)?
        .then(|| store.get_quest(&edge.key.requires).map(|q| q.name))
        .transpose()?;
    Ok(PrerequisiteDto {
        quest_zone_id: edge.key.quest.zone_id,
        quest_id: edge.key.quest.id,
        prerequisite: EntitySummary::new(edge.key.requires, name),
        created_at: edge.created_at,
    })
}

pub fn prerequisites_by_quest(store: &CmsStore, quest: EntityKey) -> Result<Vec<PrerequisiteDto>, CmsError> {
    store
        .prerequisites_for_quest(&quest)?
        .into_iter()
        .map(|edge| prerequisite_dto(store, edge))
        .collect()
}

/// Self references are rejected here, before anything is read from storage.
pub fn add_prerequisite(store: &CmsStore, input: PrerequisiteInput) -> Result<PrerequisiteDto, CmsError> {
    let key = input.key();
    if key.is_self_reference() {
        return Err(CmsError::Validation(format!("quest {} cannot require itself", key.quest)));
    }
    let edge = QuestPrerequisiteRecord {
        key,
        created_at: Utc::now(),
        schema_version: QUEST_SCHEMA_VERSION,
    };
    let edge = store.add_prerequisite(edge)?;
    prerequisite_dto(store, edge)
}

pub fn remove_prerequisite(store: &CmsStore, input: PrerequisiteInput) -> Result<(), CmsError> {
    store.remove_prerequisite(&input.key())
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
        store.create_zone(ZoneRecord::new(12, "Quest Hall")).unwrap();
        (store, dir)
    }

    fn quest(store: &CmsStore, id: u32) -> QuestDto {
        create_quest(
            store,
            serde_json::from_value(json!({"zoneId": 12, "id": id, "name": format!("Quest {}", id)})).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn trigger_type_defaults_to_mob() {
        let (store, _dir) = store();
        assert_eq!(quest(&store, 1).trigger_type, QuestTriggerType::Mob);
    }

    #[test]
    fn level_range_enforced() {
        let (store, _dir) = store();
        let input: QuestInput = serde_json::from_value(json!({
            "zoneId": 12, "id": 2, "name": "Upside down", "minLevel": 50, "maxLevel": 10
        }))
        .unwrap();
        assert!(matches!(create_quest(&store, input), Err(CmsError::Validation(_))));
    }

    #[test]
    fn phases_sorted_by_order_then_id() {
        let (store, _dir) = store();
        quest(&store, 1);
        for (id, order) in [(1, 20), (2, 5), (3, 20)] {
            create_phase(
                &store,
                serde_json::from_value(json!({
                    "questZoneId": 12, "questId": 1, "id": id, "name": "p", "order": order
                }))
                .unwrap(),
            )
            .unwrap();
        }
        let ids: Vec<u32> = phases_by_quest(&store, EntityKey::new(12, 1))
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn phase_order_defaults_to_id_within_range() {
        let (store, _dir) = store();
        quest(&store, 1);
        let phase = |id: u32, order: Option<i32>| -> PhaseInput {
            serde_json::from_value(json!({
                "questZoneId": 12, "questId": 1, "id": id, "name": "p", "order": order
            }))
            .unwrap()
        };
        assert_eq!(create_phase(&store, phase(7, None)).unwrap().order, 7);

        let big = i32::MAX as u32 + 1;
        assert!(matches!(create_phase(&store, phase(big, None)), Err(CmsError::Validation(_))));
        assert_eq!(create_phase(&store, phase(big, Some(3))).unwrap().order, 3);
    }

    #[test]
    fn objective_targets_checked_per_type() {
        let (store, _dir) = store();
        quest(&store, 1);
        create_phase(
            &store,
            serde_json::from_value(json!({"questZoneId": 12, "questId": 1, "id": 1, "name": "p"})).unwrap(),
        )
        .unwrap();
        let kill: ObjectiveInput = serde_json::from_value(json!({
            "questZoneId": 12, "questId": 1, "phaseId": 1, "id": 1,
            "objectiveType": "KILL_MOB", "playerDescription": "Slay the rat"
        }))
        .unwrap();
        assert!(matches!(create_objective(&store, kill), Err(CmsError::Validation(_))));

        let lua: ObjectiveInput = serde_json::from_value(json!({
            "questZoneId": 12, "questId": 1, "phaseId": 1, "id": 2,
            "objectiveType": "CUSTOM_LUA", "playerDescription": "Ring the bell",
            "luaExpression": "actor.flags.bell_rung"
        }))
        .unwrap();
        let dto = create_objective(&store, lua).unwrap();
        assert_eq!(dto.required_count, 1);
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("targetMob").is_none());
    }

    #[test]
    fn patch_null_clears_and_omission_keeps() {
        let (store, _dir) = store();
        create_quest(
            &store,
            serde_json::from_value(json!({
                "zoneId": 12, "id": 3, "name": "Timed", "description": "Hurry", "timeLimitMinutes": 30
            }))
            .unwrap(),
        )
        .unwrap();
        let patch: QuestPatch = serde_json::from_value(json!({"timeLimitMinutes": null})).unwrap();
        let dto = update_quest(&store, EntityKey::new(12, 3), patch).unwrap();
        assert_eq!(dto.time_limit_minutes, None);
        assert_eq!(dto.description.as_deref(), Some("Hurry"));
    }

    #[test]
    fn prerequisite_rules() {
        let (store, _dir) = store();
        quest(&store, 1);
        quest(&store, 2);
        let self_ref: PrerequisiteInput = serde_json::from_value(json!({
            "questZoneId": 12, "questId": 1, "prerequisiteQuestZoneId": 12, "prerequisiteQuestId": 1
        }))
        .unwrap();
        assert!(matches!(add_prerequisite(&store, self_ref), Err(CmsError::Validation(_))));

        let edge: PrerequisiteInput = serde_json::from_value(json!({
            "questZoneId": 12, "questId": 2, "prerequisiteQuestZoneId": 12, "prerequisiteQuestId": 1
        }))
        .unwrap();
        let dto = add_prerequisite(&store, edge.clone()).unwrap();
        assert_eq!(dto.prerequisite.name.as_deref(), Some("Quest 1"));
        assert!(matches!(add_prerequisite(&store, edge), Err(CmsError::AlreadyExists(_))));

        let missing: PrerequisiteInput = serde_json::from_value(json!({
            "questZoneId": 12, "questId": 2, "prerequisiteQuestZoneId": 12, "prerequisiteQuestId": 99
        }))
        .unwrap();
        assert!(matches!(add_prerequisite(&store, missing), Err(CmsError::Constraint(_))));
    }

    #[test]
    fn choice_groups_bucket_rewards() {
        let (store, _dir) = store();
        quest(&store, 1);
        for (id, group) in [(1, None), (2, Some(1)), (3, Some(1))] {
            create_reward(
                &store,
                serde_json::from_value(json!({
                    "questZoneId": 12, "questId": 1, "id": id,
                    "rewardType": "GOLD", "amount": 10, "choiceGroup": group
                }))
                .unwrap(),
            )
            .unwrap();
        }
        let groups = reward_choice_groups(rewards_by_quest(&store, EntityKey::new(12, 1)).unwrap());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].choice_group, None);
        assert_eq!(groups[1].rewards.len(), 2);
    }
}
