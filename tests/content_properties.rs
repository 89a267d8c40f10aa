//! End-to-end behavior of the content services through operation dispatch:
//! optional-field shaping, probability bounds, quest cascade, defaults,
//! prerequisite self reference, mob flag round trip and non-destructive
//! reset updates.

mod common;

use common::TestWorld;
use fierycms::cms::EntityKey;
use fierycms::cms::MobFlag;
use serde_json::json;

fn reset_world(w: &TestWorld) {
    w.zone(5);
    w.zone(30);
    w.room(30, 1);
    w.mob(30, 10);
    w.object(5, 200);
    w.object(5, 201);
}

#[test]
fn null_wear_location_is_absent_from_reset_json() {
    let w = TestWorld::new();
    reset_world(&w);
    let reset = w.ok(
        "root",
        "createMobReset",
        json!({ "data": {
            "mobZoneId": 30, "mobId": 10, "roomZoneId": 30, "roomId": 1,
            "equipment": [
                { "objectZoneId": 5, "objectId": 200, "wearLocation": null },
                { "objectZoneId": 5, "objectId": 201, "wearLocation": "WIELD" }
            ]
        } }),
    );
    let equipment = reset["equipment"].as_array().unwrap();
    assert_eq!(equipment.len(), 2);
    let plain = equipment.iter().find(|e| e["object"]["id"] == 200).unwrap();
    assert!(plain.get("wearLocation").is_none(), "{}", plain);
    let wielded = equipment.iter().find(|e| e["object"]["id"] == 201).unwrap();
    assert_eq!(wielded["wearLocation"], "WIELD");
}

#[test]
fn probabilities_outside_unit_interval_are_rejected() {
    let w = TestWorld::new();
    reset_world(&w);
    for bad in [-0.1, 1.5] {
        let code = w.err(
            "root",
            "createMobReset",
            json!({ "data": {
                "mobZoneId": 30, "mobId": 10, "roomZoneId": 30, "roomId": 1,
                "probability": bad
            } }),
        );
        assert_eq!(code, "BAD_USER_INPUT");

        let code = w.err(
            "root",
            "createObjectReset",
            json!({ "data": {
                "objectZoneId": 5, "objectId": 200, "roomZoneId": 30, "roomId": 1,
                "probability": bad
            } }),
        );
        assert_eq!(code, "BAD_USER_INPUT");
    }
    assert_eq!(w.store().counts().mob_resets, 0);
    assert_eq!(w.store().counts().object_resets, 0);

    for good in [0.0, 1.0] {
        w.ok(
            "root",
            "createMobReset",
            json!({ "data": {
                "mobZoneId": 30, "mobId": 10, "roomZoneId": 30, "roomId": 1,
                "probability": good
            } }),
        );
    }
}

#[test]
fn deleting_a_quest_leaves_no_children() {
    let w = TestWorld::new();
    w.zone(30);
    w.zone(31);
    w.quest(30, 1);
    w.quest(31, 7);
    w.ok("root", "createQuestPhase", json!({ "data": { "questZoneId": 30, "questId": 1, "id": 1, "name": "Begin" } }));
    w.ok("root", "createQuestPhase", json!({ "data": { "questZoneId": 30, "questId": 1, "id": 2, "name": "End" } }));
    w.ok(
        "root",
        "createQuestObjective",
        json!({ "data": {
            "questZoneId": 30, "questId": 1, "phaseId": 1, "id": 1,
            "objectiveType": "CUSTOM_LUA",
            "playerDescription": "Ring the bell",
            "luaExpression": "return bell_rung"
        } }),
    );
    w.ok(
        "root",
        "createQuestReward",
        json!({ "data": { "questZoneId": 30, "questId": 1, "id": 1, "rewardType": "EXPERIENCE", "amount": 500 } }),
    );
    // Both directions: 30:1 requires 31:7 and 31:7 requires 30:1.
    w.ok(
        "root",
        "addQuestPrerequisite",
        json!({ "data": { "questZoneId": 30, "questId": 1, "prerequisiteQuestZoneId": 31, "prerequisiteQuestId": 7 } }),
    );
    w.ok(
        "root",
        "addQuestPrerequisite",
        json!({ "data": { "questZoneId": 31, "questId": 7, "prerequisiteQuestZoneId": 30, "prerequisiteQuestId": 1 } }),
    );

    assert_eq!(w.ok("root", "deleteQuest", json!({ "zoneId": 30, "id": 1 })), json!(true));

    let quest = EntityKey::new(30, 1);
    let store = w.store();
    assert!(store.phases_for_quest(&quest).unwrap().is_empty());
    assert!(store.objectives_for_quest(&quest).unwrap().is_empty());
    assert!(store.rewards_for_quest(&quest).unwrap().is_empty());
    assert!(store.prerequisites_for_quest(&quest).unwrap().is_empty());
    assert!(store
        .prerequisites_for_quest(&EntityKey::new(31, 7))
        .unwrap()
        .is_empty());
    assert_eq!(w.err("root", "quest", json!({ "zoneId": 30, "id": 1 })), "NOT_FOUND");
    // The other quest survives.
    w.ok("root", "quest", json!({ "zoneId": 31, "id": 7 }));
}

#[test]
fn quest_trigger_type_defaults_to_mob() {
    let w = TestWorld::new();
    w.zone(30);
    let quest = w.ok("root", "createQuest", json!({ "data": { "zoneId": 30, "id": 2, "name": "Lost cat" } }));
    assert_eq!(quest["triggerType"], "MOB");
    let explicit = w.ok(
        "root",
        "createQuest",
        json!({ "data": { "zoneId": 30, "id": 3, "name": "Bell", "triggerType": "ROOM" } }),
    );
    assert_eq!(explicit["triggerType"], "ROOM");
}

#[test]
fn self_prerequisite_is_rejected_before_storage() {
    let w = TestWorld::new();
    w.zone(30);
    w.quest(30, 1);
    let code = w.err(
        "root",
        "addQuestPrerequisite",
        json!({ "data": { "questZoneId": 30, "questId": 1, "prerequisiteQuestZoneId": 30, "prerequisiteQuestId": 1 } }),
    );
    assert_eq!(code, "BAD_USER_INPUT");
    assert!(w
        .store()
        .prerequisites_for_quest(&EntityKey::new(30, 1))
        .unwrap()
        .is_empty());
}

#[test]
fn mob_flags_round_trip_and_short_desc_is_stored() {
    let w = TestWorld::new();
    w.zone(1000);
    let id = w.store().generate_id().unwrap() as u32;
    w.ok(
        "root",
        "createMob",
        json!({ "data": {
            "zoneId": 1000,
            "id": id,
            "keywords": ["goblin"],
            "shortDescription": "a sneaky goblin",
            "longDescription": "A sneaky goblin lurks here.",
            "description": "Green and mean.",
            "mobFlags": ["AGGRESSIVE", "AWARE", "ISNPC"]
        } }),
    );

    let fetched = w.ok("root", "mob", json!({ "zoneId": 1000, "id": id }));
    let mut flags: Vec<String> = fetched["mobFlags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    flags.sort();
    assert_eq!(flags, vec!["AGGRESSIVE", "AWARE", "ISNPC"]);

    let row = w.store().get_mob(&EntityKey::new(1000, id)).unwrap();
    assert_eq!(row.short_desc, "a sneaky goblin");
    assert_eq!(row.mob_flags.len(), 3);
    for flag in [MobFlag::Aggressive, MobFlag::Aware, MobFlag::Isnpc] {
        assert!(row.mob_flags.contains(&flag));
    }
}

#[test]
fn reset_update_without_equipment_keeps_rows() {
    let w = TestWorld::new();
    reset_world(&w);
    let created = w.ok(
        "root",
        "createMobReset",
        json!({ "data": {
            "mobZoneId": 30, "mobId": 10, "roomZoneId": 30, "roomId": 1,
            "probability": 0.75,
            "equipment": [ { "objectZoneId": 5, "objectId": 200 } ]
        } }),
    );
    let id = created["id"].as_u64().unwrap();
    let equipment_id = created["equipment"][0]["id"].as_u64().unwrap();

    let updated = w.ok(
        "root",
        "updateMobReset",
        json!({ "id": id, "data": { "probability": 0.5, "comment": "night shift" } }),
    );
    assert_eq!(updated["probability"], 0.5);
    let equipment = updated["equipment"].as_array().unwrap();
    assert_eq!(equipment.len(), 1);
    assert_eq!(equipment[0]["id"].as_u64(), Some(equipment_id));
    assert_eq!(equipment[0]["object"]["zoneId"], 5);
    assert_eq!(equipment[0]["object"]["id"], 200);

    // An empty list is also "no changes", not "remove everything".
    let again = w.ok("root", "updateMobReset", json!({ "id": id, "data": { "equipment": [] } }));
    assert_eq!(again["equipment"].as_array().unwrap().len(), 1);

    // Removal is its own call.
    w.ok("root", "deleteMobResetEquipment", json!({ "id": equipment_id }));
    let after = w.ok("root", "mobReset", json!({ "id": id }));
    assert!(after["equipment"].as_array().unwrap().is_empty());
}

#[test]
fn object_reset_update_without_conditions_keeps_rows() {
    let w = TestWorld::new();
    reset_world(&w);
    let created = w.ok(
        "root",
        "createObjectReset",
        json!({ "data": {
            "objectZoneId": 5, "objectId": 200, "roomZoneId": 30, "roomId": 1,
            "probability": 0.75,
            "conditions": [ { "conditionType": "TIME_OF_DAY", "parameters": { "from": 20, "to": 6 } } ]
        } }),
    );
    let id = created["id"].as_u64().unwrap();
    let updated = w.ok("root", "updateObjectReset", json!({ "id": id, "data": { "maxInstances": 3 } }));
    assert_eq!(updated["maxInstances"], 3);
    assert_eq!(updated["probability"], 0.75);
    let conditions = updated["conditions"].as_array().unwrap();
    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0]["parameters"]["from"], 20);
}
