//! Deleting a room, mob or object is refused while anything still names it.

mod common;

use common::TestWorld;
use serde_json::json;

fn world() -> TestWorld {
    let w = TestWorld::new();
    w.zone(30);
    w.room(30, 1);
    w.room(30, 2);
    w.mob(30, 10);
    w.mob(30, 11);
    w.object(30, 100);
    w.quest(30, 1);
    w.ok(
        "root",
        "createQuestPhase",
        json!({ "data": { "questZoneId": 30, "questId": 1, "id": 1, "name": "Start" } }),
    );
    w
}

fn objective(w: &TestWorld, id: u32, fields: serde_json::Value) {
    let mut data = json!({
        "questZoneId": 30, "questId": 1, "phaseId": 1, "id": id,
        "playerDescription": "Do the thing"
    });
    for (k, v) in fields.as_object().unwrap() {
        data[k] = v.clone();
    }
    w.ok("root", "createQuestObjective", json!({ "data": data }));
}

fn trigger_on(w: &TestWorld, attach: &str, zone: u32, id: u32) -> u64 {
    let t = w.ok(
        "root",
        "createTrigger",
        json!({ "data": {
            "zoneId": 30, "name": "greet", "attachType": attach,
            "targetZoneId": zone, "targetId": id, "script": "say('hi')"
        } }),
    );
    t["id"].as_u64().unwrap()
}

#[test]
fn quest_giver_blocks_mob_delete_until_quest_is_gone() {
    let w = world();
    w.ok(
        "root",
        "updateQuest",
        json!({ "zoneId": 30, "id": 1, "data": { "giverMobZoneId": 30, "giverMobId": 10 } }),
    );
    assert_eq!(w.err("root", "deleteMob", json!({ "zoneId": 30, "id": 10 })), "CONSTRAINT");
    assert_eq!(w.ok("root", "quest", json!({ "zoneId": 30, "id": 1 }))["giverMob"]["id"], 10);

    w.ok("root", "deleteQuest", json!({ "zoneId": 30, "id": 1 }));
    assert_eq!(w.ok("root", "deleteMob", json!({ "zoneId": 30, "id": 10 })), json!(true));
}

#[test]
fn objective_targets_block_deletes() {
    let w = world();
    objective(&w, 1, json!({ "objectiveType": "DELIVER_ITEM",
        "targetObjectZoneId": 30, "targetObjectId": 100,
        "deliverToMobZoneId": 30, "deliverToMobId": 11 }));
    objective(&w, 2, json!({ "objectiveType": "VISIT_ROOM",
        "targetRoomZoneId": 30, "targetRoomId": 2 }));

    assert_eq!(w.err("root", "deleteMob", json!({ "zoneId": 30, "id": 11 })), "CONSTRAINT");
    assert_eq!(w.err("root", "deleteObject", json!({ "zoneId": 30, "id": 100 })), "CONSTRAINT");
    assert_eq!(w.err("root", "deleteRoom", json!({ "zoneId": 30, "id": 2 })), "CONSTRAINT");

    w.ok(
        "root",
        "deleteQuestObjective",
        json!({ "questZoneId": 30, "questId": 1, "phaseId": 1, "id": 2 }),
    );
    assert_eq!(w.ok("root", "deleteRoom", json!({ "zoneId": 30, "id": 2 })), json!(true));
}

#[test]
fn item_reward_blocks_object_delete() {
    let w = world();
    w.ok(
        "root",
        "createQuestReward",
        json!({ "data": { "questZoneId": 30, "questId": 1, "id": 1,
            "rewardType": "ITEM", "objectZoneId": 30, "objectId": 100 } }),
    );
    assert_eq!(w.err("root", "deleteObject", json!({ "zoneId": 30, "id": 100 })), "CONSTRAINT");
    w.ok("root", "deleteQuestReward", json!({ "questZoneId": 30, "questId": 1, "id": 1 }));
    assert_eq!(w.ok("root", "deleteObject", json!({ "zoneId": 30, "id": 100 })), json!(true));
}

#[test]
fn door_key_blocks_object_delete() {
    let w = world();
    w.ok(
        "root",
        "updateRoom",
        json!({ "zoneId": 30, "id": 1, "data": { "exits": [{
            "direction": "NORTH", "destinationZoneId": 30, "destinationId": 2,
            "keyObjectZoneId": 30, "keyObjectId": 100
        }] } }),
    );
    assert_eq!(w.err("root", "deleteObject", json!({ "zoneId": 30, "id": 100 })), "CONSTRAINT");
    w.ok("root", "updateRoom", json!({ "zoneId": 30, "id": 1, "data": { "exits": [] } }));
    assert_eq!(w.ok("root", "deleteObject", json!({ "zoneId": 30, "id": 100 })), json!(true));
}

#[test]
fn shop_room_blocks_room_delete() {
    let w = world();
    w.ok(
        "root",
        "createShop",
        json!({ "data": { "zoneId": 30, "id": 1, "rooms": [{ "roomZoneId": 30, "roomId": 2 }] } }),
    );
    assert_eq!(w.err("root", "deleteRoom", json!({ "zoneId": 30, "id": 2 })), "CONSTRAINT");
    w.ok("root", "deleteShop", json!({ "zoneId": 30, "id": 1 }));
    assert_eq!(w.ok("root", "deleteRoom", json!({ "zoneId": 30, "id": 2 })), json!(true));
}

#[test]
fn attached_triggers_block_deletes() {
    let w = world();
    let on_mob = trigger_on(&w, "MOB", 30, 10);
    let on_object = trigger_on(&w, "OBJECT", 30, 100);
    let on_room = trigger_on(&w, "WORLD", 30, 2);

    assert_eq!(w.err("root", "deleteMob", json!({ "zoneId": 30, "id": 10 })), "CONSTRAINT");
    assert_eq!(w.err("root", "deleteObject", json!({ "zoneId": 30, "id": 100 })), "CONSTRAINT");
    assert_eq!(w.err("root", "deleteRoom", json!({ "zoneId": 30, "id": 2 })), "CONSTRAINT");

    for id in [on_mob, on_object, on_room] {
        w.ok("root", "deleteTrigger", json!({ "id": id }));
    }
    assert_eq!(w.ok("root", "deleteMob", json!({ "zoneId": 30, "id": 10 })), json!(true));
    assert_eq!(w.ok("root", "deleteObject", json!({ "zoneId": 30, "id": 100 })), json!(true));
    assert_eq!(w.ok("root", "deleteRoom", json!({ "zoneId": 30, "id": 2 })), json!(true));
}
