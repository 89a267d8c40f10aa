//! Zone-write guard as seen through operation dispatch.

mod common;

use common::TestWorld;
use serde_json::json;

fn world() -> TestWorld {
    let w = TestWorld::new();
    w.zone(30);
    w.zone(31);
    w.user("brick", "BUILDER");
    w.user("mort", "IMMORTAL");
    w.user("hb", "HEAD_BUILDER");
    w
}

fn room_args(zone_id: u32, id: u32) -> serde_json::Value {
    json!({ "data": { "zoneId": zone_id, "id": id, "name": "Hut", "description": "A hut." } })
}

#[test]
fn builder_needs_a_write_grant_for_the_zone() {
    let w = world();
    assert_eq!(w.err("brick", "createRoom", room_args(30, 1)), "FORBIDDEN");

    w.ok(
        "root",
        "grantZone",
        json!({ "data": { "username": "brick", "zoneId": 30, "permission": "WRITE" } }),
    );
    w.ok("brick", "createRoom", room_args(30, 1));
    w.ok("brick", "updateRoom", json!({ "zoneId": 30, "id": 1, "data": { "name": "Big hut" } }));
    assert_eq!(w.err("brick", "createRoom", room_args(31, 1)), "FORBIDDEN");
}

#[test]
fn read_only_and_expired_grants_do_not_allow_writes() {
    let w = world();
    w.ok(
        "root",
        "grantZone",
        json!({ "data": { "username": "brick", "zoneId": 30, "permission": "READ" } }),
    );
    assert_eq!(w.err("brick", "createRoom", room_args(30, 1)), "FORBIDDEN");

    w.ok(
        "root",
        "grantZone",
        json!({ "data": {
            "username": "brick", "zoneId": 31, "permission": "ADMIN",
            "expiresAt": "2000-01-01T00:00:00Z"
        } }),
    );
    assert_eq!(w.err("brick", "createRoom", room_args(31, 1)), "FORBIDDEN");
}

#[test]
fn revoked_grant_stops_writes() {
    let w = world();
    w.ok(
        "root",
        "grantZone",
        json!({ "data": { "username": "brick", "zoneId": 30, "permission": "WRITE" } }),
    );
    w.ok("brick", "createRoom", room_args(30, 1));
    assert_eq!(w.ok("root", "revokeZone", json!({ "username": "brick", "zoneId": 30 })), json!(true));
    assert_eq!(w.err("brick", "createRoom", room_args(30, 2)), "FORBIDDEN");
}

#[test]
fn elevated_roles_write_anywhere_and_immortals_only_read() {
    let w = world();
    w.ok("hb", "createRoom", room_args(31, 5));
    assert_eq!(w.err("mort", "createRoom", room_args(30, 1)), "FORBIDDEN");
    let rooms = w.ok("mort", "roomsByZone", json!({ "zoneId": 31 }));
    assert_eq!(rooms.as_array().unwrap().len(), 1);
}

#[test]
fn global_content_needs_elevation() {
    let w = world();
    w.ok(
        "root",
        "grantZone",
        json!({ "data": { "username": "brick", "zoneId": 30, "permission": "ADMIN" } }),
    );
    assert_eq!(
        w.err("brick", "createZone", json!({ "data": { "id": 40, "name": "Nowhere" } })),
        "FORBIDDEN"
    );
    assert_eq!(w.err("brick", "deleteZone", json!({ "id": 30 })), "FORBIDDEN");
    assert_eq!(
        w.err("brick", "createSocial", json!({ "data": { "name": "wave" } })),
        "FORBIDDEN"
    );
    assert_eq!(w.err("brick", "users", json!({})), "FORBIDDEN");
    assert_eq!(w.err("brick", "zoneGrants", json!({ "username": "mort" })), "FORBIDDEN");

    let own = w.ok("brick", "zoneGrants", json!({ "username": "brick" }));
    assert_eq!(own.as_array().unwrap().len(), 1);
    assert_eq!(own[0]["permission"], "ADMIN");
}

#[test]
fn moving_a_reset_needs_write_on_both_zones() {
    let w = world();
    w.room(30, 1);
    w.room(31, 1);
    w.mob(30, 10);
    w.ok(
        "root",
        "grantZone",
        json!({ "data": { "username": "brick", "zoneId": 30, "permission": "WRITE" } }),
    );
    let reset = w.ok(
        "brick",
        "createMobReset",
        json!({ "data": { "mobZoneId": 30, "mobId": 10, "roomZoneId": 30, "roomId": 1 } }),
    );
    let id = reset["id"].as_u64().unwrap();
    assert_eq!(
        w.err("brick", "updateMobReset", json!({ "id": id, "data": { "roomZoneId": 31, "roomId": 1 } })),
        "FORBIDDEN"
    );
    let unchanged = w.ok("brick", "mobReset", json!({ "id": id }));
    assert_eq!(unchanged["room"]["zoneId"], 30);
}

#[test]
fn unknown_or_missing_actor_is_unauthenticated() {
    let w = world();
    assert_eq!(w.err("nobody", "zones", json!({})), "UNAUTHENTICATED");
    assert_eq!(w.err("", "zones", json!({})), "UNAUTHENTICATED");
}

#[test]
fn denials_are_counted() {
    let w = world();
    let before = fierycms::metrics::snapshot().auth_denials;
    w.err("mort", "createRoom", room_args(30, 1));
    assert!(fierycms::metrics::snapshot().auth_denials > before);
}

#[test]
fn users_cannot_demote_themselves() {
    let w = world();
    assert_eq!(
        w.err("root", "setUserRole", json!({ "username": "root", "role": "BUILDER" })),
        "BAD_USER_INPUT"
    );
    let promoted = w.ok("root", "setUserRole", json!({ "username": "brick", "role": "HEAD_BUILDER" }));
    assert_eq!(promoted["role"], "HEAD_BUILDER");
    w.ok("brick", "createRoom", room_args(31, 2));
}

#[test]
fn role_changes_are_capped_at_the_callers_role() {
    let w = world();
    assert_eq!(
        w.err("hb", "setUserRole", json!({ "username": "hb", "role": "GOD" })),
        "FORBIDDEN"
    );
    assert_eq!(
        w.err("hb", "setUserRole", json!({ "username": "root", "role": "PLAYER" })),
        "FORBIDDEN"
    );
    assert_eq!(
        w.err("hb", "createUser", json!({ "username": "zeus", "role": "GOD" })),
        "FORBIDDEN"
    );
    let me = w.ok("root", "me", json!({}));
    assert_eq!(me["role"], "GOD");

    let promoted = w.ok("hb", "setUserRole", json!({ "username": "brick", "role": "HEAD_BUILDER" }));
    assert_eq!(promoted["role"], "HEAD_BUILDER");
    let made = w.ok("root", "setUserRole", json!({ "username": "hb", "role": "GOD" }));
    assert_eq!(made["role"], "GOD");
}
