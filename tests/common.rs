//! Test utilities & fixtures.
//! Each `TestWorld` owns a throwaway sled store seeded with a GOD account
//! named `root`, and drives it through the same dispatch the server uses.

use std::sync::Arc;

use fierycms::api::{Api, ApiOptions, ApiRequest, ApiResponse};
use fierycms::cms::{CmsStore, CmsStoreBuilder};
use serde_json::{json, Value};
use tempfile::TempDir;

pub struct TestWorld {
    pub api: Arc<Api>,
    _dir: TempDir,
}

#[allow(dead_code)]
impl TestWorld {
    pub fn new() -> Self {
        Self::with_options(ApiOptions::default())
    }

    pub fn with_options(options: ApiOptions) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CmsStoreBuilder::new(dir.path().join("cms"))
            .with_bootstrap_admin("root")
            .open()
            .expect("open store");
        Self {
            api: Arc::new(Api::new(Arc::new(store), options)),
            _dir: dir,
        }
    }

    pub fn store(&self) -> &CmsStore {
        self.api.store()
    }

    pub fn call(&self, actor: &str, operation: &str, args: Value) -> ApiResponse {
        self.api.handle(ApiRequest {
            id: None,
            operation: operation.to_string(),
            actor: Some(actor.to_string()),
            args,
        })
    }

    /// Call and unwrap `data`, failing the test on any error.
    pub fn ok(&self, actor: &str, operation: &str, args: Value) -> Value {
        let resp = self.call(actor, operation, args);
        assert!(resp.errors.is_none(), "{} failed: {:?}", operation, resp.errors);
        resp.data.expect("data")
    }

    /// Call and return the error code, failing the test on success.
    pub fn err(&self, actor: &str, operation: &str, args: Value) -> String {
        let resp = self.call(actor, operation, args);
        match resp.error_code() {
            Some(code) => code.to_string(),
            None => panic!("{} unexpectedly succeeded: {:?}", operation, resp.data),
        }
    }

    pub fn zone(&self, id: u32) {
        self.ok(
            "root",
            "createZone",
            json!({ "data": { "id": id, "name": format!("Zone {}", id), "bottom": id * 100, "top": id * 100 + 99 } }),
        );
    }

    pub fn room(&self, zone_id: u32, id: u32) {
        self.ok(
            "root",
            "createRoom",
            json!({ "data": {
                "zoneId": zone_id,
                "id": id,
                "name": format!("Room {}", id),
                "description": "A plain room."
            } }),
        );
    }

    pub fn mob(&self, zone_id: u32, id: u32) {
        self.ok(
            "root",
            "createMob",
            json!({ "data": {
                "zoneId": zone_id,
                "id": id,
                "keywords": ["guard"],
                "shortDescription": "a town guard",
                "longDescription": "A town guard stands here.",
                "description": "He looks bored."
            } }),
        );
    }

    pub fn object(&self, zone_id: u32, id: u32) {
        self.ok(
            "root",
            "createObject",
            json!({ "data": {
                "zoneId": zone_id,
                "id": id,
                "keywords": ["sword"],
                "shortDescription": "a short sword",
                "groundDescription": "A short sword lies here."
            } }),
        );
    }

    pub fn quest(&self, zone_id: u32, id: u32) {
        self.ok(
            "root",
            "createQuest",
            json!({ "data": { "zoneId": zone_id, "id": id, "name": format!("Quest {}", id) } }),
        );
    }

    pub fn user(&self, username: &str, role: &str) {
        self.ok("root", "createUser", json!({ "username": username, "role": role }));
    }
}
