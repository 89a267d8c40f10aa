//! Event routing, dedupe and delivery failure handling, without Redis.

use fierycms::bridge::dedupe::MemoryClaimStore;
use fierycms::bridge::discord::RecordingNotifier;
use fierycms::bridge::{Forwarder, Outcome, ADMIN_CHANNEL, CHAT_CHANNEL, PLAYER_CHANNEL};
use serde_json::json;

fn payload(kind: &str, data: serde_json::Value) -> String {
    json!({ "type": kind, "timestamp": "2024-05-01T12:00:00Z", "data": data }).to_string()
}

#[tokio::test]
async fn forwards_routed_events_once() {
    let notifier = RecordingNotifier::new();
    let mut forwarder = Forwarder::new(MemoryClaimStore::new(), &notifier, 60_000);

    let gossip = payload("gossip", json!({ "player": "Zela", "message": "anyone for Tower?" }));
    assert_eq!(forwarder.process(CHAT_CHANNEL, &gossip).await, Outcome::Forwarded);
    // Same publish seen again (a second subscriber) is skipped.
    assert_eq!(forwarder.process(CHAT_CHANNEL, &gossip).await, Outcome::Duplicate);

    let login = payload("player_login", json!({ "player": "Zela" }));
    assert_eq!(forwarder.process(PLAYER_CHANNEL, &login).await, Outcome::Forwarded);

    assert_eq!(
        notifier.sent(),
        vec![
            "**Zela** gossips, 'anyone for Tower?'".to_string(),
            "Zela has entered FieryMUD.".to_string(),
        ]
    );
}

#[tokio::test]
async fn unknown_and_malformed_events_are_dropped() {
    let notifier = RecordingNotifier::new();
    let mut forwarder = Forwarder::new(MemoryClaimStore::new(), &notifier, 60_000);

    let unknown = payload("zone_reset", json!({ "zone": 30 }));
    assert_eq!(forwarder.process(ADMIN_CHANNEL, &unknown).await, Outcome::Dropped);
    assert_eq!(forwarder.process(ADMIN_CHANNEL, "not json").await, Outcome::Dropped);
    assert_eq!(forwarder.process(ADMIN_CHANNEL, r#"{"data":{}}"#).await, Outcome::Dropped);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn delivery_failures_are_reported_not_retried() {
    let notifier = RecordingNotifier::failing();
    let mut forwarder = Forwarder::new(MemoryClaimStore::new(), &notifier, 60_000);
    let before = fierycms::metrics::snapshot().bridge_dropped;

    let shutdown = payload("server_shutdown", json!({ "reason": "copyover" }));
    assert_eq!(forwarder.process(ADMIN_CHANNEL, &shutdown).await, Outcome::Failed);
    assert!(fierycms::metrics::snapshot().bridge_dropped > before);
}

#[tokio::test]
async fn identical_text_on_different_channels_is_not_a_duplicate() {
    let notifier = RecordingNotifier::new();
    let mut forwarder = Forwarder::new(MemoryClaimStore::new(), &notifier, 60_000);
    let announce = payload("announcement", json!({ "message": "Double XP tonight" }));
    assert_eq!(forwarder.process(ADMIN_CHANNEL, &announce).await, Outcome::Forwarded);
    assert_eq!(forwarder.process(CHAT_CHANNEL, &announce).await, Outcome::Forwarded);
    assert_eq!(notifier.sent().len(), 2);
}
