//! In-process counters for the API server and the Discord bridge.
//! Logged when the server or the bridge shuts down.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

static REQUESTS: AtomicU64 = AtomicU64::new(0);
static REQUEST_ERRORS: AtomicU64 = AtomicU64::new(0);
static AUTH_DENIALS: AtomicU64 = AtomicU64::new(0);
static BRIDGE_FORWARDED: AtomicU64 = AtomicU64::new(0);
static BRIDGE_DROPPED: AtomicU64 = AtomicU64::new(0);
static BRIDGE_DUPLICATES: AtomicU64 = AtomicU64::new(0);
static BRIDGE_RECONNECTS: AtomicU64 = AtomicU64::new(0);

static OPERATION_COUNTERS: OnceLock<Mutex<HashMap<String, OperationCounter>>> = OnceLock::new();

pub fn inc_requests() {
    REQUESTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_request_errors() {
    REQUEST_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_auth_denials() {
    AUTH_DENIALS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_bridge_forwarded() {
    BRIDGE_FORWARDED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_bridge_dropped() {
    BRIDGE_DROPPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_bridge_duplicates() {
    BRIDGE_DUPLICATES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_bridge_reconnects() {
    BRIDGE_RECONNECTS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OperationCounter {
    pub calls: u64,
    pub errors: u64,
}

fn operation_lock() -> &'static Mutex<HashMap<String, OperationCounter>> {
    OPERATION_COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Record one dispatched operation. A poisoned lock only loses the sample.
pub fn record_operation(name: &str, failed: bool) {
    let Ok(mut guard) = operation_lock().lock() else {
        return;
    };
    let counter = guard.entry(name.to_string()).or_default();
    counter.calls = counter.calls.saturating_add(1);
    if failed {
        counter.errors = counter.errors.saturating_add(1);
    }
}

/// Per-operation counters, busiest first, ties by name.
pub fn operation_counters() -> Vec<(String, OperationCounter)> {
    let mut counters: Vec<_> = operation_lock()
        .lock()
        .map(|guard| guard.iter().map(|(k, v)| (k.clone(), *v)).collect())
        .unwrap_or_default();
    counters.sort_by(|a, b| b.1.calls.cmp(&a.1.calls).then_with(|| a.0.cmp(&b.0)));
    counters
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub requests: u64,
    pub request_errors: u64,
    pub auth_denials: u64,
    pub bridge_forwarded: u64,
    pub bridge_dropped: u64,
    pub bridge_duplicates: u64,
    pub bridge_reconnects: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        requests: REQUESTS.load(Ordering::Relaxed),
        request_errors: REQUEST_ERRORS.load(Ordering::Relaxed),
        auth_denials: AUTH_DENIALS.load(Ordering::Relaxed),
        bridge_forwarded: BRIDGE_FORWARDED.load(Ordering::Relaxed),
        bridge_dropped: BRIDGE_DROPPED.load(Ordering::Relaxed),
        bridge_duplicates: BRIDGE_DUPLICATES.load(Ordering::Relaxed),
        bridge_reconnects: BRIDGE_RECONNECTS.load(Ordering::Relaxed),
    }
}
