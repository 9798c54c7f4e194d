use crate::fake_store::FakeStore;
use kvlens_core::{MutationService, StoreRegistry, StoreValue};
use std::time::Duration;

/// Server name the fixtures register their store under.
pub const SERVER: &str = "local";

pub fn profile_hash() -> StoreValue {
    StoreValue::hash([("name", "Alice"), ("email", "alice@example.com"), ("age", "31")])
}

pub fn queue_list() -> StoreValue {
    StoreValue::list(["job-1", "job-2", "job-3"])
}

pub fn tag_set() -> StoreValue {
    StoreValue::set(["red", "green", "blue"])
}

pub fn leaderboard() -> StoreValue {
    StoreValue::sorted_set([("alice", 42.0), ("bob", 17.5), ("carol", 3.0)])
}

pub fn json_string() -> StoreValue {
    StoreValue::string(r#"{"theme":"dark","beta":true}"#)
}

pub fn binary_string() -> StoreValue {
    StoreValue::String(vec![0x00, 0xff, b'a', 0x7f])
}

/// A store holding one key of every editable type plus a stream.
pub fn populated_store() -> FakeStore {
    FakeStore::new()
        .with_key("greeting", StoreValue::string("hello world"))
        .with_key("settings", json_string())
        .with_key("blob", binary_string())
        .with_key("user:1", profile_hash())
        .with_key("queue:jobs", queue_list())
        .with_key("tags", tag_set())
        .with_expiring_key("scores", leaderboard(), Duration::from_secs(3600))
        .with_foreign_key("events", "stream")
}

pub fn registry_for(store: &FakeStore) -> StoreRegistry {
    StoreRegistry::new().with_store(SERVER, store.clone().as_store_arc())
}

pub fn service_for(store: &FakeStore) -> MutationService {
    MutationService::new(registry_for(store))
}
