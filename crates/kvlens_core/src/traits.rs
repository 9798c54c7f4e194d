use crate::error::StoreError;
use crate::key_value::{
    KeyDescriptor, KeyExpireRequest, KeyRecord, KeyRef, KeyReplaceRequest, KeyScanRequest,
    KeyType, KeyWriteRequest, RawReply,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Connection to a Redis-like key-value store.
///
/// The explorer interacts exclusively through this trait, never accessing driver internals.
/// Implementations must be thread-safe (`Send + Sync`).
pub trait KeyValueStore: Send + Sync {
    /// Scan keys matching `request.pattern`, in the order the store yields them.
    ///
    /// Keys whose type the explorer cannot edit are skipped. At most
    /// `request.max_keys` descriptors are returned.
    fn list_keys(&self, request: &KeyScanRequest) -> Result<Vec<KeyDescriptor>, StoreError>;

    /// Fetch type, value, TTL, size and encoding. `None` when the key does not exist.
    fn read_key(&self, key: &KeyRef) -> Result<Option<KeyRecord>, StoreError>;

    /// Current type of a key, `None` when it does not exist.
    ///
    /// Keys of a type the explorer cannot edit yield `StoreError::TypeConflict`.
    fn key_type(&self, key: &KeyRef) -> Result<Option<KeyType>, StoreError>;

    /// Create a key. Fails with `StoreError::KeyExists` if the key is present,
    /// checked atomically with the write.
    fn write_key(&self, request: &KeyWriteRequest) -> Result<(), StoreError>;

    fn apply_expiry(&self, request: &KeyExpireRequest) -> Result<(), StoreError>;

    /// Replace the whole value of an existing key, keeping its TTL.
    ///
    /// Fails with `StoreError::NotFound` when the key is gone and
    /// `StoreError::TypeConflict` when the stored type differs from the new value's.
    fn replace_value(&self, request: &KeyReplaceRequest) -> Result<(), StoreError>;

    /// Remove a key. Returns whether anything was removed; absent keys are not an error.
    fn delete_key(&self, key: &KeyRef) -> Result<bool, StoreError>;

    /// Execute a command line as typed by the operator.
    ///
    /// Errors raised by the server are returned as a reply with `is_error` set;
    /// `Err` is reserved for the store being unreachable.
    fn run_raw_command(&self, database: Option<u32>, command: &str)
    -> Result<RawReply, StoreError>;

    /// Server information text (`INFO`).
    fn server_info(&self) -> Result<String, StoreError> {
        Err(StoreError::NotSupported(
            "Server info is not available for this store".to_string(),
        ))
    }

    /// Number of logical databases the server exposes.
    fn database_count(&self) -> Result<u32, StoreError> {
        Ok(1)
    }

    /// Whether `write_key` honours `KeyWriteRequest::expiry` in the same atomic step.
    ///
    /// When `false`, the caller applies expiry with a separate `apply_expiry` call.
    fn atomic_expiry(&self) -> bool {
        false
    }
}

/// Stores addressable by server name.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: BTreeMap<String, Arc<dyn KeyValueStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, name: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        self.register(name, store);
        self
    }

    /// Registers a store, replacing any previous store of the same name.
    pub fn register(&mut self, name: impl Into<String>, store: Arc<dyn KeyValueStore>) {
        self.stores.insert(name.into(), store);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn KeyValueStore>> {
        self.stores.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// Server names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
