use kvlens_core::{
    Expiry, KeyDescriptor, KeyExpireRequest, KeyRecord, KeyRef, KeyReplaceRequest,
    KeyScanRequest, KeyType, KeyValueStore, KeyWriteRequest, RawReply, StoreError, StoreValue,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOperation {
    ListKeys,
    ReadKey,
    KeyType,
    WriteKey,
    ApplyExpiry,
    ReplaceValue,
    DeleteKey,
    RawCommand,
    ServerInfo,
    DatabaseCount,
}

impl FakeOperation {
    /// Operations that change store contents.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            FakeOperation::WriteKey
                | FakeOperation::ApplyExpiry
                | FakeOperation::ReplaceValue
                | FakeOperation::DeleteKey
        )
    }
}

/// One recorded call: the operation and the key, pattern or command it targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCall {
    pub operation: FakeOperation,
    pub target: String,
    pub database: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeStoreStats {
    pub calls: Vec<FakeCall>,
}

impl FakeStoreStats {
    pub fn count(&self, operation: FakeOperation) -> usize {
        self.calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    pub fn mutating_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| call.operation.is_mutating())
            .count()
    }

    pub fn total(&self) -> usize {
        self.calls.len()
    }
}

#[derive(Debug, Clone)]
enum FakeEntry {
    Editable {
        value: StoreValue,
        ttl: Option<Duration>,
    },
    /// A key of a type the explorer does not edit, e.g. a stream.
    Foreign { type_name: String },
}

#[derive(Default)]
struct FakeStoreState {
    databases: RwLock<HashMap<u32, BTreeMap<String, FakeEntry>>>,
    failures: RwLock<HashMap<FakeOperation, StoreError>>,
    raw_replies: RwLock<HashMap<String, RawReply>>,
    info: RwLock<String>,
    database_count: RwLock<u32>,
    atomic_expiry: RwLock<bool>,
    calls: Mutex<Vec<FakeCall>>,
}

/// In-memory [`KeyValueStore`] with error injection and call recording.
///
/// Clones share state, so a test can keep one handle for assertions while the
/// code under test owns another.
#[derive(Clone)]
pub struct FakeStore {
    state: Arc<FakeStoreState>,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStore {
    pub fn new() -> Self {
        let store = Self {
            state: Arc::new(FakeStoreState::default()),
        };
        *rwlock_write(&store.state.database_count) = 16;
        *rwlock_write(&store.state.info) = "# Server\r\nredis_version:7.2.0\r\n".to_string();
        store
    }

    pub fn with_key(self, key: impl Into<String>, value: StoreValue) -> Self {
        self.insert(0, key, value, None);
        self
    }

    pub fn with_key_in(self, database: u32, key: impl Into<String>, value: StoreValue) -> Self {
        self.insert(database, key, value, None);
        self
    }

    pub fn with_expiring_key(
        self,
        key: impl Into<String>,
        value: StoreValue,
        ttl: Duration,
    ) -> Self {
        self.insert(0, key, value, Some(ttl));
        self
    }

    pub fn with_foreign_key(self, key: impl Into<String>, type_name: impl Into<String>) -> Self {
        rwlock_write(&self.state.databases)
            .entry(0)
            .or_default()
            .insert(
                key.into(),
                FakeEntry::Foreign {
                    type_name: type_name.into(),
                },
            );
        self
    }

    pub fn with_failure(self, operation: FakeOperation, error: StoreError) -> Self {
        self.set_failure(operation, error);
        self
    }

    pub fn with_raw_reply(self, command: impl Into<String>, reply: RawReply) -> Self {
        rwlock_write(&self.state.raw_replies).insert(command.into(), reply);
        self
    }

    pub fn with_info(self, info: impl Into<String>) -> Self {
        *rwlock_write(&self.state.info) = info.into();
        self
    }

    pub fn with_database_count(self, count: u32) -> Self {
        *rwlock_write(&self.state.database_count) = count;
        self
    }

    pub fn with_atomic_expiry(self, atomic: bool) -> Self {
        *rwlock_write(&self.state.atomic_expiry) = atomic;
        self
    }

    pub fn set_failure(&self, operation: FakeOperation, error: StoreError) {
        rwlock_write(&self.state.failures).insert(operation, error);
    }

    pub fn clear_failure(&self, operation: FakeOperation) {
        rwlock_write(&self.state.failures).remove(&operation);
    }

    pub fn insert(
        &self,
        database: u32,
        key: impl Into<String>,
        value: StoreValue,
        ttl: Option<Duration>,
    ) {
        rwlock_write(&self.state.databases)
            .entry(database)
            .or_default()
            .insert(key.into(), FakeEntry::Editable { value, ttl });
    }

    pub fn value(&self, key: &str) -> Option<StoreValue> {
        self.value_in(0, key)
    }

    pub fn value_in(&self, database: u32, key: &str) -> Option<StoreValue> {
        match rwlock_read(&self.state.databases).get(&database)?.get(key)? {
            FakeEntry::Editable { value, .. } => Some(value.clone()),
            FakeEntry::Foreign { .. } => None,
        }
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        match rwlock_read(&self.state.databases).get(&0)?.get(key)? {
            FakeEntry::Editable { ttl, .. } => *ttl,
            FakeEntry::Foreign { .. } => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        rwlock_read(&self.state.databases)
            .get(&0)
            .is_some_and(|keys| keys.contains_key(key))
    }

    pub fn stats(&self) -> FakeStoreStats {
        FakeStoreStats {
            calls: mutex_lock(&self.state.calls).clone(),
        }
    }

    pub fn reset_stats(&self) {
        mutex_lock(&self.state.calls).clear();
    }

    pub fn as_store_arc(self) -> Arc<dyn KeyValueStore> {
        Arc::new(self)
    }

    fn record(
        &self,
        operation: FakeOperation,
        target: &str,
        database: Option<u32>,
    ) -> Result<(), StoreError> {
        mutex_lock(&self.state.calls).push(FakeCall {
            operation,
            target: target.to_string(),
            database,
        });

        match rwlock_read(&self.state.failures).get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn remove(&self, database: u32, key: &str) -> bool {
        rwlock_write(&self.state.databases)
            .get_mut(&database)
            .is_some_and(|keys| keys.remove(key).is_some())
    }
}

impl KeyValueStore for FakeStore {
    fn list_keys(&self, request: &KeyScanRequest) -> Result<Vec<KeyDescriptor>, StoreError> {
        self.record(
            FakeOperation::ListKeys,
            request.effective_pattern(),
            request.database,
        )?;

        let pattern = request.effective_pattern().as_bytes();
        let databases = rwlock_read(&self.state.databases);
        let Some(keys) = databases.get(&request.database.unwrap_or(0)) else {
            return Ok(Vec::new());
        };

        Ok(keys
            .iter()
            .filter(|(key, _)| glob_match(pattern, key.as_bytes()))
            .filter_map(|(key, entry)| match entry {
                FakeEntry::Editable { value, .. } => {
                    let descriptor = KeyDescriptor::new(key.clone(), value.key_type());
                    Some(if value.key_type().is_composite() {
                        descriptor.with_len(value.size())
                    } else {
                        descriptor
                    })
                }
                FakeEntry::Foreign { .. } => None,
            })
            .take(request.max_keys)
            .collect())
    }

    fn read_key(&self, key: &KeyRef) -> Result<Option<KeyRecord>, StoreError> {
        self.record(FakeOperation::ReadKey, &key.key, key.database)?;

        let databases = rwlock_read(&self.state.databases);
        match databases
            .get(&key.database.unwrap_or(0))
            .and_then(|keys| keys.get(&key.key))
        {
            None => Ok(None),
            Some(FakeEntry::Editable { value, ttl }) => {
                let mut record = KeyRecord::new(value.clone()).with_encoding(fake_encoding(value));
                record.ttl = *ttl;
                Ok(Some(record))
            }
            Some(FakeEntry::Foreign { type_name }) => Err(foreign_type(&key.key, type_name)),
        }
    }

    fn key_type(&self, key: &KeyRef) -> Result<Option<KeyType>, StoreError> {
        self.record(FakeOperation::KeyType, &key.key, key.database)?;

        let databases = rwlock_read(&self.state.databases);
        match databases
            .get(&key.database.unwrap_or(0))
            .and_then(|keys| keys.get(&key.key))
        {
            None => Ok(None),
            Some(FakeEntry::Editable { value, .. }) => Ok(Some(value.key_type())),
            Some(FakeEntry::Foreign { type_name }) => Err(foreign_type(&key.key, type_name)),
        }
    }

    fn write_key(&self, request: &KeyWriteRequest) -> Result<(), StoreError> {
        self.record(FakeOperation::WriteKey, &request.key, request.database)?;

        let atomic = *rwlock_read(&self.state.atomic_expiry);
        let mut databases = rwlock_write(&self.state.databases);
        let keys = databases.entry(request.database.unwrap_or(0)).or_default();

        if keys.contains_key(&request.key) {
            return Err(StoreError::KeyExists(request.key.clone()));
        }

        let ttl = match (atomic, request.expiry) {
            (true, Some(Expiry::Immediately)) => return Ok(()),
            (true, Some(Expiry::After(duration))) => Some(duration),
            _ => None,
        };

        keys.insert(
            request.key.clone(),
            FakeEntry::Editable {
                value: request.value.clone(),
                ttl,
            },
        );
        Ok(())
    }

    fn apply_expiry(&self, request: &KeyExpireRequest) -> Result<(), StoreError> {
        self.record(FakeOperation::ApplyExpiry, &request.key, request.database)?;

        let mut databases = rwlock_write(&self.state.databases);
        let keys = databases.entry(request.database.unwrap_or(0)).or_default();

        match request.expiry {
            Expiry::Immediately => {
                keys.remove(&request.key);
            }
            Expiry::After(duration) => match keys.get_mut(&request.key) {
                Some(FakeEntry::Editable { ttl, .. }) => *ttl = Some(duration),
                Some(FakeEntry::Foreign { .. }) => {}
                None => return Err(StoreError::NotFound(request.key.clone())),
            },
        }
        Ok(())
    }

    fn replace_value(&self, request: &KeyReplaceRequest) -> Result<(), StoreError> {
        self.record(FakeOperation::ReplaceValue, &request.key, request.database)?;

        let mut databases = rwlock_write(&self.state.databases);
        let entry = databases
            .get_mut(&request.database.unwrap_or(0))
            .and_then(|keys| keys.get_mut(&request.key))
            .ok_or_else(|| StoreError::NotFound(request.key.clone()))?;

        match entry {
            FakeEntry::Editable { value, .. } if value.key_type() == request.value.key_type() => {
                *value = request.value.clone();
                Ok(())
            }
            FakeEntry::Editable { value, .. } => Err(StoreError::type_conflict(format!(
                "'{}' holds a {}, not a {}",
                request.key,
                value.key_type(),
                request.value.key_type()
            ))),
            FakeEntry::Foreign { type_name } => Err(foreign_type(&request.key, type_name)),
        }
    }

    fn delete_key(&self, key: &KeyRef) -> Result<bool, StoreError> {
        self.record(FakeOperation::DeleteKey, &key.key, key.database)?;
        Ok(self.remove(key.database.unwrap_or(0), &key.key))
    }

    fn run_raw_command(
        &self,
        database: Option<u32>,
        command: &str,
    ) -> Result<RawReply, StoreError> {
        let command = command.trim();
        self.record(FakeOperation::RawCommand, command, database)?;

        if let Some(reply) = rwlock_read(&self.state.raw_replies).get(command) {
            return Ok(reply.clone());
        }

        let parts: Vec<&str> = command.split_whitespace().collect();
        let Some(name) = parts.first() else {
            return Ok(RawReply::ok(String::new()));
        };

        let reply = match (name.to_ascii_uppercase().as_str(), &parts[1..]) {
            ("PING", []) => RawReply::ok("PONG"),
            ("DBSIZE", []) => {
                let databases = rwlock_read(&self.state.databases);
                let size = databases
                    .get(&database.unwrap_or(0))
                    .map_or(0, BTreeMap::len);
                RawReply::ok(format!("(integer) {}", size))
            }
            ("GET", [key]) => match self.value_in(database.unwrap_or(0), key) {
                Some(StoreValue::String(bytes)) => {
                    RawReply::ok(format!("\"{}\"", String::from_utf8_lossy(&bytes)))
                }
                Some(_) => RawReply::error(
                    "WRONGTYPE Operation against a key holding the wrong kind of value",
                ),
                None => RawReply::ok("(nil)"),
            },
            (other, _) => RawReply::error(format!("ERR unknown command '{}'", other)),
        };

        Ok(reply)
    }

    fn server_info(&self) -> Result<String, StoreError> {
        self.record(FakeOperation::ServerInfo, "", None)?;
        Ok(rwlock_read(&self.state.info).clone())
    }

    fn database_count(&self) -> Result<u32, StoreError> {
        self.record(FakeOperation::DatabaseCount, "", None)?;
        Ok(*rwlock_read(&self.state.database_count))
    }

    fn atomic_expiry(&self) -> bool {
        *rwlock_read(&self.state.atomic_expiry)
    }
}

fn foreign_type(key: &str, type_name: &str) -> StoreError {
    StoreError::type_conflict(format!("'{}' holds a {}, which cannot be edited", key, type_name))
}

fn fake_encoding(value: &StoreValue) -> &'static str {
    match value {
        StoreValue::String(bytes) if bytes.len() <= 44 => "embstr",
        StoreValue::String(_) => "raw",
        StoreValue::Set(_) => "hashtable",
        StoreValue::List(_) => "quicklist",
        StoreValue::Hash(_) | StoreValue::SortedSet(_) => "listpack",
    }
}

/// Redis-style glob: `*`, `?`, `[abc]`, `[^a-z]` and `\` escapes.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|skip| glob_match(rest, &text[skip..])),
        Some((b'?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((b'[', rest)) => {
            let Some((&first, tail)) = text.split_first() else {
                return false;
            };
            match match_class(rest, first) {
                Some((matched, after)) => matched && glob_match(after, tail),
                // Unterminated class: treat `[` literally.
                None => first == b'[' && glob_match(rest, tail),
            }
        }
        Some((b'\\', rest)) if !rest.is_empty() => {
            text.first() == rest.first() && glob_match(&rest[1..], &text[1..])
        }
        Some((&literal, rest)) => text.first() == Some(&literal) && glob_match(rest, &text[1..]),
    }
}

/// Matches `byte` against a class body (after `[`). Returns the outcome and the pattern after `]`.
fn match_class(class: &[u8], byte: u8) -> Option<(bool, &[u8])> {
    let (negated, mut index) = match class.first() {
        Some(b'^') => (true, 1),
        _ => (false, 0),
    };

    let mut matched = false;
    while index < class.len() {
        match class[index] {
            b']' => return Some((matched != negated, &class[index + 1..])),
            b'\\' if index + 1 < class.len() => {
                matched |= class[index + 1] == byte;
                index += 2;
            }
            low if index + 2 < class.len() && class[index + 1] == b'-' && class[index + 2] != b']' => {
                let high = class[index + 2];
                let (low, high) = if low <= high { (low, high) } else { (high, low) };
                matched |= (low..=high).contains(&byte);
                index += 3;
            }
            single => {
                matched |= single == byte;
                index += 1;
            }
        }
    }

    None
}

fn rwlock_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

fn rwlock_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

fn mutex_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_supports_redis_wildcards() {
        assert!(glob_match(b"*", b""));
        assert!(glob_match(b"user:*", b"user:42"));
        assert!(!glob_match(b"user:*", b"session:1"));
        assert!(glob_match(b"h?llo", b"hallo"));
        assert!(glob_match(b"h[ae]llo", b"hello"));
        assert!(!glob_match(b"h[^e]llo", b"hello"));
        assert!(glob_match(b"k[0-9]", b"k7"));
        assert!(glob_match(b"a\\*b", b"a*b"));
        assert!(!glob_match(b"a\\*b", b"axb"));
        assert!(glob_match(b"[abc", b"[abc"));
    }

    #[test]
    fn list_skips_foreign_types_and_honours_max_keys() {
        let store = FakeStore::new()
            .with_key("a", StoreValue::string("1"))
            .with_key("b", StoreValue::list(["x", "y"]))
            .with_foreign_key("events", "stream")
            .with_key("c", StoreValue::string("3"));

        let keys = store.list_keys(&KeyScanRequest::new("")).unwrap();
        let names: Vec<_> = keys.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(keys[1].len, 2);

        let capped = store
            .list_keys(&KeyScanRequest::new("*").with_max_keys(2))
            .unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn write_refuses_existing_key() {
        let store = FakeStore::new().with_key("k", StoreValue::string("old"));
        let result = store.write_key(&KeyWriteRequest::new("k", StoreValue::string("new")));

        assert_eq!(result, Err(StoreError::KeyExists("k".to_string())));
        assert_eq!(store.value("k"), Some(StoreValue::string("old")));
    }

    #[test]
    fn injected_failures_are_recorded_and_returned() {
        let store = FakeStore::new()
            .with_failure(FakeOperation::DeleteKey, StoreError::unavailable("down"));

        let result = store.delete_key(&KeyRef::new("k"));
        assert_eq!(result, Err(StoreError::unavailable("down")));
        assert_eq!(store.stats().count(FakeOperation::DeleteKey), 1);

        store.clear_failure(FakeOperation::DeleteKey);
        assert_eq!(store.delete_key(&KeyRef::new("k")), Ok(false));
    }

    #[test]
    fn replace_keeps_ttl_and_rejects_other_types() {
        let store = FakeStore::new().with_expiring_key(
            "k",
            StoreValue::list(["a"]),
            Duration::from_secs(60),
        );

        store
            .replace_value(&KeyReplaceRequest::new("k", StoreValue::list(["b"])))
            .unwrap();
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(60)));

        let conflict = store.replace_value(&KeyReplaceRequest::new("k", StoreValue::string("s")));
        assert!(matches!(conflict, Err(StoreError::TypeConflict(_))));
    }

    #[test]
    fn databases_are_isolated() {
        let store = FakeStore::new().with_key_in(3, "k", StoreValue::string("v"));

        assert!(!store.contains("k"));
        let found = store.read_key(&KeyRef::new("k").with_database(3)).unwrap();
        assert!(found.is_some());
    }
}
