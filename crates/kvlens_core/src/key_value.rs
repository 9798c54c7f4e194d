use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Store-native key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    Hash,
    List,
    Set,
    #[serde(rename = "zset")]
    SortedSet,
}

impl KeyType {
    pub const ALL: [KeyType; 5] = [
        KeyType::String,
        KeyType::Hash,
        KeyType::List,
        KeyType::Set,
        KeyType::SortedSet,
    ];

    /// Parses a `TYPE` reply. Types the explorer cannot edit yield `None`.
    pub fn parse(type_name: &str) -> Option<Self> {
        match type_name.trim().to_ascii_lowercase().as_str() {
            "string" => Some(KeyType::String),
            "hash" => Some(KeyType::Hash),
            "list" => Some(KeyType::List),
            "set" => Some(KeyType::Set),
            "zset" => Some(KeyType::SortedSet),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::Hash => "hash",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::SortedSet => "zset",
        }
    }

    pub fn is_composite(self) -> bool {
        !matches!(self, KeyType::String)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sorted-set member with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: Vec<u8>,
    pub score: f64,
}

impl ScoredMember {
    pub fn new(member: impl Into<Vec<u8>>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// Value as held by the store. Elements keep the order the store returned.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    String(Vec<u8>),
    Hash(Vec<(Vec<u8>, Vec<u8>)>),
    List(Vec<Vec<u8>>),
    Set(Vec<Vec<u8>>),
    SortedSet(Vec<ScoredMember>),
}

impl StoreValue {
    pub fn key_type(&self) -> KeyType {
        match self {
            StoreValue::String(_) => KeyType::String,
            StoreValue::Hash(_) => KeyType::Hash,
            StoreValue::List(_) => KeyType::List,
            StoreValue::Set(_) => KeyType::Set,
            StoreValue::SortedSet(_) => KeyType::SortedSet,
        }
    }

    /// Strings report their byte length, composites their element count.
    pub fn size(&self) -> u64 {
        let size = match self {
            StoreValue::String(bytes) => bytes.len(),
            StoreValue::Hash(entries) => entries.len(),
            StoreValue::List(items) | StoreValue::Set(items) => items.len(),
            StoreValue::SortedSet(members) => members.len(),
        };
        size as u64
    }

    /// Iterates every byte payload held by the value (fields, values, members).
    pub fn byte_slices(&self) -> Box<dyn Iterator<Item = &[u8]> + '_> {
        match self {
            StoreValue::String(bytes) => Box::new(std::iter::once(bytes.as_slice())),
            StoreValue::Hash(entries) => Box::new(
                entries
                    .iter()
                    .flat_map(|(field, value)| [field.as_slice(), value.as_slice()]),
            ),
            StoreValue::List(items) | StoreValue::Set(items) => {
                Box::new(items.iter().map(Vec::as_slice))
            }
            StoreValue::SortedSet(members) => {
                Box::new(members.iter().map(|m| m.member.as_slice()))
            }
        }
    }

    pub fn is_utf8(&self) -> bool {
        self.byte_slices()
            .all(|bytes| std::str::from_utf8(bytes).is_ok())
    }

    pub fn string(value: impl Into<Vec<u8>>) -> Self {
        StoreValue::String(value.into())
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        StoreValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn set<I, T>(members: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        StoreValue::Set(members.into_iter().map(Into::into).collect())
    }

    pub fn hash<I, F, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        StoreValue::Hash(
            entries
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        )
    }

    pub fn sorted_set<I, T>(members: I) -> Self
    where
        I: IntoIterator<Item = (T, f64)>,
        T: Into<Vec<u8>>,
    {
        StoreValue::SortedSet(
            members
                .into_iter()
                .map(|(member, score)| ScoredMember::new(member, score))
                .collect(),
        )
    }
}

/// Listing entry for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    pub key: String,
    pub key_type: KeyType,
    /// Element count for composites, `1` for strings.
    pub len: u64,
}

impl KeyDescriptor {
    pub fn new(key: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            key: key.into(),
            key_type,
            len: 1,
        }
    }

    pub fn with_len(mut self, len: u64) -> Self {
        self.len = len;
        self
    }

    /// Text shown for the key in the listing; the client-side filter matches on this.
    pub fn display_text(&self) -> &str {
        &self.key
    }
}

/// Raw key state fetched from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRecord {
    pub key_type: KeyType,
    pub value: StoreValue,
    /// Remaining time to live; `None` when the key never expires.
    pub ttl: Option<Duration>,
    pub size: u64,
    /// Store-internal representation hint (`OBJECT ENCODING`), informational only.
    pub encoding: String,
}

impl KeyRecord {
    pub fn new(value: StoreValue) -> Self {
        Self {
            key_type: value.key_type(),
            size: value.size(),
            value,
            ttl: None,
            encoding: String::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }
}

/// Relative expiry handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    After(Duration),
    Immediately,
}

/// Request for scanning keys matching a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScanRequest {
    pub pattern: String,
    pub database: Option<u32>,
    pub max_keys: usize,
    pub count: u32,
}

impl KeyScanRequest {
    pub const DEFAULT_MAX_KEYS: usize = 1000;
    pub const DEFAULT_COUNT: u32 = 100;

    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            database: None,
            max_keys: Self::DEFAULT_MAX_KEYS,
            count: Self::DEFAULT_COUNT,
        }
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Pattern sent to the store; an empty pattern matches everything.
    pub fn effective_pattern(&self) -> &str {
        let trimmed = self.pattern.trim();
        if trimmed.is_empty() { "*" } else { trimmed }
    }
}

/// Request addressing a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRef {
    pub key: String,
    pub database: Option<u32>,
}

impl KeyRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            database: None,
        }
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = Some(database);
        self
    }
}

/// Create-only write. Fails with `KeyExists` when the key is present.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyWriteRequest {
    pub key: String,
    pub value: StoreValue,
    pub database: Option<u32>,
    /// Only honoured by stores reporting `atomic_expiry`.
    pub expiry: Option<Expiry>,
}

impl KeyWriteRequest {
    pub fn new(key: impl Into<String>, value: StoreValue) -> Self {
        Self {
            key: key.into(),
            value,
            database: None,
            expiry: None,
        }
    }

    pub fn with_database(mut self, database: Option<u32>) -> Self {
        self.database = database;
        self
    }

    pub fn with_expiry(mut self, expiry: Option<Expiry>) -> Self {
        self.expiry = expiry;
        self
    }
}

/// Applies a relative expiry to an existing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExpireRequest {
    pub key: String,
    pub expiry: Expiry,
    pub database: Option<u32>,
}

impl KeyExpireRequest {
    pub fn new(key: impl Into<String>, expiry: Expiry) -> Self {
        Self {
            key: key.into(),
            expiry,
            database: None,
        }
    }

    pub fn with_database(mut self, database: Option<u32>) -> Self {
        self.database = database;
        self
    }
}

/// Replaces the value of an existing key, keeping its type and TTL.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyReplaceRequest {
    pub key: String,
    pub value: StoreValue,
    pub database: Option<u32>,
}

impl KeyReplaceRequest {
    pub fn new(key: impl Into<String>, value: StoreValue) -> Self {
        Self {
            key: key.into(),
            value,
            database: None,
        }
    }

    pub fn with_database(mut self, database: Option<u32>) -> Self {
        self.database = database;
        self
    }
}

/// Reply to a raw command, passed through without interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReply {
    pub text: String,
    pub is_error: bool,
}

impl RawReply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}
