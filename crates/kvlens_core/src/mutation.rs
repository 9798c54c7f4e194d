//! Validate-before-commit sequencing for create, read, update and delete.
//!
//! Every request is decoded and checked before the store is touched, so a
//! malformed edit never reaches the store.

use crate::codec::{self, Format};
use crate::error::MutationError;
use crate::key_value::{
    KeyDescriptor, KeyExpireRequest, KeyRef, KeyReplaceRequest, KeyScanRequest, KeyType,
    KeyWriteRequest, RawReply, StoreValue,
};
use crate::traits::{KeyValueStore, StoreRegistry};
use crate::ttl::{self, NegativeTtlPolicy};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Request to create a new key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub server: String,
    pub database: Option<u32>,
    pub key_type: KeyType,
    pub key: String,
    /// Raw TTL expression, e.g. `10m`. Empty means no expiry.
    pub ttl: String,
    pub format: Format,
    pub value: String,
}

impl CreateRequest {
    pub fn new(
        server: impl Into<String>,
        key: impl Into<String>,
        key_type: KeyType,
        value: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            database: None,
            key_type,
            key: key.into(),
            ttl: String::new(),
            format: Format::String,
            value: value.into(),
        }
    }

    pub fn with_database(mut self, database: Option<u32>) -> Self {
        self.database = database;
        self
    }

    pub fn with_ttl(mut self, ttl: impl Into<String>) -> Self {
        self.ttl = ttl.into();
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

/// Request to replace the content of an existing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub server: String,
    pub database: Option<u32>,
    pub key: String,
    pub changed_content: String,
    pub format: Format,
}

impl UpdateRequest {
    pub fn new(
        server: impl Into<String>,
        key: impl Into<String>,
        changed_content: impl Into<String>,
        format: Format,
    ) -> Self {
        Self {
            server: server.into(),
            database: None,
            key: key.into(),
            changed_content: changed_content.into(),
            format,
        }
    }

    pub fn with_database(mut self, database: Option<u32>) -> Self {
        self.database = database;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub server: String,
    pub database: Option<u32>,
    pub key: String,
    /// Display format; detected from the value when `None`.
    pub format: Option<Format>,
}

impl ReadRequest {
    pub fn new(server: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            database: None,
            key: key.into(),
            format: None,
        }
    }

    pub fn with_database(mut self, database: Option<u32>) -> Self {
        self.database = database;
        self
    }

    pub fn with_format(mut self, format: Option<Format>) -> Self {
        self.format = format;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub server: String,
    pub database: Option<u32>,
    pub key: String,
}

impl DeleteRequest {
    pub fn new(server: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            database: None,
            key: key.into(),
        }
    }

    pub fn with_database(mut self, database: Option<u32>) -> Self {
        self.database = database;
        self
    }
}

/// Display payload for one key, recomputed on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentView {
    pub key: String,
    pub key_type: Option<KeyType>,
    pub content: String,
    /// Remaining TTL as text, `no expiry` for persistent keys.
    pub ttl: String,
    pub size: u64,
    pub encoding: String,
    pub format: Option<Format>,
    pub exists: bool,
    /// Set when `content` does not represent the value faithfully.
    pub error: String,
}

impl ContentView {
    /// View of a key that does not exist.
    pub fn missing(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            key_type: None,
            content: String::new(),
            ttl: String::new(),
            size: 0,
            encoding: String::new(),
            format: None,
            exists: false,
            error: String::new(),
        }
    }

    /// Whether saving `content` unchanged would write the value back as-is.
    pub fn is_lossless(&self) -> bool {
        self.error.is_empty()
    }
}

/// Runs mutations against the stores of a [`StoreRegistry`].
pub struct MutationService {
    registry: StoreRegistry,
    negative_ttl_policy: NegativeTtlPolicy,
    default_format: Option<Format>,
}

impl MutationService {
    pub fn new(registry: StoreRegistry) -> Self {
        Self {
            registry,
            negative_ttl_policy: NegativeTtlPolicy::default(),
            default_format: None,
        }
    }

    pub fn with_negative_ttl_policy(mut self, policy: NegativeTtlPolicy) -> Self {
        self.negative_ttl_policy = policy;
        self
    }

    /// Format used by reads that do not ask for one. `None` detects it per value.
    pub fn with_default_format(mut self, format: Option<Format>) -> Self {
        self.default_format = format;
        self
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    pub fn store(&self, server: &str) -> Result<Arc<dyn KeyValueStore>, MutationError> {
        self.registry
            .get(server)
            .ok_or_else(|| MutationError::UnknownServer(server.to_string()))
    }

    /// Scans keys on `server`.
    pub fn list_keys(
        &self,
        server: &str,
        request: &KeyScanRequest,
    ) -> Result<Vec<KeyDescriptor>, MutationError> {
        let store = self.store(server)?;
        Ok(store.list_keys(request)?)
    }

    /// Creates a key that must not exist yet.
    ///
    /// Stores without atomic expiry get the value first and the TTL right
    /// after; if only the TTL step fails the error is
    /// [`MutationError::PartialTtlFailure`] and the key exists without expiry.
    pub fn create(&self, request: &CreateRequest) -> Result<KeyDescriptor, MutationError> {
        ensure_key(&request.key)?;
        let store = self.store(&request.server)?;

        let value = codec::decode(request.format, request.key_type, &request.value)?;
        let expiry = ttl::parse_ttl(&request.ttl)?
            .for_create()
            .resolve(self.negative_ttl_policy);

        let descriptor = descriptor_for(&request.key, &value);

        if store.atomic_expiry() || expiry.is_none() {
            let write = KeyWriteRequest::new(request.key.clone(), value)
                .with_database(request.database)
                .with_expiry(expiry);
            store.write_key(&write)?;
        } else {
            let write =
                KeyWriteRequest::new(request.key.clone(), value).with_database(request.database);
            store.write_key(&write)?;

            if let Some(expiry) = expiry {
                let expire = KeyExpireRequest::new(request.key.clone(), expiry)
                    .with_database(request.database);

                if let Err(source) = store.apply_expiry(&expire) {
                    warn!(
                        "Key '{}' on {} was created but its TTL could not be applied: {}",
                        request.key, request.server, source
                    );
                    return Err(MutationError::PartialTtlFailure {
                        key: request.key.clone(),
                        source,
                    });
                }
            }
        }

        info!(
            "Created {} key '{}' on {}",
            request.key_type, request.key, request.server
        );

        Ok(descriptor)
    }

    /// Fetches a key and renders it in the requested format.
    pub fn read(&self, request: &ReadRequest) -> Result<ContentView, MutationError> {
        ensure_key(&request.key)?;
        let store = self.store(&request.server)?;

        let key = KeyRef {
            key: request.key.clone(),
            database: request.database,
        };

        let Some(record) = store.read_key(&key)? else {
            debug!("Key '{}' not found on {}", request.key, request.server);
            return Ok(ContentView::missing(request.key.clone()));
        };

        let format = request
            .format
            .or(self.default_format)
            .unwrap_or_else(|| Format::detect(&record.value));
        let codec = format.codec();

        let error = if codec.is_lossless(&record.value) {
            String::new()
        } else {
            warn!(
                "Key '{}' holds bytes the {} format cannot show",
                request.key, format
            );
            format!(
                "The value contains bytes the {} format cannot show faithfully; edit it as Quoted to keep them",
                format
            )
        };

        Ok(ContentView {
            key: request.key.clone(),
            key_type: Some(record.key_type),
            content: codec.encode(&record.value),
            ttl: ttl::format_remaining(record.ttl),
            size: record.size,
            encoding: record.encoding,
            format: Some(format),
            exists: true,
            error,
        })
    }

    /// Replaces the value of an existing key. Its current type decides how the
    /// content is decoded and its TTL is kept.
    pub fn update(&self, request: &UpdateRequest) -> Result<KeyDescriptor, MutationError> {
        ensure_key(&request.key)?;
        let store = self.store(&request.server)?;

        let key = KeyRef {
            key: request.key.clone(),
            database: request.database,
        };

        let key_type = store
            .key_type(&key)?
            .ok_or_else(|| MutationError::NotFound(request.key.clone()))?;

        let value = codec::decode(request.format, key_type, &request.changed_content)?;
        let descriptor = descriptor_for(&request.key, &value);

        let replace =
            KeyReplaceRequest::new(request.key.clone(), value).with_database(request.database);
        store.replace_value(&replace)?;

        info!(
            "Updated {} key '{}' on {}",
            key_type, request.key, request.server
        );

        Ok(descriptor)
    }

    /// Removes a key. Deleting an absent key succeeds and returns `false`.
    pub fn delete(&self, request: &DeleteRequest) -> Result<bool, MutationError> {
        ensure_key(&request.key)?;
        let store = self.store(&request.server)?;

        let key = KeyRef {
            key: request.key.clone(),
            database: request.database,
        };
        let removed = store.delete_key(&key)?;

        if removed {
            info!("Deleted key '{}' on {}", request.key, request.server);
        } else {
            debug!("Key '{}' on {} was already gone", request.key, request.server);
        }

        Ok(removed)
    }

    /// Passes a command line through to the store.
    pub fn run_raw_command(
        &self,
        server: &str,
        database: Option<u32>,
        command: &str,
    ) -> Result<RawReply, MutationError> {
        let store = self.store(server)?;
        let reply = store.run_raw_command(database, command)?;

        debug!(
            "Raw command on {} returned {}",
            server,
            if reply.is_error { "an error" } else { "a reply" }
        );

        Ok(reply)
    }

    pub fn server_info(&self, server: &str) -> Result<String, MutationError> {
        Ok(self.store(server)?.server_info()?)
    }

    pub fn database_count(&self, server: &str) -> Result<u32, MutationError> {
        Ok(self.store(server)?.database_count()?)
    }
}

fn ensure_key(key: &str) -> Result<(), MutationError> {
    if key.trim().is_empty() {
        Err(MutationError::EmptyKey)
    } else {
        Ok(())
    }
}

/// Listing entry for a freshly written value.
pub(crate) fn descriptor_for(key: &str, value: &StoreValue) -> KeyDescriptor {
    let descriptor = KeyDescriptor::new(key, value.key_type());
    if value.key_type().is_composite() {
        descriptor.with_len(value.size())
    } else {
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_view_is_empty() {
        let view = ContentView::missing("gone");
        assert!(!view.exists);
        assert_eq!(view.key, "gone");
        assert!(view.content.is_empty());
        assert!(view.ttl.is_empty());
        assert_eq!(view.size, 0);
        assert!(view.key_type.is_none());
    }

    #[test]
    fn view_serializes_format_and_type_names() {
        let view = ContentView {
            key: "k".to_string(),
            key_type: Some(KeyType::SortedSet),
            content: "[]".to_string(),
            ttl: "no expiry".to_string(),
            size: 0,
            encoding: "listpack".to_string(),
            format: Some(Format::Json),
            exists: true,
            error: String::new(),
        };

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["key_type"], "zset");
        assert_eq!(json["format"], "JSON");
        assert_eq!(json["exists"], true);
    }

    #[test]
    fn whitespace_only_key_is_empty() {
        assert_eq!(ensure_key("  "), Err(MutationError::EmptyKey));
        assert_eq!(ensure_key(" k "), Ok(()));
    }

    #[test]
    fn descriptors_count_elements_of_composites_only() {
        assert_eq!(descriptor_for("s", &StoreValue::string("hello")).len, 1);
        assert_eq!(descriptor_for("l", &StoreValue::list(["a", "b"])).len, 2);
    }
}
