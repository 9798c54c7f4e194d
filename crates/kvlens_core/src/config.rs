use crate::codec::Format;
use crate::key_value::KeyScanRequest;
use crate::ttl::NegativeTtlPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not find config directory")]
    NoConfigDir,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// A Redis server the explorer can connect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,

    /// `host:port`.
    pub addr: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default)]
    pub db: u32,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            password: None,
            username: None,
            db: 0,
        }
    }

    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,

    /// Upper bound on keys collected by one scan.
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,

    /// `COUNT` hint passed to each `SCAN` round trip.
    #[serde(default = "default_scan_count")]
    pub scan_count: u32,

    /// Format for reads that do not ask for one; detected per value when unset.
    #[serde(default)]
    pub default_format: Option<Format>,

    #[serde(default)]
    pub negative_ttl_policy: NegativeTtlPolicy,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            max_keys: default_max_keys(),
            scan_count: default_scan_count(),
            default_format: None,
            negative_ttl_policy: NegativeTtlPolicy::default(),
        }
    }
}

impl ExplorerConfig {
    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|server| server.name == name)
    }

    /// The server used when none is named: the first one configured.
    pub fn default_server(&self) -> Option<&ServerConfig> {
        self.servers.first()
    }
}

fn default_servers() -> Vec<ServerConfig> {
    vec![ServerConfig::new("local", "127.0.0.1:6379")]
}

fn default_max_keys() -> usize {
    KeyScanRequest::DEFAULT_MAX_KEYS
}

fn default_scan_count() -> u32 {
    KeyScanRequest::DEFAULT_COUNT
}

/// Reads the explorer config from `<config_dir>/kvlens/config.json`.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;

        Ok(Self {
            path: config_dir.join("kvlens").join("config.json"),
        })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the config. A missing file yields the defaults.
    pub fn load(&self) -> Result<ExplorerConfig, ConfigError> {
        if !self.path.exists() {
            return Ok(ExplorerConfig::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Invalid {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, config: &ExplorerConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(config).map_err(|e| ConfigError::Invalid {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        fs::write(&self.path, content).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::with_path(dir.path().join("absent.json"));

        let config = store.load().unwrap();
        assert_eq!(config, ExplorerConfig::default());
        assert_eq!(config.max_keys, 1000);
        assert_eq!(config.scan_count, 100);
        assert_eq!(config.default_server().unwrap().addr, "127.0.0.1:6379");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "servers": [{"name": "cache", "addr": "10.0.0.5:6380", "db": 2}],
                "default_format": "JSON",
                "negative_ttl_policy": "expire_immediately"
            }"#,
        )
        .unwrap();

        let config = ConfigStore::with_path(&path).load().unwrap();
        assert_eq!(config.max_keys, 1000);
        assert_eq!(config.default_format, Some(Format::Json));
        assert_eq!(config.negative_ttl_policy, NegativeTtlPolicy::ExpireImmediately);

        let cache = config.server("cache").unwrap();
        assert_eq!(cache.db, 2);
        assert!(cache.password.is_none());
    }

    #[test]
    fn save_then_load_keeps_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::with_path(dir.path().join("nested").join("config.json"));

        let config = ExplorerConfig {
            servers: vec![
                ServerConfig::new("a", "127.0.0.1:6379"),
                ServerConfig::new("b", "redis.internal:6379")
                    .with_db(3)
                    .with_password("secret"),
            ],
            max_keys: 50,
            scan_count: 10,
            default_format: Some(Format::Quoted),
            negative_ttl_policy: NegativeTtlPolicy::NoExpiry,
        };

        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn malformed_file_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let error = ConfigStore::with_path(&path).load().unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { .. }));
        assert!(error.to_string().contains("config.json"));
    }
}
