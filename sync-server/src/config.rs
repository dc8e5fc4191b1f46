//! Configuration loading for sync-server.
//!
//! Configuration is loaded from a TOML file (default: `sync-server.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use sync_core::{CodecKind, SyncSettings, ViewConfig, ViewConfigError, DEFAULT_BASE_TIME};

/// Root configuration for sync-server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Sync token configuration.
    pub sync: SyncConfig,
    /// Per-resource view tables.
    pub views: ViewsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP server (default: 127.0.0.1:3000).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Sync token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Epoch for `synced_at` values, in unix milliseconds
    /// (default: 2017-01-01T00:00:00Z).
    #[serde(default = "default_base_time")]
    pub base_time: i64,
    /// Token encoding (default: json).
    #[serde(default)]
    pub codec: CodecKind,
}

/// View allow-lists and defaults per resource.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewsConfig {
    /// The `notes` resource.
    #[serde(default = "default_notes_view")]
    pub notes: ViewConfig,
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("notes.db")
}

fn default_base_time() -> i64 {
    DEFAULT_BASE_TIME
}

fn default_notes_view() -> ViewConfig {
    ViewConfig::default().with_allowed([
        ("view", vec!["list", "compact"]),
        ("order_by", vec!["id", "title", "status", "created_at", "updated_at"]),
        ("direction", vec!["asc", "desc", "ASC", "DESC"]),
    ])
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_time: default_base_time(),
            codec: CodecKind::default(),
        }
    }
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            notes: default_notes_view(),
        }
    }
}

impl SyncConfig {
    /// Build the process-wide sync settings.
    pub fn settings(&self) -> SyncSettings {
        SyncSettings::new(self.base_time, self.codec.codec().into())
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a
    /// view table contradicts itself.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.views
            .notes
            .validate()
            .map_err(|source| ConfigError::InvalidView {
                resource: "notes".to_string(),
                source,
            })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A view table is inconsistent.
    #[error("invalid view config for {resource}: {source}")]
    InvalidView {
        /// Resource the table belongs to.
        resource: String,
        /// What is wrong with it.
        source: ViewConfigError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert_eq!(config.storage.database, PathBuf::from("notes.db"));
        assert_eq!(config.sync.base_time, 1_483_228_800_000);
        assert_eq!(config.sync.codec, CodecKind::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "0.0.0.0:8080"

[storage]
database = "/data/notes.db"

[sync]
base_time = 0
codec = "url_safe"

[views.notes.allowed]
view = ["list", "grid"]

[views.notes.defaults]
view = "grid"
length = "20"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.storage.database, PathBuf::from("/data/notes.db"));
        assert_eq!(config.sync.base_time, 0);
        assert_eq!(config.sync.codec, CodecKind::UrlSafe);
        assert_eq!(config.views.notes.defaults["view"], "grid");
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.settings().codec().name(), "url_safe");
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let config: Config = toml::from_str("[server]\n[storage]\n").unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert_eq!(config.sync.base_time, DEFAULT_BASE_TIME);
        assert!(config.views.notes.allowed.contains_key("order_by"));

        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.storage.database, PathBuf::from("notes.db"));
    }

    #[test]
    fn unknown_codec_is_a_parse_error() {
        let result: Result<Config, _> = toml::from_str("[sync]\ncodec = \"xml\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn from_file_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind_address = \"127.0.0.1:4000\"").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:4000");

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            bad,
            "[views.notes.allowed]\nview = [\"list\"]\n[views.notes.defaults]\nview = \"grid\""
        )
        .unwrap();
        let err = Config::from_file(bad.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidView { .. }));
    }

    #[test]
    fn from_file_missing_path() {
        let err = Config::from_file(std::path::Path::new("/nonexistent/sync.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
