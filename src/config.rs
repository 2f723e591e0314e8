//! Configuration Module
//!
//! Handles the backend discriminant and the per-backend connection settings.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::cache::{DEFAULT_LIFETIME, DEFAULT_SAVETIME};
use crate::error::CacheError;

// == Storage Type ==
/// Backend selected by the configuration discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    /// Process-local map
    Array,
    /// One file per entry in a directory
    Files,
    /// Caller-supplied SQL connection
    Sql,
    /// SQLite database file
    Sqlite,
    /// Redis server
    Redis,
    /// Memcached server
    Memcached,
}

impl StorageType {
    /// Canonical discriminant string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Array => "array",
            StorageType::Files => "files",
            StorageType::Sql => "mysql",
            StorageType::Sqlite => "sqlite",
            StorageType::Redis => "redis",
            StorageType::Memcached => "memcached",
        }
    }
}

impl FromStr for StorageType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "array" | "memory" => Ok(StorageType::Array),
            "files" => Ok(StorageType::Files),
            "mysql" | "sql" => Ok(StorageType::Sql),
            "sqlite" => Ok(StorageType::Sqlite),
            "redis" => Ok(StorageType::Redis),
            "memcached" => Ok(StorageType::Memcached),
            other => Err(CacheError::NotSupported(format!(
                "unknown storage type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == SQL Settings ==
/// Table and column names used by the SQL and SQLite backends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SqlSettings {
    pub table: String,
    pub key_field: String,
    pub value_field: String,
    pub timestamp_field: String,
    pub lifetime_field: String,
    pub savetime_field: String,
}

impl SqlSettings {
    /// Default column layout with a custom table name.
    pub fn with_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }
}

impl Default for SqlSettings {
    fn default() -> Self {
        Self {
            table: "cache".to_string(),
            key_field: "key".to_string(),
            value_field: "value".to_string(),
            timestamp_field: "created".to_string(),
            lifetime_field: "lifetime".to_string(),
            savetime_field: "savetime".to_string(),
        }
    }
}

// == Cache Config ==
/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
/// The discriminant stays a plain string so that an unknown backend is reported
/// when the cache is constructed, not when the configuration is read.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend discriminant (`array`, `files`, `mysql`, `sqlite`, `redis`, `memcached`)
    pub storage: String,
    /// Directory for the files backend
    pub files_dir: PathBuf,
    /// Table layout for the SQL backend
    pub sql: SqlSettings,
    /// Database file for the SQLite backend
    pub sqlite_base: PathBuf,
    /// Table layout for the SQLite backend
    pub sqlite: SqlSettings,
    pub redis_host: String,
    pub redis_port: u16,
    pub memcached_host: String,
    pub memcached_port: u16,
    /// Lifetime in seconds applied when `set` gets none
    pub default_lifetime: i64,
    /// Savetime in seconds applied when `set` gets none
    pub default_savetime: i64,
    /// Interval in seconds between background `delete_outdated` sweeps
    pub sweep_interval: u64,
}

impl CacheConfig {
    /// Default configuration for the given backend discriminant.
    pub fn for_storage(storage: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            ..Self::default()
        }
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TYPE` - Backend discriminant (default: array)
    /// - `CACHE_DIR` - Files backend directory (default: /cache)
    /// - `CACHE_SQL_TABLE` - SQL backend table (default: cache)
    /// - `CACHE_SQLITE_BASE` - SQLite database file (default: /cache/cache.db)
    /// - `CACHE_SQLITE_TABLE` - SQLite backend table (default: cache)
    /// - `CACHE_REDIS_HOST` / `CACHE_REDIS_PORT` (default: localhost:6379)
    /// - `CACHE_MEMCACHED_HOST` / `CACHE_MEMCACHED_PORT` (default: localhost:11211)
    /// - `CACHE_LIFETIME` - Default lifetime in seconds (default: 3)
    /// - `CACHE_SAVETIME` - Default savetime in seconds (default: 3600)
    /// - `CACHE_SWEEP_INTERVAL` - Sweep frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage: env::var("CACHE_TYPE").unwrap_or(defaults.storage),
            files_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.files_dir),
            sql: env::var("CACHE_SQL_TABLE")
                .map(SqlSettings::with_table)
                .unwrap_or(defaults.sql),
            sqlite_base: env::var("CACHE_SQLITE_BASE")
                .map(PathBuf::from)
                .unwrap_or(defaults.sqlite_base),
            sqlite: env::var("CACHE_SQLITE_TABLE")
                .map(SqlSettings::with_table)
                .unwrap_or(defaults.sqlite),
            redis_host: env::var("CACHE_REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: parse_var("CACHE_REDIS_PORT").unwrap_or(defaults.redis_port),
            memcached_host: env::var("CACHE_MEMCACHED_HOST").unwrap_or(defaults.memcached_host),
            memcached_port: parse_var("CACHE_MEMCACHED_PORT").unwrap_or(defaults.memcached_port),
            default_lifetime: parse_var("CACHE_LIFETIME").unwrap_or(defaults.default_lifetime),
            default_savetime: parse_var("CACHE_SAVETIME").unwrap_or(defaults.default_savetime),
            sweep_interval: parse_var("CACHE_SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
        }
    }

    /// Parses the discriminant.
    pub fn storage_type(&self) -> crate::error::Result<StorageType> {
        self.storage.parse()
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            storage: StorageType::Array.as_str().to_string(),
            files_dir: PathBuf::from("/cache"),
            sql: SqlSettings::default(),
            sqlite_base: PathBuf::from("/cache/cache.db"),
            sqlite: SqlSettings::default(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            memcached_host: "localhost".to_string(),
            memcached_port: 11211,
            default_lifetime: DEFAULT_LIFETIME,
            default_savetime: DEFAULT_SAVETIME,
            sweep_interval: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.storage, "array");
        assert_eq!(config.redis_port, 6379);
        assert_eq!(config.memcached_port, 11211);
        assert_eq!(config.default_lifetime, 3);
        assert_eq!(config.default_savetime, 3600);
        assert_eq!(config.sql.timestamp_field, "created");
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_TYPE");
        env::remove_var("CACHE_LIFETIME");
        env::remove_var("CACHE_SAVETIME");
        env::remove_var("CACHE_REDIS_PORT");

        let config = CacheConfig::from_env();
        assert_eq!(config.storage, "array");
        assert_eq!(config.default_lifetime, 3);
        assert_eq!(config.default_savetime, 3600);
        assert_eq!(config.redis_port, 6379);
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config: CacheConfig = serde_json::from_str(
            r#"{"storage":"files","files_dir":"/tmp/c","sqlite":{"table":"kv"}}"#,
        )
        .unwrap();
        assert_eq!(config.storage, "files");
        assert_eq!(config.files_dir, PathBuf::from("/tmp/c"));
        assert_eq!(config.sqlite.table, "kv");
        assert_eq!(config.sqlite.key_field, "key");
        assert_eq!(config.default_savetime, 3600);
    }

    #[test]
    fn test_storage_type_parse() {
        assert_eq!("files".parse::<StorageType>().unwrap(), StorageType::Files);
        assert_eq!("Memory".parse::<StorageType>().unwrap(), StorageType::Array);
        assert_eq!("MYSQL".parse::<StorageType>().unwrap(), StorageType::Sql);
        assert_eq!("memcached".parse::<StorageType>().unwrap(), StorageType::Memcached);
    }

    #[test]
    fn test_storage_type_unknown() {
        assert!(matches!(
            "".parse::<StorageType>(),
            Err(CacheError::NotSupported(_))
        ));
        assert!(matches!(
            "ftp".parse::<StorageType>(),
            Err(CacheError::NotSupported(_))
        ));
    }

    #[test]
    fn test_storage_type_display_roundtrip() {
        for kind in [
            StorageType::Array,
            StorageType::Files,
            StorageType::Sql,
            StorageType::Sqlite,
            StorageType::Redis,
            StorageType::Memcached,
        ] {
            assert_eq!(kind.to_string().parse::<StorageType>().unwrap(), kind);
        }
    }
}
