//! StorableCache Module
//!
//! Façade over one storage backend. Applies the default lifetime and savetime
//! and turns every per-operation failure into a safe default.

use std::fmt;

use tracing::{debug, info, warn};

use crate::cache::{DEFAULT_LIFETIME, DEFAULT_SAVETIME};
use crate::config::{CacheConfig, StorageType};
use crate::error::{CacheError, Result};
use crate::storage::{FilesStorage, MemoryStorage, SqlClient, SqlStorage, Storage};

// == Storable Cache ==
/// Key/value cache where every entry carries a lifetime and a savetime.
///
/// A value past its lifetime is still returned by [`StorableCache::get`];
/// callers that care check [`StorableCache::expired`] and may keep serving the
/// stale value while a fresh one cannot be computed. Entries past their
/// savetime are removed by [`StorableCache::delete_outdated`].
pub struct StorableCache {
    storage: Box<dyn Storage>,
    default_lifetime: i64,
    default_savetime: i64,
}

impl fmt::Debug for StorableCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorableCache")
            .field("storage", &self.storage.kind())
            .field("default_lifetime", &self.default_lifetime)
            .field("default_savetime", &self.default_savetime)
            .finish()
    }
}

impl StorableCache {
    // == Constructors ==
    /// Creates a cache over the backend named by `config.storage`.
    ///
    /// # Errors
    /// - `NotSupported` for an unknown discriminant or a backend compiled out
    /// - `Connect` if the backend cannot be reached, or for the SQL backend,
    ///   which needs [`StorableCache::with_sql_client`]
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Creates a cache, handing a connected client to the SQL backend.
    ///
    /// The client is ignored by every other backend.
    pub fn with_sql_client(config: &CacheConfig, client: Box<dyn SqlClient>) -> Result<Self> {
        Self::build(config, Some(client))
    }

    /// Wraps a custom storage with the default lifetime and savetime.
    pub fn from_storage(storage: Box<dyn Storage>) -> Self {
        Self {
            storage,
            default_lifetime: DEFAULT_LIFETIME,
            default_savetime: DEFAULT_SAVETIME,
        }
    }

    fn build(config: &CacheConfig, client: Option<Box<dyn SqlClient>>) -> Result<Self> {
        let kind = config.storage_type()?;
        let storage = open_storage(kind, config, client)?;
        info!("storable cache using {} storage", kind);

        Ok(Self {
            storage,
            default_lifetime: config.default_lifetime,
            default_savetime: config.default_savetime,
        })
    }

    /// Backend in use.
    pub fn storage_type(&self) -> StorageType {
        self.storage.kind()
    }

    /// Direct access to the backend, for callers that need packets or errors.
    pub fn storage_mut(&mut self) -> &mut dyn Storage {
        self.storage.as_mut()
    }

    fn usable_key(key: &str, operation: &str) -> bool {
        if key.is_empty() {
            warn!("storable cache: {} called with an empty key", operation);
            false
        } else {
            true
        }
    }

    // == Has ==
    /// Returns true if a readable entry exists for `key`.
    pub fn has(&mut self, key: &str) -> bool {
        Self::usable_key(key, "has") && self.storage.has(key)
    }

    // == Get ==
    /// Returns the stored value, or `default` (empty if `None`) on a miss.
    ///
    /// A missing entry and a corrupt one look the same here.
    pub fn get(&mut self, key: &str, default: Option<&str>) -> String {
        let fallback = || default.unwrap_or_default().to_string();
        if !Self::usable_key(key, "get") {
            return fallback();
        }

        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                debug!("storable cache: miss for '{}': {}", key, e);
                fallback()
            }
        }
    }

    // == Set ==
    /// Stores `value`, substituting the defaults for a missing or negative
    /// lifetime or savetime.
    pub fn set(
        &mut self,
        key: &str,
        value: &str,
        lifetime: Option<i64>,
        savetime: Option<i64>,
    ) -> bool {
        if !Self::usable_key(key, "set") {
            return false;
        }

        let lifetime = lifetime
            .filter(|l| *l >= 0)
            .unwrap_or(self.default_lifetime);
        let savetime = savetime
            .filter(|s| *s >= 0)
            .unwrap_or(self.default_savetime);

        let stored = self.storage.set(key, value, lifetime, savetime);
        if !stored {
            debug!("storable cache: set '{}' was not stored", key);
        }
        stored
    }

    // == Delete ==
    /// Removes the entry for `key`; removing an absent key succeeds.
    pub fn delete(&mut self, key: &str) -> bool {
        Self::usable_key(key, "delete") && self.storage.delete(key)
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&mut self) -> bool {
        self.storage.clear()
    }

    // == Expired ==
    /// Returns whether the value for `key` has outlived its lifetime.
    ///
    /// Missing or unreadable entries count as expired.
    pub fn expired(&mut self, key: &str) -> bool {
        if !Self::usable_key(key, "expired") {
            return true;
        }

        match self.storage.expired(key) {
            Ok(expired) => expired,
            Err(e) => {
                debug!("storable cache: treating '{}' as expired: {}", key, e);
                true
            }
        }
    }

    // == Delete Outdated ==
    /// Removes every entry past its savetime.
    pub fn delete_outdated(&mut self) -> bool {
        self.storage.delete_outdated()
    }
}

// == Backend Selection ==
/// Opens the backend for `kind` from `config`.
fn open_storage(
    kind: StorageType,
    config: &CacheConfig,
    client: Option<Box<dyn SqlClient>>,
) -> Result<Box<dyn Storage>> {
    match kind {
        StorageType::Array => Ok(Box::new(MemoryStorage::new())),
        StorageType::Files => Ok(Box::new(FilesStorage::new(&config.files_dir)?)),
        StorageType::Sql => {
            let client = client.ok_or_else(|| {
                CacheError::Connect("sql storage requires a connected client".to_string())
            })?;
            Ok(Box::new(SqlStorage::new(client, &config.sql)?))
        }
        StorageType::Sqlite => open_sqlite(config),
        StorageType::Redis => open_redis(config),
        StorageType::Memcached => open_memcached(config),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &CacheConfig) -> Result<Box<dyn Storage>> {
    let storage = crate::storage::SqliteStorage::open(&config.sqlite_base, &config.sqlite)?;
    Ok(Box::new(storage))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_: &CacheConfig) -> Result<Box<dyn Storage>> {
    Err(CacheError::NotSupported(
        "sqlite storage not compiled in".to_string(),
    ))
}

#[cfg(feature = "redis")]
fn open_redis(config: &CacheConfig) -> Result<Box<dyn Storage>> {
    let storage = crate::storage::RedisStorage::connect(&config.redis_host, config.redis_port)?;
    Ok(Box::new(storage))
}

#[cfg(not(feature = "redis"))]
fn open_redis(_: &CacheConfig) -> Result<Box<dyn Storage>> {
    Err(CacheError::NotSupported(
        "redis storage not compiled in".to_string(),
    ))
}

#[cfg(feature = "memcached")]
fn open_memcached(config: &CacheConfig) -> Result<Box<dyn Storage>> {
    let storage =
        crate::storage::MemcachedStorage::connect(&config.memcached_host, config.memcached_port)?;
    Ok(Box::new(storage))
}

#[cfg(not(feature = "memcached"))]
fn open_memcached(_: &CacheConfig) -> Result<Box<dyn Storage>> {
    Err(CacheError::NotSupported(
        "memcached storage not compiled in".to_string(),
    ))
}
