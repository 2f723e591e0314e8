//! Storage Module
//!
//! The contract every backend implements, the shared key policy, and one
//! module per backend.

pub mod files;
pub mod key;
pub mod memory;
pub mod sql;

#[cfg(feature = "memcached")]
pub mod memcached;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use files::FilesStorage;
pub use memory::MemoryStorage;
pub use sql::{SqlClient, SqlDialect, SqlStorage, SqlValue};

#[cfg(feature = "memcached")]
pub use self::memcached::MemcachedStorage;
#[cfg(feature = "redis")]
pub use self::redis::RedisStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

use crate::cache::Packet;
use crate::config::StorageType;
use crate::error::Result;

// == Storage Trait ==
/// Key/value storage of packets.
///
/// `get_packet` is the only fallible read: it fails with `BadPacket` when the
/// key is absent or the stored data cannot be decoded. The mutating operations
/// report failure as `false` and never return an error; a backend that cannot
/// write logs the cause and moves on.
pub trait Storage: Send {
    /// Backend discriminant.
    fn kind(&self) -> StorageType;

    /// Returns true if a readable, well-formed entry exists for `key`.
    fn has(&mut self, key: &str) -> bool {
        self.get_packet(key).is_ok()
    }

    /// Loads the packet stored under `key`.
    fn get_packet(&mut self, key: &str) -> Result<Packet>;

    /// Loads the value stored under `key`.
    fn get_value(&mut self, key: &str) -> Result<String> {
        self.get_packet(key).map(Packet::into_value)
    }

    /// Synonym for [`Storage::get_value`].
    fn get(&mut self, key: &str) -> Result<String> {
        self.get_value(key)
    }

    /// Returns whether the packet under `key` has outlived its lifetime.
    fn expired(&mut self, key: &str) -> Result<bool> {
        self.get_packet(key).map(|packet| packet.expired())
    }

    /// Stores `value` under `key` in a freshly stamped packet.
    fn set(&mut self, key: &str, value: &str, lifetime: i64, savetime: i64) -> bool;

    /// Removes the entry under `key`.
    fn delete(&mut self, key: &str) -> bool;

    /// Removes every outdated or undecodable entry.
    ///
    /// Returns false only when the scan could not start.
    fn delete_outdated(&mut self) -> bool;

    /// Removes every entry.
    fn clear(&mut self) -> bool;
}
