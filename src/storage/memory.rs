//! Memory Storage
//!
//! Process-local backend over a HashMap. Nothing survives the process.

use std::collections::HashMap;

use tracing::debug;

use crate::cache::Packet;
use crate::config::StorageType;
use crate::error::{CacheError, Result};
use crate::storage::Storage;

// == Memory Storage ==
/// In-memory packet map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, Packet>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a pre-built packet, keeping its timestamp.
    pub fn insert_packet(&mut self, key: impl Into<String>, packet: Packet) {
        self.entries.insert(key.into(), packet);
    }

    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn kind(&self) -> StorageType {
        StorageType::Array
    }

    fn has(&mut self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn get_packet(&mut self, key: &str) -> Result<Packet> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::BadPacket(format!("no entry for '{}'", key)))
    }

    fn set(&mut self, key: &str, value: &str, lifetime: i64, savetime: i64) -> bool {
        self.entries
            .insert(key.to_string(), Packet::new(value, lifetime, savetime));
        true
    }

    fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key);
        true
    }

    // == Delete Outdated ==
    fn delete_outdated(&mut self) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, packet| !packet.outdated());
        debug!(
            "memory storage: removed {} outdated entries",
            before - self.entries.len()
        );
        true
    }

    fn clear(&mut self) -> bool {
        self.entries.clear();
        true
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::current_timestamp;

    #[test]
    fn test_memory_set_and_get() {
        let mut storage = MemoryStorage::new();

        assert!(storage.set("key1", "value1", 10, 100));
        assert!(storage.has("key1"));
        assert_eq!(storage.get_value("key1").unwrap(), "value1");
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_memory_get_missing_is_bad_packet() {
        let mut storage = MemoryStorage::new();
        assert!(storage.get_packet("nope").unwrap_err().is_bad_packet());
        assert!(storage.get_value("nope").unwrap_err().is_bad_packet());
    }

    #[test]
    fn test_memory_overwrite_restamps() {
        let mut storage = MemoryStorage::new();
        storage.insert_packet("key1", Packet::with_timestamp("old", 1, 1, 10));

        storage.set("key1", "new", 5, 50);
        let packet = storage.get_packet("key1").unwrap();
        assert_eq!(packet.value(), "new");
        assert_eq!(packet.lifetime(), 5);
        assert!(packet.timestamp() > 10);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_memory_delete_is_idempotent() {
        let mut storage = MemoryStorage::new();
        storage.set("key1", "value1", 10, 100);

        assert!(storage.delete("key1"));
        assert!(storage.delete("key1"));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_memory_delete_outdated() {
        let mut storage = MemoryStorage::new();
        let now = current_timestamp();
        storage.insert_packet("stale", Packet::with_timestamp("v", 1, 5, now - 10));
        storage.insert_packet("expired", Packet::with_timestamp("v", 1, 60, now - 10));
        storage.set("fresh", "v", 10, 100);

        assert!(storage.delete_outdated());
        assert!(!storage.has("stale"));
        assert!(storage.has("expired"));
        assert!(storage.has("fresh"));
    }

    #[test]
    fn test_memory_clear() {
        let mut storage = MemoryStorage::new();
        storage.set("a", "1", 10, 100);
        storage.set("b", "2", 10, 100);

        assert!(storage.clear());
        assert!(!storage.has("a"));
        assert!(!storage.has("b"));
    }
}
