//! Memcached Storage
//!
//! Encoded packets stored with a native expiration derived from savetime.
//! The server evicts outdated entries itself, so `delete_outdated` is a no-op.

use std::borrow::Cow;

use memcache::Client;
use tracing::{info, warn};

use crate::cache::{current_timestamp, Packet};
use crate::config::StorageType;
use crate::error::{CacheError, Result};
use crate::storage::{key, Storage};

/// Longest key memcached accepts.
const MAX_KEY_LENGTH: usize = 250;

/// Relative expirations above this are read by memcached as Unix timestamps.
const MAX_RELATIVE_EXPIRATION: i64 = 60 * 60 * 24 * 30;

// == Memcached Storage ==
/// Storage over a memcached client.
pub struct MemcachedStorage {
    client: Client,
}

impl MemcachedStorage {
    // == Constructor ==
    /// Connects to `host:port`, failing with `Connect` if the server is unreachable.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let url = format!("memcache://{}:{}", host, port);
        let client = memcache::connect(url.as_str())
            .map_err(|e| CacheError::Connect(format!("memcached at {}:{}: {}", host, port, e)))?;

        info!("memcached storage connected to {}:{}", host, port);
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Memcached keys are at most 250 bytes with no whitespace or control
    /// characters; anything else is stored under its digest.
    fn server_key(key: &str) -> Cow<'_, str> {
        let usable = !key.is_empty()
            && key.len() <= MAX_KEY_LENGTH
            && !key.chars().any(|c| c.is_whitespace() || c.is_control());
        if usable {
            Cow::Borrowed(key)
        } else {
            Cow::Owned(key::digest(key))
        }
    }

    /// Native expiration one second past savetime, switching to an absolute
    /// timestamp past the 30 day relative limit.
    fn expiration(savetime: i64) -> u32 {
        let relative = savetime.max(0).saturating_add(1);
        let expiration = if relative > MAX_RELATIVE_EXPIRATION {
            current_timestamp().saturating_add(relative)
        } else {
            relative
        };
        u32::try_from(expiration).unwrap_or(u32::MAX)
    }
}

impl Storage for MemcachedStorage {
    fn kind(&self) -> StorageType {
        StorageType::Memcached
    }

    fn get_packet(&mut self, key: &str) -> Result<Packet> {
        let raw: Option<String> = self
            .client
            .get(&Self::server_key(key))
            .map_err(|e| CacheError::BadPacket(format!("memcached get failed: {}", e)))?;
        let raw = raw.ok_or_else(|| CacheError::BadPacket(format!("no entry for '{}'", key)))?;
        Packet::decode(raw.as_bytes())
    }

    fn set(&mut self, key: &str, value: &str, lifetime: i64, savetime: i64) -> bool {
        let blob = Packet::new(value, lifetime, savetime).encode();
        match self.client.set(
            &Self::server_key(key),
            blob.as_str(),
            Self::expiration(savetime),
        ) {
            Ok(()) => true,
            Err(e) => {
                warn!("memcached storage: set '{}' failed: {}", key, e);
                false
            }
        }
    }

    fn delete(&mut self, key: &str) -> bool {
        match self.client.delete(&Self::server_key(key)) {
            Ok(_) => true,
            Err(e) => {
                warn!("memcached storage: delete '{}' failed: {}", key, e);
                false
            }
        }
    }

    /// Native expiration already removes outdated entries.
    fn delete_outdated(&mut self) -> bool {
        true
    }

    fn clear(&mut self) -> bool {
        match self.client.flush() {
            Ok(()) => true,
            Err(e) => {
                warn!("memcached storage: flush failed: {}", e);
                false
            }
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_key_passthrough() {
        assert_eq!(MemcachedStorage::server_key("user:42/profile"), "user:42/profile");
    }

    #[test]
    fn test_server_key_hashes_unusable_keys() {
        let long = "x".repeat(MAX_KEY_LENGTH + 1);
        for key in ["with space", "tab\there", "nl\n", long.as_str()] {
            assert_eq!(MemcachedStorage::server_key(key), key::digest(key));
        }
    }

    #[test]
    fn test_expiration_relative() {
        assert_eq!(MemcachedStorage::expiration(0), 1);
        assert_eq!(MemcachedStorage::expiration(3600), 3601);
    }

    #[test]
    fn test_expiration_absolute_past_thirty_days() {
        let savetime = MAX_RELATIVE_EXPIRATION * 2;
        let expiration = MemcachedStorage::expiration(savetime) as i64;
        let expected = current_timestamp() + savetime + 1;
        assert!((expiration - expected).abs() <= 1);
    }

    #[test]
    fn test_expiration_saturates() {
        assert_eq!(MemcachedStorage::expiration(i64::MAX), u32::MAX);
        assert_eq!(MemcachedStorage::expiration(i64::MAX - 100), u32::MAX);
    }
}
