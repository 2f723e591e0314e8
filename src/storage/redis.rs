//! Redis Storage
//!
//! Encoded packets stored as plain string values. Savetime doubles as the
//! native TTL, so the server expires most outdated entries on its own.

use redis::{Client, Commands, Connection};
use tracing::{debug, info, warn};

use crate::cache::Packet;
use crate::config::StorageType;
use crate::error::{CacheError, Result};
use crate::storage::Storage;

/// Redis keeps expirations as absolute milliseconds in an i64.
const MAX_TTL: u64 = (i64::MAX / 1000 / 2) as u64;

// == Redis Storage ==
/// Storage over a synchronous Redis connection.
pub struct RedisStorage {
    conn: Connection,
}

impl RedisStorage {
    // == Constructor ==
    /// Connects to `host:port`, failing with `Connect` if the server is unreachable.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let url = format!("redis://{}:{}/", host, port);
        let conn = Client::open(url.as_str())
            .and_then(|client| client.get_connection())
            .map_err(|e| CacheError::Connect(format!("redis at {}:{}: {}", host, port, e)))?;

        info!("redis storage connected to {}:{}", host, port);
        Ok(Self { conn })
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Native TTL for a packet; one second past savetime so the server never
    /// drops an entry that is not yet outdated. Capped below the largest
    /// expire time Redis accepts.
    fn ttl(savetime: i64) -> u64 {
        (savetime.max(0) as u64).saturating_add(1).min(MAX_TTL)
    }

    fn try_delete_outdated(&mut self) -> Result<usize> {
        let keys: Vec<String> = self.conn.keys("*")?;
        let mut removed = 0usize;

        for key in keys {
            let stale = match self.get_packet(&key) {
                Ok(packet) => packet.outdated(),
                Err(_) => true,
            };
            if stale && self.delete(&key) {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl Storage for RedisStorage {
    fn kind(&self) -> StorageType {
        StorageType::Redis
    }

    fn get_packet(&mut self, key: &str) -> Result<Packet> {
        let raw: Option<String> = self
            .conn
            .get(key)
            .map_err(|e| CacheError::BadPacket(format!("redis get failed: {}", e)))?;
        let raw = raw.ok_or_else(|| CacheError::BadPacket(format!("no entry for '{}'", key)))?;
        Packet::decode(raw.as_bytes())
    }

    fn set(&mut self, key: &str, value: &str, lifetime: i64, savetime: i64) -> bool {
        let blob = Packet::new(value, lifetime, savetime).encode();
        match self
            .conn
            .set_ex::<_, _, ()>(key, blob, Self::ttl(savetime))
        {
            Ok(()) => true,
            Err(e) => {
                warn!("redis storage: set '{}' failed: {}", key, e);
                false
            }
        }
    }

    fn delete(&mut self, key: &str) -> bool {
        match self.conn.del::<_, i64>(key) {
            Ok(_) => true,
            Err(e) => {
                warn!("redis storage: delete '{}' failed: {}", key, e);
                false
            }
        }
    }

    // == Delete Outdated ==
    /// Scans every key, removing outdated and undecodable entries.
    fn delete_outdated(&mut self) -> bool {
        match self.try_delete_outdated() {
            Ok(removed) => {
                debug!("redis storage: removed {} outdated entries", removed);
                true
            }
            Err(e) => {
                warn!("redis storage: delete outdated failed: {}", e);
                false
            }
        }
    }

    /// Flushes the selected database.
    fn clear(&mut self) -> bool {
        match redis::cmd("FLUSHDB").query::<()>(&mut self.conn) {
            Ok(()) => true,
            Err(e) => {
                warn!("redis storage: flush failed: {}", e);
                false
            }
        }
    }
}
