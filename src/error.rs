//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache construction and storage operations.
///
/// `NotSupported` and `Connect` are construction-time failures. `BadPacket`
/// only surfaces from the low-level storage API; the `StorableCache` façade
/// absorbs it along with every other per-operation failure.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Unknown storage discriminant, or the backend was compiled out
    #[error("Storage not supported: {0}")]
    NotSupported(String),

    /// Backend unreachable or misconfigured
    #[error("Storage connect failed: {0}")]
    Connect(String),

    /// Entry missing, unreadable or not decodable into a packet
    #[error("Bad packet: {0}")]
    BadPacket(String),

    /// Key rejected by the key policy
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Packet encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error reported by a caller-supplied SQL client
    #[error("SQL error: {0}")]
    Sql(String),

    /// SQLite driver error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Redis driver error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Memcached driver error
    #[cfg(feature = "memcached")]
    #[error("Memcached error: {0}")]
    Memcached(#[from] memcache::MemcacheError),
}

impl CacheError {
    /// Returns true for the recoverable "no usable entry" case.
    pub fn is_bad_packet(&self) -> bool {
        matches!(self, CacheError::BadPacket(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CacheError::NotSupported("ftp".to_string()).to_string(),
            "Storage not supported: ftp"
        );
        assert_eq!(
            CacheError::BadPacket("empty".to_string()).to_string(),
            "Bad packet: empty"
        );
    }

    #[test]
    fn test_is_bad_packet() {
        assert!(CacheError::BadPacket("x".to_string()).is_bad_packet());
        assert!(!CacheError::Connect("x".to_string()).is_bad_packet());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CacheError = io.into();
        assert!(matches!(err, CacheError::Io(_)));
    }
}
