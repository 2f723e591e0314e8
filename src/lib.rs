//! Storable Cache - key/value caching over interchangeable backends
//!
//! Every entry carries two horizons: a lifetime, after which the value is
//! expired but still served, and a savetime, after which the entry may be
//! removed. Backends: memory, files, SQL, SQLite, Redis and Memcached.

pub mod cache;
pub mod config;
pub mod error;
pub mod storage;
pub mod tasks;

pub use cache::{Packet, StorableCache, DEFAULT_LIFETIME, DEFAULT_SAVETIME};
pub use config::{CacheConfig, SqlSettings, StorageType};
pub use error::{CacheError, Result};
pub use storage::Storage;
pub use tasks::spawn_cleanup_task;
