//! Packet Module
//!
//! Defines the stored unit: a value with its creation time and the two
//! time horizons, plus the versioned wire encoding shared by the byte-oriented
//! backends.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Current version tag of the packet encoding.
pub const PACKET_VERSION: u32 = 1;

// == Packet ==
/// A cached value together with its lifetime and savetime.
///
/// A packet is `expired` once more than `lifetime` seconds have passed since
/// `timestamp`, and `outdated` once more than `savetime` seconds have passed.
/// Both predicates are evaluated against the clock on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    value: String,
    timestamp: i64,
    lifetime: i64,
    savetime: i64,
}

/// On-the-wire shape of a packet.
#[derive(Serialize, Deserialize)]
struct PacketRecord<'a> {
    version: u32,
    #[serde(borrow)]
    value: std::borrow::Cow<'a, str>,
    timestamp: i64,
    lifetime: i64,
    savetime: i64,
}

impl Packet {
    // == Constructor ==
    /// Creates a packet stamped with the current time.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `lifetime` - Seconds until the value is considered expired
    /// * `savetime` - Seconds until the packet may be physically removed
    pub fn new(value: impl Into<String>, lifetime: i64, savetime: i64) -> Self {
        Self::with_timestamp(value, lifetime, savetime, current_timestamp())
    }

    /// Creates a packet with an explicit creation time.
    ///
    /// A negative `timestamp` is replaced by the current time.
    pub fn with_timestamp(
        value: impl Into<String>,
        lifetime: i64,
        savetime: i64,
        timestamp: i64,
    ) -> Self {
        let timestamp = if timestamp < 0 {
            current_timestamp()
        } else {
            timestamp
        };

        Self {
            value: value.into(),
            timestamp,
            lifetime,
            savetime,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Consumes the packet, returning the value.
    pub fn into_value(self) -> String {
        self.value
    }

    /// Creation time in Unix seconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn lifetime(&self) -> i64 {
        self.lifetime
    }

    pub fn savetime(&self) -> i64 {
        self.savetime
    }

    /// Seconds elapsed since the packet was created.
    pub fn age(&self) -> i64 {
        current_timestamp() - self.timestamp
    }

    // == Is Expired ==
    /// Returns true once more than `lifetime` seconds have elapsed.
    ///
    /// An expired packet is still present and its value still readable.
    pub fn expired(&self) -> bool {
        self.lifetime < self.age()
    }

    // == Is Outdated ==
    /// Returns true once more than `savetime` seconds have elapsed.
    pub fn outdated(&self) -> bool {
        self.savetime < self.age()
    }

    // == Encoding ==
    /// Encodes the packet as versioned JSON.
    pub fn encode(&self) -> String {
        let record = PacketRecord {
            version: PACKET_VERSION,
            value: std::borrow::Cow::Borrowed(&self.value),
            timestamp: self.timestamp,
            lifetime: self.lifetime,
            savetime: self.savetime,
        };
        // A struct of strings and integers always serializes.
        serde_json::to_string(&record).unwrap_or_default()
    }

    /// Decodes bytes produced by [`Packet::encode`].
    ///
    /// Empty, truncated or foreign bytes, an unknown version and a negative
    /// timestamp all fail with `BadPacket`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(CacheError::BadPacket("empty packet".to_string()));
        }

        let record: PacketRecord<'_> = serde_json::from_slice(bytes)
            .map_err(|e| CacheError::BadPacket(format!("undecodable packet: {}", e)))?;

        if record.version != PACKET_VERSION {
            return Err(CacheError::BadPacket(format!(
                "unsupported packet version {}",
                record.version
            )));
        }
        if record.timestamp < 0 {
            return Err(CacheError::BadPacket(format!(
                "negative timestamp {}",
                record.timestamp
            )));
        }

        Ok(Self {
            value: record.value.into_owned(),
            timestamp: record.timestamp,
            lifetime: record.lifetime,
            savetime: record.savetime,
        })
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in seconds.
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}
