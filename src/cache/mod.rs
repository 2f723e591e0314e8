//! Cache Module
//!
//! Provides the packet model and the `StorableCache` façade.

mod packet;
mod storable;


// Re-export public types
pub use packet::{current_timestamp, Packet, PACKET_VERSION};
pub use storable::StorableCache;

// == Public Constants ==
/// Lifetime in seconds applied when `set` is called without one
pub const DEFAULT_LIFETIME: i64 = 3;

/// Savetime in seconds applied when `set` is called without one
pub const DEFAULT_SAVETIME: i64 = 3600;
