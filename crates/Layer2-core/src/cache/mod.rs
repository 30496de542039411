//! Response cache
//!
//! - `key`: key normalization, truncation, sharded paths
//! - `memory`: bounded entry map
//! - `disk`: gzip JSON entry files
//! - `tiered`: memory + disk cache with per-category TTL
//! - `janitor`: expiry, quota eviction, recompression

pub mod disk;
pub mod janitor;
pub mod key;
pub mod memory;
pub mod tiered;

pub use janitor::{CacheJanitor, JanitorReport};
pub use key::{
    compose, normalize, query_hash, query_key, sanitize_filename, truncate, CategoryStats,
    KeyCodec, MAX_KEY_LENGTH,
};
pub use memory::{CacheEntry, MemoryMap};
pub use tiered::{TieredCache, TieredCacheStats, EXTENDED_TTL_MULTIPLIER};
