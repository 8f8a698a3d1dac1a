//! Local expiring cache
//!
//! Best-effort TTL cache fronting the study backend. Entries live in a
//! persistent string key/value medium (one file per key by default) wrapped
//! in `{value, expiry}` envelopes; expired or corrupt entries degrade to a
//! miss and self-heal by deletion.

pub mod expiry;
pub mod keys;
pub mod medium;

pub use expiry::{CacheStats, Clock, ExpiringCache, SystemClock, CACHE_TTL};
pub use keys::{cache_key, content_hash, params_hash, Category};
pub use medium::{CacheMedium, FileMedium, MemoryMedium};
