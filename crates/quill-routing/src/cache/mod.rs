//! Response caching keyed by request fingerprint.
//!
//! Only results from real providers are stored. Each task kind has its own
//! lifetime so cheap answers turn over faster than long syntheses.

/// Request fingerprinting
pub mod fingerprint;
/// Cache storage implementation
pub mod storage;

pub use fingerprint::CacheKey;
pub use storage::{CacheEntry, CacheStats, ResponseCache};
