//! Response caching.
//!
//! # Data Flow
//! ```text
//! request ──▶ CacheTable::should_cache(path)
//!                 │ None ──────────────────────────▶ inner service
//!                 │ Some(ttl)
//!                 ▼
//!            TtlCache::get(uri) ── hit ──▶ replayed response
//!                 │ miss
//!                 ▼
//!            inner service ──▶ TtlCache::insert(uri, response, ttl)
//! ```

pub mod layer;
pub mod store;
pub mod table;

pub use layer::{CacheLayer, CacheMetrics, CachedResponse, ResponseCache};
pub use store::TtlCache;
pub use table::{CacheRule, CacheTable, CacheTableError};
