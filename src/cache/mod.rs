//! Caching
//!
//! Two eviction strategies and the provider seam the resolver caches through:
//!
//! - [`LruStrategy`] - bounded map evicting the least recently used entry
//! - [`TtlStrategy`] - per-key absolute expiry, optionally sliding
//! - [`CacheProvider`] - async key/value collaborator with glob deletes
//! - [`MemoryCache`] - in-process provider built from the two strategies

pub mod lru;
pub mod memory;
pub mod provider;
pub mod ttl;

pub use lru::{EvictionCallback, EvictionEvent, EvictionReason, LruStats, LruStrategy};
pub use memory::{MemoryCache, MemoryCacheOptions};
pub use provider::{CacheProvider, CacheSetOptions};
pub use ttl::{
    CleanupTask, ExpirationCallback, ExpirationEvent, TtlOptions, TtlStatus, TtlStrategy,
    spawn_cleanup,
};
