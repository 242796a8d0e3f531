//! Cache provider trait
//!
//! The resolver caches hierarchy and permission snapshots through this trait.
//! Implementations may be in-process ([`MemoryCache`](super::MemoryCache)) or
//! backed by a remote cache server; callers treat every failure as a miss.

use crate::error::CacheError;
// async_trait required for dyn-compatibility with Arc<dyn CacheProvider>
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Options for a cache write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSetOptions {
    /// Time to live; `None` uses the provider's default
    pub ttl: Option<Duration>,
    /// Tags for grouped invalidation
    pub tags: Vec<String>,
    /// Renew the ttl on every read
    pub sliding: bool,
}

impl CacheSetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn sliding(mut self) -> Self {
        self.sliding = true;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Key/value cache collaborator
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Get a live value
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store a value
    async fn set(&self, key: &str, value: Value, options: CacheSetOptions)
    -> Result<(), CacheError>;

    /// Remove a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every key matching a glob (`*`, `?`), returning the count
    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError>;
}
