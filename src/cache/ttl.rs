//! Time-to-live expiration strategy
//!
//! Tracks an absolute expiry per key. The entries map is authoritative; an
//! ascending queue of `(expires_at, key)` tuples lets [`TtlStrategy::cleanup`]
//! find expired keys without scanning. Re-setting, touching or updating a key
//! leaves its old tuple in the queue; such stale tuples are detected and
//! dropped when they reach the front.
//!
//! Time comes from [`tokio::time::Instant`], so tests can drive expiry with a
//! paused clock.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default maximum number of entries removed by one cleanup pass
pub const DEFAULT_CLEANUP_BATCH: usize = 1000;

/// Rebuild the queue once it holds this many times more tuples than entries
const COMPACT_FACTOR: usize = 2;
/// Never compact queues smaller than this
const COMPACT_MIN: usize = 64;

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// Live, expiring after the given duration
    Expires(Duration),
    /// Live, never expires
    NoExpiry,
    /// Untracked or already expired
    NotFound,
}

impl TtlStatus {
    /// Redis-style code: whole seconds rounded up, `-1` no expiry, `-2` missing
    pub fn as_legacy_seconds(&self) -> i64 {
        match self {
            TtlStatus::Expires(remaining) => {
                i64::try_from(remaining.as_millis().div_ceil(1000)).unwrap_or(i64::MAX)
            }
            TtlStatus::NoExpiry => -1,
            TtlStatus::NotFound => -2,
        }
    }
}

/// Per-key options for [`TtlStrategy::set`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtlOptions {
    /// Renew the full ttl whenever the key is touched
    pub sliding: bool,
}

impl TtlOptions {
    pub fn sliding() -> Self {
        Self { sliding: true }
    }
}

/// Reported to expiration callbacks for every key removed by cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationEvent<K> {
    pub key: K,
    pub expired_at: Instant,
    pub ttl: Duration,
}

/// Expiration callback; must not touch the strategy that invoked it
pub type ExpirationCallback<K> = Box<dyn FnMut(&ExpirationEvent<K>) + Send>;

#[derive(Debug, Clone, Copy)]
struct TtlEntry {
    expires_at: Option<Instant>,
    ttl: Option<Duration>,
    sliding: bool,
}

impl TtlEntry {
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// Per-key absolute expiry tracker
pub struct TtlStrategy<K> {
    entries: HashMap<K, TtlEntry>,
    queue: VecDeque<(Instant, K)>,
    default_ttl: Option<Duration>,
    batch_size: usize,
    callbacks: Vec<ExpirationCallback<K>>,
}

impl<K> std::fmt::Debug for TtlStrategy<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlStrategy")
            .field("entries", &self.entries.len())
            .field("queued", &self.queue.len())
            .field("default_ttl", &self.default_ttl)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Expiry instant for `ttl` from `now`; a ttl too large to represent never expires
fn deadline(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

impl<K: Hash + Eq + Clone> Default for TtlStrategy<K> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<K: Hash + Eq + Clone> TtlStrategy<K> {
    /// Create a tracker; keys set without a ttl use `default_ttl`, or never
    /// expire when that is `None`
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            queue: VecDeque::new(),
            default_ttl,
            batch_size: DEFAULT_CLEANUP_BATCH,
            callbacks: Vec::new(),
        }
    }

    /// Maximum entries removed by a cleanup pass without an explicit limit
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Register a callback fired for each entry removed by cleanup
    pub fn on_expire(&mut self, callback: impl FnMut(&ExpirationEvent<K>) + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Start (or restart) tracking a key
    pub fn set(&mut self, key: K, ttl: Option<Duration>, options: TtlOptions) {
        let ttl = ttl.or(self.default_ttl);
        let now = Instant::now();
        let expires_at = ttl.and_then(|ttl| deadline(now, ttl));
        self.entries.insert(
            key.clone(),
            TtlEntry {
                expires_at,
                ttl,
                sliding: options.sliding,
            },
        );
        if let Some(at) = expires_at {
            self.enqueue(at, key);
        }
    }

    /// True for untracked keys and once `now` is strictly past the expiry
    pub fn is_expired(&self, key: &K) -> bool {
        match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(Instant::now()),
            None => true,
        }
    }

    /// Whether the key is tracked, expired or not
    pub fn is_tracked(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_ttl(&self, key: &K) -> TtlStatus {
        let now = Instant::now();
        match self.entries.get(key) {
            None => TtlStatus::NotFound,
            Some(entry) if entry.is_expired_at(now) => TtlStatus::NotFound,
            Some(TtlEntry {
                expires_at: Some(at),
                ..
            }) => TtlStatus::Expires(at.saturating_duration_since(now)),
            Some(_) => TtlStatus::NoExpiry,
        }
    }

    /// Renew a sliding entry
    ///
    /// Non-sliding live entries are left unchanged but still report `true`;
    /// `false` means the key is missing or expired.
    pub fn touch(&mut self, key: &K) -> bool {
        let now = Instant::now();
        let renewed = match self.entries.get_mut(key) {
            None => return false,
            Some(entry) if entry.is_expired_at(now) => return false,
            Some(entry) if entry.sliding => match entry.ttl {
                Some(ttl) => {
                    entry.expires_at = deadline(now, ttl);
                    entry.expires_at
                }
                None => None,
            },
            Some(_) => None,
        };
        if let Some(at) = renewed {
            trace!(expires_in = ?(at - now), "Sliding expiry renewed");
            self.enqueue(at, key.clone());
        }
        true
    }

    /// Replace the ttl of a live entry, sliding or not
    pub fn update_ttl(&mut self, key: &K, ttl: Duration) -> bool {
        let now = Instant::now();
        let at = deadline(now, ttl);
        match self.entries.get_mut(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.ttl = Some(ttl);
                entry.expires_at = at;
            }
            _ => return false,
        }
        if let Some(at) = at {
            self.enqueue(at, key.clone());
        }
        true
    }

    /// Stop tracking a key
    pub fn remove(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.keys().cloned().collect()
    }

    /// Live keys expiring within `window`, soonest first
    pub fn expiring_within(&self, window: Duration) -> Vec<K> {
        let now = Instant::now();
        let horizon = deadline(now, window);
        let mut keys = Vec::new();
        for (at, key) in &self.queue {
            if horizon.is_some_and(|h| *at > h) {
                break;
            }
            let live = self
                .entries
                .get(key)
                .is_some_and(|e| e.expires_at == Some(*at) && !e.is_expired_at(now));
            if live && !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Remove expired entries, at most `max_count` (default: batch size)
    ///
    /// Returns the number of entries removed and fires the expiration
    /// callbacks for each. Stale queue tuples are skipped without counting
    /// toward the limit.
    pub fn cleanup(&mut self, max_count: Option<usize>) -> usize {
        let expired = self.take_expired(max_count);
        for event in &expired {
            for callback in &mut self.callbacks {
                callback(event);
            }
        }
        expired.len()
    }

    /// Remove expired entries like [`cleanup`](Self::cleanup) but hand them
    /// back instead of firing callbacks
    pub fn take_expired(&mut self, max_count: Option<usize>) -> Vec<ExpirationEvent<K>> {
        let limit = max_count.unwrap_or(self.batch_size);
        let now = Instant::now();
        let mut expired = Vec::new();
        let mut stale = 0;

        while expired.len() < limit {
            match self.queue.front() {
                Some((at, _)) if *at <= now => {}
                _ => break,
            }
            let Some((at, key)) = self.queue.pop_front() else {
                break;
            };

            let current = self.entries.get(&key).and_then(|e| e.expires_at);
            if current != Some(at) {
                stale += 1;
                continue;
            }

            let ttl = self
                .entries
                .remove(&key)
                .and_then(|e| e.ttl)
                .unwrap_or_default();
            expired.push(ExpirationEvent {
                key,
                expired_at: at,
                ttl,
            });
        }

        if !expired.is_empty() || stale > 0 {
            trace!(
                removed = expired.len(),
                stale,
                remaining = self.entries.len(),
                "TTL cleanup pass"
            );
        }
        expired
    }

    fn enqueue(&mut self, at: Instant, key: K) {
        let idx = self.queue.partition_point(|(queued, _)| *queued <= at);
        self.queue.insert(idx, (at, key));

        if self.queue.len() > COMPACT_MIN
            && self.queue.len() > self.entries.len().saturating_mul(COMPACT_FACTOR)
        {
            self.compact();
        }
    }

    /// Rebuild the queue from the authoritative entries
    fn compact(&mut self) {
        let before = self.queue.len();
        let mut live: Vec<(Instant, K)> = self
            .entries
            .iter()
            .filter_map(|(k, e)| e.expires_at.map(|at| (at, k.clone())))
            .collect();
        live.sort_by_key(|(at, _)| *at);
        self.queue = live.into();
        trace!(before, after = self.queue.len(), "TTL queue compacted");
    }
}

/// Handle to a background cleanup task
///
/// Dropping the handle stops the task. The task never keeps the runtime
/// alive on its own: it exits with the runtime.
#[derive(Debug)]
pub struct CleanupTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl CleanupTask {
    /// Stop the task and wait for it to finish
    pub async fn stop(mut self) {
        self.token.cancel();
        let _ = (&mut self.handle).await;
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Run [`TtlStrategy::cleanup`] every `interval` on the current Tokio runtime
///
/// Returns `None` for a zero interval (cleanup disabled).
pub fn spawn_cleanup<K>(
    strategy: Arc<Mutex<TtlStrategy<K>>>,
    interval: Duration,
) -> Option<CleanupTask>
where
    K: Hash + Eq + Clone + Send + 'static,
{
    spawn_sweeper(interval, move || {
        strategy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cleanup(None)
    })
}

/// Run `sweep` every `interval` until the returned task is stopped
///
/// `sweep` returns how many entries it removed.
pub fn spawn_sweeper(
    interval: Duration,
    mut sweep: impl FnMut() -> usize + Send + 'static,
) -> Option<CleanupTask> {
    if interval.is_zero() {
        return None;
    }

    let token = CancellationToken::new();
    let child = token.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = child.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = sweep();
                    if removed > 0 {
                        debug!(removed, "Expired entries cleaned up");
                    }
                }
            }
        }
        debug!("TTL cleanup task stopped");
    });

    Some(CleanupTask { token, handle })
}
