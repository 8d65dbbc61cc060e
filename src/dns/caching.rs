//! Positive/negative result caching for a wrapped resolver.
//!
//! The cache never runs a sweeper. Instead every write inspects a few random
//! entries and drops the expired ones, and one in every
//! [`ASYNC_CLEANUP_INTERVAL`] hits schedules the same sampled pass on a
//! detached task. Both keep the cost per operation constant while bounding
//! how many dead hostnames can pile up.

use super::{AddressFamily, Addrs, LookupKey, Name, Resolve, Resolving};
use crate::base::fastrand::FastRand;
use crate::base::neterror::NetError;
use crate::base::scope::Scope;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::Instant;

/// Hits between two detached cleanup passes.
pub const ASYNC_CLEANUP_INTERVAL: u64 = 1024;
/// Entries sampled by a detached cleanup pass.
const ASYNC_SAMPLES: usize = 10;
/// Entries sampled on every cache write.
const LOCKED_SAMPLES: usize = 3;

#[derive(Debug, Clone)]
struct CacheEntry {
    result: Result<Addrs, NetError>,
    expires_at: Instant,
}

/// Key→entry table that can pick a uniformly random entry in O(1).
///
/// Entries live densely in `slots`; `index` maps each key to its slot.
/// Removal swaps the last slot into the hole.
#[derive(Default)]
struct ExpiryTable {
    index: HashMap<LookupKey, usize>,
    slots: Vec<(LookupKey, CacheEntry)>,
}

impl ExpiryTable {
    fn len(&self) -> usize {
        self.slots.len()
    }

    fn get(&self, key: &LookupKey) -> Option<&CacheEntry> {
        self.index.get(key).map(|&i| &self.slots[i].1)
    }

    /// Stores `entry` unless the current entry for `key` expires at the
    /// same time or later.
    fn insert_if_newer(&mut self, key: LookupKey, entry: CacheEntry) -> bool {
        match self.index.get(&key) {
            Some(&i) => {
                let current = &mut self.slots[i].1;
                if current.expires_at >= entry.expires_at {
                    return false;
                }
                *current = entry;
            }
            None => {
                self.index.insert(key.clone(), self.slots.len());
                self.slots.push((key, entry));
            }
        }
        true
    }

    fn remove_at(&mut self, i: usize) {
        let (key, _) = self.slots.swap_remove(i);
        self.index.remove(&key);
        if let Some((moved, _)) = self.slots.get(i) {
            self.index.insert(moved.clone(), i);
        }
    }

    /// Inspects up to `samples` random entries and removes the expired ones.
    fn sampled_cleanup(&mut self, samples: usize, now: Instant, rnd: &FastRand) -> usize {
        let mut removed = 0;
        for _ in 0..samples {
            if self.slots.is_empty() {
                break;
            }
            let i = rnd.index(self.slots.len());
            if self.slots[i].1.expires_at <= now {
                self.remove_at(i);
                removed += 1;
            }
        }
        removed
    }
}

struct Cache {
    table: RwLock<ExpiryTable>,
    hits: AtomicU64,
    rnd: FastRand,
}

impl Cache {
    fn cleanup_locked(&self, table: &mut ExpiryTable, samples: usize) {
        let removed = table.sampled_cleanup(samples, Instant::now(), &self.rnd);
        if removed > 0 {
            tracing::debug!(removed, remaining = table.len(), "evicted expired dns cache entries");
        }
    }

    /// Counts an access and, once per interval, runs a sampled cleanup pass
    /// on a detached task.
    fn cleanup_async(self: &Arc<Self>) {
        if (self.hits.fetch_add(1, Ordering::Relaxed) + 1) % ASYNC_CLEANUP_INTERVAL != 0 {
            return;
        }
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut table = cache.table.write();
            cache.cleanup_locked(&mut table, ASYNC_SAMPLES);
        });
    }
}

/// Caches results of the wrapped resolver.
///
/// Successful lookups are kept for `ttl`, failed ones for `neg_ttl`; a zero
/// duration disables that half of the cache. Failures that happen while the
/// caller's scope has already ended are never cached: they describe the
/// caller, not the name.
///
/// Timeouts and request deduplication are not handled here; compose with
/// [`TimeoutResolver`](super::TimeoutResolver) and
/// [`SingleflightResolver`](super::SingleflightResolver), see
/// [`ResolverConfig`](crate::config::ResolverConfig).
#[derive(Clone)]
pub struct CachingResolver {
    inner: Arc<dyn Resolve>,
    ttl: Duration,
    neg_ttl: Duration,
    cache: Arc<Cache>,
}

impl CachingResolver {
    pub fn new(inner: Arc<dyn Resolve>, ttl: Duration, neg_ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            neg_ttl,
            cache: Arc::new(Cache {
                table: RwLock::new(ExpiryTable::default()),
                hits: AtomicU64::new(0),
                rnd: FastRand::from_entropy(),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn neg_ttl(&self) -> Duration {
        self.neg_ttl
    }

    /// Number of entries currently stored, expired ones included.
    pub fn len(&self) -> usize {
        self.cache.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, scope: Scope, family: AddressFamily, name: Name) -> Resolving {
        let this = self.clone();
        Box::pin(async move {
            let key = LookupKey::new(family, name);
            let mut populated = false;

            if !this.ttl.is_zero() || !this.neg_ttl.is_zero() {
                let hit = {
                    let table = this.cache.table.read();
                    populated = table.len() > 0;
                    table
                        .get(&key)
                        .filter(|entry| entry.expires_at > Instant::now())
                        .map(|entry| entry.result.clone())
                };
                if let Some(result) = hit {
                    tracing::trace!(domain = %key.name, family = %key.family, "dns cache hit");
                    this.cache.cleanup_async();
                    return result;
                }
            }

            let now = Instant::now();
            let result = this
                .inner
                .resolve(scope.clone(), key.family, key.name.clone())
                .await;

            let ttl = match &result {
                Err(_) if scope.is_done() => None,
                Err(_) if this.neg_ttl.is_zero() => None,
                Ok(_) if this.ttl.is_zero() => None,
                Err(_) => Some(this.neg_ttl),
                Ok(_) => Some(this.ttl),
            };
            let Some(ttl) = ttl else {
                if populated {
                    this.cache.cleanup_async();
                }
                return result;
            };

            let entry = CacheEntry {
                result: result.clone(),
                expires_at: now + ttl,
            };
            let mut table = this.cache.table.write();
            if table.insert_if_newer(key.clone(), entry) {
                tracing::debug!(domain = %key.name, family = %key.family, ttl = ?ttl, ok = result.is_ok(), "dns cache store");
            }
            this.cache.cleanup_locked(&mut table, LOCKED_SAMPLES);
            drop(table);

            result
        })
    }
}

impl fmt::Debug for CachingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingResolver")
            .field("ttl", &self.ttl)
            .field("neg_ttl", &self.neg_ttl)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}
