//! Result cache
//!
//! [`CacheStore`] is the storage port (bytes in, bytes out, TTL per entry).
//! [`ResultCache`] sits on top of it, encodes values with serde_json and
//! treats every store failure as a miss: a broken cache slows scans down but
//! never fails them.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    clock::{serde_secs, Clock, SystemClock},
    scan::ScanParams,
    shard::{ShardedMap, DEFAULT_LOCK_TIMEOUT, DEFAULT_SHARDS},
    timeframe::Timeframe,
};

/// Hex characters of the request digest kept in a scan key
const SCAN_KEY_DIGEST_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache serialization failed: {0}")]
    Serialization(String),
}

// ============================================================
// STORE PORT
// ============================================================

pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Insert or overwrite `key`
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove every key starting with `prefix`; an exact key is its own prefix
    fn invalidate(&self, prefix: &str) -> Result<usize, CacheError>;

    /// Drop expired entries
    fn sweep(&self) -> Result<usize, CacheError>;

    /// Entries currently held, expired or not
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    created_at: u64,
    ttl: Duration,
}

impl CacheEntry {
    #[inline]
    fn is_expired(&self, now: u64) -> bool {
        now >= self.created_at.saturating_add(self.ttl.as_millis() as u64)
    }
}

/// In-process store: sharded map, lazy expiry on read, eager expiry on sweep
pub struct MemoryStore {
    entries: ShardedMap<CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    pub fn new(shards: usize, lock_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: ShardedMap::new(shards, lock_timeout),
            clock,
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::new(DEFAULT_SHARDS, DEFAULT_LOCK_TIMEOUT, clock)
    }

    fn busy(key: &str) -> CacheError {
        CacheError::Unavailable(format!("shard lock timed out for {key}"))
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = self.clock.now_millis();
        self.entries
            .with_shard(key, |map| match map.get(key) {
                Some(entry) if entry.is_expired(now) => {
                    map.remove(key);
                    None
                },
                Some(entry) => Some(entry.value.clone()),
                None => None,
            })
            .ok_or_else(|| Self::busy(key))
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry {
            value,
            created_at: self.clock.now_millis(),
            ttl,
        };
        self.entries
            .with_shard(key, |map| {
                map.insert(key.to_string(), entry);
            })
            .ok_or_else(|| Self::busy(key))
    }

    fn invalidate(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut removed = 0;
        let skipped = self.entries.for_each_shard(|map| {
            let before = map.len();
            map.retain(|k, _| !k.starts_with(prefix));
            removed += before - map.len();
        });
        if skipped > 0 {
            return Err(CacheError::Unavailable(format!("{skipped} shards busy during invalidate")));
        }
        Ok(removed)
    }

    fn sweep(&self) -> Result<usize, CacheError> {
        let now = self.clock.now_millis();
        let mut removed = 0;
        let skipped = self.entries.for_each_shard(|map| {
            let before = map.len();
            map.retain(|_, entry| !entry.is_expired(now));
            removed += before - map.len();
        });
        if skipped > 0 {
            debug!(skipped, "sweep skipped busy shards");
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Store that holds nothing; every read misses
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

impl CacheStore for NoopStore {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    fn invalidate(&self, _prefix: &str) -> Result<usize, CacheError> {
        Ok(0)
    }

    fn sweep(&self) -> Result<usize, CacheError> {
        Ok(0)
    }

    fn len(&self) -> usize {
        0
    }
}

// ============================================================
// TTL POLICY
// ============================================================

/// Kind of cached value; decides the entry TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueCategory {
    MarketBars,
    ScanResult,
    PatternCatalog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    #[serde(with = "serde_secs")]
    pub market_bars: Duration,
    #[serde(with = "serde_secs")]
    pub scan_result: Duration,
    #[serde(with = "serde_secs")]
    pub pattern_catalog: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            market_bars: Duration::from_secs(5 * 60),
            scan_result: Duration::from_secs(15 * 60),
            pattern_catalog: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CacheTtls {
    pub fn ttl(&self, category: ValueCategory) -> Duration {
        match category {
            ValueCategory::MarketBars => self.market_bars,
            ValueCategory::ScanResult => self.scan_result,
            ValueCategory::PatternCatalog => self.pattern_catalog,
        }
    }
}

// ============================================================
// TYPED FACADE
// ============================================================

/// Counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub writes: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttls: CacheTtls,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    writes: AtomicU64,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_ttls(store, CacheTtls::default())
    }

    pub fn with_ttls(store: Arc<dyn CacheStore>, ttls: CacheTtls) -> Self {
        Self {
            store,
            ttls,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    pub fn entries(&self) -> usize {
        self.store.len()
    }

    /// Decoded value under `key`; any failure reads as a miss
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            },
            Err(e) => {
                self.absorb(key, &e);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            },
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            },
            Err(e) => {
                self.absorb(key, &CacheError::Serialization(e.to_string()));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
        }
    }

    /// Store `value` with the TTL of `category`. Failures are logged only.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T, category: ValueCategory) {
        let result = serde_json::to_vec(value)
            .map_err(|e| CacheError::Serialization(e.to_string()))
            .and_then(|bytes| self.store.set(key, bytes, self.ttls.ttl(category)));
        match result {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => self.absorb(key, &e),
        }
    }

    pub fn invalidate(&self, prefix: &str) -> usize {
        self.store.invalidate(prefix).unwrap_or_else(|e| {
            self.absorb(prefix, &e);
            0
        })
    }

    pub fn sweep(&self) -> usize {
        self.store.sweep().unwrap_or_else(|e| {
            self.absorb("*", &e);
            0
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    fn absorb(&self, key: &str, error: &CacheError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        warn!(key, error = %error, "cache error ignored");
    }

    /// Evict expired entries every `interval` until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else { break };
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, "swept expired cache entries");
                }
            }
        })
    }

    // --------------------------------------------------------
    // Keys
    // --------------------------------------------------------

    /// Key for a scan request. Symbol and pattern order and repeats do not
    /// change the key.
    pub fn scan_key<S: AsRef<str>, P: AsRef<str>>(
        symbols: &[S],
        patterns: &[P],
        timeframe: Timeframe,
        params: &ScanParams,
    ) -> String {
        let symbols = canonical_list(symbols, true);
        let patterns = canonical_list(patterns, false);
        let canonical = format!("{symbols}|{patterns}|{timeframe}|{}", params.canonical());
        let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
        format!("scan:{timeframe}:{}", &digest[..SCAN_KEY_DIGEST_LEN])
    }

    /// Key for a provider response. The range is floored to whole bars so
    /// repeated calls within one bar share an entry.
    pub fn bars_key(symbol: &str, timeframe: Timeframe, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        let step = timeframe.bar_duration().as_secs().max(1) as i64;
        let floor = |t: DateTime<Utc>| t.timestamp().div_euclid(step) * step;
        format!("bars:{timeframe}:{}:{}:{}", symbol.trim().to_uppercase(), floor(start), floor(end))
    }

    pub const CATALOG_KEY: &'static str = "catalog:patterns";
}

fn canonical_list<S: AsRef<str>>(items: &[S], uppercase: bool) -> String {
    let mut items: Vec<String> = items
        .iter()
        .map(|s| {
            let s = s.as_ref().trim();
            if uppercase {
                s.to_uppercase()
            } else {
                s.to_string()
            }
        })
        .collect();
    items.sort_unstable();
    items.dedup();
    items.join(",")
}

// ============================================================
// TESTS
// ============================================================
