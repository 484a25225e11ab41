//! String-keyed map split across independently locked shards.
//!
//! Backs both the memory cache and the rate governor: requests for different
//! keys rarely contend, and no caller ever holds more than one shard lock.

use std::{
    collections::{hash_map::DefaultHasher, HashMap},
    hash::{Hash, Hasher},
    time::Duration,
};

use parking_lot::Mutex;

pub const DEFAULT_SHARDS: usize = 16;

/// How long a caller waits for a shard before giving up
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct ShardedMap<V> {
    shards: Box<[Mutex<HashMap<String, V>>]>,
    lock_timeout: Duration,
}

impl<V> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS, DEFAULT_LOCK_TIMEOUT)
    }
}

impl<V> ShardedMap<V> {
    /// `shards` is clamped to at least one
    pub fn new(shards: usize, lock_timeout: Duration) -> Self {
        let shards = (0..shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect();
        Self { shards, lock_timeout }
    }

    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, key: &str) -> &Mutex<HashMap<String, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Run `f` on the shard owning `key`. `None` when the lock timed out.
    pub fn with_shard<R>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, V>) -> R) -> Option<R> {
        let mut guard = self.shard_for(key).try_lock_for(self.lock_timeout)?;
        Some(f(&mut guard))
    }

    /// Run `f` on every shard in turn; returns how many shards were skipped
    /// because their lock timed out.
    pub fn for_each_shard(&self, mut f: impl FnMut(&mut HashMap<String, V>)) -> usize {
        let mut skipped = 0;
        for shard in self.shards.iter() {
            match shard.try_lock_for(self.lock_timeout) {
                Some(mut guard) => f(&mut guard),
                None => skipped += 1,
            }
        }
        skipped
    }

    /// Entry count summed over reachable shards
    pub fn len(&self) -> usize {
        let mut total = 0;
        self.for_each_shard(|m| total += m.len());
        total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
