//! Bounded, time-expiring, insertion-ordered cache store.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::warn;

use crate::tenant::{ScopedKey, TenantScope};

/// Fraction of capacity at which the one-time high-water warning fires.
const HIGH_WATER_RATIO: f64 = 0.9;

/// Per-resource cache tuning.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
  /// Entries older than this are treated as misses and removed on read.
  pub ttl: Duration,
  /// Hard backstop on entry count; the oldest-inserted entry is evicted
  /// first once exceeded.
  pub max_entries: usize,
  /// Re-insert an entry at the freshest position on read-hit. Suits
  /// resources that are re-read repeatedly (patient details); leave off for
  /// resources queried by key once per screen (appointments by date).
  pub promote_on_hit: bool,
}

impl CacheConfig {
  pub fn new(ttl: Duration, max_entries: usize) -> Self {
    Self {
      ttl,
      max_entries,
      promote_on_hit: false,
    }
  }

  pub fn with_promotion(mut self) -> Self {
    self.promote_on_hit = true;
    self
  }
}

struct CacheEntry<V> {
  value: V,
  stored_at: Instant,
}

/// Size-bounded key/value store with TTL expiry and FIFO eviction.
///
/// Insertion order doubles as age order: every `insert` removes the key
/// first, so the map's natural iteration order is oldest-first and eviction
/// is always `shift_remove_index(0)`.
pub struct BoundedCache<V> {
  name: &'static str,
  entries: IndexMap<ScopedKey, CacheEntry<V>>,
  config: CacheConfig,
  high_water_warned: bool,
}

impl<V: Clone> BoundedCache<V> {
  pub fn new(name: &'static str, config: CacheConfig) -> Self {
    Self {
      name,
      entries: IndexMap::new(),
      config,
      high_water_warned: false,
    }
  }

  /// Look up a fresh entry. Expired entries are removed and reported as a
  /// miss; hits are promoted to the freshest position when configured.
  pub fn get(&mut self, key: &ScopedKey) -> Option<V> {
    let idx = self.entries.get_index_of(key)?;

    let expired = {
      let (_, entry) = self.entries.get_index(idx).unwrap();
      entry.stored_at.elapsed() > self.config.ttl
    };
    if expired {
      self.entries.shift_remove_index(idx);
      return None;
    }

    if self.config.promote_on_hit {
      let last = self.entries.len() - 1;
      self.entries.move_index(idx, last);
      let (_, entry) = self.entries.get_index(last).unwrap();
      return Some(entry.value.clone());
    }

    let (_, entry) = self.entries.get_index(idx).unwrap();
    Some(entry.value.clone())
  }

  /// Whether a fresh entry exists, without promoting it.
  pub fn has(&self, key: &ScopedKey) -> bool {
    self
      .entries
      .get(key)
      .is_some_and(|entry| entry.stored_at.elapsed() <= self.config.ttl)
  }

  /// Store a value at the freshest position, then evict oldest-first while
  /// over capacity. Returns the number of evicted entries.
  pub fn insert(&mut self, key: ScopedKey, value: V) -> u64 {
    self.entries.shift_remove(&key);
    self.entries.insert(
      key,
      CacheEntry {
        value,
        stored_at: Instant::now(),
      },
    );

    let mut evicted = 0;
    while self.entries.len() > self.config.max_entries {
      self.entries.shift_remove_index(0);
      evicted += 1;
    }

    if !self.high_water_warned
      && self.entries.len() as f64 >= self.config.max_entries as f64 * HIGH_WATER_RATIO
    {
      self.high_water_warned = true;
      warn!(
        cache = self.name,
        len = self.entries.len(),
        max = self.config.max_entries,
        "cache approaching capacity; eviction imminent"
      );
    }

    evicted
  }

  pub fn remove(&mut self, key: &ScopedKey) -> bool {
    self.entries.shift_remove(key).is_some()
  }

  /// Drop every entry belonging to one tenant. Returns how many were removed.
  pub fn remove_scope(&mut self, scope: &TenantScope) -> usize {
    let before = self.entries.len();
    self.entries.retain(|key, _| !key.in_scope(scope));
    before - self.entries.len()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Keys currently held, oldest first. For scoped invalidation sweeps.
  pub fn keys(&self) -> impl Iterator<Item = &ScopedKey> {
    self.entries.keys()
  }
}
