//! Cache layer that orchestrates the bounded store, request coalescing and
//! invalidation versioning.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::debug;

use super::store::{BoundedCache, CacheConfig};
use crate::error::Result;
use crate::metrics::DataMetrics;
use crate::tenant::{ScopedKey, TenantScope};

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Caching front-end every repository reads through.
///
/// On top of [`BoundedCache`] this adds the two guarantees the raw store
/// cannot give:
///
/// - **Coalescing**: at most one loader is in flight per key; concurrent
///   callers join the existing fetch and all observe the same resolution.
/// - **Stale-write prevention**: each key carries a version that only
///   invalidation bumps. A fetch snapshots the version when it starts and
///   its result is discarded if the key was invalidated (or overwritten via
///   [`CacheLayer::put`]) while it was outstanding.
///
/// Loader failures are never cached; the same error is handed to every
/// waiter.
pub struct CacheLayer<V> {
  inner: Arc<LayerInner<V>>,
}

struct LayerInner<V> {
  name: &'static str,
  store: Mutex<BoundedCache<V>>,
  in_flight: Mutex<HashMap<ScopedKey, SharedFetch<V>>>,
  versions: Mutex<HashMap<ScopedKey, u64>>,
  metrics: Arc<dyn DataMetrics>,
}

impl<V> Clone for CacheLayer<V> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<V> CacheLayer<V>
where
  V: Clone + Send + Sync + 'static,
{
  pub fn new(name: &'static str, config: CacheConfig, metrics: Arc<dyn DataMetrics>) -> Self {
    Self {
      inner: Arc::new(LayerInner {
        name,
        store: Mutex::new(BoundedCache::new(name, config)),
        in_flight: Mutex::new(HashMap::new()),
        versions: Mutex::new(HashMap::new()),
        metrics,
      }),
    }
  }

  /// Fetch through the cache: fresh hit, or join/start a coalesced load.
  pub async fn fetch<F, Fut>(&self, key: &ScopedKey, loader: F) -> Result<V>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V>> + Send + 'static,
  {
    self.fetch_inner(key, false, loader).await
  }

  /// Force a reload, bypassing the freshness check. Still coalesces: a
  /// refetch issued while a load is outstanding joins it.
  pub async fn refetch<F, Fut>(&self, key: &ScopedKey, loader: F) -> Result<V>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V>> + Send + 'static,
  {
    self.fetch_inner(key, true, loader).await
  }

  async fn fetch_inner<F, Fut>(&self, key: &ScopedKey, force: bool, loader: F) -> Result<V>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V>> + Send + 'static,
  {
    if !force {
      if let Some(value) = self.inner.store.lock().get(key) {
        self.inner.metrics.record_hit(self.inner.name);
        return Ok(value);
      }
    }
    self.inner.metrics.record_miss(self.inner.name);

    // Join an existing fetch or register a new one. The registry lock is
    // released before any await; only the first caller's loader ever runs.
    let shared = {
      let mut in_flight = self.inner.in_flight.lock();
      match in_flight.entry(key.clone()) {
        Entry::Occupied(existing) => existing.get().clone(),
        Entry::Vacant(vacant) => {
          let shared = self.start_fetch(key.clone(), loader());
          vacant.insert(shared.clone());
          shared
        }
      }
    };

    shared.await
  }

  /// Wrap a loader future with the version check and in-flight cleanup.
  fn start_fetch<Fut>(&self, key: ScopedKey, fut: Fut) -> SharedFetch<V>
  where
    Fut: Future<Output = Result<V>> + Send + 'static,
  {
    let version_at_start = self.inner.version_of(&key);
    let inner = Arc::clone(&self.inner);

    async move {
      let result = fut.await;

      if let Ok(value) = &result {
        if inner.version_of(&key) == version_at_start {
          let evicted = inner.store.lock().insert(key.clone(), value.clone());
          if evicted > 0 {
            inner.metrics.record_evictions(inner.name, evicted);
          }
        } else {
          // The key was invalidated while this load was outstanding. The
          // caller still gets the value; the cache does not.
          debug!(cache = inner.name, key = %key, "discarding stale fetch result");
        }
      }

      inner.in_flight.lock().remove(&key);
      result
    }
    .boxed()
    .shared()
  }

  /// Peek at the cache without fetching or recording metrics.
  pub fn get(&self, key: &ScopedKey) -> Option<V> {
    self.inner.store.lock().get(key)
  }

  pub fn has(&self, key: &ScopedKey) -> bool {
    self.inner.store.lock().has(key)
  }

  /// Write-through after a mutation. Bumps the key's version first so an
  /// in-flight read that predates the mutation cannot clobber this value.
  pub fn put(&self, key: &ScopedKey, value: V) {
    self.inner.bump_version(key);
    let evicted = self.inner.store.lock().insert(key.clone(), value);
    if evicted > 0 {
      self.inner.metrics.record_evictions(self.inner.name, evicted);
    }
  }

  /// Invalidate one key: bump its version, drop the cached entry and any
  /// in-flight registration. The in-flight load itself is not cancelled; it
  /// completes and its result is discarded by the version check.
  pub fn invalidate(&self, key: &ScopedKey) {
    self.inner.bump_version(key);
    self.inner.store.lock().remove(key);
    self.inner.in_flight.lock().remove(key);
  }

  /// Invalidate every key belonging to one tenant.
  pub fn invalidate_scope(&self, scope: &TenantScope) {
    let mut keys: Vec<ScopedKey> = {
      let store = self.inner.store.lock();
      store.keys().filter(|k| k.in_scope(scope)).cloned().collect()
    };
    {
      let in_flight = self.inner.in_flight.lock();
      keys.extend(in_flight.keys().filter(|k| k.in_scope(scope)).cloned());
    }

    {
      let mut versions = self.inner.versions.lock();
      for key in &keys {
        *versions.entry(key.clone()).or_insert(0) += 1;
      }
    }
    self.inner.store.lock().remove_scope(scope);
    self
      .inner
      .in_flight
      .lock()
      .retain(|key, _| !key.in_scope(scope));
  }

  pub fn len(&self) -> usize {
    self.inner.store.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.store.lock().is_empty()
  }
}

impl<V> LayerInner<V> {
  fn version_of(&self, key: &ScopedKey) -> u64 {
    self.versions.lock().get(key).copied().unwrap_or(0)
  }

  fn bump_version(&self, key: &ScopedKey) {
    *self.versions.lock().entry(key.clone()).or_insert(0) += 1;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::DataError;
  use crate::metrics::{CounterMetrics, NoopMetrics};
  use crate::tenant::TenantScope;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  fn layer(max: usize) -> CacheLayer<u32> {
    CacheLayer::new(
      "test",
      CacheConfig::new(Duration::from_secs(60), max),
      Arc::new(NoopMetrics),
    )
  }

  fn scope() -> TenantScope {
    TenantScope::new("clinic-1", "dr-1")
  }

  fn slow_loader(
    calls: &Arc<AtomicU32>,
    value: u32,
  ) -> impl FnOnce() -> BoxFuture<'static, Result<u32>> {
    let calls = calls.clone();
    move || {
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(value)
      }
      .boxed()
    }
  }

  #[tokio::test]
  async fn test_concurrent_fetches_coalesce() {
    let layer = layer(10);
    let key = scope().key("patient:1");
    let calls = Arc::new(AtomicU32::new(0));

    let tasks: Vec<_> = (0..5)
      .map(|_| {
        let layer = layer.clone();
        let key = key.clone();
        let loader = slow_loader(&calls, 7);
        tokio::spawn(async move { layer.fetch(&key, loader).await })
      })
      .collect();

    for task in tasks {
      assert_eq!(task.await.unwrap(), Ok(7));
    }
    // All five callers rode a single network call.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_waiters_share_the_same_error() {
    let layer = layer(10);
    let key = scope().key("patient:1");
    let calls = Arc::new(AtomicU32::new(0));

    let tasks: Vec<_> = (0..3)
      .map(|_| {
        let layer = layer.clone();
        let key = key.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
          layer
            .fetch(&key, move || async move {
              calls.fetch_add(1, Ordering::SeqCst);
              tokio::time::sleep(Duration::from_millis(30)).await;
              Err(DataError::Network("connection reset".into()))
            })
            .await
        })
      })
      .collect();

    for task in tasks {
      assert_eq!(
        task.await.unwrap(),
        Err(DataError::Network("connection reset".into()))
      );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // Failures are never cached.
    assert!(layer.get(&key).is_none());
  }

  #[tokio::test]
  async fn test_second_fetch_hits_cache() {
    let layer = layer(10);
    let key = scope().key("patient:1");
    let calls = Arc::new(AtomicU32::new(0));

    layer.fetch(&key, slow_loader(&calls, 7)).await.unwrap();
    layer.fetch(&key, slow_loader(&calls, 8)).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(layer.get(&key), Some(7));
  }

  #[tokio::test]
  async fn test_refetch_bypasses_freshness() {
    let layer = layer(10);
    let key = scope().key("patient:1");
    let calls = Arc::new(AtomicU32::new(0));

    layer.fetch(&key, slow_loader(&calls, 7)).await.unwrap();
    let value = layer.refetch(&key, slow_loader(&calls, 8)).await.unwrap();

    assert_eq!(value, 8);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(layer.get(&key), Some(8));
  }

  #[tokio::test]
  async fn test_invalidate_during_fetch_discards_result() {
    let layer = layer(10);
    let key = scope().key("patient:1");
    let calls = Arc::new(AtomicU32::new(0));

    let task = {
      let layer = layer.clone();
      let key = key.clone();
      let loader = slow_loader(&calls, 7);
      tokio::spawn(async move { layer.fetch(&key, loader).await })
    };

    // Let the load start, then invalidate while it is outstanding.
    tokio::time::sleep(Duration::from_millis(10)).await;
    layer.invalidate(&key);

    // The caller still receives the value...
    assert_eq!(task.await.unwrap(), Ok(7));
    // ...but it was not written back to the cache.
    assert!(layer.get(&key).is_none());
  }

  #[tokio::test]
  async fn test_put_during_fetch_wins_over_stale_read() {
    let layer = layer(10);
    let key = scope().key("patient:1");
    let calls = Arc::new(AtomicU32::new(0));

    let task = {
      let layer = layer.clone();
      let key = key.clone();
      let loader = slow_loader(&calls, 7);
      tokio::spawn(async move { layer.fetch(&key, loader).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    layer.put(&key, 99);

    task.await.unwrap().unwrap();
    assert_eq!(layer.get(&key), Some(99));
  }

  #[tokio::test]
  async fn test_scoped_invalidation_spares_other_tenants() {
    let layer = layer(10);
    let a = TenantScope::new("clinic-1", "dr-1");
    let b = TenantScope::new("clinic-2", "dr-1");

    layer.put(&a.key("patient:42"), 1);
    layer.put(&b.key("patient:42"), 2);

    layer.invalidate_scope(&b);

    assert_eq!(layer.get(&a.key("patient:42")), Some(1));
    assert!(layer.get(&b.key("patient:42")).is_none());
  }

  #[tokio::test]
  async fn test_metrics_record_hits_and_misses() {
    let metrics = Arc::new(CounterMetrics::new());
    let layer: CacheLayer<u32> = CacheLayer::new(
      "test",
      CacheConfig::new(Duration::from_secs(60), 10),
      metrics.clone(),
    );
    let key = scope().key("patient:1");

    layer.fetch(&key, || async { Ok(7) }).await.unwrap();
    layer.fetch(&key, || async { Ok(8) }).await.unwrap();

    let snap = metrics.snapshot();
    assert_eq!(snap.misses, 1);
    assert_eq!(snap.hits, 1);
  }
}
