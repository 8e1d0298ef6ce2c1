//! Debounced, deduplicated search requests.
//!
//! UI search boxes fire a call per keystroke. Each distinct normalized query
//! gets one debounce window; every caller inside the window (and any caller
//! that arrives while the request is on the wire) is parked on a waiter list
//! and settled with the single shared outcome.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{DataError, Result};
use crate::tenant::{ScopedKey, TenantScope};

type SearchResult<V> = Result<Vec<V>>;

struct QueryState<V> {
  waiters: Vec<oneshot::Sender<SearchResult<V>>>,
  /// The moment the coalesced request may fire. Every new caller pushes it
  /// forward until the request is in flight.
  deadline: Instant,
  in_flight: bool,
}

/// Coalesces bursts of identical search calls into one delayed request.
pub struct SearchDebouncer<V> {
  inner: Arc<SearchInner<V>>,
  name: &'static str,
  debounce: Duration,
}

struct SearchInner<V> {
  queries: Mutex<HashMap<ScopedKey, QueryState<V>>>,
}

impl<V> Clone for SearchDebouncer<V> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
      name: self.name,
      debounce: self.debounce,
    }
  }
}

impl<V> SearchDebouncer<V>
where
  V: Clone + Send + Sync + 'static,
{
  pub fn new(name: &'static str, debounce: Duration) -> Self {
    Self {
      inner: Arc::new(SearchInner {
        queries: Mutex::new(HashMap::new()),
      }),
      name,
      debounce,
    }
  }

  /// Search with debouncing and per-query coalescing.
  ///
  /// The query is normalized (trimmed, case-folded) and scoped to the
  /// tenant. Empty queries resolve to an empty result without touching the
  /// network. The loader receives the normalized query; when several calls
  /// share one window only the first caller's loader runs.
  ///
  /// A `NotFound` response is a search with no matches, not a failure: it
  /// resolves every waiter with an empty result.
  pub async fn search<F, Fut>(&self, scope: &TenantScope, query: &str, loader: F) -> SearchResult<V>
  where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = SearchResult<V>> + Send + 'static,
  {
    let normalized = query.trim().to_lowercase();
    if normalized.is_empty() {
      return Ok(Vec::new());
    }

    let key = scope.key(format!("{}:{}", self.name, normalized));
    let (tx, rx) = oneshot::channel();

    let start_driver = {
      let mut queries = self.inner.queries.lock();
      match queries.entry(key.clone()) {
        Entry::Occupied(mut occupied) => {
          let state = occupied.get_mut();
          state.waiters.push(tx);
          if !state.in_flight {
            // Another keystroke inside the window: reset the timer.
            state.deadline = Instant::now() + self.debounce;
          }
          false
        }
        Entry::Vacant(vacant) => {
          vacant.insert(QueryState {
            waiters: vec![tx],
            deadline: Instant::now() + self.debounce,
            in_flight: false,
          });
          true
        }
      }
    };

    if start_driver {
      let inner = Arc::clone(&self.inner);
      let fut = loader(normalized);
      tokio::spawn(async move {
        inner.drive(key, fut).await;
      });
    }

    match rx.await {
      Ok(result) => result,
      // The driver never drops waiters unsettled; this is a process-teardown
      // artifact.
      Err(_) => Err(DataError::Unknown("search was abandoned".into())),
    }
  }
}

impl<V: Clone> SearchInner<V> {
  /// Wait out the debounce window, run the request once, settle all waiters.
  async fn drive<Fut>(&self, key: ScopedKey, fut: Fut)
  where
    Fut: Future<Output = SearchResult<V>> + Send + 'static,
  {
    loop {
      let deadline = match self.queries.lock().get(&key) {
        Some(state) => state.deadline,
        None => return,
      };
      if Instant::now() >= deadline {
        break;
      }
      tokio::time::sleep_until(deadline).await;
    }

    if let Some(state) = self.queries.lock().get_mut(&key) {
      state.in_flight = true;
    }

    let mut result = fut.await;
    if matches!(&result, Err(e) if e.is_not_found()) {
      debug!(key = %key, "search returned not-found; treating as empty result");
      result = Ok(Vec::new());
    }

    let waiters = match self.queries.lock().remove(&key) {
      Some(state) => state.waiters,
      None => Vec::new(),
    };
    for waiter in waiters {
      let _ = waiter.send(result.clone());
    }
  }
}
