//! Injectable observability hooks for the caching layer and upload queue.
//!
//! Components record hits, misses, evictions and queue depth through the
//! `DataMetrics` trait. The default implementation discards everything;
//! applications that want numbers install `CounterMetrics` and read
//! snapshots from it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Observability sink injected into each component.
///
/// All methods default to no-ops so implementors only override what they
/// track. The `resource` label is the owning cache's name ("patients",
/// "appointments", ...).
pub trait DataMetrics: Send + Sync {
  fn record_hit(&self, _resource: &str) {}
  fn record_miss(&self, _resource: &str) {}
  fn record_evictions(&self, _resource: &str, _count: u64) {}
  fn record_queue_depth(&self, _depth: usize) {}
}

/// Discards every measurement.
pub struct NoopMetrics;

impl DataMetrics for NoopMetrics {}

/// Lock-free aggregate counters.
pub struct CounterMetrics {
  hits: AtomicU64,
  misses: AtomicU64,
  evictions: AtomicU64,
  queue_depth: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
  pub hits: u64,
  pub misses: u64,
  pub evictions: u64,
  pub queue_depth: u64,
}

impl MetricsSnapshot {
  /// Cache hit rate (0.0-1.0). Returns 0.0 if no lookups yet.
  pub fn hit_rate(&self) -> f64 {
    let total = self.hits + self.misses;
    if total == 0 {
      0.0
    } else {
      self.hits as f64 / total as f64
    }
  }
}

impl CounterMetrics {
  pub const fn new() -> Self {
    Self {
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      evictions: AtomicU64::new(0),
      queue_depth: AtomicU64::new(0),
    }
  }

  pub fn snapshot(&self) -> MetricsSnapshot {
    MetricsSnapshot {
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
      queue_depth: self.queue_depth.load(Ordering::Relaxed),
    }
  }
}

impl Default for CounterMetrics {
  fn default() -> Self {
    Self::new()
  }
}

impl DataMetrics for CounterMetrics {
  fn record_hit(&self, _resource: &str) {
    self.hits.fetch_add(1, Ordering::Relaxed);
  }

  fn record_miss(&self, _resource: &str) {
    self.misses.fetch_add(1, Ordering::Relaxed);
  }

  fn record_evictions(&self, _resource: &str, count: u64) {
    self.evictions.fetch_add(count, Ordering::Relaxed);
  }

  fn record_queue_depth(&self, depth: usize) {
    self.queue_depth.store(depth as u64, Ordering::Relaxed);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hit_rate() {
    let metrics = CounterMetrics::new();
    assert_eq!(metrics.snapshot().hit_rate(), 0.0);

    metrics.record_hit("patients");
    metrics.record_hit("patients");
    metrics.record_miss("patients");

    let snap = metrics.snapshot();
    assert_eq!(snap.hits, 2);
    assert_eq!(snap.misses, 1);
    assert!((snap.hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
  }

  #[test]
  fn test_queue_depth_is_a_gauge() {
    let metrics = CounterMetrics::new();
    metrics.record_queue_depth(7);
    metrics.record_queue_depth(3);
    assert_eq!(metrics.snapshot().queue_depth, 3);
  }
}
