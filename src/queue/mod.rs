//! Durable offline queue for consultation artifact uploads.
//!
//! When an upload fails at submission time the artifact reference is parked
//! here instead of surfacing an error: the queue persists itself, retries on
//! a fixed interval and whenever the app returns to the foreground, and
//! drops an item only after a bounded number of attempts. The user flow that
//! produced the artifact never blocks on connectivity.
//!
//! Per-item lifecycle: Pending -> Uploading -> Success (removed)
//! | Requeued (attempts+1) | Dropped (ceiling reached, removed, logged).

mod store;

pub use store::{DurableStore, FileStore, MemoryStore};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::metrics::DataMetrics;

/// One deferred artifact upload, persisted as camelCase JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpload {
  pub id: String,
  pub consultation_id: String,
  pub patient_id: String,
  pub doctor_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub appointment_id: Option<String>,
  pub pdf_uri: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file_name: Option<String>,
  /// Epoch milliseconds.
  pub created_at: i64,
  pub attempts: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_error: Option<String>,
}

/// What a caller hands to [`UploadQueue::enqueue`]; the queue fills in the
/// id, timestamp and attempt counter.
#[derive(Debug, Clone)]
pub struct UploadRequest {
  pub consultation_id: String,
  pub patient_id: String,
  pub doctor_id: String,
  pub appointment_id: Option<String>,
  pub pdf_uri: String,
  pub file_name: Option<String>,
}

/// Performs the actual artifact upload. Implemented over the remote API
/// client by the records layer.
#[async_trait]
pub trait Uploader: Send + Sync {
  async fn upload(&self, item: &PendingUpload) -> Result<()>;
}

/// Retry cadence and give-up threshold.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
  pub retry_interval: Duration,
  pub max_attempts: u32,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      retry_interval: Duration::from_secs(20),
      max_attempts: 20,
    }
  }
}

/// Durable, ordered retry queue for failed uploads.
pub struct UploadQueue {
  inner: Arc<QueueInner>,
}

impl Clone for UploadQueue {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

struct QueueInner {
  items: Mutex<VecDeque<PendingUpload>>,
  /// Only one drain runs at a time; a flush requested mid-drain is a no-op.
  processing: AtomicBool,
  init: OnceCell<()>,
  store: Arc<dyn DurableStore>,
  uploader: Arc<dyn Uploader>,
  config: QueueConfig,
  metrics: Arc<dyn DataMetrics>,
}

impl UploadQueue {
  pub fn new(
    store: Arc<dyn DurableStore>,
    uploader: Arc<dyn Uploader>,
    config: QueueConfig,
    metrics: Arc<dyn DataMetrics>,
  ) -> Self {
    Self {
      inner: Arc::new(QueueInner {
        items: Mutex::new(VecDeque::new()),
        processing: AtomicBool::new(false),
        init: OnceCell::new(),
        store,
        uploader,
        config,
        metrics,
      }),
    }
  }

  /// Load the persisted queue and start the retry timer. Idempotent;
  /// concurrent callers share one initialization in progress. If persisted
  /// items exist, a flush is triggered immediately.
  pub async fn initialize(&self) {
    let inner = &self.inner;
    inner
      .init
      .get_or_init(|| async {
        let loaded = match inner.store.read().await {
          Ok(Some(bytes)) => match serde_json::from_slice::<Vec<PendingUpload>>(&bytes) {
            Ok(items) => items,
            Err(e) => {
              warn!(error = %e, "persisted upload queue is unreadable; starting empty");
              Vec::new()
            }
          },
          Ok(None) => Vec::new(),
          Err(e) => {
            warn!(error = %e, "failed to read persisted upload queue; starting empty");
            Vec::new()
          }
        };

        let has_items = {
          let mut items = inner.items.lock();
          // Persisted items predate anything enqueued this process.
          for item in loaded.into_iter().rev() {
            items.push_front(item);
          }
          !items.is_empty()
        };
        if has_items {
          info!(pending = self.pending_count(), "restored upload queue");
        }

        self.spawn_retry_timer();
        if has_items {
          self.trigger_flush();
        }
      })
      .await;
  }

  /// Append a new pending upload, persist the queue, then kick off a
  /// background flush. The caller gets the queue item id back; upload
  /// failures from the flush never reach it.
  pub async fn enqueue(&self, request: UploadRequest) -> String {
    // Enqueueing before startup finished must not clobber the persisted
    // queue with a partial one.
    self.initialize().await;

    let item = PendingUpload {
      id: uuid::Uuid::new_v4().to_string(),
      consultation_id: request.consultation_id,
      patient_id: request.patient_id,
      doctor_id: request.doctor_id,
      appointment_id: request.appointment_id,
      pdf_uri: request.pdf_uri,
      file_name: request.file_name,
      created_at: Utc::now().timestamp_millis(),
      attempts: 0,
      last_error: None,
    };
    let id = item.id.clone();
    info!(id = %id, consultation = %item.consultation_id, "deferring consultation upload");

    self.inner.items.lock().push_back(item);
    self.inner.persist().await;
    self
      .inner
      .metrics
      .record_queue_depth(self.pending_count());
    self.trigger_flush();
    id
  }

  /// Drain the queue once. No-op when a drain is already running.
  pub async fn flush(&self) {
    self.inner.flush().await;
  }

  /// Opportunistic flush on app-foreground transitions.
  pub async fn on_app_foreground(&self) {
    debug!("app foregrounded; flushing upload queue");
    self.inner.flush().await;
  }

  /// Number of uploads still awaiting delivery. Drives the optional
  /// pending-uploads indicator in the UI.
  pub fn pending_count(&self) -> usize {
    self.inner.items.lock().len()
  }

  fn trigger_flush(&self) {
    let inner = Arc::clone(&self.inner);
    tokio::spawn(async move {
      inner.flush().await;
    });
  }

  /// Fixed-interval retry driver. Holds only a weak reference so dropping
  /// the last queue handle stops the timer.
  fn spawn_retry_timer(&self) {
    let weak = Arc::downgrade(&self.inner);
    let interval = self.inner.config.retry_interval;
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      // The first tick completes immediately; initialization already
      // flushed, so skip it.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        match weak.upgrade() {
          Some(inner) => inner.flush().await,
          None => break,
        }
      }
    });
  }
}

impl QueueInner {
  async fn flush(&self) {
    if self.processing.swap(true, Ordering::SeqCst) {
      return;
    }

    // Drain a snapshot of the current length; items enqueued while we are
    // uploading wait for the next pass.
    let planned = self.items.lock().len();
    for _ in 0..planned {
      let item = self.items.lock().pop_front();
      let Some(mut item) = item else { break };

      debug!(id = %item.id, attempt = item.attempts + 1, "attempting deferred upload");
      match self.uploader.upload(&item).await {
        Ok(()) => {
          info!(id = %item.id, consultation = %item.consultation_id, "deferred upload delivered");
        }
        Err(e) => {
          item.attempts += 1;
          item.last_error = Some(e.to_string());
          if item.attempts >= self.config.max_attempts {
            warn!(
              id = %item.id,
              consultation = %item.consultation_id,
              attempts = item.attempts,
              error = %e,
              "giving up on deferred upload"
            );
          } else {
            self.items.lock().push_back(item);
          }
        }
      }
    }

    self.persist().await;
    self.metrics.record_queue_depth(self.items.lock().len());
    self.processing.store(false, Ordering::SeqCst);
  }

  /// Persist the current queue. An empty queue deletes the record instead
  /// of writing `[]`. I/O failures are logged and swallowed: the in-memory
  /// queue stays authoritative for this process.
  async fn persist(&self) {
    let snapshot: Vec<PendingUpload> = self.items.lock().iter().cloned().collect();

    let result = if snapshot.is_empty() {
      self.store.delete().await
    } else {
      match serde_json::to_vec(&snapshot) {
        Ok(bytes) => self.store.write(&bytes).await,
        Err(e) => {
          warn!(error = %e, "failed to serialize upload queue");
          return;
        }
      }
    };

    if let Err(e) = result {
      warn!(error = %e, "failed to persist upload queue; in-memory copy kept");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::DataError;
  use crate::metrics::NoopMetrics;
  use std::sync::atomic::AtomicU32;

  /// Uploader that fails the first `failures` calls, then succeeds.
  struct FlakyUploader {
    calls: AtomicU32,
    failures: u32,
  }

  impl FlakyUploader {
    fn failing(failures: u32) -> Self {
      Self {
        calls: AtomicU32::new(0),
        failures,
      }
    }

    fn always_failing() -> Self {
      Self::failing(u32::MAX)
    }

    fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Uploader for FlakyUploader {
    async fn upload(&self, _item: &PendingUpload) -> Result<()> {
      let n = self.calls.fetch_add(1, Ordering::SeqCst);
      if n < self.failures {
        Err(DataError::Network("offline".into()))
      } else {
        Ok(())
      }
    }
  }

  fn request() -> UploadRequest {
    UploadRequest {
      consultation_id: "cons-1".into(),
      patient_id: "pat-1".into(),
      doctor_id: "dr-1".into(),
      appointment_id: Some("apt-1".into()),
      pdf_uri: "file:///tmp/cons-1.pdf".into(),
      file_name: Some("consulta.pdf".into()),
    }
  }

  fn make_queue(
    store: &MemoryStore,
    uploader: Arc<FlakyUploader>,
    max_attempts: u32,
  ) -> UploadQueue {
    UploadQueue::new(
      Arc::new(store.clone()),
      uploader,
      QueueConfig {
        retry_interval: Duration::from_secs(3600),
        max_attempts,
      },
      Arc::new(NoopMetrics),
    )
  }

  #[tokio::test]
  async fn test_enqueue_persists_and_survives_restart() {
    let store = MemoryStore::new();
    let uploader = Arc::new(FlakyUploader::always_failing());
    let queue = make_queue(&store, uploader.clone(), 20);

    queue.enqueue(request()).await;
    assert_eq!(queue.pending_count(), 1);
    assert!(store.read().await.unwrap().is_some());

    // "Restart": a fresh queue over the same durable store.
    let restarted = make_queue(&store, uploader, 20);
    restarted.initialize().await;
    assert_eq!(restarted.pending_count(), 1);

    let items = restarted.inner.items.lock();
    assert_eq!(items[0].consultation_id, "cons-1");
    assert_eq!(items[0].file_name.as_deref(), Some("consulta.pdf"));
  }

  #[tokio::test]
  async fn test_item_dropped_after_attempt_ceiling() {
    let store = MemoryStore::new();
    let uploader = Arc::new(FlakyUploader::always_failing());
    let queue = make_queue(&store, uploader.clone(), 3);

    queue.enqueue(request()).await;
    // Let the enqueue-triggered flush land attempt 1.
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Each further flush is one attempt for the single queued item.
    queue.flush().await;
    queue.flush().await;

    assert_eq!(queue.pending_count(), 0);
    assert_eq!(uploader.calls(), 3);
    // The persisted record is deleted, not rewritten as [].
    assert_eq!(store.read().await.unwrap(), None);

    // Dropped means dropped: further flushes never retry it.
    queue.flush().await;
    assert_eq!(uploader.calls(), 3);
  }

  #[tokio::test]
  async fn test_failures_below_ceiling_stay_retryable() {
    let store = MemoryStore::new();
    let uploader = Arc::new(FlakyUploader::failing(2));
    let queue = make_queue(&store, uploader.clone(), 5);

    queue.enqueue(request()).await;
    // Attempt 1 comes from the enqueue-triggered flush, attempt 2 here.
    tokio::time::sleep(Duration::from_millis(10)).await;
    queue.flush().await;

    {
      let items = queue.inner.items.lock();
      assert_eq!(items.len(), 1);
      assert_eq!(items[0].attempts, 2);
      assert_eq!(items[0].last_error.as_deref(), Some("network error: offline"));
    }

    // Third attempt succeeds and clears the queue.
    queue.flush().await;
    assert_eq!(queue.pending_count(), 0);
    assert_eq!(store.read().await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_initialize_is_idempotent() {
    let store = MemoryStore::new();
    let uploader = Arc::new(FlakyUploader::always_failing());
    let seeded = make_queue(&store, uploader.clone(), 20);
    seeded.enqueue(request()).await;

    let restarted = make_queue(&store, uploader, 20);
    restarted.initialize().await;
    restarted.initialize().await;

    // The persisted item was loaded exactly once.
    assert_eq!(restarted.pending_count(), 1);
  }

  #[tokio::test]
  async fn test_concurrent_flushes_are_mutually_exclusive() {
    struct SlowUploader {
      calls: AtomicU32,
    }

    #[async_trait]
    impl Uploader for SlowUploader {
      async fn upload(&self, _item: &PendingUpload) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
      }
    }

    let uploader = Arc::new(SlowUploader {
      calls: AtomicU32::new(0),
    });
    let queue = UploadQueue::new(
      Arc::new(MemoryStore::new()),
      uploader.clone(),
      QueueConfig::default(),
      Arc::new(NoopMetrics),
    );

    queue.enqueue(request()).await;

    let a = {
      let queue = queue.clone();
      tokio::spawn(async move { queue.flush().await })
    };
    let b = {
      let queue = queue.clone();
      tokio::spawn(async move { queue.flush().await })
    };
    a.await.unwrap();
    b.await.unwrap();

    // enqueue() also triggered a background flush; whichever drain won the
    // flag, the item was uploaded exactly once.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_retry_timer_drives_attempts() {
    let store = MemoryStore::new();
    let uploader = Arc::new(FlakyUploader::always_failing());
    let queue = UploadQueue::new(
      Arc::new(store.clone()),
      uploader.clone(),
      QueueConfig {
        retry_interval: Duration::from_millis(40),
        max_attempts: 20,
      },
      Arc::new(NoopMetrics),
    );

    queue.initialize().await;
    queue.enqueue(request()).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    // Initial flush plus several timer ticks.
    assert!(uploader.calls() >= 3);
    assert_eq!(queue.pending_count(), 1);
  }

  #[tokio::test]
  async fn test_unreadable_persisted_queue_starts_empty() {
    let store = MemoryStore::new();
    store.write(b"not json at all").await.unwrap();

    let queue = make_queue(&store, Arc::new(FlakyUploader::always_failing()), 20);
    queue.initialize().await;

    assert_eq!(queue.pending_count(), 0);
  }

  #[tokio::test]
  async fn test_persisted_record_is_camel_case() {
    let store = MemoryStore::new();
    let queue = make_queue(&store, Arc::new(FlakyUploader::always_failing()), 20);
    queue.enqueue(request()).await;

    let bytes = store.read().await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let record = &value.as_array().unwrap()[0];

    assert_eq!(record["consultationId"], "cons-1");
    assert_eq!(record["patientId"], "pat-1");
    assert_eq!(record["pdfUri"], "file:///tmp/cons-1.pdf");
    assert!(record["createdAt"].is_i64());
    assert!(record["attempts"].is_u64());
  }
}
