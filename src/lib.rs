//! Client-side data-access layer for clinic records.
//!
//! Sits between the UI screens and the remote clinical-records API and
//! provides:
//! - Tenant-scoped, size-bounded, TTL-expiring caches per resource family
//! - Request coalescing, so N concurrent reads of one resource make one call
//! - Invalidation versioning, so a slow read can never overwrite a cache
//!   entry that was invalidated while the read was in flight
//! - Debounced, deduplicated search
//! - A durable offline queue that guarantees eventual delivery of
//!   consultation artifact uploads across restarts and flaky connectivity
//!
//! The remote API client, tenant resolution and durable storage are
//! capabilities supplied by the embedding application ([`RecordsApi`],
//! [`TenantProvider`](tenant::TenantProvider), [`DurableStore`]).

pub mod cache;
pub mod config;
pub mod draft;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod records;
pub mod search;
pub mod tenant;

pub use cache::{BoundedCache, CacheConfig, CacheLayer};
pub use config::DataConfig;
pub use draft::{ConsultationDraft, DraftStore};
pub use error::{DataError, Result};
pub use metrics::{CounterMetrics, DataMetrics, NoopMetrics};
pub use queue::{DurableStore, FileStore, MemoryStore, PendingUpload, UploadQueue};
pub use records::RecordsApi;
pub use search::SearchDebouncer;
pub use tenant::{TenantProvider, TenantScope};

use std::sync::Arc;

use records::{
  ApiUploader, AppointmentRepo, ConsultationUploads, MasterDataRepo, PatientRepo, SuggestionRepo,
};

/// Everything the UI needs, wired together.
///
/// Construct once at startup and share; repositories are internally
/// reference-counted and safe to use from concurrent tasks.
pub struct ClinicData {
  pub patients: PatientRepo,
  pub appointments: AppointmentRepo,
  pub suggestions: SuggestionRepo,
  pub master_data: MasterDataRepo,
  pub uploads: ConsultationUploads,
  pub drafts: DraftStore,
  queue: UploadQueue,
}

impl ClinicData {
  pub fn new(
    api: Arc<dyn RecordsApi>,
    tenant: Arc<dyn TenantProvider>,
    config: &DataConfig,
    queue_store: Arc<dyn DurableStore>,
    draft_store: Arc<dyn DurableStore>,
    metrics: Arc<dyn DataMetrics>,
  ) -> Self {
    let queue = UploadQueue::new(
      queue_store,
      Arc::new(ApiUploader::new(Arc::clone(&api))),
      config.queue_config(),
      Arc::clone(&metrics),
    );

    Self {
      patients: PatientRepo::new(
        Arc::clone(&api),
        Arc::clone(&tenant),
        config,
        Arc::clone(&metrics),
      ),
      appointments: AppointmentRepo::new(
        Arc::clone(&api),
        Arc::clone(&tenant),
        config,
        Arc::clone(&metrics),
      ),
      suggestions: SuggestionRepo::new(
        Arc::clone(&api),
        Arc::clone(&tenant),
        config,
        Arc::clone(&metrics),
      ),
      master_data: MasterDataRepo::new(
        Arc::clone(&api),
        Arc::clone(&tenant),
        config,
        Arc::clone(&metrics),
      ),
      uploads: ConsultationUploads::new(Arc::clone(&api), Arc::clone(&tenant), queue.clone()),
      drafts: DraftStore::new(draft_store),
      queue,
    }
  }

  /// Restore the persisted upload queue and start its retry timer. Call
  /// once during startup; safe to call again.
  pub async fn initialize(&self) {
    self.queue.initialize().await;
  }

  /// Forward app-foreground transitions here to flush pending uploads
  /// opportunistically.
  pub async fn on_app_foreground(&self) {
    self.queue.on_app_foreground().await;
  }

  /// Uploads awaiting delivery, for the optional pending indicator.
  pub fn pending_uploads(&self) -> usize {
    self.queue.pending_count()
  }
}
