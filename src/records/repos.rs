//! Cached repositories, one per resource family.
//!
//! Each repository wires the tenant provider, the cache layer and the remote
//! API together: reads go through [`CacheLayer::fetch`], mutations hit the
//! API directly and then invalidate (or write through) the affected keys.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::warn;

use super::client::RecordsApi;
use super::keys;
use super::types::{Appointment, MasterItem, NewAppointment, Patient, Suggestion};
use super::wire::Page;
use crate::cache::CacheLayer;
use crate::config::DataConfig;
use crate::error::Result;
use crate::metrics::DataMetrics;
use crate::queue::{PendingUpload, UploadQueue, UploadRequest, Uploader};
use crate::search::SearchDebouncer;
use crate::tenant::TenantProvider;

/// Patient details and debounced patient search.
pub struct PatientRepo {
  api: Arc<dyn RecordsApi>,
  tenant: Arc<dyn TenantProvider>,
  cache: CacheLayer<Patient>,
  search: SearchDebouncer<Patient>,
}

impl PatientRepo {
  pub fn new(
    api: Arc<dyn RecordsApi>,
    tenant: Arc<dyn TenantProvider>,
    config: &DataConfig,
    metrics: Arc<dyn DataMetrics>,
  ) -> Self {
    Self {
      api,
      tenant,
      cache: CacheLayer::new("patients", config.patients.cache_config(), metrics),
      search: SearchDebouncer::new("patient-search", config.search_debounce()),
    }
  }

  /// Patient details, cached.
  pub async fn patient(&self, patient_id: &str) -> Result<Patient> {
    let scope = self.tenant.current()?;
    let key = keys::patient(&scope, patient_id);

    let api = Arc::clone(&self.api);
    let id = patient_id.to_string();
    self
      .cache
      .fetch(&key, move || async move { api.patient(&scope, &id).await })
      .await
  }

  /// Force a reload of one patient, e.g. on pull-to-refresh.
  pub async fn refresh_patient(&self, patient_id: &str) -> Result<Patient> {
    let scope = self.tenant.current()?;
    let key = keys::patient(&scope, patient_id);

    let api = Arc::clone(&self.api);
    let id = patient_id.to_string();
    self
      .cache
      .refetch(&key, move || async move { api.patient(&scope, &id).await })
      .await
  }

  /// Debounced, coalesced patient search.
  pub async fn search(&self, query: &str) -> Result<Vec<Patient>> {
    let scope = self.tenant.current()?;

    let api = Arc::clone(&self.api);
    let loader_scope = scope.clone();
    self
      .search
      .search(&scope, query, move |normalized| async move {
        api
          .search_patients(&loader_scope, &normalized)
          .await
          .map(Page::into_items)
      })
      .await
  }

  /// Update a patient, then write the fresh copy through the cache so an
  /// in-flight stale read cannot resurrect the old one.
  pub async fn update(&self, patient: &Patient) -> Result<Patient> {
    let scope = self.tenant.current()?;
    let updated = self.api.update_patient(&scope, patient).await?;

    let key = keys::patient(&scope, &updated.id);
    self.cache.put(&key, updated.clone());
    Ok(updated)
  }
}

/// The day's schedule. Short TTL, no read-promotion: each day key is loaded
/// once per screen visit, not re-read in a loop.
pub struct AppointmentRepo {
  api: Arc<dyn RecordsApi>,
  tenant: Arc<dyn TenantProvider>,
  cache: CacheLayer<Vec<Appointment>>,
}

impl AppointmentRepo {
  pub fn new(
    api: Arc<dyn RecordsApi>,
    tenant: Arc<dyn TenantProvider>,
    config: &DataConfig,
    metrics: Arc<dyn DataMetrics>,
  ) -> Self {
    Self {
      api,
      tenant,
      cache: CacheLayer::new("appointments", config.appointments.cache_config(), metrics),
    }
  }

  pub async fn for_day(&self, day: NaiveDate) -> Result<Vec<Appointment>> {
    let scope = self.tenant.current()?;
    let key = keys::appointments(&scope, day);

    let api = Arc::clone(&self.api);
    self
      .cache
      .fetch(&key, move || async move {
        api
          .appointments_for_day(&scope, day)
          .await
          .map(Page::into_items)
      })
      .await
  }

  /// Create an appointment and invalidate the affected day.
  pub async fn create(&self, appointment: &NewAppointment) -> Result<Appointment> {
    let scope = self.tenant.current()?;
    let created = self.api.create_appointment(&scope, appointment).await?;

    self
      .cache
      .invalidate(&keys::appointments(&scope, created.scheduled_at.date_naive()));
    Ok(created)
  }

  /// Cancel an appointment shown on `day` and invalidate that day.
  pub async fn cancel(&self, appointment_id: &str, day: NaiveDate) -> Result<()> {
    let scope = self.tenant.current()?;
    self.api.cancel_appointment(&scope, appointment_id).await?;

    self.cache.invalidate(&keys::appointments(&scope, day));
    Ok(())
  }
}

/// Canned consultation texts per category.
pub struct SuggestionRepo {
  api: Arc<dyn RecordsApi>,
  tenant: Arc<dyn TenantProvider>,
  cache: CacheLayer<Vec<Suggestion>>,
}

impl SuggestionRepo {
  pub fn new(
    api: Arc<dyn RecordsApi>,
    tenant: Arc<dyn TenantProvider>,
    config: &DataConfig,
    metrics: Arc<dyn DataMetrics>,
  ) -> Self {
    Self {
      api,
      tenant,
      cache: CacheLayer::new("suggestions", config.suggestions.cache_config(), metrics),
    }
  }

  pub async fn for_category(&self, category: &str) -> Result<Vec<Suggestion>> {
    let scope = self.tenant.current()?;
    let key = keys::suggestions(&scope, category);

    let api = Arc::clone(&self.api);
    let category = category.to_string();
    self
      .cache
      .fetch(&key, move || async move {
        api.suggestions(&scope, &category).await.map(Page::into_items)
      })
      .await
  }

  /// Prescription templates are just the "prescriptions" category.
  pub async fn prescriptions(&self) -> Result<Vec<Suggestion>> {
    self.for_category("prescriptions").await
  }
}

/// Master-data catalogs (exams, medications, specialties, ...).
pub struct MasterDataRepo {
  api: Arc<dyn RecordsApi>,
  tenant: Arc<dyn TenantProvider>,
  cache: CacheLayer<Vec<MasterItem>>,
}

impl MasterDataRepo {
  pub fn new(
    api: Arc<dyn RecordsApi>,
    tenant: Arc<dyn TenantProvider>,
    config: &DataConfig,
    metrics: Arc<dyn DataMetrics>,
  ) -> Self {
    Self {
      api,
      tenant,
      cache: CacheLayer::new("master-data", config.master_data.cache_config(), metrics),
    }
  }

  pub async fn list(&self, name: &str) -> Result<Vec<MasterItem>> {
    let scope = self.tenant.current()?;
    let key = keys::master_list(&scope, name);

    let api = Arc::clone(&self.api);
    let name = name.to_string();
    self
      .cache
      .fetch(&key, move || async move {
        api.master_list(&scope, &name).await.map(Page::into_items)
      })
      .await
  }
}

/// What the consultation flow hands over when it finishes rendering a PDF.
#[derive(Debug, Clone)]
pub struct SubmitPdf {
  pub consultation_id: String,
  pub patient_id: String,
  pub appointment_id: Option<String>,
  pub pdf_uri: String,
  pub file_name: Option<String>,
}

/// How a submission ended up: delivered now, or parked for retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
  Delivered,
  Queued { upload_id: String },
}

/// Direct-then-deferred artifact submission.
pub struct ConsultationUploads {
  api: Arc<dyn RecordsApi>,
  tenant: Arc<dyn TenantProvider>,
  queue: UploadQueue,
}

impl ConsultationUploads {
  pub fn new(
    api: Arc<dyn RecordsApi>,
    tenant: Arc<dyn TenantProvider>,
    queue: UploadQueue,
  ) -> Self {
    Self { api, tenant, queue }
  }

  /// Try the upload once; on any failure hand it to the offline queue.
  ///
  /// The only error this can surface is tenant resolution — an upload
  /// failure becomes `UploadOutcome::Queued`, because the consultation
  /// itself is already saved and the user flow must not block on
  /// connectivity.
  pub async fn submit_pdf(&self, submit: SubmitPdf) -> Result<UploadOutcome> {
    let scope = self.tenant.current()?;

    let attempt = PendingUpload {
      id: uuid::Uuid::new_v4().to_string(),
      consultation_id: submit.consultation_id.clone(),
      patient_id: submit.patient_id.clone(),
      doctor_id: scope.doctor_id.clone(),
      appointment_id: submit.appointment_id.clone(),
      pdf_uri: submit.pdf_uri.clone(),
      file_name: submit.file_name.clone(),
      created_at: Utc::now().timestamp_millis(),
      attempts: 0,
      last_error: None,
    };

    match self.api.upload_consultation_pdf(&attempt).await {
      Ok(()) => Ok(UploadOutcome::Delivered),
      Err(e) => {
        warn!(
          consultation = %submit.consultation_id,
          error = %e,
          "direct upload failed; deferring to offline queue"
        );
        let upload_id = self
          .queue
          .enqueue(UploadRequest {
            consultation_id: submit.consultation_id,
            patient_id: submit.patient_id,
            doctor_id: scope.doctor_id,
            appointment_id: submit.appointment_id,
            pdf_uri: submit.pdf_uri,
            file_name: submit.file_name,
          })
          .await;
        Ok(UploadOutcome::Queued { upload_id })
      }
    }
  }

  /// Uploads still pending delivery, for the optional UI indicator.
  pub fn pending_count(&self) -> usize {
    self.queue.pending_count()
  }
}

/// [`Uploader`] implementation the queue retries through.
pub struct ApiUploader {
  api: Arc<dyn RecordsApi>,
}

impl ApiUploader {
  pub fn new(api: Arc<dyn RecordsApi>) -> Self {
    Self { api }
  }
}

#[async_trait::async_trait]
impl Uploader for ApiUploader {
  async fn upload(&self, item: &PendingUpload) -> Result<()> {
    self.api.upload_consultation_pdf(item).await
  }
}
