//! The remote records API, as consumed by the repositories.
//!
//! The concrete client (HTTP, auth, retries at the transport level) lives in
//! the embedding application; repositories only see this trait and its
//! normalized [`DataError`](crate::error::DataError) failures.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::types::{Appointment, MasterItem, NewAppointment, Patient, Suggestion};
use super::wire::Page;
use crate::error::Result;
use crate::queue::PendingUpload;
use crate::tenant::TenantScope;

/// Authenticated access to the tenant's clinical records.
///
/// Read methods must be idempotent: the cache layer may call them at any
/// time and discards results it no longer wants.
#[async_trait]
pub trait RecordsApi: Send + Sync {
  async fn patient(&self, scope: &TenantScope, patient_id: &str) -> Result<Patient>;

  async fn search_patients(&self, scope: &TenantScope, query: &str) -> Result<Page<Patient>>;

  async fn update_patient(&self, scope: &TenantScope, patient: &Patient) -> Result<Patient>;

  async fn appointments_for_day(
    &self,
    scope: &TenantScope,
    day: NaiveDate,
  ) -> Result<Page<Appointment>>;

  async fn create_appointment(
    &self,
    scope: &TenantScope,
    appointment: &NewAppointment,
  ) -> Result<Appointment>;

  async fn cancel_appointment(&self, scope: &TenantScope, appointment_id: &str) -> Result<()>;

  async fn suggestions(&self, scope: &TenantScope, category: &str) -> Result<Page<Suggestion>>;

  async fn master_list(&self, scope: &TenantScope, list: &str) -> Result<Page<MasterItem>>;

  /// Upload a generated consultation artifact. Also invoked by the offline
  /// queue on retry, so it must tolerate re-uploads of the same item.
  async fn upload_consultation_pdf(&self, upload: &PendingUpload) -> Result<()>;
}
