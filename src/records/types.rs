//! Domain types served by the repositories.
//!
//! These are the normalized shapes the rest of the app consumes; wire-level
//! quirks are absorbed in `wire` before anything reaches the cache.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
  pub id: String,
  pub full_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub document_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub birth_date: Option<NaiveDate>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
  Scheduled,
  Confirmed,
  Attended,
  Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
  pub id: String,
  pub patient_id: String,
  pub scheduled_at: DateTime<Utc>,
  pub status: AppointmentStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

/// A canned consultation text (diagnosis template, prescription line, ...)
/// offered while the doctor types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
  pub id: String,
  pub category: String,
  pub text: String,
}

/// One entry of a master-data list (exam catalog, medication vademecum,
/// referral specialties, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterItem {
  pub code: String,
  pub label: String,
}

/// Fields accepted when creating an appointment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
  pub patient_id: String,
  pub scheduled_at: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}
