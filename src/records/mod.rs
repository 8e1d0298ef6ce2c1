//! The records domain: types, the remote API seam, and the cached
//! repositories built on the generic engine.

pub mod client;
pub mod keys;
pub mod repos;
pub mod types;
pub mod wire;

pub use client::RecordsApi;
pub use repos::{
  ApiUploader, AppointmentRepo, ConsultationUploads, MasterDataRepo, PatientRepo, SubmitPdf,
  SuggestionRepo, UploadOutcome,
};
pub use types::{
  Appointment, AppointmentStatus, MasterItem, NewAppointment, Patient, Suggestion,
};
pub use wire::Page;
