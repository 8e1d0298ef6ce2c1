//! Crash-safe snapshot of the consultation being written.
//!
//! Saved on every meaningful edit so a killed process can restore the
//! half-finished consultation. Rides the same durable-store seam as the
//! upload queue; storage failures are logged and swallowed, never surfaced
//! to the editing flow.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::queue::DurableStore;

/// The recoverable state of an in-progress consultation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationDraft {
  pub patient_id: String,
  pub doctor_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub appointment_id: Option<String>,
  pub notes: String,
  #[serde(default)]
  pub prescriptions: Vec<String>,
  /// Epoch milliseconds of the last save.
  pub updated_at: i64,
}

/// Persists at most one draft at a time.
pub struct DraftStore {
  store: Arc<dyn DurableStore>,
}

impl DraftStore {
  pub fn new(store: Arc<dyn DurableStore>) -> Self {
    Self { store }
  }

  /// Save the draft, stamping `updated_at`. Returns whether the durable
  /// write succeeded; callers may ignore it.
  pub async fn save(&self, mut draft: ConsultationDraft) -> bool {
    draft.updated_at = Utc::now().timestamp_millis();

    let bytes = match serde_json::to_vec(&draft) {
      Ok(bytes) => bytes,
      Err(e) => {
        warn!(error = %e, "failed to serialize consultation draft");
        return false;
      }
    };
    match self.store.write(&bytes).await {
      Ok(()) => {
        debug!(patient = %draft.patient_id, "consultation draft saved");
        true
      }
      Err(e) => {
        warn!(error = %e, "failed to persist consultation draft");
        false
      }
    }
  }

  /// The last saved draft, if any. An unreadable snapshot is treated as
  /// absent rather than an error.
  pub async fn load(&self) -> Option<ConsultationDraft> {
    let bytes = match self.store.read().await {
      Ok(Some(bytes)) => bytes,
      Ok(None) => return None,
      Err(e) => {
        warn!(error = %e, "failed to read consultation draft");
        return None;
      }
    };

    match serde_json::from_slice(&bytes) {
      Ok(draft) => Some(draft),
      Err(e) => {
        warn!(error = %e, "discarding unreadable consultation draft");
        None
      }
    }
  }

  /// Remove the snapshot, e.g. after the consultation is finalized.
  pub async fn clear(&self) {
    if let Err(e) = self.store.delete().await {
      warn!(error = %e, "failed to clear consultation draft");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::queue::MemoryStore;

  fn draft() -> ConsultationDraft {
    ConsultationDraft {
      patient_id: "pat-1".into(),
      doctor_id: "dr-1".into(),
      appointment_id: None,
      notes: "persistent cough, two weeks".into(),
      prescriptions: vec!["amoxicillin 500mg".into()],
      updated_at: 0,
    }
  }

  #[tokio::test]
  async fn test_save_load_round_trip() {
    let drafts = DraftStore::new(Arc::new(MemoryStore::new()));

    assert!(drafts.load().await.is_none());
    assert!(drafts.save(draft()).await);

    let restored = drafts.load().await.unwrap();
    assert_eq!(restored.notes, "persistent cough, two weeks");
    assert!(restored.updated_at > 0);
  }

  #[tokio::test]
  async fn test_clear_removes_snapshot() {
    let drafts = DraftStore::new(Arc::new(MemoryStore::new()));
    drafts.save(draft()).await;
    drafts.clear().await;
    assert!(drafts.load().await.is_none());
  }

  #[tokio::test]
  async fn test_corrupt_snapshot_is_absent() {
    let store = MemoryStore::new();
    store.write(b"{truncated").await.unwrap();

    let drafts = DraftStore::new(Arc::new(store));
    assert!(drafts.load().await.is_none());
  }
}
