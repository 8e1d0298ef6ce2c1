//! Error taxonomy shared by every repository and the caching layer.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = DataError> = std::result::Result<T, E>;

/// Normalized errors surfaced by the data-access layer.
///
/// `Clone` is required: a coalesced fetch hands the same failure to every
/// waiter that joined it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataError {
  /// Transient transport failure; safe to retry.
  #[error("network error: {0}")]
  Network(String),

  /// The resource does not exist. Searches treat this as an empty result.
  #[error("not found: {0}")]
  NotFound(String),

  /// Rejected input; retrying without changing it will not help.
  #[error("validation failed: {0}")]
  Validation(String),

  /// A bulk operation where only some sub-operations failed.
  #[error("{} of {total} operations failed", .failed.len())]
  PartialFailure {
    /// Descriptions of the sub-operations that failed.
    failed: Vec<String>,
    total: usize,
  },

  #[error("unknown error: {0}")]
  Unknown(String),
}

impl DataError {
  /// Whether retrying the same operation can succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, DataError::Network(_) | DataError::Unknown(_))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, DataError::NotFound(_))
  }
}

impl From<serde_json::Error> for DataError {
  fn from(err: serde_json::Error) -> Self {
    DataError::Unknown(format!("malformed payload: {}", err))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_retryability() {
    assert!(DataError::Network("timeout".into()).is_retryable());
    assert!(!DataError::Validation("bad date".into()).is_retryable());
    assert!(!DataError::NotFound("patient 9".into()).is_retryable());
  }

  #[test]
  fn test_partial_failure_message() {
    let err = DataError::PartialFailure {
      failed: vec!["apt-1".into(), "apt-4".into()],
      total: 5,
    };
    assert_eq!(err.to_string(), "2 of 5 operations failed");
  }
}
