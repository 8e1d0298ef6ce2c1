//! Wire-level response normalization.
//!
//! The records API has shipped three list shapes over the years: a bare
//! array, a paginated `{items, nextCursor}` object, and a legacy
//! `[items, total]` tuple. All of them decode into one canonical [`Page`]
//! before anything reaches the cache layer, so nothing downstream ever
//! sniffs response shapes again.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Canonical list response: the items plus an opaque continuation cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub next_cursor: Option<String>,
}

impl<T> Page<T> {
  pub fn new(items: Vec<T>) -> Self {
    Self {
      items,
      next_cursor: None,
    }
  }

  pub fn into_items(self) -> Vec<T> {
    self.items
  }

  pub fn is_last(&self) -> bool {
    self.next_cursor.is_none()
  }
}

impl<T> From<Vec<T>> for Page<T> {
  fn from(items: Vec<T>) -> Self {
    Self::new(items)
  }
}

/// The historical shapes, tried in order.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPage<T> {
  Paged {
    #[serde(alias = "data")]
    items: Vec<T>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
  },
  /// Legacy `[items, total]` tuple; the total was never trustworthy and is
  /// discarded.
  Legacy(Vec<T>, u64),
  Plain(Vec<T>),
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Page<T> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = RawPage::deserialize(deserializer)?;
    Ok(match raw {
      RawPage::Paged { items, next_cursor } => Page { items, next_cursor },
      RawPage::Legacy(items, _total) => Page::new(items),
      RawPage::Plain(items) => Page::new(items),
    })
  }
}
