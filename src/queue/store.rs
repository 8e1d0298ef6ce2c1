//! Durable storage capability used by the upload queue and draft snapshot.
//!
//! One byte-blob record per store. Native builds persist to a file under the
//! platform data directory; tests (and keyed-storage platforms) use the
//! in-memory implementation.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Minimal read/write/delete capability over one durable record.
#[async_trait]
pub trait DurableStore: Send + Sync {
  /// The stored bytes, or `None` if nothing has been written.
  async fn read(&self) -> io::Result<Option<Vec<u8>>>;

  async fn write(&self, bytes: &[u8]) -> io::Result<()>;

  /// Remove the record entirely. Deleting a missing record is not an error.
  async fn delete(&self) -> io::Result<()>;
}

/// File-backed store for native builds.
pub struct FileStore {
  path: PathBuf,
}

impl FileStore {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  /// Store under the platform data directory, e.g.
  /// `~/.local/share/clinic-data/<name>`.
  pub fn in_data_dir(name: &str) -> io::Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| io::Error::other("could not determine data directory"))?;

    Ok(Self::new(data_dir.join("clinic-data").join(name)))
  }

  pub fn path(&self) -> &std::path::Path {
    &self.path
  }
}

#[async_trait]
impl DurableStore for FileStore {
  async fn read(&self) -> io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(&self.path).await {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e),
    }
  }

  async fn write(&self, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = self.path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    // Write-then-rename so a crash mid-write never truncates the record.
    let tmp = self.path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &self.path).await
  }

  async fn delete(&self) -> io::Result<()> {
    match tokio::fs::remove_file(&self.path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e),
    }
  }
}

/// In-memory store. Cloning shares the record, which is what a simulated
/// process restart needs: a new queue over the same `MemoryStore` sees the
/// previous "process"'s data.
#[derive(Clone, Default)]
pub struct MemoryStore {
  data: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl DurableStore for MemoryStore {
  async fn read(&self) -> io::Result<Option<Vec<u8>>> {
    Ok(self.data.lock().clone())
  }

  async fn write(&self, bytes: &[u8]) -> io::Result<()> {
    *self.data.lock() = Some(bytes.to_vec());
    Ok(())
  }

  async fn delete(&self) -> io::Result<()> {
    *self.data.lock() = None;
    Ok(())
  }
}
