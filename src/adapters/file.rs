//! Durable file-backed state backend
//!
//! A single JSON document maps keys to records. Every write goes through
//! the atomic sequence:
//! 1. Write to temp file
//! 2. fsync temp file
//! 3. Rename temp to final (atomic on POSIX)
//! 4. fsync the directory
//!
//! A crash at any point leaves either the old or the new document.
//!
//! CAS is serialized within one process only. Orchestrators on several
//! hosts must share a linearizable backend instead.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::state::{StateBackend, StateResult, StateStoreError};

type Document = BTreeMap<String, String>;

/// File I/O runs on the blocking pool. The lock is taken there too, so a
/// caller that gives up on a slow write cannot race the write it left behind.
pub struct FileStateBackend {
    files: Arc<StateFiles>,
}

struct StateFiles {
    path: PathBuf,
    temp_path: PathBuf,
    /// Held across read-compare-write
    guard: Mutex<()>,
}

impl FileStateBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut temp = path.clone().into_os_string();
        temp.push(".tmp");
        Self {
            files: Arc::new(StateFiles {
                path,
                temp_path: PathBuf::from(temp),
                guard: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.files.path
    }

    async fn blocking<T, F>(&self, op: F) -> StateResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&StateFiles) -> StateResult<T> + Send + 'static,
    {
        let files = self.files.clone();
        tokio::task::spawn_blocking(move || {
            let _held = files.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            op(&files)
        })
        .await
        .map_err(|e| StateStoreError::Unavailable(format!("state file task failed: {}", e)))?
    }
}

impl StateFiles {
    fn load(&self) -> StateResult<Document> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Document::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                StateStoreError::Corrupt(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(unavailable("failed to read state file", e)),
        }
    }

    fn write_atomic(&self, document: &Document) -> StateResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| unavailable("failed to create state directory", e))?;
        }

        let content = serde_json::to_string_pretty(document)
            .map_err(|e| StateStoreError::Corrupt(e.to_string()))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.temp_path)
            .map_err(|e| unavailable("failed to create temp state file", e))?;

        file.write_all(content.as_bytes())
            .map_err(|e| unavailable("failed to write state file", e))?;
        file.sync_all()
            .map_err(|e| unavailable("failed to fsync state file", e))?;

        fs::rename(&self.temp_path, &self.path)
            .map_err(|e| unavailable("failed to commit state file", e))?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }
}

fn unavailable(context: &str, err: std::io::Error) -> StateStoreError {
    StateStoreError::Unavailable(format!("{}: {}", context, err))
}

#[async_trait]
impl StateBackend for FileStateBackend {
    async fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        let key = key.to_string();
        self.blocking(move |files| Ok(files.load()?.remove(&key).map(String::into_bytes)))
            .await
    }

    async fn cas_put(&self, key: &str, expected: Option<&[u8]>, next: &[u8]) -> StateResult<bool> {
        let key = key.to_string();
        let expected = expected.map(<[u8]>::to_vec);
        let value = String::from_utf8(next.to_vec())
            .map_err(|e| StateStoreError::Corrupt(format!("record is not UTF-8: {}", e)))?;

        self.blocking(move |files| {
            let mut document = files.load()?;
            if document.get(&key).map(String::as_bytes) != expected.as_deref() {
                return Ok(false);
            }
            document.insert(key, value);
            files.write_atomic(&document)?;
            Ok(true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionId;
    use crate::state::{FailoverPhase, FailoverStateStore, DEFAULT_STATE_KEY};
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_absent_file_reads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let backend = FileStateBackend::new(tmp.path().join("state.json"));
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cas_persists_across_instances() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("state.json");

        let first = FileStateBackend::new(&path);
        assert!(first.cas_put("k", None, b"{\"v\":1}").await.unwrap());
        assert!(!first.cas_put("k", None, b"{\"v\":2}").await.unwrap());

        let second = FileStateBackend::new(&path);
        assert_eq!(second.get("k").await.unwrap(), Some(b"{\"v\":1}".to_vec()));
        assert!(second
            .cas_put("k", Some(b"{\"v\":1}"), b"{\"v\":2}")
            .await
            .unwrap());
        assert_eq!(first.get("k").await.unwrap(), Some(b"{\"v\":2}".to_vec()));
        assert!(!tmp.path().join("nested").join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let err = FileStateBackend::new(&path).get("k").await.unwrap_err();
        assert!(matches!(err, StateStoreError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_failover_record_round_trip() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(FileStateBackend::new(tmp.path().join("state.json")));
        let store = FailoverStateStore::new(backend.clone(), DEFAULT_STATE_KEY);

        let idle = store.initialize(RegionId::new("us-east-1")).await.unwrap();
        let next = idle
            .clone()
            .begin_failover(RegionId::new("us-west-2"), Uuid::new_v4(), Utc::now())
            .unwrap();
        assert!(store.compare_and_swap(&idle, &next).await.unwrap());

        let reopened = FailoverStateStore::new(
            Arc::new(FileStateBackend::new(backend.path())),
            DEFAULT_STATE_KEY,
        );
        let state = reopened.read().await.unwrap();
        assert_eq!(state.phase, FailoverPhase::FailoverInProgress);
        assert_eq!(state, next);
    }

    #[tokio::test]
    async fn test_abandoned_write_completes_off_the_runtime() {
        let tmp = TempDir::new().unwrap();
        let backend = FileStateBackend::new(tmp.path().join("state.json"));

        // the caller stops waiting at once; the write runs on the blocking pool
        let abandoned =
            tokio::time::timeout(Duration::ZERO, backend.cas_put("k", None, b"{\"v\":1}")).await;
        assert!(abandoned.is_err());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while backend.get("k").await.unwrap().is_none() {
            assert!(tokio::time::Instant::now() < deadline, "write never landed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!backend.cas_put("k", None, b"{\"v\":2}").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some(b"{\"v\":1}".to_vec()));
    }
}
