use crate::error::{CoreError, Result};
use crate::request::Request;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Row storage for request records, keyed by request id.
///
/// Implementations only need to be durable; ordering, filtering and change
/// notification live in [`crate::repository::RequestRepository`].
pub trait RequestStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<Request>>;
    fn get(&self, id: Uuid) -> Result<Option<Request>>;
    fn upsert(&self, request: &Request) -> Result<()>;
    /// Returns whether a row was removed.
    fn remove(&self, id: Uuid) -> Result<bool>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| CoreError::Store("store lock poisoned".to_string()))
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<Uuid, Request>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<Request>> {
        Ok(lock(&self.rows)?.values().cloned().collect())
    }

    fn get(&self, id: Uuid) -> Result<Option<Request>> {
        Ok(lock(&self.rows)?.get(&id).cloned())
    }

    fn upsert(&self, request: &Request) -> Result<()> {
        lock(&self.rows)?.insert(request.id, request.clone());
        Ok(())
    }

    fn remove(&self, id: Uuid) -> Result<bool> {
        Ok(lock(&self.rows)?.remove(&id).is_some())
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Keeps every request in one pretty-printed JSON array on disk.
///
/// The file is rewritten on each mutation through a temp file in the same
/// directory followed by a rename, so a crash leaves either the old or the new
/// contents.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    rows: Mutex<BTreeMap<Uuid, Request>>,
}

impl JsonFileStore {
    /// Open `path`, creating an empty store if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rows = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let requests: Vec<Request> = if data.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&data)?
            };
            requests.into_iter().map(|r| (r.id, r)).collect()
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), count = rows.len(), "opened request store");
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, rows: &BTreeMap<Uuid, Request>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let requests: Vec<&Request> = rows.values().collect();
        let json = serde_json::to_string_pretty(&requests)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| CoreError::Io(e.error))?;
        Ok(())
    }
}

impl RequestStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<Request>> {
        Ok(lock(&self.rows)?.values().cloned().collect())
    }

    fn get(&self, id: Uuid) -> Result<Option<Request>> {
        Ok(lock(&self.rows)?.get(&id).cloned())
    }

    fn upsert(&self, request: &Request) -> Result<()> {
        let mut rows = lock(&self.rows)?;
        let previous = rows.insert(request.id, request.clone());
        if let Err(e) = self.flush(&rows) {
            // keep memory and disk in agreement
            match previous {
                Some(old) => rows.insert(old.id, old),
                None => rows.remove(&request.id),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, id: Uuid) -> Result<bool> {
        let mut rows = lock(&self.rows)?;
        let Some(old) = rows.remove(&id) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&rows) {
            rows.insert(old.id, old);
            return Err(e);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ConcatRequestData, RequestPayload, RequestStatus};
    use tempfile::TempDir;

    fn request(name: &str) -> Request {
        Request::new(RequestPayload::Concat(ConcatRequestData {
            inputs: vec![PathBuf::from(format!("/in/{name}.mp4"))],
            output: PathBuf::from(format!("/out/{name}.mp4")),
            result_path: None,
        }))
    }

    #[test]
    fn memory_store_crud() {
        let store = MemoryStore::new();
        let req = request("a");
        store.upsert(&req).unwrap();
        assert_eq!(store.get(req.id).unwrap(), Some(req.clone()));
        assert_eq!(store.load_all().unwrap().len(), 1);
        assert!(store.remove(req.id).unwrap());
        assert!(!store.remove(req.id).unwrap());
        assert!(store.get(req.id).unwrap().is_none());
    }

    #[test]
    fn json_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requests.json");

        let mut a = request("a");
        let b = request("b");
        {
            let store = JsonFileStore::open(&path).unwrap();
            store.upsert(&a).unwrap();
            store.upsert(&b).unwrap();
            a.mark_processing();
            a.mark_error("probe failed");
            store.upsert(&a).unwrap();
            assert!(store.remove(b.id).unwrap());
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        let all = reopened.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[0].status, RequestStatus::Error);
        assert_eq!(all[0].error_message.as_deref(), Some("probe failed"));
    }

    #[test]
    fn json_store_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state").join("requests.json");
        let store = JsonFileStore::open(&path).unwrap();
        store.upsert(&request("a")).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn json_store_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requests.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(matches!(err, CoreError::Json(_)));
    }
}
