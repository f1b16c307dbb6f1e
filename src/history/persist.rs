use super::record::ScanRecord;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Durable storage primitives behind the history store.
pub trait RecordStore: Send + Sync {
    fn append(&self, record: &ScanRecord) -> Result<()>;
    /// All records in chronological order.
    fn list(&self) -> Result<Vec<ScanRecord>>;
    fn update(&self, record: &ScanRecord) -> Result<()>;
    fn remove(&self, id: Uuid) -> Result<()>;
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn append(&self, record: &ScanRecord) -> Result<()> {
        (**self).append(record)
    }

    fn list(&self) -> Result<Vec<ScanRecord>> {
        (**self).list()
    }

    fn update(&self, record: &ScanRecord) -> Result<()> {
        (**self).update(record)
    }

    fn remove(&self, id: Uuid) -> Result<()> {
        (**self).remove(id)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn apply_update(records: &mut [ScanRecord], record: &ScanRecord) -> Result<()> {
    let slot = records
        .iter_mut()
        .find(|r| r.id == record.id)
        .with_context(|| format!("No stored record with id {}", record.id))?;
    *slot = record.clone();
    Ok(())
}

/// Volatile store, used by tests and `--mock` runs without a history file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ScanRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn append(&self, record: &ScanRecord) -> Result<()> {
        lock(&self.records).push(record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<ScanRecord>> {
        Ok(lock(&self.records).clone())
    }

    fn update(&self, record: &ScanRecord) -> Result<()> {
        apply_update(&mut lock(&self.records), record)
    }

    fn remove(&self, id: Uuid) -> Result<()> {
        lock(&self.records).retain(|r| r.id != id);
        Ok(())
    }
}

/// History kept as a JSON array on disk, rewritten on every mutation.
///
/// Writes are synchronous and happen while the caller holds the history lock.
/// Cost grows with `max_records`, so keep the bound small.
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<Vec<ScanRecord>>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create history directory: {}", parent.display())
                })?;
            }
        }

        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read history file: {}", path.display()))?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content).with_context(|| {
                    format!("Failed to parse history file: {}", path.display())
                })?
            }
        } else {
            Vec::new()
        };

        log::debug!(
            "Opened history file {} ({} records)",
            path.display(),
            records.len()
        );
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, records: &[ScanRecord]) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(records)?;
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn append(&self, record: &ScanRecord) -> Result<()> {
        let mut records = lock(&self.records);
        records.push(record.clone());
        self.flush(&records)
    }

    fn list(&self) -> Result<Vec<ScanRecord>> {
        Ok(lock(&self.records).clone())
    }

    fn update(&self, record: &ScanRecord) -> Result<()> {
        let mut records = lock(&self.records);
        apply_update(&mut records, record)?;
        self.flush(&records)
    }

    fn remove(&self, id: Uuid) -> Result<()> {
        let mut records = lock(&self.records);
        records.retain(|r| r.id != id);
        self.flush(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::record::sample;

    #[test]
    fn test_memory_store_ops() {
        let store = MemoryStore::new();
        let mut a = sample("one");
        let b = sample("two");
        store.append(&a).unwrap();
        store.append(&b).unwrap();

        a.bookmarked = true;
        store.update(&a).unwrap();
        assert!(store.list().unwrap()[0].bookmarked);

        store.remove(b.id).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);

        // Updating something that was never stored is an error
        assert!(store.update(&b).is_err());
    }

    #[test]
    fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let first = sample("https://a.example");
        let second = sample("12345");
        {
            let store = JsonFileStore::open(&path).unwrap();
            store.append(&first).unwrap();
            store.append(&second).unwrap();
            store.remove(first.id).unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        let records = reopened.list().unwrap();
        assert_eq!(records, vec![second]);
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }

    #[test]
    fn test_json_store_accepts_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "").unwrap();
        assert!(JsonFileStore::open(&path).unwrap().list().unwrap().is_empty());
    }
}
