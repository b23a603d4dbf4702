use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::models::zone::DetectorKind;

/// One alert that has already been sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Unix seconds of the alerted zone's start
    pub zone_start: i64,
    /// Unix seconds the alert fired
    pub fired_at: i64,
}

/// Durable key/value map of sent alerts for one instrument and detector.
///
/// Every mutation replaces the backing state as a whole; readers never observe a partial write.
pub trait DedupStore: Send + Sync {
    fn get(&self, key: &str) -> Option<AlertRecord>;

    fn set(&mut self, key: &str, record: AlertRecord) -> Result<(), StoreError>;

    /// Returns whether a record was present
    fn remove(&mut self, key: &str) -> Result<bool, StoreError>;

    fn atomic_replace(&mut self, records: BTreeMap<String, AlertRecord>) -> Result<(), StoreError>;

    fn snapshot(&self) -> BTreeMap<String, AlertRecord>;
}

/// Non-durable store, used when no dedup directory is configured
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: BTreeMap<String, AlertRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupStore for MemoryStore {
    fn get(&self, key: &str) -> Option<AlertRecord> {
        self.records.get(key).copied()
    }

    fn set(&mut self, key: &str, record: AlertRecord) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), record);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(key).is_some())
    }

    fn atomic_replace(&mut self, records: BTreeMap<String, AlertRecord>) -> Result<(), StoreError> {
        self.records = records;
        Ok(())
    }

    fn snapshot(&self) -> BTreeMap<String, AlertRecord> {
        self.records.clone()
    }
}

/// JSON file per instrument and detector, rewritten via temp file + rename on every mutation
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: BTreeMap<String, AlertRecord>,
}

impl JsonFileStore {
    /// Load `{dir}/{instrument}_{detector}.json`. A missing or corrupt file starts empty.
    pub fn open(dir: impl AsRef<Path>, instrument: &str, detector: DetectorKind) -> Self {
        let path = dir
            .as_ref()
            .join(format!("{}_{}.json", instrument, detector));
        let records = Self::load(&path);
        Self { path, records }
    }

    fn load(path: &Path) -> BTreeMap<String, AlertRecord> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No dedup file at {}, starting empty", path.display());
                return BTreeMap::new();
            }
            Err(e) => {
                tracing::warn!("Failed to read dedup file {}: {}", path.display(), e);
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    "Corrupt dedup file {} ({}), starting empty",
                    path.display(),
                    e
                );
                BTreeMap::new()
            }
        }
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DedupStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<AlertRecord> {
        self.records.get(key).copied()
    }

    fn set(&mut self, key: &str, record: AlertRecord) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), record);
        self.persist()
    }

    fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        let removed = self.records.remove(key).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn atomic_replace(&mut self, records: BTreeMap<String, AlertRecord>) -> Result<(), StoreError> {
        self.records = records;
        self.persist()
    }

    fn snapshot(&self) -> BTreeMap<String, AlertRecord> {
        self.records.clone()
    }
}

/// File-backed store under `dir`, or an in-memory one when no directory is configured.
/// Instrument ids are validated as path-safe at config load.
pub fn open_store(
    dir: Option<&Path>,
    instrument: &str,
    detector: DetectorKind,
) -> Box<dyn DedupStore> {
    match dir {
        Some(dir) => Box::new(JsonFileStore::open(dir, instrument, detector)),
        None => Box::new(MemoryStore::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(zone_start: i64) -> AlertRecord {
        AlertRecord {
            zone_start,
            fired_at: zone_start + 60,
        }
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = JsonFileStore::open(dir.path(), "BTC", DetectorKind::Accumulation);
        store.set("BTC:accumulation", record(1_000)).unwrap();
        store.set("BTC:other", record(2_000)).unwrap();
        assert!(store.remove("BTC:other").unwrap());
        assert!(!store.remove("BTC:other").unwrap());

        let reopened = JsonFileStore::open(dir.path(), "BTC", DetectorKind::Accumulation);
        assert_eq!(reopened.get("BTC:accumulation"), Some(record(1_000)));
        assert_eq!(reopened.get("BTC:other"), None);
        assert!(dir.path().join("BTC_accumulation.json").exists());
        assert!(!dir.path().join("BTC_accumulation.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ETH_fvg.json"), "{ not json").unwrap();

        let mut store = JsonFileStore::open(dir.path(), "ETH", DetectorKind::Fvg);
        assert!(store.snapshot().is_empty());

        // The next write replaces the corrupt content
        store.set("ETH:fvg:10", record(10)).unwrap();
        let reopened = JsonFileStore::open(dir.path(), "ETH", DetectorKind::Fvg);
        assert_eq!(reopened.snapshot().len(), 1);
    }

    #[test]
    fn test_missing_directory_is_created_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("alerts").join("state");

        let mut store = JsonFileStore::open(&nested, "SOL", DetectorKind::SupplyDemand);
        assert!(store.snapshot().is_empty());
        store.set("SOL:supply_demand:5", record(5)).unwrap();
        assert!(nested.join("SOL_supply_demand.json").exists());
    }

    #[test]
    fn test_atomic_replace_overwrites_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path(), "BTC", DetectorKind::Fvg);
        store.set("a", record(1)).unwrap();
        store.set("b", record(2)).unwrap();

        let mut next = BTreeMap::new();
        next.insert("c".to_string(), record(3));
        store.atomic_replace(next.clone()).unwrap();

        let reopened = JsonFileStore::open(dir.path(), "BTC", DetectorKind::Fvg);
        assert_eq!(reopened.snapshot(), next);
    }

    #[test]
    fn test_open_store_without_dir_keeps_nothing_on_disk() {
        let dir = tempfile::tempdir().unwrap();

        let mut durable = open_store(Some(dir.path()), "BTC", DetectorKind::Fvg);
        durable.set("BTC:fvg:1", record(1)).unwrap();
        assert!(dir.path().join("BTC_fvg.json").exists());

        let mut volatile = open_store(None, "BTC", DetectorKind::Fvg);
        volatile.set("BTC:fvg:1", record(1)).unwrap();
        assert_eq!(volatile.get("BTC:fvg:1"), Some(record(1)));
        assert!(open_store(None, "BTC", DetectorKind::Fvg).snapshot().is_empty());
    }

    #[test]
    fn test_memory_store_basics() {
        let mut store = MemoryStore::new();
        store.set("k", record(7)).unwrap();
        assert_eq!(store.get("k"), Some(record(7)));
        assert!(store.remove("k").unwrap());
        assert!(store.snapshot().is_empty());
    }
}
