//! On-disk cache store
//!
//! Persists each record as a JSON file in an XDG-compliant cache directory
//! (`~/.cache/airstatus/` on Linux). Each file carries its expiry timestamp;
//! expired files read as absent and are deleted on the next access.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CacheKey, CacheStore, StoreError, Ttl};
use crate::record::StatusRecord;

/// Record layout on disk
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    /// Field name to stored value
    fields: HashMap<String, serde_json::Value>,
    /// When the record was last written
    cached_at: DateTime<Utc>,
    /// When the record stops being served
    expires_at: DateTime<Utc>,
}

impl FileEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Stores cache records as JSON files, one per key
///
/// All file operations for this store run on the blocking thread pool under a
/// single lock shared by every clone, and writes go through a temporary file
/// followed by a rename, so readers never observe a half-written record.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where record files are stored
    cache_dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Creates a FileStore in the platform cache directory
    ///
    /// Fails if the directory cannot be determined (e.g., no home directory).
    pub fn new() -> Result<Self, StoreError> {
        let project_dirs = ProjectDirs::from("", "", "airstatus").ok_or_else(|| {
            StoreError::Unavailable("cannot determine a cache directory".to_string())
        })?;
        Ok(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a FileStore rooted at a custom directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the path of the file holding `key`
    ///
    /// Escaped key components are joined with `.`, so every key maps to its
    /// own file and no key can name a path outside the cache directory.
    fn record_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key.encoded('.')))
    }

    /// Loads the live entry for `key`, removing it if it has expired
    fn load(&self, key: &CacheKey, now: DateTime<Utc>) -> Result<Option<FileEntry>, StoreError> {
        let path = self.record_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: FileEntry = serde_json::from_str(&content)?;

        if entry.is_expired(now) {
            debug!(%key, path = %path.display(), "Removing expired record file");
            fs::remove_file(&path)?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Writes `entry` for `key` via a temporary file and rename
    fn save(&self, key: &CacheKey, entry: &FileEntry) -> Result<(), StoreError> {
        fs::create_dir_all(&self.cache_dir)?;

        let path = self.record_path(key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(entry)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Runs `op` on the blocking pool while holding the store lock
    async fn locked<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&FileStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = store.lock.lock();
            op(&store)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("file store task failed: {}", e)))?
    }
}

fn decode_field(key: &CacheKey, field: &str, value: serde_json::Value) -> Result<StatusRecord, StoreError> {
    StatusRecord::from_value(value).ok_or_else(|| StoreError::Shape {
        key: key.to_string(),
        field: field.to_string(),
    })
}

fn expiry(now: DateTime<Utc>, ttl: Ttl) -> DateTime<Utc> {
    now + Duration::seconds(i64::from(ttl.as_secs()))
}

#[async_trait]
impl CacheStore for FileStore {
    async fn read(&self, key: &CacheKey, field: &str) -> Result<Option<StatusRecord>, StoreError> {
        let key = key.clone();
        let field = field.to_string();

        self.locked(move |store| match store.load(&key, Utc::now())? {
            Some(mut entry) => match entry.fields.remove(&field) {
                Some(value) => decode_field(&key, &field, value).map(Some),
                None => Ok(None),
            },
            None => Ok(None),
        })
        .await
    }

    async fn write_and_read(
        &self,
        key: &CacheKey,
        field: &str,
        record: &StatusRecord,
        ttl: Ttl,
    ) -> Result<StatusRecord, StoreError> {
        let key = key.clone();
        let field = field.to_string();
        let value = serde_json::to_value(record)?;

        self.locked(move |store| {
            let now = Utc::now();
            let mut entry = store.load(&key, now)?.unwrap_or_else(|| FileEntry {
                fields: HashMap::new(),
                cached_at: now,
                expires_at: now,
            });
            entry.fields.insert(field.clone(), value);
            entry.cached_at = now;
            entry.expires_at = expiry(now, ttl);
            store.save(&key, &entry)?;

            // Read back what landed on disk rather than echoing the input
            let stored = store
                .load(&key, now)?
                .and_then(|mut entry| entry.fields.remove(&field))
                .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;
            decode_field(&key, &field, stored)
        })
        .await
    }

    async fn touch(&self, key: &CacheKey, ttl: Ttl) -> Result<(), StoreError> {
        let key = key.clone();

        self.locked(move |store| {
            let now = Utc::now();
            let mut entry = store
                .load(&key, now)?
                .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;
            entry.expires_at = expiry(now, ttl);
            store.save(&key, &entry)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FLT_DATA_BIN;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    fn record(code: &str) -> StatusRecord {
        StatusRecord::from_value(json!({"IATA": code, "delay": false, "weather": {"temp": 61.0}}))
            .unwrap()
    }

    fn key(code: &str) -> CacheKey {
        CacheKey::new("test", "demo", code)
    }

    /// Writes an entry that expired a minute ago, bypassing the store API
    fn write_expired(store: &FileStore, key: &CacheKey, field: &str, record: &StatusRecord) {
        let past = Utc::now() - Duration::seconds(60);
        let mut fields = HashMap::new();
        fields.insert(field.to_string(), serde_json::to_value(record).unwrap());
        let entry = FileEntry {
            fields,
            cached_at: past - Duration::seconds(300),
            expires_at: past,
        };
        store.save(key, &entry).unwrap();
    }

    #[tokio::test]
    async fn test_write_creates_file_in_cache_directory() {
        let (store, temp_dir) = create_test_store();

        store
            .write_and_read(&key("DFW"), FLT_DATA_BIN, &record("DFW"), Ttl::DEFAULT)
            .await
            .expect("Write should succeed");

        let expected_path = temp_dir.path().join("test.demo.DFW.json");
        assert!(expected_path.exists(), "Record file should exist");

        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert!(content.contains("\"flt_data_bin\""));
        assert!(content.contains("\"DFW\""));
        assert!(content.contains("expires_at"));
    }

    #[tokio::test]
    async fn test_read_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();

        let result = store.read(&key("SFO"), FLT_DATA_BIN).await.unwrap();

        assert!(result.is_none(), "Should return None for missing key");
    }

    #[tokio::test]
    async fn test_write_and_read_returns_stored_value() {
        let (store, _temp_dir) = create_test_store();

        let stored = store
            .write_and_read(&key("DFW"), FLT_DATA_BIN, &record("DFW"), Ttl::DEFAULT)
            .await
            .unwrap();

        assert_eq!(stored, record("DFW"));
        assert_eq!(
            store.read(&key("DFW"), FLT_DATA_BIN).await.unwrap(),
            Some(record("DFW"))
        );
    }

    #[tokio::test]
    async fn test_expired_record_reads_as_absent_and_is_removed() {
        let (store, temp_dir) = create_test_store();
        write_expired(&store, &key("BWI"), FLT_DATA_BIN, &record("BWI"));

        let result = store.read(&key("BWI"), FLT_DATA_BIN).await.unwrap();

        assert!(result.is_none(), "Expired record should not be served");
        assert!(!temp_dir.path().join("test.demo.BWI.json").exists());
    }

    #[tokio::test]
    async fn test_touch_expired_record_fails() {
        let (store, _temp_dir) = create_test_store();
        write_expired(&store, &key("BWI"), FLT_DATA_BIN, &record("BWI"));

        let result = store.touch(&key("BWI"), Ttl::DEFAULT).await;

        assert!(matches!(result, Err(StoreError::KeyNotFound(_))));
    }

    #[tokio::test]
    async fn test_touch_moves_expiry_forward() {
        let (store, _temp_dir) = create_test_store();
        let short = Ttl::from_secs(10).unwrap();
        store
            .write_and_read(&key("SJC"), FLT_DATA_BIN, &record("SJC"), short)
            .await
            .unwrap();

        let before = Utc::now();
        store.touch(&key("SJC"), Ttl::DEFAULT).await.unwrap();

        let entry = store.load(&key("SJC"), Utc::now()).unwrap().unwrap();
        assert!(entry.expires_at >= before + Duration::seconds(300));
        assert_eq!(
            store.read(&key("SJC"), FLT_DATA_BIN).await.unwrap(),
            Some(record("SJC"))
        );
    }

    #[tokio::test]
    async fn test_non_map_field_is_a_shape_error() {
        let (store, _temp_dir) = create_test_store();
        let now = Utc::now();
        let mut fields = HashMap::new();
        fields.insert(FLT_DATA_BIN.to_string(), json!("not a map"));
        let entry = FileEntry {
            fields,
            cached_at: now,
            expires_at: now + Duration::seconds(300),
        };
        store.save(&key("IAD"), &entry).unwrap();

        let result = store.read(&key("IAD"), FLT_DATA_BIN).await;

        assert!(matches!(result, Err(StoreError::Shape { .. })));
    }

    #[tokio::test]
    async fn test_write_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let store = FileStore::with_dir(nested_path.clone());

        store
            .write_and_read(&key("DFW"), FLT_DATA_BIN, &record("DFW"), Ttl::DEFAULT)
            .await
            .expect("Write should succeed");

        assert!(nested_path.join("test.demo.DFW.json").exists());
    }

    #[tokio::test]
    async fn test_codes_with_separators_stay_in_directory() {
        let (store, temp_dir) = create_test_store();

        store
            .write_and_read(&key("../X"), FLT_DATA_BIN, &record("X"), Ttl::DEFAULT)
            .await
            .unwrap();

        assert!(temp_dir.path().join("test.demo.%2E%2E%2FX.json").exists());
        assert!(!temp_dir.path().join("X.json").exists());
    }

    #[tokio::test]
    async fn test_keys_differing_only_in_separators_use_separate_files() {
        let (store, temp_dir) = create_test_store();

        store
            .write_and_read(&key("A/B"), FLT_DATA_BIN, &record("A/B"), Ttl::DEFAULT)
            .await
            .unwrap();
        assert_eq!(store.read(&key("A_B"), FLT_DATA_BIN).await.unwrap(), None);

        let dotted_namespace = CacheKey::new("test.demo", "X", "Y");
        let dotted_set = CacheKey::new("test", "demo.X", "Y");
        store
            .write_and_read(&dotted_namespace, FLT_DATA_BIN, &record("NS"), Ttl::DEFAULT)
            .await
            .unwrap();
        store
            .write_and_read(&dotted_set, FLT_DATA_BIN, &record("SET"), Ttl::DEFAULT)
            .await
            .unwrap();

        assert_eq!(
            store.read(&dotted_namespace, FLT_DATA_BIN).await.unwrap(),
            Some(record("NS"))
        );
        assert_eq!(
            store.read(&dotted_set, FLT_DATA_BIN).await.unwrap(),
            Some(record("SET"))
        );
        assert_eq!(store.read(&key("A/B"), FLT_DATA_BIN).await.unwrap(), Some(record("A/B")));

        let files = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(files, 3, "Each key should have its own file");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_on_worker_threads() {
        let (store, _temp_dir) = create_test_store();
        let codes = ["DFW", "SFO", "BWI", "SJC", "IAD", "ORD", "ATL", "DEN"];

        let handles: Vec<_> = codes
            .iter()
            .map(|code| {
                let store = store.clone();
                let code = code.to_string();
                tokio::spawn(async move {
                    store
                        .write_and_read(&key(&code), FLT_DATA_BIN, &record(&code), Ttl::DEFAULT)
                        .await
                })
            })
            .collect();

        for (handle, code) in handles.into_iter().zip(codes) {
            let stored = handle.await.expect("Task should not panic").unwrap();
            assert_eq!(stored, record(code));
        }
        for code in codes {
            assert_eq!(
                store.read(&key(code), FLT_DATA_BIN).await.unwrap(),
                Some(record(code))
            );
        }
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Ok(store) = FileStore::new() {
            let path_str = store.cache_dir.to_string_lossy();
            assert!(
                path_str.contains("airstatus"),
                "Cache path should contain project name"
            );
        }
        // Test passes if new() fails (e.g., no home directory in CI)
    }
}
