//! In-process cache store
//!
//! Keeps records in a map behind a read/write lock. Expiry is measured on the
//! tokio clock, so tests running with a paused runtime can move time forward.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::{CacheKey, CacheStore, StoreError, Ttl};
use crate::record::StatusRecord;

/// One stored record with its deadline
#[derive(Debug, Clone)]
struct MemoryEntry {
    fields: HashMap<String, StatusRecord>,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe in-memory store with per-record TTL
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<CacheKey, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) records
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Returns true if no live records are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time left before the record under `key` expires
    pub fn remaining_ttl(&self, key: &CacheKey) -> Option<std::time::Duration> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Drops every expired record
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, entry| !entry.is_expired(now));
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self, key: &CacheKey, field: &str) -> Result<Option<StatusRecord>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => {
                    return Ok(entry.fields.get(field).cloned());
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock; a writer may have refreshed it meanwhile
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                debug!(%key, "Evicting expired record");
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(entry.fields.get(field).cloned()),
            None => Ok(None),
        }
    }

    async fn write_and_read(
        &self,
        key: &CacheKey,
        field: &str,
        record: &StatusRecord,
        ttl: Ttl,
    ) -> Result<StatusRecord, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write();

        let entry = entries.entry(key.clone()).or_insert_with(|| MemoryEntry {
            fields: HashMap::new(),
            expires_at: now,
        });
        if entry.is_expired(now) {
            entry.fields.clear();
        }
        entry.fields.insert(field.to_string(), record.clone());
        entry.expires_at = now + ttl.as_duration();

        entry
            .fields
            .get(field)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    async fn touch(&self, key: &CacheKey, ttl: Ttl) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write();

        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = now + ttl.as_duration();
                Ok(())
            }
            _ => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }
}
