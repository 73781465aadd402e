//! Cache store adapters
//!
//! A store keeps one record per `(namespace, set, airport code)` key, with the
//! status map held under a single named field and a whole-second time-to-live.
//! Three backends implement [`CacheStore`]: Redis for shared deployments, an
//! in-process map for tests and one-off runs, and JSON files on disk.

mod file;
mod memory;
mod redis_store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::StatusRecord;

/// Field that holds the status map inside a cache record
pub const FLT_DATA_BIN: &str = "flt_data_bin";

/// Composite key identifying one cache record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Logical namespace (top-level partition)
    pub namespace: String,
    /// Logical set within the namespace
    pub set: String,
    /// Airport code, used verbatim
    pub code: String,
}

impl CacheKey {
    pub fn new(
        namespace: impl Into<String>,
        set: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            code: code.into(),
        }
    }

    /// Joins the escaped components with `sep`
    ///
    /// Every byte outside `[A-Za-z0-9_-]` is written as `%XX`, so the
    /// separator never appears inside a component and distinct keys always
    /// produce distinct strings.
    pub fn encoded(&self, sep: char) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            escape_component(&self.namespace),
            escape_component(&self.set),
            escape_component(&self.code),
        )
    }
}

fn escape_component(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for byte in component.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded(':'))
    }
}

/// Whole-second time-to-live for a cache record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ttl(u32);

impl Ttl {
    /// The five minute window used for airport status
    pub const DEFAULT: Ttl = Ttl(300);

    /// Creates a TTL of `secs` seconds
    ///
    /// Returns `None` for zero, since a record that expires on write can never
    /// be read back.
    pub fn from_secs(secs: u32) -> Option<Self> {
        (secs > 0).then_some(Self(secs))
    }

    pub fn as_secs(&self) -> u32 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.0))
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Errors raised by a cache store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The Redis server rejected the command or the connection failed
    #[error("Redis command failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Filesystem access failed
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded
    #[error("Failed to encode or decode stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored field exists but does not hold an attribute map
    #[error("Field '{field}' under {key} does not hold a map")]
    Shape { key: String, field: String },

    /// The record disappeared before the operation reached it
    #[error("No record under {0}")]
    KeyNotFound(String),

    /// The store cannot be set up (e.g. no cache directory available)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Operations the resolver needs from a key-value store
///
/// Implementations must be safe to share between concurrent callers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads `field` of the record under `key`
    ///
    /// Returns `Ok(None)` when the record is absent or has expired.
    async fn read(&self, key: &CacheKey, field: &str) -> Result<Option<StatusRecord>, StoreError>;

    /// Writes `record` into `field`, sets the TTL, and returns the stored value
    ///
    /// Must be atomic: a concurrent reader sees the old value or the new one.
    async fn write_and_read(
        &self,
        key: &CacheKey,
        field: &str,
        record: &StatusRecord,
        ttl: Ttl,
    ) -> Result<StatusRecord, StoreError>;

    /// Resets the TTL of the record under `key` without changing its value
    async fn touch(&self, key: &CacheKey, ttl: Ttl) -> Result<(), StoreError>;
}
