//! Read-through resolution of airport status
//!
//! A lookup first reads the cache. On a miss the status is fetched from
//! upstream, written with the configured TTL and read back in one atomic
//! store operation. On a hit the record's TTL is reset before it is re-read,
//! so airports that keep being asked for stay cached (sliding expiration).
//!
//! Concurrent misses on the same code are not coalesced: each caller fetches
//! and writes, the last write wins, and each caller returns what its own
//! write-and-read observed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::fetch::{FetchError, StatusSource};
use crate::record::StatusRecord;
use crate::store::{CacheKey, CacheStore, StoreError, Ttl, FLT_DATA_BIN};

/// Errors surfaced by a lookup, tagged with the airport code and failing layer
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The resolver or its store could not be set up
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A cache read, write or touch failed
    #[error("Cache unavailable for {code}: {source}")]
    CacheUnavailable {
        code: String,
        #[source]
        source: StoreError,
    },

    /// Fetching from the status service failed
    #[error("Upstream unavailable for {code}: {source}")]
    UpstreamUnavailable {
        code: String,
        #[source]
        source: FetchError,
    },

    /// The cache returned something other than an attribute map
    #[error("Cached value for {code} is malformed: {detail}")]
    ShapeViolation { code: String, detail: String },

    /// The whole lookup ran past its deadline
    #[error("Lookup for {code} timed out after {after:?}")]
    Timeout { code: String, after: Duration },
}

/// Layer that produced a [`ResolveError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Config,
    Cache,
    Upstream,
    Resolver,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Config => "config",
            Layer::Cache => "cache",
            Layer::Upstream => "upstream",
            Layer::Resolver => "resolver",
        };
        f.write_str(name)
    }
}

impl ResolveError {
    fn from_store(code: &str, source: StoreError) -> Self {
        match source {
            StoreError::Shape { .. } => ResolveError::ShapeViolation {
                code: code.to_string(),
                detail: source.to_string(),
            },
            source => ResolveError::CacheUnavailable {
                code: code.to_string(),
                source,
            },
        }
    }

    /// The airport code the failed lookup was for, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            ResolveError::Configuration(_) => None,
            ResolveError::CacheUnavailable { code, .. }
            | ResolveError::UpstreamUnavailable { code, .. }
            | ResolveError::ShapeViolation { code, .. }
            | ResolveError::Timeout { code, .. } => Some(code),
        }
    }

    /// The layer the failure originated in
    pub fn layer(&self) -> Layer {
        match self {
            ResolveError::Configuration(_) => Layer::Config,
            ResolveError::CacheUnavailable { .. } | ResolveError::ShapeViolation { .. } => {
                Layer::Cache
            }
            ResolveError::UpstreamUnavailable { .. } => Layer::Upstream,
            ResolveError::Timeout { .. } => Layer::Resolver,
        }
    }
}

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Cache namespace for every key
    pub namespace: String,
    /// Cache set for every key
    pub set: String,
    /// TTL applied on write and on every touch
    pub ttl: Ttl,
    /// Upper bound on a whole lookup, if any
    pub call_timeout: Option<Duration>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            namespace: "test".to_string(),
            set: "demo".to_string(),
            ttl: Ttl::DEFAULT,
            call_timeout: None,
        }
    }
}

impl ResolverConfig {
    /// Creates a config for the given namespace and set
    pub fn new(namespace: impl Into<String>, set: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = ttl;
        self
    }

    /// Bounds each lookup, cache and upstream work included
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// Where a lookup's record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from an existing cache record
    Cache,
    /// Fetched from upstream and written to the cache
    Upstream,
}

/// Result of a lookup with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    /// The record as stored in the cache
    pub record: StatusRecord,
    /// Whether the record came from cache
    pub source: Source,
}

/// Read-through cache in front of an airport status source
///
/// Holds its store, its upstream source and its TTL settings. Cheap to share
/// behind an `Arc`; lookups take `&self`.
pub struct Resolver {
    store: Arc<dyn CacheStore>,
    source: Arc<dyn StatusSource>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn CacheStore>,
        source: Arc<dyn StatusSource>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Cache key for `code` under the configured namespace and set
    pub fn key_for(&self, code: &str) -> CacheKey {
        CacheKey::new(&self.config.namespace, &self.config.set, code)
    }

    /// Returns the latest status record for `code`
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let resolver = Resolver::new(store, source, ResolverConfig::default());
    /// let record = resolver.get_airport("DFW").await?;
    /// ```
    pub async fn get_airport(&self, code: &str) -> Result<StatusRecord, ResolveError> {
        self.lookup(code).await.map(|lookup| lookup.record)
    }

    /// Like [`get_airport`](Self::get_airport), also reporting hit or miss
    #[instrument(skip(self))]
    pub async fn lookup(&self, code: &str) -> Result<Lookup, ResolveError> {
        match self.config.call_timeout {
            Some(after) => tokio::time::timeout(after, self.resolve(code))
                .await
                .map_err(|_| ResolveError::Timeout {
                    code: code.to_string(),
                    after,
                })?,
            None => self.resolve(code).await,
        }
    }

    async fn resolve(&self, code: &str) -> Result<Lookup, ResolveError> {
        let key = self.key_for(code);
        let cached = self
            .store
            .read(&key, FLT_DATA_BIN)
            .await
            .map_err(|e| ResolveError::from_store(code, e))?;

        match cached {
            None => self.refresh(code, &key).await,
            Some(_) => self.serve_cached(code, &key).await,
        }
    }

    /// Miss branch: fetch, then write and read back in one operation
    async fn refresh(&self, code: &str, key: &CacheKey) -> Result<Lookup, ResolveError> {
        info!(code, "Not in cache, fetching from source");

        let fetched = self
            .source
            .fetch(code)
            .await
            .map_err(|source| ResolveError::UpstreamUnavailable {
                code: code.to_string(),
                source,
            })?;

        let record = self
            .store
            .write_and_read(key, FLT_DATA_BIN, &fetched, self.config.ttl)
            .await
            .map_err(|e| ResolveError::from_store(code, e))?;
        debug!(code, %key, ttl = %self.config.ttl, "Cached upstream record");

        Ok(Lookup {
            record,
            source: Source::Upstream,
        })
    }

    /// Hit branch: reset the TTL, then re-read
    async fn serve_cached(&self, code: &str, key: &CacheKey) -> Result<Lookup, ResolveError> {
        info!(code, "Cached");

        self.store
            .touch(key, self.config.ttl)
            .await
            .map_err(|e| ResolveError::from_store(code, e))?;

        let record = self
            .store
            .read(key, FLT_DATA_BIN)
            .await
            .map_err(|e| ResolveError::from_store(code, e))?
            .ok_or_else(|| ResolveError::CacheUnavailable {
                code: code.to_string(),
                source: StoreError::KeyNotFound(key.to_string()),
            })?;

        Ok(Lookup {
            record,
            source: Source::Cache,
        })
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
