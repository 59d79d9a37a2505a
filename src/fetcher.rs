//! Cache-aware resource fetching
//!
//! [`ResourceFetcher`] answers "give me the current bytes for this path" by
//! combining a [`CacheStore`] with an [`Origin`]:
//!
//! - a cached entry within its TTL is returned without contacting the origin;
//! - otherwise the origin is asked, conditionally when the entry has an ETag;
//! - a 304 extends the cached entry's freshness without touching its payload;
//! - a 2xx replaces the entry;
//! - any failure (error status, malformed status, or no response at all)
//!   falls back to the cached entry, however old, and only surfaces as an
//!   error when nothing was ever cached.
//!
//! Every result carries a [`Provenance`] describing how it was obtained.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::config::CacheConfig;
use crate::origin::{Origin, OriginResponse};

/// HTTP status reported upward for failures with no usable upstream status
const BAD_GATEWAY: u16 = 502;

/// Category of resource, which decides its TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// Per-dataset index of available dates
    Manifest,
    /// One dataset's rows for one date
    DailyData,
}

/// How a fetch result was obtained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// The payload came from the cache rather than a new download
    pub cache_hit: bool,
    /// The payload is past its TTL and the origin could not supply an update
    pub served_stale: bool,
    /// The origin was asked during this fetch
    pub origin_contacted: bool,
    /// Status observed from the origin, or the entry's last known status on a fresh hit
    pub upstream_status: Option<u16>,
}

/// Aggregate of the provenance of several fetches made for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceSummary {
    pub fetches: u32,
    pub cache_hits: u32,
    pub origin_contacts: u32,
    /// At least one payload was served stale
    pub served_stale: bool,
    /// Origin contacts that got no response at all
    pub transport_failures: u32,
    /// Highest upstream status observed; fetches that got no response are
    /// counted in `transport_failures` instead
    pub worst_status: Option<u16>,
}

impl ProvenanceSummary {
    pub fn record(&mut self, provenance: &Provenance) {
        self.fetches += 1;
        if provenance.cache_hit {
            self.cache_hits += 1;
        }
        if provenance.origin_contacted {
            self.origin_contacts += 1;
        }
        if provenance.origin_contacted && provenance.upstream_status.is_none() {
            self.transport_failures += 1;
        }
        self.served_stale |= provenance.served_stale;
        self.worst_status = self.worst_status.max(provenance.upstream_status);
    }
}

impl<'a> Extend<&'a Provenance> for ProvenanceSummary {
    fn extend<I: IntoIterator<Item = &'a Provenance>>(&mut self, iter: I) {
        for provenance in iter {
            self.record(provenance);
        }
    }
}

impl<'a> FromIterator<&'a Provenance> for ProvenanceSummary {
    fn from_iter<I: IntoIterator<Item = &'a Provenance>>(iter: I) -> Self {
        let mut summary = Self::default();
        summary.extend(iter);
        summary
    }
}

/// Bytes and metadata for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub bytes: Arc<[u8]>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_type: Option<String>,
    /// When the payload was last downloaded or revalidated
    pub cached_at: DateTime<Utc>,
    pub provenance: Provenance,
}

impl FetchedResource {
    fn from_entry(entry: CacheEntry, provenance: Provenance) -> Self {
        Self {
            bytes: entry.payload,
            etag: entry.etag,
            last_modified: entry.last_modified,
            content_type: entry.content_type,
            cached_at: entry.cached_at,
            provenance,
        }
    }
}

/// Errors returned when no cached fallback exists
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The origin reports the resource does not exist
    #[error("Resource not found: {path}")]
    NotFound { path: String },

    /// The origin failed or could not be reached
    #[error("Upstream unavailable for {path} ({})", describe_status(.status))]
    Unavailable { path: String, status: Option<u16> },
}

impl FetchError {
    /// Status code the HTTP layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            FetchError::NotFound { .. } => 404,
            FetchError::Unavailable { .. } => BAD_GATEWAY,
        }
    }

    /// Upstream status observed, if any
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            FetchError::NotFound { .. } => Some(404),
            FetchError::Unavailable { status, .. } => *status,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FetchError::NotFound { path } | FetchError::Unavailable { path, .. } => path,
        }
    }
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no response".to_string(),
    }
}

/// Fetches resources through the cache, falling back to stale data on failure
///
/// Cheap to share: the store and origin are held by `Arc`, so one fetcher can
/// serve any number of concurrent requests.
#[derive(Clone)]
pub struct ResourceFetcher {
    origin: Arc<dyn Origin>,
    store: Arc<CacheStore>,
    manifest_ttl: Duration,
    daily_ttl: Duration,
}

impl ResourceFetcher {
    pub fn new(origin: Arc<dyn Origin>, store: Arc<CacheStore>, config: &CacheConfig) -> Self {
        Self {
            origin,
            store,
            manifest_ttl: config.manifest_ttl,
            daily_ttl: config.daily_ttl,
        }
    }

    /// TTL applied to every resource of `class`
    pub fn ttl_for(&self, class: ResourceClass) -> Duration {
        match class {
            ResourceClass::Manifest => self.manifest_ttl,
            ResourceClass::DailyData => self.daily_ttl,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Drops every cached resource
    pub fn invalidate_cache(&self) {
        self.store.clear();
        info!("cache invalidated");
    }

    /// Returns the current bytes for `path`
    ///
    /// `source` labels the resource in logs and, together with `path`,
    /// identifies its cache entry.
    pub async fn fetch(
        &self,
        class: ResourceClass,
        source: &str,
        path: &str,
    ) -> Result<FetchedResource, FetchError> {
        let key = CacheKey::new(source, path);
        let cached = self.store.get_allowing_stale(&key);
        let remaining = self.store.remaining_freshness(&key);

        if let Some(entry) = cached.as_ref().filter(|_| !remaining.is_zero()) {
            debug!(source, path, remaining_secs = remaining.as_secs(), "fresh cache hit");
            let provenance = Provenance {
                cache_hit: true,
                served_stale: false,
                origin_contacted: false,
                upstream_status: Some(entry.status.unwrap_or(200)),
            };
            return Ok(FetchedResource::from_entry(entry.clone(), provenance));
        }

        let validator = cached.as_ref().and_then(|e| e.etag.clone());
        debug!(source, path, validator = ?validator, "fetching from origin");

        let response = match self.origin.fetch(path, validator.as_deref()).await {
            Ok(response) => response,
            Err(err) => {
                warn!(source, path, error = %err, "origin unreachable");
                return self.fall_back(key, cached, None);
            }
        };

        match (response.status, cached, validator) {
            (304, Some(entry), Some(validator)) => {
                Ok(self.revalidate(class, key, entry, &validator, response))
            }
            (200..=299, _, _) => Ok(self.replace(class, key, response)),
            (status, cached, _) => self.fall_back(key, cached, Some(status)),
        }
    }

    /// Extends freshness of `entry` after a 304, keeping its payload
    ///
    /// `entry` is the copy read before contacting the origin. If another
    /// fetch stored a different version meanwhile, the store is left alone and
    /// the validated copy is returned as is.
    fn revalidate(
        &self,
        class: ResourceClass,
        key: CacheKey,
        entry: CacheEntry,
        validator: &str,
        response: OriginResponse,
    ) -> FetchedResource {
        let refreshed = self.store.revalidate(
            &key,
            validator,
            response.etag,
            response.last_modified,
            self.ttl_for(class),
        );
        let entry = match refreshed {
            Some(entry) => {
                debug!(source = %key.source, path = %key.path, "revalidated with 304");
                entry
            }
            None => {
                debug!(
                    source = %key.source,
                    path = %key.path,
                    validator,
                    "cache entry changed during revalidation, leaving it in place"
                );
                CacheEntry {
                    status: Some(304),
                    ..entry
                }
            }
        };

        FetchedResource::from_entry(
            entry,
            Provenance {
                cache_hit: true,
                served_stale: false,
                origin_contacted: true,
                upstream_status: Some(304),
            },
        )
    }

    /// Stores a successful download as the new entry for `key`
    fn replace(&self, class: ResourceClass, key: CacheKey, response: OriginResponse) -> FetchedResource {
        let status = response.status;
        let entry = CacheEntry::new(response.body)
            .with_etag(response.etag)
            .with_last_modified(response.last_modified)
            .with_content_type(response.content_type)
            .with_status(status);
        info!(
            source = %key.source,
            path = %key.path,
            status,
            bytes = entry.payload.len(),
            "fetched from origin"
        );
        self.store.set(key, entry.clone(), self.ttl_for(class));

        FetchedResource::from_entry(
            entry,
            Provenance {
                cache_hit: false,
                served_stale: false,
                origin_contacted: true,
                upstream_status: Some(status),
            },
        )
    }

    /// Serves `cached` as stale after an origin failure, or reports the failure
    fn fall_back(
        &self,
        key: CacheKey,
        cached: Option<CacheEntry>,
        status: Option<u16>,
    ) -> Result<FetchedResource, FetchError> {
        let Some(mut entry) = cached else {
            debug!(source = %key.source, path = %key.path, status = ?status, "no cached fallback");
            return Err(match status {
                Some(404) => FetchError::NotFound { path: key.path },
                status => FetchError::Unavailable {
                    path: key.path,
                    status,
                },
            });
        };

        if let Some(code) = status {
            self.store.record_status(&key, &entry, Some(code));
            entry.status = Some(code);
        }
        warn!(
            source = %key.source,
            path = %key.path,
            status = ?status,
            cached_at = %entry.cached_at,
            "serving stale cache entry"
        );

        Ok(FetchedResource::from_entry(
            entry,
            Provenance {
                cache_hit: true,
                served_stale: true,
                origin_contacted: true,
                upstream_status: status,
            },
        ))
    }
}

impl std::fmt::Debug for ResourceFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceFetcher")
            .field("store", &self.store)
            .field("manifest_ttl", &self.manifest_ttl)
            .field("daily_ttl", &self.daily_ttl)
            .finish_non_exhaustive()
    }
}
