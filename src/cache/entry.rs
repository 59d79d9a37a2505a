//! Cache keys and entries

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Identity of one cacheable resource
///
/// The `(source, path)` pair is the map key itself, so two different pairs can
/// never collide regardless of which characters either half contains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Observability label, e.g. `manifest:lending` or `lending:2025-09-30`
    pub source: String,
    /// Logical path under the origin root, e.g. `meta/lending_manifest.json`
    pub path: String,
}

impl CacheKey {
    pub fn new(source: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.source, self.path)
    }
}

/// A cached origin response
///
/// The payload is reference-counted so handing an entry to a caller never
/// copies the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Raw response body
    pub payload: Arc<[u8]>,
    /// Entity tag reported by the origin
    pub etag: Option<String>,
    /// `Last-Modified` header reported by the origin
    pub last_modified: Option<String>,
    /// `Content-Type` header reported by the origin
    pub content_type: Option<String>,
    /// Most recent upstream status seen for this resource
    pub status: Option<u16>,
    /// When the payload was last stored or revalidated
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry for a freshly downloaded payload, stamped with the current time
    pub fn new(payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            payload: payload.into(),
            etag: None,
            last_modified: None,
            content_type: None,
            status: None,
            cached_at: Utc::now(),
        }
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    pub fn with_last_modified(mut self, last_modified: Option<String>) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_with_delimiter_in_path_stay_distinct() {
        let a = CacheKey::new("a|b", "c");
        let b = CacheKey::new("a", "b|c");

        // Both render the same way in logs but are different identities
        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_entry_builder_sets_metadata() {
        let entry = CacheEntry::new(b"[]".to_vec())
            .with_etag(Some("\"e1\"".to_string()))
            .with_last_modified(Some("Tue, 30 Sep 2025 00:00:00 GMT".to_string()))
            .with_content_type(Some("application/json".to_string()))
            .with_status(200);

        assert_eq!(&*entry.payload, b"[]");
        assert_eq!(entry.etag.as_deref(), Some("\"e1\""));
        assert_eq!(entry.content_type.as_deref(), Some("application/json"));
        assert_eq!(entry.status, Some(200));
    }
}
