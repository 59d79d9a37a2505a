//! Typed access to dataset manifests and daily row-sets
//!
//! Wraps a [`ResourceFetcher`] and turns the bytes it returns into
//! [`Manifest`] and [`RowSet`] values. A body that does not parse is reported
//! as [`DatasetError::Parse`], separate from fetch failures, and is never
//! masked by falling back to an older cached copy.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use thiserror::Error;
use tracing::warn;

use super::{Dataset, Manifest, RowSet};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::fetcher::{
    FetchError, FetchedResource, Provenance, ProvenanceSummary, ResourceClass, ResourceFetcher,
};
use crate::origin::{HttpOrigin, OriginError};

/// Errors that can occur when loading a dataset file
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The file could not be fetched and nothing was cached
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The file was fetched but is not in the expected shape
    #[error("Malformed data at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DatasetError {
    /// Whether asking again later might succeed
    ///
    /// Only an unavailable origin is transient; missing files and malformed
    /// data will not fix themselves on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DatasetError::Fetch(FetchError::Unavailable { .. }))
    }

    /// Status code the HTTP layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            DatasetError::Fetch(err) => err.http_status(),
            DatasetError::Parse { .. } => 502,
        }
    }
}

/// A parsed manifest with its fetch metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestResult {
    pub manifest: Manifest,
    pub etag: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub provenance: Provenance,
}

/// One dataset's parsed rows for one date with fetch metadata
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRows {
    pub dataset: Dataset,
    pub date: NaiveDate,
    pub rows: RowSet,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub provenance: Provenance,
}

/// Per-date outcomes of a multi-date fetch, in request order
#[derive(Debug)]
pub struct RowsForDates {
    pub results: Vec<(NaiveDate, Result<DailyRows, DatasetError>)>,
    /// Provenance of every date that was fetched successfully
    pub summary: ProvenanceSummary,
}

/// Client for the lending and borrowing datasets
#[derive(Debug, Clone)]
pub struct DatasetClient {
    fetcher: ResourceFetcher,
}

impl DatasetClient {
    /// Creates a client on top of an existing fetcher
    pub fn new(fetcher: ResourceFetcher) -> Self {
        Self { fetcher }
    }

    /// Creates a client talking to the configured HTTP origin through a new cache
    pub fn from_config(config: &Config) -> Result<Self, OriginError> {
        let origin = HttpOrigin::new(config.origin.clone())?;
        let store = CacheStore::new(config.cache.max_entries);
        let fetcher = ResourceFetcher::new(Arc::new(origin), Arc::new(store), &config.cache);
        Ok(Self::new(fetcher))
    }

    pub fn fetcher(&self) -> &ResourceFetcher {
        &self.fetcher
    }

    /// Drops every cached manifest and row-set
    pub fn invalidate_cache(&self) {
        self.fetcher.invalidate_cache();
    }

    /// Fetches and parses the manifest of `dataset`
    pub async fn get_manifest(&self, dataset: Dataset) -> Result<ManifestResult, DatasetError> {
        let path = dataset.manifest_path();
        let fetched = self
            .fetcher
            .fetch(ResourceClass::Manifest, &dataset.manifest_source(), &path)
            .await?;

        let manifest: Manifest = parse(&path, &fetched, |bytes| serde_json::from_slice(bytes))?;

        Ok(ManifestResult {
            updated_at: manifest.updated_at,
            manifest,
            etag: fetched.etag,
            provenance: fetched.provenance,
        })
    }

    /// Fetches and parses the rows of `dataset` for `date`
    pub async fn get_daily_rows(
        &self,
        dataset: Dataset,
        date: NaiveDate,
    ) -> Result<DailyRows, DatasetError> {
        let path = dataset.daily_path(date);
        let fetched = self
            .fetcher
            .fetch(ResourceClass::DailyData, &dataset.daily_source(date), &path)
            .await?;

        let rows = parse(&path, &fetched, |bytes| RowSet::parse(dataset, bytes))?;

        Ok(DailyRows {
            dataset,
            date,
            rows,
            etag: fetched.etag,
            last_modified: fetched.last_modified,
            provenance: fetched.provenance,
        })
    }

    /// Fetches the rows of `dataset` for every date in `dates` concurrently
    ///
    /// Each date succeeds or fails on its own; results keep the order of `dates`.
    pub async fn get_rows_for_dates(&self, dataset: Dataset, dates: &[NaiveDate]) -> RowsForDates {
        let fetches = dates.iter().map(|&date| async move {
            (date, self.get_daily_rows(dataset, date).await)
        });
        let results = join_all(fetches).await;

        let summary = results
            .iter()
            .filter_map(|(_, result)| result.as_ref().ok())
            .map(|rows| &rows.provenance)
            .collect();

        RowsForDates { results, summary }
    }
}

fn parse<T, F>(path: &str, fetched: &FetchedResource, decode: F) -> Result<T, DatasetError>
where
    F: FnOnce(&[u8]) -> Result<T, serde_json::Error>,
{
    decode(&fetched.bytes[..]).map_err(|source| {
        warn!(
            path,
            served_stale = fetched.provenance.served_stale,
            error = %source,
            "malformed upstream data"
        );
        DatasetError::Parse {
            path: path.to_string(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::origin::scripted::{Reply, ScriptedOrigin};
    use crate::origin::OriginResponse;
    use std::time::Duration;

    const MANIFEST: &str = r#"{
        "latest": "2025-09-30",
        "dates": ["2025-09-29", "2025-09-30"],
        "updated_at": "2025-09-30T06:00:00Z",
        "schema_version": 1
    }"#;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn client_with(origin: &ScriptedOrigin, ttl: Duration) -> DatasetClient {
        let config = CacheConfig {
            max_entries: 16,
            manifest_ttl: ttl,
            daily_ttl: ttl,
        };
        DatasetClient::new(ResourceFetcher::new(
            Arc::new(origin.clone()),
            Arc::new(CacheStore::new(config.max_entries)),
            &config,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_manifest_revalidated_with_not_modified() {
        let origin = ScriptedOrigin::new();
        origin
            .respond(OriginResponse::new(200, MANIFEST).with_etag("\"m1\""))
            .respond(OriginResponse::new(304, Vec::new()).with_etag("\"m1\""));
        let client = client_with(&origin, Duration::from_secs(60));

        let first = client.get_manifest(Dataset::Lending).await.unwrap();
        assert!(!first.provenance.cache_hit);
        assert_eq!(first.etag.as_deref(), Some("\"m1\""));
        assert_eq!(first.manifest.latest, date("2025-09-30"));
        assert_eq!(first.updated_at, first.manifest.updated_at);

        tokio::time::advance(Duration::from_secs(61)).await;

        let second = client.get_manifest(Dataset::Lending).await.unwrap();
        assert_eq!(second.manifest, first.manifest);
        assert!(second.provenance.cache_hit);
        assert_eq!(second.provenance.upstream_status, Some(304));

        let calls = origin.calls();
        assert_eq!(calls[0].path, "meta/lending_manifest.json");
        assert_eq!(calls[1].if_none_match.as_deref(), Some("\"m1\""));
    }

    #[tokio::test]
    async fn test_missing_day_is_not_found_and_not_cached() {
        let origin = ScriptedOrigin::new();
        origin.respond(OriginResponse::new(404, Vec::new()));
        let client = client_with(&origin, Duration::from_secs(300));

        let err = client
            .get_daily_rows(Dataset::Lending, date("2025-09-01"))
            .await
            .unwrap_err();

        assert!(matches!(err, DatasetError::Fetch(FetchError::NotFound { .. })));
        assert_eq!(err.http_status(), 404);
        assert!(!err.is_retryable());
        assert!(client.fetcher().store().is_empty());
        assert_eq!(origin.calls()[0].path, "data/lending/2025-09-01.json");
    }

    #[tokio::test]
    async fn test_unavailable_is_retryable() {
        let origin = ScriptedOrigin::new();
        origin.push(Reply::Unreachable);
        let client = client_with(&origin, Duration::from_secs(300));

        let err = client.get_manifest(Dataset::Borrowing).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.http_status(), 502);
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let origin = ScriptedOrigin::new();
        origin.respond(OriginResponse::new(200, b"<html>rate limited</html>".to_vec()));
        let client = client_with(&origin, Duration::from_secs(300));

        let err = client
            .get_daily_rows(Dataset::Borrowing, date("2025-09-30"))
            .await
            .unwrap_err();

        match &err {
            DatasetError::Parse { path, .. } => {
                assert_eq!(path, "data/borrowing/2025-09-30.json")
            }
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Malformed data"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_error_is_not_masked_by_older_copy() {
        let origin = ScriptedOrigin::new();
        origin
            .respond(OriginResponse::new(200, br#"[{"protocol":"Vesu"}]"#.to_vec()))
            .respond(OriginResponse::new(200, br#"{"unexpected":true}"#.to_vec()));
        let client = client_with(&origin, Duration::from_secs(1));

        client
            .get_daily_rows(Dataset::Lending, date("2025-09-30"))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let err = client
            .get_daily_rows(Dataset::Lending, date("2025-09-30"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Parse { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_rows_are_parsed_and_flagged() {
        let origin = ScriptedOrigin::new();
        origin
            .respond(OriginResponse::new(200, br#"[{"protocol":"Vesu"}]"#.to_vec()))
            .respond(OriginResponse::new(500, Vec::new()));
        let client = client_with(&origin, Duration::from_secs(1));

        client
            .get_daily_rows(Dataset::Lending, date("2025-09-30"))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let stale = client
            .get_daily_rows(Dataset::Lending, date("2025-09-30"))
            .await
            .unwrap();
        assert_eq!(stale.rows.keys()[0].protocol, "Vesu");
        assert!(stale.provenance.served_stale);
        assert_eq!(stale.provenance.upstream_status, Some(500));
    }

    #[tokio::test]
    async fn test_rows_for_dates_keeps_order_and_isolates_failures() {
        let origin = ScriptedOrigin::new();
        // join_all polls in order and the scripted origin never suspends,
        // so replies are consumed in date order
        origin
            .respond(OriginResponse::new(200, br#"[{"protocol":"Vesu"}]"#.to_vec()))
            .respond(OriginResponse::new(404, Vec::new()))
            .respond(OriginResponse::new(200, br#"[{"protocol":"Nostra"}]"#.to_vec()));
        let client = client_with(&origin, Duration::from_secs(300));

        let dates = [date("2025-09-28"), date("2025-09-29"), date("2025-09-30")];
        let outcome = client.get_rows_for_dates(Dataset::Lending, &dates).await;

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results[0].0, dates[0]);
        assert_eq!(outcome.results[2].0, dates[2]);
        assert!(outcome.results[0].1.is_ok());
        assert!(matches!(
            outcome.results[1].1,
            Err(DatasetError::Fetch(FetchError::NotFound { .. }))
        ));
        let last = outcome.results[2].1.as_ref().unwrap();
        assert_eq!(last.rows.keys()[0].protocol, "Nostra");

        assert_eq!(outcome.summary.fetches, 2);
        assert_eq!(outcome.summary.origin_contacts, 2);
        assert!(!outcome.summary.served_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rows_for_dates_runs_concurrently_and_keeps_input_order() {
        let origin = ScriptedOrigin::new();
        // Each date's request is issued in date order but answered out of order
        origin
            .respond_after(
                Duration::from_secs(30),
                OriginResponse::new(200, br#"[{"protocol":"Vesu"}]"#.to_vec()),
            )
            .respond_after(
                Duration::from_secs(10),
                OriginResponse::new(200, br#"[{"protocol":"Nostra"}]"#.to_vec()),
            )
            .respond_after(
                Duration::from_secs(20),
                OriginResponse::new(200, br#"[{"protocol":"Ekubo"}]"#.to_vec()),
            );
        let client = client_with(&origin, Duration::from_secs(300));

        let dates = [date("2025-09-28"), date("2025-09-29"), date("2025-09-30")];
        let started = tokio::time::Instant::now();
        let outcome = client.get_rows_for_dates(Dataset::Borrowing, &dates).await;

        assert_eq!(started.elapsed(), Duration::from_secs(30));
        let paths: Vec<_> = origin.calls().into_iter().map(|c| c.path).collect();
        assert_eq!(
            paths,
            dates.map(|d| Dataset::Borrowing.daily_path(d)).to_vec()
        );

        let protocols: Vec<_> = outcome
            .results
            .iter()
            .map(|(day, result)| {
                let rows = result.as_ref().unwrap();
                assert_eq!(rows.date, *day);
                rows.rows.keys()[0].protocol.clone()
            })
            .collect();
        assert_eq!(outcome.results.iter().map(|(d, _)| *d).collect::<Vec<_>>(), dates);
        assert_eq!(protocols, ["Vesu", "Nostra", "Ekubo"]);
        assert_eq!(client.fetcher().store().len(), 3);
    }

    #[tokio::test]
    async fn test_invalidate_cache_clears_store() {
        let origin = ScriptedOrigin::new();
        origin.respond(OriginResponse::new(200, MANIFEST));
        let client = client_with(&origin, Duration::from_secs(300));

        client.get_manifest(Dataset::Lending).await.unwrap();
        assert_eq!(client.fetcher().store().len(), 1);

        client.invalidate_cache();
        assert!(client.fetcher().store().is_empty());
    }

    #[test]
    fn test_from_config_builds_client() {
        let config = Config {
            cache: CacheConfig::default(),
            origin: crate::config::OriginConfig::new("ratelabs", "rates-data", "main"),
        };
        let client = DatasetClient::from_config(&config).unwrap();

        assert_eq!(
            client.fetcher().ttl_for(ResourceClass::Manifest),
            config.cache.manifest_ttl
        );
        assert_eq!(
            client.fetcher().store().max_entries(),
            config.cache.max_entries
        );
    }
}
