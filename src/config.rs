//! Runtime configuration for the fetch layer
//!
//! Settings are read from `RATEMIRROR_*` environment variables. Origin
//! owner, repo and branch have no sensible default and must be present;
//! everything else falls back to the defaults below.

use std::time::Duration;

use thiserror::Error;

use crate::cache::DEFAULT_MAX_ENTRIES;

/// Default TTL for manifests in seconds
pub const DEFAULT_MANIFEST_TTL_SECS: u64 = 60;

/// Default TTL for daily data files in seconds
pub const DEFAULT_DAILY_TTL_SECS: u64 = 300;

/// Default origin serving raw repository files
pub const DEFAULT_ORIGIN_BASE_URL: &str = "https://raw.githubusercontent.com";

/// Default per-request timeout against the origin in seconds
pub const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 10;

pub const ENV_CACHE_MAX_ENTRIES: &str = "RATEMIRROR_CACHE_MAX_ENTRIES";
pub const ENV_MANIFEST_TTL_SECS: &str = "RATEMIRROR_MANIFEST_TTL_SECS";
pub const ENV_DAILY_TTL_SECS: &str = "RATEMIRROR_DAILY_TTL_SECS";
pub const ENV_ORIGIN_BASE_URL: &str = "RATEMIRROR_ORIGIN_BASE_URL";
pub const ENV_ORIGIN_OWNER: &str = "RATEMIRROR_ORIGIN_OWNER";
pub const ENV_ORIGIN_REPO: &str = "RATEMIRROR_ORIGIN_REPO";
pub const ENV_ORIGIN_BRANCH: &str = "RATEMIRROR_ORIGIN_BRANCH";
pub const ENV_ORIGIN_TIMEOUT_SECS: &str = "RATEMIRROR_ORIGIN_TIMEOUT_SECS";

/// Errors that can occur when loading configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    /// A variable is set but cannot be used
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Cache sizing and freshness settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of resources held at once
    pub max_entries: usize,
    /// How long a fetched manifest is served without contacting the origin
    pub manifest_ttl: Duration,
    /// How long a fetched daily data file is served without contacting the origin
    pub daily_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            manifest_ttl: Duration::from_secs(DEFAULT_MANIFEST_TTL_SECS),
            daily_ttl: Duration::from_secs(DEFAULT_DAILY_TTL_SECS),
        }
    }
}

/// Location of the remote file store
///
/// Resources are fetched from `{base_url}/{owner}/{repo}/{branch}/{path}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginConfig {
    pub base_url: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Upper bound on one origin request, connect through body
    pub timeout: Duration,
}

impl OriginConfig {
    /// Creates an origin config with the default base URL and timeout
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            base_url: DEFAULT_ORIGIN_BASE_URL.to_string(),
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
            timeout: Duration::from_secs(DEFAULT_ORIGIN_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the absolute URL for a logical path
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.base_url,
            self.owner,
            self.repo,
            self.branch,
            path.trim_start_matches('/')
        )
    }
}

/// Complete configuration for the fetch layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub cache: CacheConfig,
    pub origin: OriginConfig,
}

impl Config {
    /// Loads configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let owner = get(ENV_ORIGIN_OWNER).ok_or(ConfigError::Missing(ENV_ORIGIN_OWNER))?;
        let repo = get(ENV_ORIGIN_REPO).ok_or(ConfigError::Missing(ENV_ORIGIN_REPO))?;
        let branch = get(ENV_ORIGIN_BRANCH).ok_or(ConfigError::Missing(ENV_ORIGIN_BRANCH))?;

        let mut origin = OriginConfig::new(owner, repo, branch);
        if let Some(base_url) = get(ENV_ORIGIN_BASE_URL) {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ConfigError::Invalid {
                    name: ENV_ORIGIN_BASE_URL,
                    value: base_url,
                    reason: "expected an http:// or https:// URL",
                });
            }
            origin = origin.with_base_url(base_url);
        }
        if let Some(secs) = parse_u64(ENV_ORIGIN_TIMEOUT_SECS, get(ENV_ORIGIN_TIMEOUT_SECS))? {
            origin = origin.with_timeout(Duration::from_secs(secs));
        }

        let mut cache = CacheConfig::default();
        if let Some(max) = parse_u64(ENV_CACHE_MAX_ENTRIES, get(ENV_CACHE_MAX_ENTRIES))? {
            if max == 0 {
                return Err(ConfigError::Invalid {
                    name: ENV_CACHE_MAX_ENTRIES,
                    value: max.to_string(),
                    reason: "must be at least 1",
                });
            }
            cache.max_entries = usize::try_from(max).unwrap_or(usize::MAX);
        }
        if let Some(secs) = parse_u64(ENV_MANIFEST_TTL_SECS, get(ENV_MANIFEST_TTL_SECS))? {
            cache.manifest_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(ENV_DAILY_TTL_SECS, get(ENV_DAILY_TTL_SECS))? {
            cache.daily_ttl = Duration::from_secs(secs);
        }

        Ok(Self { cache, origin })
    }
}

fn parse_u64(name: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|v| {
            v.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name,
                value: v,
                reason: "expected a non-negative integer",
            })
        })
        .transpose()
}
