//! Origin client for the remote file store
//!
//! An [`Origin`] performs exactly one conditional GET per call. It does not
//! retry, cache or interpret status codes: a 404 or 502 is a successful
//! exchange carrying bad news and comes back as an [`OriginResponse`], while
//! failing to reach the origin at all is an [`OriginError`].

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, CONTENT_TYPE, ETAG, IF_NONE_MATCH, LAST_MODIFIED, USER_AGENT,
};
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::debug;

use crate::config::OriginConfig;

/// User agent sent with every origin request
const USER_AGENT_VALUE: &str = concat!("ratemirror/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur before any HTTP status is received
#[derive(Debug, Error)]
pub enum OriginError {
    /// Connecting, sending or reading the body failed
    #[error("Origin request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// A complete response from the origin, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl OriginResponse {
    /// Creates a response with no headers
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            etag: None,
            last_modified: None,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: impl Into<String>) -> Self {
        self.last_modified = Some(last_modified.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Source of raw resources addressed by logical path
#[async_trait]
pub trait Origin: Send + Sync {
    /// Fetches `path`, sending `if_none_match` as a validator when present
    async fn fetch(
        &self,
        path: &str,
        if_none_match: Option<&str>,
    ) -> Result<OriginResponse, OriginError>;
}

/// Origin backed by an HTTP(S) raw-file host
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: Client,
    config: OriginConfig,
}

impl HttpOrigin {
    /// Creates an origin with a client configured from `config`
    pub fn new(config: OriginConfig) -> Result<Self, OriginError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OriginError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Copies the interesting parts of a response out of reqwest's types
    async fn read_response(response: Response) -> Result<OriginResponse, OriginError> {
        let status = response.status().as_u16();
        let headers = response.headers();
        let etag = header_string(headers, ETAG);
        let last_modified = header_string(headers, LAST_MODIFIED);
        let content_type = header_string(headers, CONTENT_TYPE);
        let body = response.bytes().await?.to_vec();

        Ok(OriginResponse {
            status,
            etag,
            last_modified,
            content_type,
            body,
        })
    }
}

/// Returns a header as a string, ignoring values that are not visible ASCII
fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(
        &self,
        path: &str,
        if_none_match: Option<&str>,
    ) -> Result<OriginResponse, OriginError> {
        let url = self.config.url_for(path);

        let mut request = self.client.get(&url).header(USER_AGENT, USER_AGENT_VALUE);
        if let Some(etag) = if_none_match {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().await?;
        debug!(url = %url, status = response.status().as_u16(), "origin responded");

        Self::read_response(response).await
    }
}
