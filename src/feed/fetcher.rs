use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::HttpConfig;
use crate::util::{normalize_feed_url, HostPolicy, UrlError};

/// Errors that can occur while fetching a document over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, timeout, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("HTTP client setup failed: {0}")]
    Setup(String),
}

impl FetchError {
    /// Statuses worth another attempt: rate limiting and server errors.
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::HttpStatus(status) => *status == 429 || (500..600).contains(status),
            FetchError::IncompleteResponse { .. } => true,
            _ => false,
        }
    }
}

/// A fetched HTTP response body plus the headers the engines care about.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects.
    pub url: Url,
    /// Lowercased `Content-Type` header, if present.
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedDocument {
    /// Whether the declared content type suggests an XML/RSS/Atom document.
    ///
    /// Advisory only: callers always attempt to parse regardless. XHTML is
    /// markup for a web page, not a feed.
    pub fn declares_feed(&self) -> bool {
        self.content_type.as_deref().is_some_and(|ct| {
            let essence = ct.split(';').next().unwrap_or_default().trim();
            matches!(
                essence,
                "application/rss+xml"
                    | "application/atom+xml"
                    | "application/rdf+xml"
                    | "application/xml"
                    | "text/xml"
            ) || essence.contains("rss")
                || essence.contains("atom")
        })
    }
}

/// Outbound HTTP client shared by discovery, validation and synchronization.
///
/// Wraps a `reqwest::Client` (cheap to clone) with the host policy, body
/// size cap and retry budget from [`HttpConfig`].
#[derive(Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    policy: HostPolicy,
    max_body_bytes: usize,
    max_retries: u32,
}

impl FeedClient {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Setup(e.to_string()))?;

        Ok(Self {
            http,
            policy: config.host_policy(),
            max_body_bytes: config.max_body_bytes,
            max_retries: config.max_retries,
        })
    }

    /// Normalize a URL under this client's host policy.
    pub fn normalize(&self, input: &str) -> Result<Url, UrlError> {
        normalize_feed_url(input, self.policy)
    }

    /// Single GET with no retry. Non-2xx statuses are errors.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedDocument, FetchError> {
        let response = self.http.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_lowercase);
        let final_url = response.url().clone();

        let body = read_limited_bytes(response, self.max_body_bytes).await?;

        Ok(FetchedDocument {
            url: final_url,
            content_type,
            body,
        })
    }

    /// GET with exponential backoff on 429, 5xx and truncated bodies.
    ///
    /// Waits 1s, 2s, 4s, ... between attempts, up to `max_retries` retries.
    pub async fn fetch_with_retry(&self, url: &Url) -> Result<FetchedDocument, FetchError> {
        let mut attempt = 0u32;

        loop {
            match self.fetch(url).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = Duration::from_secs(1u64 << attempt.min(6));
                    tracing::warn!(
                        url = %url,
                        error = %e,
                        retry = attempt + 1,
                        delay_secs = delay.as_secs(),
                        "Fetch failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
