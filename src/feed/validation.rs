use serde::Serialize;
use url::Url;

use super::fetcher::{FeedClient, FetchError};
use super::parser::parse_feed;

/// Title used when neither the feed nor its URL path supply one.
const FALLBACK_TITLE: &str = "RSS Feed";

/// Outcome of checking whether a URL serves a parsable feed.
///
/// Negative outcomes are ordinary values, never errors: callers render
/// `error` inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    fn valid(title: String) -> Self {
        Self {
            is_valid: true,
            title: Some(title),
            error: None,
        }
    }

    fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            title: None,
            error: Some(error.into()),
        }
    }
}

/// Fetch `input` once and try to parse it as RSS/Atom.
///
/// The body is always parsed regardless of `Content-Type`; the header only
/// picks which failure message is reported.
pub async fn validate_feed_url(client: &FeedClient, input: &str) -> ValidationResult {
    let url = match client.normalize(input) {
        Ok(url) => url,
        Err(e) => return ValidationResult::invalid(e.to_string()),
    };
    validate_normalized(client, &url).await
}

pub(crate) async fn validate_normalized(client: &FeedClient, url: &Url) -> ValidationResult {
    let document = match client.fetch(url).await {
        Ok(doc) => doc,
        Err(FetchError::HttpStatus(status)) => {
            return ValidationResult::invalid(format!("Failed to fetch feed: HTTP {status}"));
        }
        Err(e) => return ValidationResult::invalid(format!("Failed to fetch feed: {e}")),
    };

    match parse_feed(&document.body) {
        Ok(feed) => {
            let title = feed
                .title
                .or_else(|| last_path_segment(url))
                .unwrap_or_else(|| FALLBACK_TITLE.to_string());
            tracing::debug!(url = %url, title = %title, "Feed validated");
            ValidationResult::valid(title)
        }
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "Feed validation failed to parse");
            if document.declares_feed() {
                ValidationResult::invalid("Not a valid RSS/Atom feed format")
            } else {
                ValidationResult::invalid("Not an RSS/Atom feed")
            }
        }
    }
}

fn last_path_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_owned)
}
