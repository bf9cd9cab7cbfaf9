use serde::Serialize;
use url::Url;

use super::fetcher::{FeedClient, FetchError};
use super::validation::validate_normalized;

/// Conventional feed locations tried against the site origin, in order.
const COMMON_FEED_PATHS: [&str; 5] = ["/feed", "/rss", "/feed.xml", "/atom.xml", "/rss.xml"];

const FEED_MIME_TYPES: [&str; 2] = ["application/rss+xml", "application/atom+xml"];

/// A validated feed URL found for a website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredFeed {
    /// URL of the RSS/Atom feed itself
    pub url: String,
    /// `<link title>` when the page declared one, else the feed's own title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Outcome of feed discovery. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub success: bool,
    pub discovered_feeds: Vec<DiscoveredFeed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiscoveryResult {
    fn found(feeds: Vec<DiscoveredFeed>) -> Self {
        Self {
            success: true,
            discovered_feeds: feeds,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            discovered_feeds: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// A `<link rel="alternate">` feed reference scraped from HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FeedLink {
    url: Url,
    title: Option<String>,
}

/// Finds RSS/Atom feeds for an arbitrary website URL.
///
/// Stops at the first stage that yields at least one valid feed:
///
/// 1. the URL itself, when it is served with an XML/RSS/Atom content type
/// 2. `<link rel="alternate">` feed references in the page's HTML
/// 3. the conventional paths in [`COMMON_FEED_PATHS`] on the site origin
///
/// Every candidate is validated. A failing candidate is skipped without
/// affecting the others.
pub async fn discover_feeds(client: &FeedClient, input: &str) -> DiscoveryResult {
    let url = match client.normalize(input) {
        Ok(url) => url,
        Err(e) => return DiscoveryResult::failed(e.to_string()),
    };

    // Discovery never retries the initial page fetch
    let document = match client.fetch(&url).await {
        Ok(doc) => doc,
        Err(FetchError::HttpStatus(status)) => {
            return DiscoveryResult::failed(format!("Failed to fetch website: HTTP {status}"));
        }
        Err(e) => return DiscoveryResult::failed(format!("Failed to fetch website: {e}")),
    };

    if document.declares_feed() {
        let validation = validate_normalized(client, &url).await;
        if validation.is_valid {
            tracing::info!(url = %url, "URL is itself a feed");
            return DiscoveryResult::found(vec![DiscoveredFeed {
                url: url.to_string(),
                title: validation.title,
            }]);
        }
    }

    let html = String::from_utf8_lossy(&document.body);
    let links = find_feed_links_in_html(&html, &document.url);
    tracing::debug!(url = %url, candidates = links.len(), "Scanned HTML for feed links");

    let mut feeds = Vec::new();
    for link in links {
        if let Some(feed) = validate_candidate(client, link.url, link.title).await {
            feeds.push(feed);
        }
    }
    if !feeds.is_empty() {
        return DiscoveryResult::found(feeds);
    }

    for path in COMMON_FEED_PATHS {
        let Ok(candidate) = document.url.join(path) else {
            continue;
        };
        if let Some(feed) = validate_candidate(client, candidate, None).await {
            feeds.push(feed);
        }
    }
    if !feeds.is_empty() {
        tracing::info!(url = %url, found = feeds.len(), "Feeds found at conventional paths");
        return DiscoveryResult::found(feeds);
    }

    DiscoveryResult::failed("No valid RSS/Atom feeds found on the website")
}

/// Re-check host policy on a derived URL, then validate it.
async fn validate_candidate(
    client: &FeedClient,
    candidate: Url,
    link_title: Option<String>,
) -> Option<DiscoveredFeed> {
    let url = match client.normalize(candidate.as_str()) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(candidate = %candidate, error = %e, "Skipping disallowed feed candidate");
            return None;
        }
    };

    let validation = validate_normalized(client, &url).await;
    if !validation.is_valid {
        tracing::debug!(candidate = %url, error = ?validation.error, "Feed candidate rejected");
        return None;
    }

    Some(DiscoveredFeed {
        url: url.to_string(),
        title: link_title.or(validation.title),
    })
}

/// Scans HTML for `<link>` tags with `rel="alternate"` and an RSS/Atom type.
///
/// Uses simple string scanning (no HTML parser dependency). Attributes may
/// appear in any order with single, double or no quotes. `href` is resolved
/// against `base`; results are de-duplicated by resolved URL, keeping the
/// first occurrence.
fn find_feed_links_in_html(html: &str, base: &Url) -> Vec<FeedLink> {
    // ASCII lowercasing keeps byte offsets aligned with `html`
    let html_lower = html.to_ascii_lowercase();
    let mut links: Vec<FeedLink> = Vec::new();
    let mut search_from = 0;

    while let Some(found) = html_lower[search_from..].find("<link") {
        let tag_start = search_from + found;
        let attrs_start = tag_start + "<link".len();

        let Some(tag_len) = html_lower[attrs_start..].find('>') else {
            break;
        };
        let attrs_end = attrs_start + tag_len;
        search_from = attrs_end + 1;

        // Reject things like <linkset>
        let boundary_ok = html[attrs_start..]
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace() || c == '/' || c == '>');
        if !boundary_ok {
            continue;
        }

        let attrs = parse_attributes(&html[attrs_start..attrs_end]);
        let attr = |name: &str| {
            attrs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.trim())
        };

        let is_alternate = attr("rel").is_some_and(|rel| rel.eq_ignore_ascii_case("alternate"));
        let is_feed = attr("type").is_some_and(|t| {
            FEED_MIME_TYPES
                .iter()
                .any(|mime| t.eq_ignore_ascii_case(mime))
        });
        if !is_alternate || !is_feed {
            continue;
        }

        let Some(href) = attr("href").filter(|h| !h.is_empty()) else {
            continue;
        };
        let Ok(url) = base.join(&href.replace("&amp;", "&")) else {
            continue;
        };

        if links.iter().any(|l| l.url == url) {
            continue;
        }
        let title = attr("title")
            .filter(|t| !t.is_empty())
            .map(str::to_owned);
        links.push(FeedLink { url, title });
    }

    links
}

/// Splits the inside of a start tag into lowercased names and raw values.
fn parse_attributes(tag: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = tag;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
        if rest.is_empty() {
            break;
        }

        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_ascii_lowercase();
        rest = rest[name_end..].trim_start();

        let Some(after_eq) = rest.strip_prefix('=') else {
            attrs.push((name, String::new()));
            continue;
        };
        let after_eq = after_eq.trim_start();

        let (value, remaining) = match after_eq.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let inner = &after_eq[1..];
                match inner.find(quote) {
                    Some(end) => (&inner[..end], &inner[end + 1..]),
                    None => (inner, ""),
                }
            }
            _ => {
                let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                (&after_eq[..end], &after_eq[end..])
            }
        };
        attrs.push((name, value.to_owned()));
        rest = remaining;
    }

    attrs
}
