use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use super::discovery::discover_feeds;
use super::fetcher::{FeedClient, FetchError};
use super::parser::{parse_feed, ParseError, ParsedItem};
use super::validation::validate_feed_url;
use crate::storage::{
    refresh_rate_in_bounds, ContentMetadata, ContentStatus, ContentStore, NewContentItem,
    NewSource, Priority, Source, SourceKind, SourceSettings, SourceStore, StoreError,
    DEFAULT_REFRESH_RATE, MAX_REFRESH_RATE, MIN_REFRESH_RATE,
};
use crate::util::{estimate_read_time, word_count, UrlError};

/// Path suffixes that skip discovery during registration.
const DIRECT_FEED_SUFFIXES: [&str; 3] = [".rss", ".xml", ".atom"];

/// Errors surfaced by synchronization and registration.
///
/// Per-source variants are demoted to [`RefreshFailure`] entries during a
/// bulk refresh; only the due-source query failing aborts a whole cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Source not found: {0}")]
    SourceNotFound(i64),
    #[error("Source {id} is a {kind} source; only RSS sources can be synchronized")]
    UnsupportedKind { id: i64, kind: SourceKind },
    #[error(transparent)]
    Url(#[from] UrlError),
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Registration rejected by feed validation; carries its message verbatim.
    #[error("{0}")]
    Validation(String),
    #[error(
        "Refresh rate must be between {min} and {max} minutes, got {0}",
        min = MIN_REFRESH_RATE,
        max = MAX_REFRESH_RATE
    )]
    InvalidRefreshRate(u32),
}

/// Result of synchronizing one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub source_id: i64,
    pub new_items_count: usize,
    /// Entries already stored for this source, seen again and not rewritten.
    pub updated_items_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshFailure {
    pub source_id: i64,
    pub error: String,
}

/// Aggregate of one bulk refresh across every due source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRefreshOutcome {
    pub total: usize,
    pub successful: usize,
    pub failed: Vec<RefreshFailure>,
    pub new_items_count: usize,
    pub updated_items_count: usize,
}

/// Registration request for a new feed source.
#[derive(Debug, Clone, Default)]
pub struct AddSourceParams {
    pub url: String,
    pub user_id: String,
    pub name: Option<String>,
    pub refresh_rate: Option<u32>,
    pub settings: Option<SourceSettings>,
}

/// Fetches registered feeds and merges new entries into the content store.
///
/// Holds no state of its own beyond configuration; share it behind an `Arc`.
pub struct SyncEngine {
    sources: Arc<dyn SourceStore>,
    contents: Arc<dyn ContentStore>,
    client: FeedClient,
    default_refresh_rate: u32,
    max_concurrent_fetches: usize,
}

impl SyncEngine {
    pub fn new(
        sources: Arc<dyn SourceStore>,
        contents: Arc<dyn ContentStore>,
        client: FeedClient,
    ) -> Self {
        Self {
            sources,
            contents,
            client,
            default_refresh_rate: DEFAULT_REFRESH_RATE,
            max_concurrent_fetches: 1,
        }
    }

    /// Cadence given to sources registered without one.
    pub fn with_default_refresh_rate(mut self, minutes: u32) -> Self {
        self.default_refresh_rate = minutes;
        self
    }

    /// Sources fetched at once during a bulk refresh. `1` is sequential.
    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit.max(1);
        self
    }

    pub fn client(&self) -> &FeedClient {
        &self.client
    }

    pub fn sources(&self) -> &dyn SourceStore {
        self.sources.as_ref()
    }

    pub fn contents(&self) -> &dyn ContentStore {
        self.contents.as_ref()
    }

    /// Fetch one source's feed and store entries not seen before.
    ///
    /// # Errors
    ///
    /// Unknown source, non-RSS kind, fetch, parse and store failures all
    /// propagate. Failures are also recorded on the source's `last_error`.
    pub async fn fetch_feed_content(&self, source_id: i64) -> Result<RefreshOutcome, SyncError> {
        let source = self
            .sources
            .find_by_id(source_id)
            .await?
            .ok_or(SyncError::SourceNotFound(source_id))?;

        self.refresh_source(&source).await
    }

    async fn refresh_source(&self, source: &Source) -> Result<RefreshOutcome, SyncError> {
        let result = self.sync_source(source).await;

        if let Err(e) = &result {
            let message = e.to_string();
            if let Err(record_err) = self
                .sources
                .record_fetch_error(source.id, Some(&message))
                .await
            {
                tracing::warn!(
                    source_id = source.id,
                    error = %record_err,
                    "Failed to record fetch error"
                );
            }
        }

        result
    }

    async fn sync_source(&self, source: &Source) -> Result<RefreshOutcome, SyncError> {
        if source.kind != SourceKind::Rss {
            return Err(SyncError::UnsupportedKind {
                id: source.id,
                kind: source.kind,
            });
        }

        let url = self.client.normalize(&source.url)?;
        let document = self.client.fetch_with_retry(&url).await?;
        let feed = parse_feed(&document.body)?;
        let fetched_at = Utc::now();

        let mut known: HashSet<String> = self
            .contents
            .find_by_source_id(source.id)
            .await?
            .into_iter()
            .map(|item| item.url)
            .collect();

        let mut outcome = RefreshOutcome {
            source_id: source.id,
            new_items_count: 0,
            updated_items_count: 0,
        };

        for item in feed.items {
            let Some(link) = item.link.clone() else {
                continue;
            };
            if known.contains(&link) {
                outcome.updated_items_count += 1;
                continue;
            }

            let new_item = new_content_item(source.id, link.clone(), item, fetched_at);
            match self.contents.create(new_item).await {
                Ok(_) => outcome.new_items_count += 1,
                // Another refresh of the same source stored it first
                Err(StoreError::Conflict(_)) => outcome.updated_items_count += 1,
                Err(e) => return Err(e.into()),
            }
            known.insert(link);
        }

        // Refreshed even when nothing was new
        self.sources.update_last_fetched(source.id).await?;

        tracing::info!(
            source_id = source.id,
            new = outcome.new_items_count,
            updated = outcome.updated_items_count,
            "Source synchronized"
        );
        Ok(outcome)
    }

    /// Register a feed for a user after discovery and validation.
    ///
    /// URLs not ending in `.rss`, `.xml` or `.atom` go through discovery
    /// first; the first discovered feed replaces the input. Discovery
    /// failure is not fatal. The (possibly substituted) URL must then
    /// validate.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidRefreshRate`] before any network access,
    /// [`SyncError::Validation`] with the validation message verbatim, or a
    /// store error.
    pub async fn add_feed_source(&self, params: AddSourceParams) -> Result<Source, SyncError> {
        if let Some(rate) = params.refresh_rate {
            if !refresh_rate_in_bounds(rate) {
                return Err(SyncError::InvalidRefreshRate(rate));
            }
        }

        let mut url = params.url.trim().to_string();
        let mut discovered_title = None;

        if !looks_like_feed_url(&url) {
            let discovery = discover_feeds(&self.client, &url).await;
            match discovery.discovered_feeds.into_iter().next() {
                Some(feed) => {
                    tracing::debug!(input = %url, feed = %feed.url, "Using discovered feed");
                    url = feed.url;
                    discovered_title = feed.title;
                }
                None => tracing::debug!(
                    input = %url,
                    error = ?discovery.error,
                    "Discovery found nothing, validating URL directly"
                ),
            }
        }

        let validation = validate_feed_url(&self.client, &url).await;
        if !validation.is_valid {
            let message = validation
                .error
                .unwrap_or_else(|| "Invalid feed URL".to_string());
            return Err(SyncError::Validation(message));
        }

        let canonical = self.client.normalize(&url)?;
        let name = params
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .or(discovered_title)
            .or(validation.title)
            .unwrap_or_default();

        let source = self
            .sources
            .create(NewSource {
                user_id: params.user_id,
                name,
                url: canonical.to_string(),
                kind: SourceKind::Rss,
                is_active: true,
                refresh_rate: params.refresh_rate.unwrap_or(self.default_refresh_rate),
                settings: params.settings.unwrap_or_default(),
            })
            .await?;

        tracing::info!(source_id = source.id, url = %source.url, "Feed source registered");
        Ok(source)
    }

    /// Synchronize every active source that is due.
    ///
    /// `None` lets each source's own cadence decide; `Some(m)` treats every
    /// source fetched more than `m` minutes ago as due. One source failing
    /// never stops the others.
    ///
    /// # Errors
    ///
    /// Only when selecting due sources fails.
    pub async fn refresh_all_feeds(
        &self,
        older_than_minutes: Option<u32>,
    ) -> Result<BulkRefreshOutcome, SyncError> {
        let due = self.sources.find_sources_to_refresh(older_than_minutes).await?;

        let mut outcome = BulkRefreshOutcome {
            total: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            tracing::debug!("No sources due for refresh");
            return Ok(outcome);
        }
        tracing::info!(
            due = due.len(),
            concurrency = self.max_concurrent_fetches,
            "Refreshing due sources"
        );

        // `buffered` keeps results in selection order
        let results: Vec<(i64, Result<RefreshOutcome, SyncError>)> = stream::iter(due)
            .map(|source| async move {
                let result = self.refresh_source(&source).await;
                (source.id, result)
            })
            .buffered(self.max_concurrent_fetches)
            .collect()
            .await;

        for (source_id, result) in results {
            match result {
                Ok(refreshed) => {
                    outcome.successful += 1;
                    outcome.new_items_count += refreshed.new_items_count;
                    outcome.updated_items_count += refreshed.updated_items_count;
                }
                Err(e) => {
                    tracing::warn!(source_id, error = %e, "Source refresh failed");
                    outcome.failed.push(RefreshFailure {
                        source_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }
}

fn looks_like_feed_url(url: &str) -> bool {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_ascii_lowercase();
    DIRECT_FEED_SUFFIXES
        .iter()
        .any(|suffix| path.ends_with(suffix))
}

fn new_content_item(
    source_id: i64,
    url: String,
    item: ParsedItem,
    fetched_at: chrono::DateTime<Utc>,
) -> NewContentItem {
    let read_time_minutes = estimate_read_time(word_count(&item.body_text));

    NewContentItem {
        source_id,
        title: item.title.unwrap_or_else(|| "Untitled".to_string()),
        url,
        body_text: item.body_text,
        body_html: item.body_html,
        author: item.author,
        published_at: item.published.unwrap_or(fetched_at),
        status: ContentStatus::Unread,
        priority: Priority::Medium,
        metadata: ContentMetadata {
            read_time_minutes,
            categories: item.categories,
            feed_item_id: Some(item.guid),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::tests::test_client;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rss(title: &str, links: &[&str]) -> String {
        let items: String = links
            .iter()
            .map(|link| format!("<item><title>Post</title><link>{link}</link></item>"))
            .collect();
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{title}</title>{items}</channel></rss>"#
        )
    }

    fn engine(store: &MemoryStore) -> SyncEngine {
        SyncEngine::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            test_client(),
        )
    }

    async fn mount_feed(server: &MockServer, route: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "application/rss+xml"),
            )
            .mount(server)
            .await;
    }

    async fn add_source(store: &MemoryStore, url: String) -> Source {
        SourceStore::create(
            store,
            NewSource {
                user_id: "u1".to_string(),
                name: "Feed".to_string(),
                url,
                kind: SourceKind::Rss,
                is_active: true,
                refresh_rate: DEFAULT_REFRESH_RATE,
                settings: SourceSettings::default(),
            },
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_looks_like_feed_url() {
        assert!(looks_like_feed_url("https://x.com/feed.xml"));
        assert!(looks_like_feed_url("https://x.com/posts.RSS?page=2"));
        assert!(looks_like_feed_url("x.com/index.atom"));
        assert!(!looks_like_feed_url("https://x.com/feed"));
        assert!(!looks_like_feed_url("https://x.com/"));
    }

    #[test]
    fn test_new_content_item_defaults() {
        let fetched_at = Utc::now();
        let item = ParsedItem {
            guid: "g".to_string(),
            title: None,
            link: Some("https://e.com/1".to_string()),
            published: None,
            body_html: String::new(),
            body_text: "word ".repeat(461),
            author: None,
            categories: vec!["news".to_string()],
        };

        let created = new_content_item(7, "https://e.com/1".to_string(), item, fetched_at);
        assert_eq!(created.title, "Untitled");
        assert_eq!(created.published_at, fetched_at);
        assert_eq!(created.status, ContentStatus::Unread);
        assert_eq!(created.priority, Priority::Medium);
        assert_eq!(created.metadata.read_time_minutes, 3);
        assert_eq!(created.metadata.feed_item_id.as_deref(), Some("g"));
    }

    #[tokio::test]
    async fn test_fetch_counts_new_and_known_items() {
        let server = MockServer::start().await;
        mount_feed(
            &server,
            "/feed.xml",
            rss("Feed", &["https://e.com/1", "https://e.com/2"]),
        )
        .await;

        let store = MemoryStore::new();
        let source = add_source(&store, format!("{}/feed.xml", server.uri())).await;
        let engine = engine(&store);

        // Pre-store one of the two entries
        ContentStore::create(
            &store,
            new_content_item(
                source.id,
                "https://e.com/1".to_string(),
                ParsedItem {
                    guid: "1".to_string(),
                    title: Some("Old".to_string()),
                    link: Some("https://e.com/1".to_string()),
                    published: None,
                    body_html: String::new(),
                    body_text: String::new(),
                    author: None,
                    categories: Vec::new(),
                },
                Utc::now(),
            ),
        )
        .await
        .unwrap();

        let outcome = engine.fetch_feed_content(source.id).await.unwrap();
        assert_eq!(
            outcome,
            RefreshOutcome {
                source_id: source.id,
                new_items_count: 1,
                updated_items_count: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_is_idempotent_and_advances_last_fetched() {
        let server = MockServer::start().await;
        mount_feed(
            &server,
            "/feed.xml",
            rss("Feed", &["https://e.com/1", "https://e.com/2"]),
        )
        .await;

        let store = MemoryStore::new();
        let source = add_source(&store, format!("{}/feed.xml", server.uri())).await;
        let engine = engine(&store);

        let first = engine.fetch_feed_content(source.id).await.unwrap();
        let after_first = SourceStore::find_by_id(&store, source.id)
            .await
            .unwrap()
            .unwrap();
        let second = engine.fetch_feed_content(source.id).await.unwrap();
        let after_second = SourceStore::find_by_id(&store, source.id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.new_items_count, 2);
        assert_eq!(second.new_items_count, 0);
        assert_eq!(second.updated_items_count, 2);
        assert_eq!(store.find_by_source_id(source.id).await.unwrap().len(), 2);
        assert!(after_first.last_fetched_at.is_some());
        assert!(after_second.last_fetched_at > after_first.last_fetched_at);
    }

    #[tokio::test]
    async fn test_fetch_skips_linkless_and_repeated_entries() {
        let server = MockServer::start().await;
        let body = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>F</title>
            <item><title>A</title><link>https://e.com/a</link></item>
            <item><title>No link</title></item>
            <item><title>A again</title><link>https://e.com/a</link></item>
            </channel></rss>"#;
        mount_feed(&server, "/feed.xml", body.to_string()).await;

        let store = MemoryStore::new();
        let source = add_source(&store, format!("{}/feed.xml", server.uri())).await;

        let outcome = engine(&store).fetch_feed_content(source.id).await.unwrap();
        assert_eq!(outcome.new_items_count, 1);
        assert_eq!(outcome.updated_items_count, 1);

        let stored = store.find_by_source_id(source.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "A");
    }

    #[tokio::test]
    async fn test_fetch_empty_feed_still_marks_fetched() {
        let server = MockServer::start().await;
        mount_feed(&server, "/feed.xml", rss("Empty", &[])).await;

        let store = MemoryStore::new();
        let source = add_source(&store, format!("{}/feed.xml", server.uri())).await;

        let outcome = engine(&store).fetch_feed_content(source.id).await.unwrap();
        assert_eq!(outcome.new_items_count, 0);

        let after = SourceStore::find_by_id(&store, source.id)
            .await
            .unwrap()
            .unwrap();
        assert!(after.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_fetch_unknown_source() {
        let store = MemoryStore::new();
        let err = engine(&store).fetch_feed_content(99).await.unwrap_err();
        assert!(matches!(err, SyncError::SourceNotFound(99)));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_recorded_then_cleared() {
        let server = MockServer::start().await;
        let store = MemoryStore::new();
        let source = add_source(&store, format!("{}/feed.xml", server.uri())).await;
        let engine = engine(&store);

        // Nothing mounted yet: 404
        let err = engine.fetch_feed_content(source.id).await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch(FetchError::HttpStatus(404))));
        let failed = SourceStore::find_by_id(&store, source.id)
            .await
            .unwrap()
            .unwrap();
        assert!(failed.last_error.as_deref().is_some_and(|e| e.contains("404")));
        assert_eq!(failed.last_fetched_at, None);

        mount_feed(&server, "/feed.xml", rss("Feed", &["https://e.com/1"])).await;
        engine.fetch_feed_content(source.id).await.unwrap();
        let recovered = SourceStore::find_by_id(&store, source.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recovered.last_error, None);
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_rss_kind() {
        let store = MemoryStore::new();
        let source = SourceStore::create(
            &store,
            NewSource {
                user_id: "u1".to_string(),
                name: "Pod".to_string(),
                url: "https://example.com/pod".to_string(),
                kind: SourceKind::Podcast,
                is_active: true,
                refresh_rate: 60,
                settings: SourceSettings::default(),
            },
        )
        .await
        .unwrap();

        let err = engine(&store).fetch_feed_content(source.id).await.unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedKind { .. }));
    }

    #[tokio::test]
    async fn test_refresh_all_isolates_failures() {
        let server = MockServer::start().await;
        mount_feed(&server, "/a.xml", rss("A", &["https://e.com/a1"])).await;
        mount_feed(&server, "/c.xml", rss("C", &["https://e.com/c1", "https://e.com/c2"])).await;
        Mock::given(method("GET"))
            .and(path("/b.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not xml at all"))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        add_source(&store, format!("{}/a.xml", server.uri())).await;
        let broken = add_source(&store, format!("{}/b.xml", server.uri())).await;
        add_source(&store, format!("{}/c.xml", server.uri())).await;

        let outcome = engine(&store).refresh_all_feeds(None).await.unwrap();
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.successful, 2);
        assert_eq!(outcome.new_items_count, 3);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].source_id, broken.id);
    }

    #[tokio::test]
    async fn test_refresh_all_concurrent_keeps_attribution() {
        let server = MockServer::start().await;
        mount_feed(&server, "/ok.xml", rss("OK", &["https://e.com/1"])).await;

        let store = MemoryStore::new();
        let mut expected_failures = Vec::new();
        for i in 0..4 {
            let route = if i % 2 == 0 { "ok.xml".to_string() } else { format!("missing-{i}.xml") };
            let source = add_source(&store, format!("{}/{route}", server.uri())).await;
            if i % 2 == 1 {
                expected_failures.push(source.id);
            }
        }

        let engine = engine(&store).with_max_concurrent_fetches(4);
        let outcome = engine.refresh_all_feeds(None).await.unwrap();

        let failed_ids: Vec<i64> = outcome.failed.iter().map(|f| f.source_id).collect();
        assert_eq!(failed_ids, expected_failures);
        assert_eq!(outcome.successful, 2);
    }

    #[tokio::test]
    async fn test_refresh_all_respects_cadence_and_override() {
        let server = MockServer::start().await;
        mount_feed(&server, "/feed.xml", rss("Feed", &["https://e.com/1"])).await;

        let store = MemoryStore::new();
        let source = add_source(&store, format!("{}/feed.xml", server.uri())).await;
        let engine = engine(&store);

        assert_eq!(engine.refresh_all_feeds(None).await.unwrap().total, 1);
        // Just fetched, 60-minute cadence: not due
        assert_eq!(engine.refresh_all_feeds(None).await.unwrap().total, 0);

        store.set_last_fetched(source.id, Some(Utc::now() - chrono::Duration::minutes(10)));
        assert_eq!(engine.refresh_all_feeds(None).await.unwrap().total, 0);
        assert_eq!(engine.refresh_all_feeds(Some(5)).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_add_direct_feed_uses_validated_title() {
        let server = MockServer::start().await;
        mount_feed(&server, "/feed.xml", rss("X News", &[])).await;

        let store = MemoryStore::new();
        let url = format!("{}/feed.xml", server.uri());
        let source = engine(&store)
            .add_feed_source(AddSourceParams {
                url: url.clone(),
                user_id: "u1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(source.url, url);
        assert_eq!(source.name, "X News");
        assert_eq!(source.refresh_rate, 60);
        assert!(source.is_active);
        assert_eq!(source.last_fetched_at, None);
        assert!(!source.settings.fetch_full_text);
    }

    #[tokio::test]
    async fn test_add_website_substitutes_discovered_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    r#"<link rel="alternate" type="application/rss+xml" href="/posts.rss" title="Posts">"#,
                    "text/html",
                ),
            )
            .mount(&server)
            .await;
        mount_feed(&server, "/posts.rss", rss("Site Feed", &[])).await;

        let store = MemoryStore::new();
        let source = engine(&store)
            .add_feed_source(AddSourceParams {
                url: server.uri(),
                user_id: "u1".to_string(),
                refresh_rate: Some(15),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(source.url, format!("{}/posts.rss", server.uri()));
        assert_eq!(source.name, "Posts");
        assert_eq!(source.refresh_rate, 15);
    }

    #[tokio::test]
    async fn test_add_caller_name_wins() {
        let server = MockServer::start().await;
        mount_feed(&server, "/feed.xml", rss("X News", &[])).await;

        let store = MemoryStore::new();
        let source = engine(&store)
            .add_feed_source(AddSourceParams {
                url: format!("{}/feed.xml", server.uri()),
                user_id: "u1".to_string(),
                name: Some("Mine".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(source.name, "Mine");
    }

    #[tokio::test]
    async fn test_add_surfaces_validation_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>hi</body></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let err = engine(&store)
            .add_feed_source(AddSourceParams {
                url: format!("{}/page.xml", server.uri()),
                user_id: "u1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Not an RSS/Atom feed");
        assert!(store.find_by_user_id("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_rejects_out_of_bounds_cadence() {
        let store = MemoryStore::new();
        for rate in [0, 4, 1441] {
            let err = engine(&store)
                .add_feed_source(AddSourceParams {
                    url: "https://example.com/feed.xml".to_string(),
                    user_id: "u1".to_string(),
                    refresh_rate: Some(rate),
                    ..Default::default()
                })
                .await
                .unwrap_err();
            assert!(matches!(err, SyncError::InvalidRefreshRate(r) if r == rate));
        }
    }
}
