//! Feed ingestion: finding, checking and synchronizing RSS/Atom feeds.
//!
//! - [`discover_feeds`] - locate feed URLs for an arbitrary website
//! - [`validate_feed_url`] - confirm a URL serves a parsable feed
//! - [`SyncEngine`] - registration, per-source sync and bulk refresh
//!
//! All outbound requests go through a shared [`FeedClient`], which applies
//! the host policy, timeout and body size limit from
//! [`HttpConfig`](crate::config::HttpConfig). Discovery and validation report
//! failures as result values; synchronization propagates [`SyncError`].

mod discovery;
mod fetcher;
mod parser;
mod sync;
mod validation;

pub use discovery::{discover_feeds, DiscoveredFeed, DiscoveryResult};
pub use fetcher::{FeedClient, FetchError, FetchedDocument};
pub use parser::{parse_feed, ParseError, ParsedFeed, ParsedItem};
pub use sync::{
    AddSourceParams, BulkRefreshOutcome, RefreshFailure, RefreshOutcome, SyncEngine, SyncError,
};
pub use validation::{validate_feed_url, ValidationResult};
