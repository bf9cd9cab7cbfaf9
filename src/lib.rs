//! Feed ingestion for a personal aggregator.
//!
//! Users register sources (RSS/Atom feeds). [`feed::discover_feeds`] finds
//! feed URLs for an arbitrary website, [`feed::validate_feed_url`] confirms a
//! URL is a parsable feed, and [`feed::SyncEngine`] fetches feeds and stores
//! entries it has not seen before. A [`scheduler::RefreshScheduler`] drives
//! bulk refreshes on an interval, honouring each source's own cadence.
//!
//! Persistence is behind the [`storage::SourceStore`] and
//! [`storage::ContentStore`] traits, implemented on SQLite and in memory.

pub mod api;
pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;
