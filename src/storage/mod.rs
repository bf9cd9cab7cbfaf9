//! Strongly typed persistence for sources and ingested content.
//!
//! The engines depend only on the [`SourceStore`] and [`ContentStore`]
//! traits. [`Database`] implements both on SQLite; [`MemoryStore`] implements
//! both in memory for tests and ephemeral runs.

mod contents;
mod memory;
mod schema;
mod sources;
mod store;
mod types;

pub use memory::MemoryStore;
pub use schema::Database;
pub use store::{ContentStore, SourceStore};
pub use types::{
    refresh_rate_in_bounds, ContentItem, ContentMetadata, ContentStatus, NewContentItem,
    NewSource, Priority, Source, SourceKind, SourceSettings, SourceUpdate, StoreError,
    DEFAULT_REFRESH_RATE, MAX_REFRESH_RATE, MIN_REFRESH_RATE,
};
