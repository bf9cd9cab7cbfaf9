use async_trait::async_trait;

use super::types::{
    ContentItem, ContentStatus, NewContentItem, NewSource, Priority, Source, SourceUpdate,
    StoreError,
};

/// Persistence of registered sources.
///
/// Every method is a discrete, independently committed operation; callers
/// never hold a transaction across calls.
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Source>, StoreError>;

    async fn create(&self, source: NewSource) -> Result<Source, StoreError>;

    /// Apply a partial update. Fails with `NotFound` for unknown ids.
    async fn update(&self, id: i64, update: SourceUpdate) -> Result<Source, StoreError>;

    /// Delete a source and all of its content items. Returns whether a row existed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Source>, StoreError>;

    /// Active sources due for a refresh, never-fetched sources first.
    ///
    /// With `older_than_minutes = None` each source is due once its own
    /// `refresh_rate` has elapsed since `last_fetched_at`. With
    /// `Some(minutes)` that global threshold replaces every source's cadence.
    async fn find_sources_to_refresh(
        &self,
        older_than_minutes: Option<u32>,
    ) -> Result<Vec<Source>, StoreError>;

    /// Set `last_fetched_at` to now, strictly later than any previous value,
    /// and clear `last_error`.
    async fn update_last_fetched(&self, id: i64) -> Result<(), StoreError>;

    /// Record (or clear, with `None`) the last fetch error of a source.
    async fn record_fetch_error(&self, id: i64, error: Option<&str>) -> Result<(), StoreError>;
}

/// Persistence of ingested items, keyed by `(source_id, url)`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_by_source_id(&self, source_id: i64) -> Result<Vec<ContentItem>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<ContentItem>, StoreError>;

    /// Insert a new item. A second item with the same `(source_id, url)`
    /// fails with `StoreError::Conflict`.
    async fn create(&self, item: NewContentItem) -> Result<ContentItem, StoreError>;

    async fn set_status(&self, id: i64, status: ContentStatus) -> Result<(), StoreError>;

    async fn set_priority(&self, id: i64, priority: Priority) -> Result<(), StoreError>;
}
