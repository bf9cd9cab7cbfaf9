use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, Caller};
use crate::feed::{
    discover_feeds, validate_feed_url, AddSourceParams, DiscoveryResult, RefreshOutcome,
    SyncEngine, ValidationResult,
};
use crate::storage::{
    refresh_rate_in_bounds, ContentItem, ContentStatus, Priority, Source, SourceSettings,
    SourceUpdate, MAX_REFRESH_RATE, MIN_REFRESH_RATE,
};

/// Body of an add-source request; the owner comes from the [`Caller`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSourceRequest {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub refresh_rate: Option<u32>,
    #[serde(default)]
    pub settings: Option<SourceSettings>,
}

/// Registration and management of a caller's own sources.
///
/// Ownership is checked here, before the engines or stores are asked to
/// mutate anything. Admins may act on any source.
#[derive(Clone)]
pub struct SourceApi {
    engine: Arc<SyncEngine>,
}

impl SourceApi {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    pub async fn validate_url(&self, url: &str) -> ValidationResult {
        validate_feed_url(self.engine.client(), url).await
    }

    pub async fn discover(&self, url: &str) -> DiscoveryResult {
        discover_feeds(self.engine.client(), url).await
    }

    pub async fn add_source(
        &self,
        caller: &Caller,
        request: AddSourceRequest,
    ) -> Result<Source, ApiError> {
        if request.url.trim().is_empty() {
            return Err(ApiError::InvalidInput("url is required".to_string()));
        }
        if let Some(rate) = request.refresh_rate {
            check_refresh_rate(rate)?;
        }

        let source = self
            .engine
            .add_feed_source(AddSourceParams {
                url: request.url,
                user_id: caller.user_id.clone(),
                name: request.name,
                refresh_rate: request.refresh_rate,
                settings: request.settings,
            })
            .await?;
        Ok(source)
    }

    pub async fn list_sources(&self, caller: &Caller) -> Result<Vec<Source>, ApiError> {
        Ok(self.engine.sources().find_by_user_id(&caller.user_id).await?)
    }

    pub async fn get_source(&self, caller: &Caller, id: i64) -> Result<Source, ApiError> {
        self.owned_source(caller, id).await
    }

    pub async fn update_source(
        &self,
        caller: &Caller,
        id: i64,
        update: SourceUpdate,
    ) -> Result<Source, ApiError> {
        if let Some(rate) = update.refresh_rate {
            check_refresh_rate(rate)?;
        }
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ApiError::InvalidInput("name must not be empty".to_string()));
        }

        self.owned_source(caller, id).await?;
        Ok(self.engine.sources().update(id, update).await?)
    }

    /// Delete a source together with its content items.
    pub async fn delete_source(&self, caller: &Caller, id: i64) -> Result<(), ApiError> {
        self.owned_source(caller, id).await?;
        self.engine.sources().delete(id).await?;
        tracing::info!(source_id = id, user_id = %caller.user_id, "Source deleted");
        Ok(())
    }

    /// Synchronize one source now, regardless of its cadence.
    pub async fn refresh_source(
        &self,
        caller: &Caller,
        id: i64,
    ) -> Result<RefreshOutcome, ApiError> {
        self.owned_source(caller, id).await?;
        Ok(self.engine.fetch_feed_content(id).await?)
    }

    pub async fn list_items(
        &self,
        caller: &Caller,
        source_id: i64,
    ) -> Result<Vec<ContentItem>, ApiError> {
        self.owned_source(caller, source_id).await?;
        Ok(self.engine.contents().find_by_source_id(source_id).await?)
    }

    pub async fn set_item_status(
        &self,
        caller: &Caller,
        item_id: i64,
        status: ContentStatus,
    ) -> Result<ContentItem, ApiError> {
        self.owned_item(caller, item_id).await?;
        self.engine.contents().set_status(item_id, status).await?;
        self.owned_item(caller, item_id).await
    }

    pub async fn set_item_priority(
        &self,
        caller: &Caller,
        item_id: i64,
        priority: Priority,
    ) -> Result<ContentItem, ApiError> {
        self.owned_item(caller, item_id).await?;
        self.engine.contents().set_priority(item_id, priority).await?;
        self.owned_item(caller, item_id).await
    }

    async fn owned_source(&self, caller: &Caller, id: i64) -> Result<Source, ApiError> {
        let source = self
            .engine
            .sources()
            .find_by_id(id)
            .await?
            .ok_or(ApiError::NotFound {
                entity: "source",
                id,
            })?;

        if source.user_id != caller.user_id && !caller.is_admin() {
            tracing::warn!(
                source_id = id,
                user_id = %caller.user_id,
                "Caller does not own source"
            );
            return Err(ApiError::Forbidden("source belongs to another user"));
        }
        Ok(source)
    }

    async fn owned_item(&self, caller: &Caller, id: i64) -> Result<ContentItem, ApiError> {
        let item = self
            .engine
            .contents()
            .find_by_id(id)
            .await?
            .ok_or(ApiError::NotFound {
                entity: "content item",
                id,
            })?;
        self.owned_source(caller, item.source_id).await?;
        Ok(item)
    }
}

fn check_refresh_rate(rate: u32) -> Result<(), ApiError> {
    if refresh_rate_in_bounds(rate) {
        Ok(())
    } else {
        Err(ApiError::InvalidInput(format!(
            "refreshRate must be between {MIN_REFRESH_RATE} and {MAX_REFRESH_RATE} minutes, got {rate}"
        )))
    }
}
