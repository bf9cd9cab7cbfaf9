use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::store::{ContentStore, SourceStore};
use super::types::{
    ContentItem, ContentStatus, NewContentItem, NewSource, Priority, Source, SourceUpdate,
    StoreError,
};

#[derive(Default)]
struct State {
    next_source_id: i64,
    next_item_id: i64,
    sources: BTreeMap<i64, Source>,
    items: BTreeMap<i64, ContentItem>,
}

/// In-memory store implementing both [`SourceStore`] and [`ContentStore`].
///
/// Behaves like [`Database`](super::Database) (cascade deletes, uniqueness of
/// `(source_id, url)`, due-source ordering) without touching disk. Cloning
/// shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked mid-write
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Overwrite a source's `last_fetched_at`, for simulating elapsed time.
    pub fn set_last_fetched(&self, id: i64, at: Option<DateTime<Utc>>) {
        if let Some(source) = self.lock().sources.get_mut(&id) {
            source.last_fetched_at = at;
        }
    }
}

fn source_not_found(id: i64) -> StoreError {
    StoreError::NotFound {
        entity: "source",
        id,
    }
}

fn item_not_found(id: i64) -> StoreError {
    StoreError::NotFound {
        entity: "content item",
        id,
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Source>, StoreError> {
        Ok(self.lock().sources.get(&id).cloned())
    }

    async fn create(&self, source: NewSource) -> Result<Source, StoreError> {
        let mut state = self.lock();
        state.next_source_id += 1;
        let id = state.next_source_id;

        let created = Source {
            id,
            user_id: source.user_id,
            name: source.name,
            url: source.url,
            kind: source.kind,
            is_active: source.is_active,
            refresh_rate: source.refresh_rate,
            last_fetched_at: None,
            last_error: None,
            settings: source.settings,
            created_at: Utc::now(),
        };
        state.sources.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, update: SourceUpdate) -> Result<Source, StoreError> {
        let mut state = self.lock();
        let source = state.sources.get_mut(&id).ok_or_else(|| source_not_found(id))?;

        if let Some(name) = update.name {
            source.name = name;
        }
        if let Some(is_active) = update.is_active {
            source.is_active = is_active;
        }
        if let Some(rate) = update.refresh_rate {
            source.refresh_rate = rate;
        }
        if let Some(settings) = update.settings {
            source.settings = settings;
        }
        Ok(source.clone())
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let existed = state.sources.remove(&id).is_some();
        state.items.retain(|_, item| item.source_id != id);
        Ok(existed)
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Source>, StoreError> {
        Ok(self
            .lock()
            .sources
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_sources_to_refresh(
        &self,
        older_than_minutes: Option<u32>,
    ) -> Result<Vec<Source>, StoreError> {
        let now = Utc::now();
        let mut due: Vec<Source> = self
            .lock()
            .sources
            .values()
            .filter(|s| s.is_active)
            .filter(|s| match s.last_fetched_at {
                None => true,
                Some(at) => {
                    let minutes = older_than_minutes.unwrap_or(s.refresh_rate);
                    at <= now - Duration::minutes(i64::from(minutes))
                }
            })
            .cloned()
            .collect();

        // Never-fetched first, then oldest fetch first; ties by id
        due.sort_by_key(|s| (s.last_fetched_at.is_some(), s.last_fetched_at, s.id));
        Ok(due)
    }

    async fn update_last_fetched(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        let source = state.sources.get_mut(&id).ok_or_else(|| source_not_found(id))?;

        let now = Utc::now();
        source.last_fetched_at = Some(match source.last_fetched_at {
            Some(prev) if prev >= now => prev + Duration::milliseconds(1),
            _ => now,
        });
        source.last_error = None;
        Ok(())
    }

    async fn record_fetch_error(&self, id: i64, error: Option<&str>) -> Result<(), StoreError> {
        if let Some(source) = self.lock().sources.get_mut(&id) {
            source.last_error = error.map(str::to_owned);
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn find_by_source_id(&self, source_id: i64) -> Result<Vec<ContentItem>, StoreError> {
        Ok(self
            .lock()
            .items
            .values()
            .filter(|item| item.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ContentItem>, StoreError> {
        Ok(self.lock().items.get(&id).cloned())
    }

    async fn create(&self, item: NewContentItem) -> Result<ContentItem, StoreError> {
        let mut state = self.lock();

        if !state.sources.contains_key(&item.source_id) {
            return Err(source_not_found(item.source_id));
        }
        let duplicate = state
            .items
            .values()
            .any(|existing| existing.source_id == item.source_id && existing.url == item.url);
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "item {} already stored for source {}",
                item.url, item.source_id
            )));
        }

        state.next_item_id += 1;
        let id = state.next_item_id;
        let created = ContentItem {
            id,
            source_id: item.source_id,
            title: item.title,
            url: item.url,
            body_text: item.body_text,
            body_html: item.body_html,
            author: item.author,
            published_at: item.published_at,
            status: item.status,
            priority: item.priority,
            metadata: item.metadata,
            created_at: Utc::now(),
        };
        state.items.insert(id, created.clone());
        Ok(created)
    }

    async fn set_status(&self, id: i64, status: ContentStatus) -> Result<(), StoreError> {
        let mut state = self.lock();
        let item = state.items.get_mut(&id).ok_or_else(|| item_not_found(id))?;
        item.status = status;
        Ok(())
    }

    async fn set_priority(&self, id: i64, priority: Priority) -> Result<(), StoreError> {
        let mut state = self.lock();
        let item = state.items.get_mut(&id).ok_or_else(|| item_not_found(id))?;
        item.priority = priority;
        Ok(())
    }
}
