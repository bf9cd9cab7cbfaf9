use async_trait::async_trait;
use chrono::Utc;

use super::schema::Database;
use super::store::ContentStore;
use super::types::{ContentItem, ContentRow, ContentStatus, NewContentItem, Priority, StoreError};

const CONTENT_COLUMNS: &str = "id, source_id, title, url, body_text, body_html, author, \
     published_at, status, priority, metadata, created_at";

impl Database {
    async fn set_content_column(
        &self,
        id: i64,
        column: &'static str,
        value: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(&format!("UPDATE content_items SET {column} = ? WHERE id = ?"))
            .bind(value)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "content item",
                id,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for Database {
    async fn find_by_source_id(&self, source_id: i64) -> Result<Vec<ContentItem>, StoreError> {
        let rows = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE source_id = ? \
             ORDER BY published_at DESC, id DESC"
        ))
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ContentRow::into_item).collect()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ContentItem>, StoreError> {
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ContentRow::into_item).transpose()
    }

    async fn create(&self, item: NewContentItem) -> Result<ContentItem, StoreError> {
        let metadata = serde_json::to_string(&item.metadata)?;

        let row = sqlx::query_as::<_, ContentRow>(&format!(
            r#"
            INSERT INTO content_items
                (source_id, title, url, body_text, body_html, author,
                 published_at, status, priority, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {CONTENT_COLUMNS}
        "#
        ))
        .bind(item.source_id)
        .bind(&item.title)
        .bind(&item.url)
        .bind(&item.body_text)
        .bind(&item.body_html)
        .bind(item.author.as_deref())
        .bind(item.published_at.timestamp_millis())
        .bind(item.status.as_str())
        .bind(item.priority.as_str())
        .bind(&metadata)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        row.into_item()
    }

    async fn set_status(&self, id: i64, status: ContentStatus) -> Result<(), StoreError> {
        self.set_content_column(id, "status", status.as_str()).await
    }

    async fn set_priority(&self, id: i64, priority: Priority) -> Result<(), StoreError> {
        self.set_content_column(id, "priority", priority.as_str())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ContentMetadata, NewSource, SourceKind, SourceSettings, SourceStore};
    use chrono::TimeZone;

    async fn db_with_source() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let source = SourceStore::create(
            &db,
            NewSource {
                user_id: "u1".to_string(),
                name: "Test".to_string(),
                url: "https://example.com/feed.xml".to_string(),
                kind: SourceKind::Rss,
                is_active: true,
                refresh_rate: 60,
                settings: SourceSettings::default(),
            },
        )
        .await
        .unwrap();
        (db, source.id)
    }

    fn new_item(source_id: i64, url: &str) -> NewContentItem {
        NewContentItem {
            source_id,
            title: "Post".to_string(),
            url: url.to_string(),
            body_text: "Hello world".to_string(),
            body_html: "<p>Hello world</p>".to_string(),
            author: Some("Ada".to_string()),
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            status: ContentStatus::Unread,
            priority: Priority::Medium,
            metadata: ContentMetadata {
                read_time_minutes: 1,
                categories: vec!["rust".to_string()],
                feed_item_id: Some("guid-1".to_string()),
            },
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (db, source_id) = db_with_source().await;
        let created = ContentStore::create(&db, new_item(source_id, "https://example.com/1"))
            .await
            .unwrap();

        assert_eq!(created.status, ContentStatus::Unread);
        assert_eq!(created.metadata.categories, vec!["rust".to_string()]);

        let items = db.find_by_source_id(source_id).await.unwrap();
        assert_eq!(items, vec![created]);
    }

    #[tokio::test]
    async fn test_duplicate_url_is_conflict() {
        let (db, source_id) = db_with_source().await;
        ContentStore::create(&db, new_item(source_id, "https://example.com/1"))
            .await
            .unwrap();

        let err = ContentStore::create(&db, new_item(source_id, "https://example.com/1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_set_status_and_priority() {
        let (db, source_id) = db_with_source().await;
        let item = ContentStore::create(&db, new_item(source_id, "https://example.com/1"))
            .await
            .unwrap();

        db.set_status(item.id, ContentStatus::Read).await.unwrap();
        db.set_priority(item.id, Priority::Urgent).await.unwrap();

        let stored = ContentStore::find_by_id(&db, item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ContentStatus::Read);
        assert_eq!(stored.priority, Priority::Urgent);

        assert!(db.set_status(item.id + 1, ContentStatus::Read).await.is_err());
    }

    #[tokio::test]
    async fn test_source_delete_cascades() {
        let (db, source_id) = db_with_source().await;
        ContentStore::create(&db, new_item(source_id, "https://example.com/1"))
            .await
            .unwrap();
        ContentStore::create(&db, new_item(source_id, "https://example.com/2"))
            .await
            .unwrap();

        SourceStore::delete(&db, source_id).await.unwrap();
        assert!(db.find_by_source_id(source_id).await.unwrap().is_empty());
    }
}
