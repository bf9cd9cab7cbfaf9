use async_trait::async_trait;
use chrono::Utc;

use super::schema::Database;
use super::store::SourceStore;
use super::types::{NewSource, Source, SourceRow, SourceUpdate, StoreError};

const SOURCE_COLUMNS: &str = "id, user_id, name, url, kind, is_active, refresh_rate, \
     last_fetched_at, last_error, settings, created_at";

impl Database {
    async fn fetch_source(&self, id: i64) -> Result<Option<Source>, StoreError> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SourceRow::into_source).transpose()
    }
}

#[async_trait]
impl SourceStore for Database {
    async fn find_by_id(&self, id: i64) -> Result<Option<Source>, StoreError> {
        self.fetch_source(id).await
    }

    async fn create(&self, source: NewSource) -> Result<Source, StoreError> {
        let now = Utc::now().timestamp_millis();
        let settings = serde_json::to_string(&source.settings)?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO sources
                (user_id, name, url, kind, is_active, refresh_rate, settings, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(&source.user_id)
        .bind(&source.name)
        .bind(&source.url)
        .bind(source.kind.as_str())
        .bind(source.is_active)
        .bind(i64::from(source.refresh_rate))
        .bind(&settings)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        tracing::debug!(source_id = id, url = %source.url, "Source created");

        self.fetch_source(id)
            .await?
            .ok_or(StoreError::NotFound { entity: "source", id })
    }

    async fn update(&self, id: i64, update: SourceUpdate) -> Result<Source, StoreError> {
        let settings = update
            .settings
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // COALESCE keeps the stored value for every field the update leaves as NULL
        let result = sqlx::query(
            r#"
            UPDATE sources SET
                name = COALESCE(?, name),
                is_active = COALESCE(?, is_active),
                refresh_rate = COALESCE(?, refresh_rate),
                settings = COALESCE(?, settings),
                updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(update.name.as_deref())
        .bind(update.is_active)
        .bind(update.refresh_rate.map(i64::from))
        .bind(settings.as_deref())
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "source", id });
        }

        self.fetch_source(id)
            .await?
            .ok_or(StoreError::NotFound { entity: "source", id })
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        // content_items rows go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Source>, StoreError> {
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE user_id = ? ORDER BY created_at, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SourceRow::into_source).collect()
    }

    async fn find_sources_to_refresh(
        &self,
        older_than_minutes: Option<u32>,
    ) -> Result<Vec<Source>, StoreError> {
        let now = Utc::now().timestamp_millis();

        // NULL override → each row's own refresh_rate is the threshold
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            r#"
            SELECT {SOURCE_COLUMNS} FROM sources
            WHERE is_active = 1
              AND (last_fetched_at IS NULL
                   OR last_fetched_at <= ? - COALESCE(?, refresh_rate) * 60000)
            ORDER BY last_fetched_at IS NOT NULL, last_fetched_at, id
        "#
        ))
        .bind(now)
        .bind(older_than_minutes.map(i64::from))
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(
            due = rows.len(),
            override_minutes = ?older_than_minutes,
            "Selected sources due for refresh"
        );

        rows.into_iter().map(SourceRow::into_source).collect()
    }

    async fn update_last_fetched(&self, id: i64) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE sources SET
                last_fetched_at = MAX(?, COALESCE(last_fetched_at + 1, 0)),
                last_error = NULL
            WHERE id = ?
        "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "source", id });
        }
        Ok(())
    }

    async fn record_fetch_error(&self, id: i64, error: Option<&str>) -> Result<(), StoreError> {
        sqlx::query("UPDATE sources SET last_error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
