use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Lower bound (inclusive) of a source's refresh cadence, in minutes.
pub const MIN_REFRESH_RATE: u32 = 5;
/// Upper bound (inclusive) of a source's refresh cadence, in minutes.
pub const MAX_REFRESH_RATE: u32 = 1440;
/// Cadence used when neither caller nor configuration supplies one.
pub const DEFAULT_REFRESH_RATE: u32 = 60;

/// Whether a refresh cadence lies within `[MIN_REFRESH_RATE, MAX_REFRESH_RATE]`.
pub fn refresh_rate_in_bounds(minutes: u32) -> bool {
    (MIN_REFRESH_RATE..=MAX_REFRESH_RATE).contains(&minutes)
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by source and content stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A uniqueness constraint rejected the write (e.g. duplicate item URL).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Stored value could not be decoded: {0}")]
    Corrupt(String),

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map sqlx errors, lifting unique-constraint violations into `Conflict`.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(db_err.message().to_owned());
            }
        }
        StoreError::Database(err)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Kind of source a user registered. Only `Rss` (which covers Atom) is
/// fetched; the others are recorded for later support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceKind {
    #[default]
    Rss,
    Podcast,
    Newsletter,
    Website,
}

/// Reading state of an ingested item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentStatus {
    #[default]
    Unread,
    Read,
    Archived,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Text codec shared by the enums above, used for SQLite columns.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(StoreError::Corrupt(format!(
                        concat!("unknown ", stringify!($ty), " {:?}"),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(SourceKind {
    Rss => "RSS",
    Podcast => "PODCAST",
    Newsletter => "NEWSLETTER",
    Website => "WEBSITE",
});

text_enum!(ContentStatus {
    Unread => "UNREAD",
    Read => "READ",
    Archived => "ARCHIVED",
    Deleted => "DELETED",
});

text_enum!(Priority {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
    Urgent => "URGENT",
});

// ============================================================================
// Data Structures
// ============================================================================

/// Free-form per-source settings. Keys other than `fetchFullText` are kept
/// verbatim so clients can store their own flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSettings {
    #[serde(default)]
    pub fetch_full_text: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A feed a user follows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub is_active: bool,
    /// Minimum minutes between refreshes.
    pub refresh_rate: u32,
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Message of the most recent failed fetch, cleared on success.
    pub last_error: Option<String>,
    pub settings: SourceSettings,
    pub created_at: DateTime<Utc>,
}

/// Fields for a source about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSource {
    pub user_id: String,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub is_active: bool,
    pub refresh_rate: u32,
    pub settings: SourceSettings,
}

/// Partial update applied by user edits. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUpdate {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub refresh_rate: Option<u32>,
    pub settings: Option<SourceSettings>,
}

/// Extra facts captured about an ingested item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    pub read_time_minutes: u32,
    #[serde(default)]
    pub categories: Vec<String>,
    /// GUID / Atom id the feed assigned to this entry.
    pub feed_item_id: Option<String>,
}

/// One ingested feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    /// De-duplication key within a source.
    pub url: String,
    pub body_text: String,
    pub body_html: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub status: ContentStatus,
    pub priority: Priority,
    pub metadata: ContentMetadata,
    pub created_at: DateTime<Utc>,
}

/// Fields for an item about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContentItem {
    pub source_id: i64,
    pub title: String,
    pub url: String,
    pub body_text: String,
    pub body_html: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub status: ContentStatus,
    pub priority: Priority,
    pub metadata: ContentMetadata,
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for source queries (used by sqlx FromRow).
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SourceRow {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub url: String,
    pub kind: String,
    pub is_active: bool,
    pub refresh_rate: i64,
    pub last_fetched_at: Option<i64>,
    pub last_error: Option<String>,
    pub settings: String,
    pub created_at: i64,
}

impl SourceRow {
    pub(crate) fn into_source(self) -> Result<Source, StoreError> {
        Ok(Source {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            url: self.url,
            kind: self.kind.parse()?,
            is_active: self.is_active,
            refresh_rate: u32::try_from(self.refresh_rate)
                .map_err(|_| StoreError::Corrupt(format!("refresh_rate {}", self.refresh_rate)))?,
            last_fetched_at: self.last_fetched_at.map(millis_to_datetime).transpose()?,
            last_error: self.last_error,
            settings: serde_json::from_str(&self.settings)?,
            created_at: millis_to_datetime(self.created_at)?,
        })
    }
}

/// Internal row type for content item queries.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ContentRow {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub url: String,
    pub body_text: String,
    pub body_html: String,
    pub author: Option<String>,
    pub published_at: i64,
    pub status: String,
    pub priority: String,
    pub metadata: String,
    pub created_at: i64,
}

impl ContentRow {
    pub(crate) fn into_item(self) -> Result<ContentItem, StoreError> {
        Ok(ContentItem {
            id: self.id,
            source_id: self.source_id,
            title: self.title,
            url: self.url,
            body_text: self.body_text,
            body_html: self.body_html,
            author: self.author,
            published_at: millis_to_datetime(self.published_at)?,
            status: self.status.parse()?,
            priority: self.priority.parse()?,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: millis_to_datetime(self.created_at)?,
        })
    }
}

pub(crate) fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {millis}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_refresh_rate_bounds() {
        assert!(!refresh_rate_in_bounds(4));
        assert!(refresh_rate_in_bounds(5));
        assert!(refresh_rate_in_bounds(1440));
        assert!(!refresh_rate_in_bounds(1441));
    }

    #[test]
    fn test_enum_text_codec() {
        assert_eq!(SourceKind::Rss.as_str(), "RSS");
        assert_eq!("NEWSLETTER".parse::<SourceKind>().unwrap(), SourceKind::Newsletter);
        assert_eq!("ARCHIVED".parse::<ContentStatus>().unwrap(), ContentStatus::Archived);
        assert_eq!(Priority::Urgent.to_string(), "URGENT");
        assert!(matches!("rss".parse::<SourceKind>(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_defaults_for_new_items() {
        assert_eq!(ContentStatus::default(), ContentStatus::Unread);
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!(SourceKind::default(), SourceKind::Rss);
    }

    #[test]
    fn test_settings_json_shape() {
        let settings = SourceSettings::default();
        assert_eq!(
            serde_json::to_value(&settings).unwrap(),
            serde_json::json!({ "fetchFullText": false })
        );

        let parsed: SourceSettings =
            serde_json::from_str(r#"{"fetchFullText": true, "tag": "news"}"#).unwrap();
        assert!(parsed.fetch_full_text);
        assert_eq!(parsed.extra.get("tag"), Some(&serde_json::json!("news")));
    }

    #[test]
    fn test_millis_roundtrip_boundary() {
        let dt = millis_to_datetime(1_704_067_200_123).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_704_067_200_123);
    }
}
