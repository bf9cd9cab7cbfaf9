//! Utility functions shared by the ingestion engines.
//!
//! - **URL normalization**: scheme defaulting plus an outbound host policy
//!   that keeps fetches away from internal addresses
//! - **Text processing**: control-character stripping, HTML flattening and
//!   read-time estimation for ingested items

mod text;
mod url_validator;

pub use text::{estimate_read_time, html_to_text, strip_control_chars, word_count};
pub use url_validator::{normalize_feed_url, HostPolicy, UrlError};
