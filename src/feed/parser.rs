use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Link, Person};
use feed_rs::parser;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::util::{html_to_text, strip_control_chars};

#[derive(Debug, Error)]
#[error("Feed parse failed: {0}")]
pub struct ParseError(#[from] feed_rs::parser::ParseFeedError);

/// Feed-level metadata plus entries in document order.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    /// The entry's own id, or a SHA-256 of link|title|published when absent.
    pub guid: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub body_html: String,
    pub body_text: String,
    pub author: Option<String>,
    pub categories: Vec<String>,
}

/// Parse RSS 0.9x/1.0/2.0, Atom or JSON Feed bytes.
///
/// Feed-supplied strings have control characters stripped.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let feed = parser::parse(bytes)?;

    let title = feed
        .title
        .map(|t| clean(&t.content))
        .filter(|t| !t.trim().is_empty());

    let items = feed.entries.into_iter().map(parse_entry).collect();

    Ok(ParsedFeed { title, items })
}

fn parse_entry(entry: Entry) -> ParsedItem {
    let link = pick_link(&entry.links).map(|href| clean(href.trim()));
    let published = entry.published.or(entry.updated);
    let title = entry
        .title
        .map(|t| clean(t.content.trim()))
        .filter(|t| !t.is_empty());

    // content:encoded / atom:content beats description / summary
    let body_html = entry
        .content
        .and_then(|c| c.body)
        .or_else(|| entry.summary.map(|s| s.content))
        .map(|html| clean(&html))
        .unwrap_or_default();
    let body_text = html_to_text(&body_html);

    let author = entry.authors.iter().find_map(author_name);

    let categories = entry
        .categories
        .into_iter()
        .map(|c| clean(c.label.as_deref().unwrap_or(&c.term).trim()))
        .filter(|c| !c.is_empty())
        .collect();

    let existing_id = if entry.id.is_empty() {
        None
    } else {
        Some(entry.id.as_str())
    };
    let guid = generate_guid(
        existing_id,
        link.as_deref(),
        title.as_deref().unwrap_or(""),
        published,
    );

    ParsedItem {
        guid,
        title,
        link: link.filter(|l| !l.is_empty()),
        published,
        body_html,
        body_text,
        author,
        categories,
    }
}

/// Display name for an entry author.
///
/// feed-rs reports RSS `<author>` as a person literally named "author" with
/// the element text (`email (Name)` by convention) in `email`. Atom names and
/// `dc:creator` come through as real names.
fn author_name(person: &Person) -> Option<String> {
    let name = person.name.trim();
    let raw = if name.is_empty() || name.eq_ignore_ascii_case("author") {
        let email = person.email.as_deref()?.trim();
        email
            .strip_suffix(')')
            .and_then(|rest| rest.split_once('('))
            .map(|(_, display)| display.trim())
            .filter(|display| !display.is_empty())
            .unwrap_or(email)
    } else {
        name
    };

    Some(clean(raw)).filter(|a| !a.is_empty())
}

/// The entry's permalink: an `alternate` (or rel-less) link, else the first.
fn pick_link(links: &[Link]) -> Option<&str> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.as_str())
}

fn clean(s: &str) -> String {
    strip_control_chars(s).into_owned()
}

fn generate_guid(
    existing: Option<&str>,
    url: Option<&str>,
    title: &str,
    published: Option<DateTime<Utc>>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        url.unwrap_or(""),
        title,
        published.map(|p| p.timestamp().to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
