use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::{FeedItem, ItemMetadata};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed feed XML: {0}")]
    Xml(String),
    #[error("Feed has no <channel> element")]
    MissingChannel,
}

impl From<quick_xml::DeError> for ParseError {
    fn from(err: quick_xml::DeError) -> Self {
        ParseError::Xml(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RawRss {
    channel: Option<RawChannel>,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    #[serde(default, rename = "item")]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawGuid {
    #[serde(rename = "$text", default)]
    value: String,
}

// Extension elements are read as text and converted afterwards so that an empty
// `<nyaa:seeders/>` degrades to `None` instead of failing the whole payload.
// The deserializer matches on local names, so the `nyaa:` prefix is not part of the rename.
#[derive(Debug, Deserialize)]
struct RawItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<RawGuid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    seeders: Option<String>,
    leechers: Option<String>,
    downloads: Option<String>,
    #[serde(rename = "infoHash")]
    info_hash: Option<String>,
    #[serde(rename = "categoryId")]
    category_id: Option<String>,
    category: Option<String>,
    size: Option<String>,
    comments: Option<String>,
    trusted: Option<String>,
    remake: Option<String>,
    description: Option<String>,
}

/// Parses an RSS 2.0 payload into feed items, preserving document order (newest first).
///
/// # Errors
///
/// - [`ParseError::Xml`] when the payload is not well-formed or has the wrong shape
/// - [`ParseError::MissingChannel`] when the root element carries no `<channel>`
pub fn parse_feed(raw: &str) -> Result<Vec<FeedItem>, ParseError> {
    let rss: RawRss = quick_xml::de::from_str(raw)?;
    let channel = rss.channel.ok_or(ParseError::MissingChannel)?;

    let items = channel.items.into_iter().map(into_item).collect();
    Ok(items)
}

fn into_item(raw: RawItem) -> FeedItem {
    let title = non_empty(raw.title).unwrap_or_else(|| "Untitled".to_string());
    let link = non_empty(raw.link).unwrap_or_default();
    let published_at = raw.pub_date.as_deref().and_then(parse_pub_date);

    let existing = raw.guid.map(|g| g.value);
    let guid = generate_guid(existing.as_deref(), &link, &title, raw.pub_date.as_deref());

    FeedItem {
        guid,
        title,
        link,
        published_at,
        metadata: ItemMetadata {
            seeders: parse_count(raw.seeders),
            leechers: parse_count(raw.leechers),
            downloads: parse_count(raw.downloads),
            info_hash: non_empty(raw.info_hash),
            category_id: non_empty(raw.category_id),
            category: non_empty(raw.category),
            size: non_empty(raw.size),
            comments: parse_count(raw.comments),
            trusted: parse_flag(raw.trusted),
            remake: parse_flag(raw.remake),
            description: non_empty(raw.description),
        },
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_count(value: Option<String>) -> Option<u64> {
    value.and_then(|v| v.trim().parse().ok())
}

fn parse_flag(value: Option<String>) -> Option<bool> {
    match value?.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Some(true),
        "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_pub_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn generate_guid(existing: Option<&str>, link: &str, title: &str, pub_date: Option<&str>) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!("{}|{}|{}", link, title, pub_date.unwrap_or(""));
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
