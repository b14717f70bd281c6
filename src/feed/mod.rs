//! Feed model, transport and parsing.
//!
//! This module provides everything the watcher needs to observe the upstream feed:
//!
//! - **Model**: [`FeedItem`] entries (newest first) and the [`FeedSnapshot`] comparison unit
//! - **Fetching**: [`FeedSource`] capability with the HTTP implementation [`HttpFeedSource`]
//! - **Parsing**: [`parse_feed`] turns an RSS 2.0 payload into ordered [`FeedItem`]s
//!
//! # Example
//!
//! ```ignore
//! use nyaawatch::feed::{parse_feed, FeedSource, HttpFeedSource};
//!
//! let source = HttpFeedSource::new(client, "https://nyaa.si/?page=rss", limits);
//! let raw = source.fetch().await?;
//! let items = parse_feed(&raw)?;
//! ```

mod fetcher;
mod parser;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use fetcher::{FetchError, FetchLimits, HttpFeedSource};
pub use parser::{parse_feed, ParseError};

/// One published entry of the feed.
///
/// `guid` is the identity used for diffing. Everything in [`ItemMetadata`] is carried
/// through the pipeline untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub metadata: ItemMetadata,
}

/// Pass-through fields from the tracker's RSS extension namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemMetadata {
    pub seeders: Option<u64>,
    pub leechers: Option<u64>,
    pub downloads: Option<u64>,
    pub info_hash: Option<String>,
    pub category_id: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub comments: Option<u64>,
    pub trusted: Option<bool>,
    pub remake: Option<bool>,
    pub description: Option<String>,
}

/// Last observed state of the feed.
///
/// `raw` is only used for the cheap "did anything change" check; `items` is the parsed
/// form of exactly that payload.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub raw: String,
    pub items: Vec<FeedItem>,
}

impl FeedSnapshot {
    pub fn new(raw: String, items: Vec<FeedItem>) -> Self {
        Self { raw, items }
    }

    /// True when `raw` is textually identical to the stored payload.
    pub fn is_unchanged(&self, raw: &str) -> bool {
        self.raw == raw
    }

    /// Guid of the newest item, if the snapshot holds any.
    pub fn head_guid(&self) -> Option<&str> {
        self.items.first().map(|item| item.guid.as_str())
    }
}

/// Source of raw feed payloads.
///
/// The `#[async_trait]` macro keeps the trait object-safe so tests and the binary can
/// hand the watcher either the HTTP source or an in-memory script.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<String, FetchError>;
}
