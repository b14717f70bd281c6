use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;

use super::{DispatchError, NotificationSink};
use crate::feed::FeedItem;

const EMBED_COLOR: u32 = 0x3582F7;
const AUTHOR_NAME: &str = "Found new release!";
const AUTHOR_URL: &str = "https://nyaa.si/";
const AUTHOR_ICON: &str = "https://nyaa.si/static/favicon.png";

/// Posts each batch as one Discord-compatible webhook message, one embed per item.
pub struct WebhookSink {
    client: reqwest::Client,
    url: SecretString,
    timeout: Duration,
}

impl std::fmt::Debug for WebhookSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSink")
            .field("url", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    embeds: Vec<Embed<'a>>,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    url: &'a str,
    color: u32,
    author: EmbedAuthor,
    fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedAuthor {
    name: &'static str,
    url: &'static str,
    icon_url: &'static str,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: &'static str,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedFooter<'a> {
    text: &'a str,
}

impl WebhookSink {
    pub fn new(client: reqwest::Client, url: SecretString, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }
}

fn count(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string())
}

fn embed(item: &FeedItem) -> Embed<'_> {
    let meta = &item.metadata;
    let size = meta.size.as_deref().unwrap_or("download");

    Embed {
        title: &item.title,
        url: &item.guid,
        color: EMBED_COLOR,
        author: EmbedAuthor {
            name: AUTHOR_NAME,
            url: AUTHOR_URL,
            icon_url: AUTHOR_ICON,
        },
        fields: vec![
            EmbedField {
                name: "⬆️ Seeders",
                value: count(meta.seeders),
                inline: true,
            },
            EmbedField {
                name: "⬇️ Leechers",
                value: count(meta.leechers),
                inline: true,
            },
            EmbedField {
                name: "✅ Downloads",
                value: count(meta.downloads),
                inline: true,
            },
            EmbedField {
                name: "Torrent File",
                value: format!("[{}]({})", size, item.link),
                inline: false,
            },
        ],
        footer: meta.category.as_deref().map(|text| EmbedFooter { text }),
        timestamp: item.published_at.map(|dt| dt.to_rfc3339()),
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send_batch(&self, items: &[FeedItem]) -> Result<(), DispatchError> {
        let message = WebhookMessage {
            embeds: items.iter().map(embed).collect(),
        };
        let body = serde_json::to_vec(&message)?;

        let request = self
            .client
            .post(self.url.expose_secret())
            .header("Content-Type", "application/json")
            .body(body);

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| DispatchError::Timeout)?
            .map_err(DispatchError::Network)?;

        if !response.status().is_success() {
            return Err(DispatchError::HttpStatus(response.status().as_u16()));
        }

        tracing::debug!(items = items.len(), "Webhook batch delivered");
        Ok(())
    }
}
