use async_trait::async_trait;

use super::{DispatchError, NotificationSink};
use crate::feed::FeedItem;

/// Sink used when no webhook is configured: every item becomes an `info` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send_batch(&self, items: &[FeedItem]) -> Result<(), DispatchError> {
        for item in items {
            tracing::info!(
                guid = %item.guid,
                title = %item.title,
                link = %item.link,
                category = item.metadata.category.as_deref().unwrap_or("-"),
                "Found new release"
            );
        }
        Ok(())
    }
}
