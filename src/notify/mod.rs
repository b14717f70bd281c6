//! Notification delivery.
//!
//! A [`NotificationSink`] receives one batch of matched items at a time. The
//! dispatcher awaits every send before starting the next, so implementations never
//! see two batches in flight.

mod log_sink;
mod webhook;

use async_trait::async_trait;
use thiserror::Error;

use crate::feed::FeedItem;

pub use log_sink::LogSink;
pub use webhook::WebhookSink;

/// Failure to deliver one batch. Never retried.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Failed to encode message: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_batch(&self, items: &[FeedItem]) -> Result<(), DispatchError>;
}
