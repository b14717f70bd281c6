use tokio_util::sync::CancellationToken;

use crate::feed::FeedItem;
use crate::notify::NotificationSink;

/// Largest batch a single notification may carry.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Splits `items` into consecutive batches of at most `batch_size` items.
///
/// A `batch_size` of zero is treated as one.
pub fn partition(items: &[FeedItem], batch_size: usize) -> std::slice::Chunks<'_, FeedItem> {
    items.chunks(batch_size.max(1))
}

/// Outcome of dispatching one event's matched items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    /// Batches never attempted because shutdown was requested.
    pub undelivered: usize,
}

/// Sends matched items to a sink one batch at a time.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    batch_size: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl Dispatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Delivers `items` in order, awaiting each batch before starting the next.
    ///
    /// A failed batch is logged and skipped. Cancellation is checked between batches:
    /// a send already in progress completes, the remaining batches are dropped and
    /// counted as undelivered.
    pub async fn dispatch<S>(
        &self,
        sink: &S,
        items: &[FeedItem],
        cancel: &CancellationToken,
    ) -> DispatchReport
    where
        S: NotificationSink + ?Sized,
    {
        let batches: Vec<&[FeedItem]> = partition(items, self.batch_size).collect();
        let total = batches.len();
        let mut report = DispatchReport::default();

        for (index, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                report.undelivered = total - index;
                tracing::warn!(
                    undelivered = report.undelivered,
                    "Shutdown, {} batches undelivered",
                    report.undelivered
                );
                break;
            }

            match sink.send_batch(batch).await {
                Ok(()) => {
                    report.delivered += 1;
                    tracing::debug!(batch_index = index, batch_size = batch.len(), "Batch delivered");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        tick = %chrono::Utc::now().to_rfc3339(),
                        batch_index = index,
                        batch_size = batch.len(),
                        error = %e,
                        "Failed to deliver batch"
                    );
                }
            }
        }

        report
    }
}
