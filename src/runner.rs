//! Drives watcher events through matching and dispatch.

use futures::{pin_mut, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::notify::NotificationSink;
use crate::pipeline::{match_subscriptions, Dispatcher};
use crate::storage::SubscriptionSource;
use crate::watcher::ChangeEvent;

/// Totals accumulated over the lifetime of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub events: usize,
    pub new_items: usize,
    pub matched_items: usize,
    pub delivered_batches: usize,
    pub failed_batches: usize,
    pub undelivered_batches: usize,
}

/// Consumes `events` until the stream ends.
///
/// Each event is handled completely (subscriptions listed, items matched, every batch
/// dispatched) before the next event is requested. Subscriptions are listed fresh for
/// every event; if listing fails the event is logged and dropped.
pub async fn run<E, Sub, Sink>(
    events: E,
    subscriptions: &Sub,
    sink: &Sink,
    dispatcher: Dispatcher,
    cancel: &CancellationToken,
) -> RunStats
where
    E: Stream<Item = ChangeEvent>,
    Sub: SubscriptionSource + ?Sized,
    Sink: NotificationSink + ?Sized,
{
    pin_mut!(events);
    let mut stats = RunStats::default();

    while let Some(event) = events.next().await {
        stats.events += 1;
        stats.new_items += event.items.len();
        tracing::info!(
            tick = %event.tick.to_rfc3339(),
            new_items = event.items.len(),
            "Found {} new releases",
            event.items.len()
        );

        let subs = match subscriptions.list_subscriptions().await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(
                    tick = %event.tick.to_rfc3339(),
                    error = %e,
                    dropped_items = event.items.len(),
                    "Failed to list subscriptions, skipping event"
                );
                continue;
            }
        };

        let matched = match_subscriptions(&subs, &event.items);
        if matched.is_empty() {
            tracing::info!(subscriptions = subs.len(), "Matched no entries");
            continue;
        }

        stats.matched_items += matched.len();
        tracing::info!(
            matched = matched.len(),
            subscriptions = subs.len(),
            "Matched {} entries",
            matched.len()
        );

        let report = dispatcher.dispatch(sink, &matched, cancel).await;
        stats.delivered_batches += report.delivered;
        stats.failed_batches += report.failed;
        stats.undelivered_batches += report.undelivered;
    }

    tracing::info!(
        events = stats.events,
        matched = stats.matched_items,
        delivered_batches = stats.delivered_batches,
        failed_batches = stats.failed_batches,
        undelivered_batches = stats.undelivered_batches,
        "Watch loop stopped"
    );
    stats
}
