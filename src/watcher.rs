//! Polling loop over the upstream feed.
//!
//! [`FeedWatcher`] owns the only [`FeedSnapshot`] and turns successive fetches into a
//! lazy stream of [`ChangeEvent`]s. One tick is fetch → compare → parse → diff; the
//! stream is consumed one event at a time, so ticks never overlap.

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::feed::{FeedItem, FeedSnapshot, FeedSource, ParseError};
use crate::pipeline::diff_changes;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Newly published items observed on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub tick: DateTime<Utc>,
    /// Newest first, never empty.
    pub items: Vec<FeedItem>,
    /// The previous head was not found, some releases may have been missed.
    pub gap: bool,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// First successful fetch; the snapshot now exists.
    Initialized { items: usize },
    /// Payload textually identical to the snapshot.
    Unchanged,
    /// Payload changed but no item was added at the head.
    NoNewItems,
    Changed(ChangeEvent),
    /// Payload parsed to no items while the snapshot still holds some; the snapshot is kept
    /// as the diff reference.
    EmptyFeed,
    FetchFailed,
    ParseFailed,
}

pub struct FeedWatcher<S, P> {
    source: S,
    parse: P,
    interval: Duration,
    snapshot: Option<FeedSnapshot>,
}

impl<S, P> FeedWatcher<S, P>
where
    S: FeedSource,
    P: Fn(&str) -> Result<Vec<FeedItem>, ParseError> + Send + Sync,
{
    /// Intervals below one millisecond are raised to one millisecond.
    pub fn new(source: S, parse: P, interval: Duration) -> Self {
        Self {
            source,
            parse,
            interval: interval.max(Duration::from_millis(1)),
            snapshot: None,
        }
    }

    pub fn snapshot(&self) -> Option<&FeedSnapshot> {
        self.snapshot.as_ref()
    }

    /// Runs one tick.
    ///
    /// Failures are logged and leave the snapshot untouched so the next tick retries.
    /// The snapshot is only replaced after the new payload parsed successfully, and never
    /// by an empty item list once items have been seen.
    pub async fn poll(&mut self) -> TickOutcome {
        let tick = Utc::now();

        let raw = match self.source.fetch().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    tick = %tick.to_rfc3339(),
                    kind = "fetch",
                    error = %e,
                    "Feed fetch failed, keeping previous snapshot"
                );
                return TickOutcome::FetchFailed;
            }
        };

        if let Some(snapshot) = &self.snapshot {
            if snapshot.is_unchanged(&raw) {
                tracing::trace!(tick = %tick.to_rfc3339(), "Feed unchanged");
                return TickOutcome::Unchanged;
            }
        }

        let items = match (self.parse)(&raw) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(
                    tick = %tick.to_rfc3339(),
                    kind = "parse",
                    error = %e,
                    "Feed parse failed, keeping previous snapshot"
                );
                return TickOutcome::ParseFailed;
            }
        };

        let previous_len = self.snapshot.as_ref().map_or(0, |s| s.items.len());
        if items.is_empty() && previous_len > 0 {
            tracing::warn!(
                tick = %tick.to_rfc3339(),
                kind = "empty",
                previous_items = previous_len,
                "Feed returned no items, keeping previous snapshot"
            );
            return TickOutcome::EmptyFeed;
        }

        let Some(previous) = self.snapshot.replace(FeedSnapshot::new(raw, items)) else {
            let count = self.snapshot.as_ref().map_or(0, |s| s.items.len());
            tracing::info!(items = count, "Initial feed snapshot established");
            return TickOutcome::Initialized { items: count };
        };

        let current = self.snapshot.as_ref().map_or(&[][..], |s| s.items.as_slice());
        let diff = diff_changes(&previous.items, current);
        if diff.is_empty() {
            tracing::debug!(tick = %tick.to_rfc3339(), "Feed changed without new items");
            return TickOutcome::NoNewItems;
        }

        tracing::info!(
            tick = %tick.to_rfc3339(),
            new_items = diff.items.len(),
            gap = diff.gap,
            "Found new releases"
        );
        TickOutcome::Changed(ChangeEvent {
            tick,
            items: diff.items,
            gap: diff.gap,
        })
    }

    /// Turns the watcher into an endless stream of change events.
    ///
    /// The first tick fires immediately; later ticks follow the interval. If the consumer
    /// holds an event longer than the interval, the next tick fires as soon as it asks
    /// for more and the schedule restarts from there. The stream ends only when `cancel`
    /// fires, which is observed while waiting for the timer or for a fetch.
    pub fn watch(self, cancel: CancellationToken) -> impl Stream<Item = ChangeEvent> + Send
    where
        S: 'static,
        P: 'static,
    {
        let state = (self, None::<Interval>, cancel);

        stream::unfold(state, |(mut watcher, ticker, cancel)| async move {
            let mut ticker = ticker.unwrap_or_else(|| {
                let mut ticker = tokio::time::interval(watcher.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!("Feed watcher cancelled");
                        return None;
                    }
                    _ = ticker.tick() => {}
                }

                // Dropping an in-flight fetch is safe: the snapshot is only touched after it returns.
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!("Feed watcher cancelled during fetch");
                        return None;
                    }
                    outcome = watcher.poll() => outcome,
                };

                if let TickOutcome::Changed(event) = outcome {
                    return Some((event, (watcher, Some(ticker), cancel)));
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FetchError, ItemMetadata};
    use async_trait::async_trait;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Replays scripted fetch results; repeats the last payload once exhausted.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        script: Arc<Mutex<VecDeque<Result<String, u16>>>>,
        last: Arc<Mutex<Option<String>>>,
        fetched_at: Arc<Mutex<Vec<Instant>>>,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Result<&str, u16>>) -> Self {
            let script = steps
                .into_iter()
                .map(|s| s.map(str::to_string))
                .collect();
            Self {
                script: Arc::new(Mutex::new(script)),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn fetch(&self) -> Result<String, FetchError> {
            self.fetched_at.lock().unwrap().push(Instant::now());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(raw)) => {
                    *self.last.lock().unwrap() = Some(raw.clone());
                    Ok(raw)
                }
                Some(Err(status)) => Err(FetchError::HttpStatus(status)),
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .ok_or(FetchError::HttpStatus(503)),
            }
        }
    }

    /// "3,2,1" → items with those guids; anything starting with '!' fails to parse.
    fn parse_guids(raw: &str) -> Result<Vec<FeedItem>, ParseError> {
        if raw.starts_with('!') {
            return Err(ParseError::Xml("scripted failure".to_string()));
        }
        Ok(raw
            .split(',')
            .filter(|g| !g.is_empty())
            .map(|g| FeedItem {
                guid: g.to_string(),
                title: format!("Release {}", g),
                link: String::new(),
                published_at: None,
                metadata: ItemMetadata::default(),
            })
            .collect())
    }

    fn guids(event: &ChangeEvent) -> Vec<&str> {
        event.items.iter().map(|i| i.guid.as_str()).collect()
    }

    #[tokio::test]
    async fn test_first_poll_initializes_without_event() {
        let source = ScriptedSource::new(vec![Ok("5,4,3")]);
        let mut watcher = FeedWatcher::new(source, parse_guids, DEFAULT_POLL_INTERVAL);

        assert_eq!(watcher.poll().await, TickOutcome::Initialized { items: 3 });
        assert_eq!(watcher.snapshot().and_then(|s| s.head_guid()), Some("5"));
    }

    #[tokio::test]
    async fn test_changed_payload_emits_diff() {
        let source = ScriptedSource::new(vec![Ok("5,4,3"), Ok("7,6,5,4,3")]);
        let mut watcher = FeedWatcher::new(source, parse_guids, DEFAULT_POLL_INTERVAL);

        watcher.poll().await;
        match watcher.poll().await {
            TickOutcome::Changed(event) => {
                assert_eq!(guids(&event), vec!["7", "6"]);
                assert!(!event.gap);
            }
            other => panic!("Expected Changed, got {:?}", other),
        }
        assert_eq!(watcher.snapshot().unwrap().raw, "7,6,5,4,3");
    }

    #[tokio::test]
    async fn test_unchanged_payload_skips_parsing() {
        let parses = Arc::new(AtomicUsize::new(0));
        let counter = parses.clone();
        let parse = move |raw: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            parse_guids(raw)
        };

        let source = ScriptedSource::new(vec![Ok("2,1"), Ok("2,1")]);
        let mut watcher = FeedWatcher::new(source, parse, DEFAULT_POLL_INTERVAL);

        watcher.poll().await;
        assert_eq!(watcher.poll().await, TickOutcome::Unchanged);
        assert_eq!(parses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changed_payload_same_head_is_no_new_items() {
        let source = ScriptedSource::new(vec![Ok("2,1"), Ok("2,1,")]);
        let mut watcher = FeedWatcher::new(source, parse_guids, DEFAULT_POLL_INTERVAL);

        watcher.poll().await;
        assert_eq!(watcher.poll().await, TickOutcome::NoNewItems);
        assert_eq!(watcher.snapshot().unwrap().raw, "2,1,");
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_snapshot_and_recovers() {
        let source = ScriptedSource::new(vec![Ok("2,1"), Err(502), Ok("3,2,1")]);
        let mut watcher = FeedWatcher::new(source, parse_guids, DEFAULT_POLL_INTERVAL);

        watcher.poll().await;
        assert_eq!(watcher.poll().await, TickOutcome::FetchFailed);
        assert_eq!(watcher.snapshot().unwrap().raw, "2,1");

        match watcher.poll().await {
            TickOutcome::Changed(event) => assert_eq!(guids(&event), vec!["3"]),
            other => panic!("Expected Changed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_parse_failure_keeps_snapshot() {
        let source = ScriptedSource::new(vec![Ok("2,1"), Ok("!garbage"), Ok("4,3,2,1")]);
        let mut watcher = FeedWatcher::new(source, parse_guids, DEFAULT_POLL_INTERVAL);

        watcher.poll().await;
        assert_eq!(watcher.poll().await, TickOutcome::ParseFailed);
        assert_eq!(watcher.snapshot().unwrap().raw, "2,1");

        match watcher.poll().await {
            TickOutcome::Changed(event) => assert_eq!(guids(&event), vec!["4", "3"]),
            other => panic!("Expected Changed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_feed_keeps_previous_items_as_reference() {
        let source = ScriptedSource::new(vec![Ok("2,1"), Ok(""), Ok("3,2,1")]);
        let mut watcher = FeedWatcher::new(source, parse_guids, DEFAULT_POLL_INTERVAL);

        watcher.poll().await;
        assert_eq!(watcher.poll().await, TickOutcome::EmptyFeed);
        assert_eq!(watcher.snapshot().unwrap().raw, "2,1");

        match watcher.poll().await {
            TickOutcome::Changed(event) => {
                assert_eq!(guids(&event), vec!["3"]);
                assert!(!event.gap);
            }
            other => panic!("Expected Changed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_first_payload_initializes() {
        let source = ScriptedSource::new(vec![Ok(""), Ok("1")]);
        let mut watcher = FeedWatcher::new(source, parse_guids, DEFAULT_POLL_INTERVAL);

        assert_eq!(watcher.poll().await, TickOutcome::Initialized { items: 0 });
        assert_eq!(watcher.poll().await, TickOutcome::NoNewItems);
    }

    #[tokio::test]
    async fn test_initial_fetch_failure_retries_initialization() {
        let source = ScriptedSource::new(vec![Err(500), Ok("1")]);
        let mut watcher = FeedWatcher::new(source, parse_guids, DEFAULT_POLL_INTERVAL);

        assert_eq!(watcher.poll().await, TickOutcome::FetchFailed);
        assert!(watcher.snapshot().is_none());
        assert_eq!(watcher.poll().await, TickOutcome::Initialized { items: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stream_yields_only_changes_at_interval() {
        let source = ScriptedSource::new(vec![
            Ok("1"),
            Ok("1"),
            Ok("3,2,1"),
            Err(500),
            Ok("4,3,2,1"),
        ]);
        let fetched_at = source.fetched_at.clone();
        let cancel = CancellationToken::new();
        let watcher = FeedWatcher::new(source, parse_guids, DEFAULT_POLL_INTERVAL);

        let start = Instant::now();
        let mut events = Box::pin(watcher.watch(cancel.clone()));

        let first = events.next().await.unwrap();
        assert_eq!(guids(&first), vec!["3", "2"]);
        let second = events.next().await.unwrap();
        assert_eq!(guids(&second), vec!["4"]);

        cancel.cancel();
        assert!(events.next().await.is_none());

        let times = fetched_at.lock().unwrap();
        assert_eq!(times.len(), 5);
        for (i, at) in times.iter().enumerate() {
            assert_eq!(at.duration_since(start), DEFAULT_POLL_INTERVAL * i as u32);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_tick_ends_stream() {
        let source = ScriptedSource::new(vec![Ok("1")]);
        let fetched_at = source.fetched_at.clone();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let watcher = FeedWatcher::new(source, parse_guids, DEFAULT_POLL_INTERVAL);
        let mut events = Box::pin(watcher.watch(cancel));

        assert!(events.next().await.is_none());
        assert!(fetched_at.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_does_not_overlap_ticks() {
        let source = ScriptedSource::new(vec![Ok("1"), Ok("2,1"), Ok("3,2,1")]);
        let fetched_at = source.fetched_at.clone();
        let cancel = CancellationToken::new();
        let watcher = FeedWatcher::new(source, parse_guids, DEFAULT_POLL_INTERVAL);

        let start = Instant::now();
        let mut events = Box::pin(watcher.watch(cancel.clone()));

        events.next().await.unwrap();
        // Consumer takes longer than one interval before asking again.
        tokio::time::sleep(Duration::from_secs(40)).await;
        events.next().await.unwrap();

        let times = fetched_at.lock().unwrap();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1].duration_since(start), Duration::from_secs(15));
        // Missed tick fires immediately once the consumer returns.
        assert_eq!(times[2].duration_since(start), Duration::from_secs(55));
    }
}
