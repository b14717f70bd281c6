//! Watches a release feed and forwards new entries that match standing queries.
//!
//! The pipeline per tick is: [`watcher`] fetches and diffs the feed,
//! [`pipeline::match_subscriptions`] filters against the [`storage`] queries, and
//! [`pipeline::Dispatcher`] delivers the result to a [`notify`] sink in batches.
//! [`runner::run`] wires these together until cancelled.

pub mod config;
pub mod feed;
pub mod notify;
pub mod pipeline;
pub mod runner;
pub mod storage;
pub mod watcher;
