//! The per-tick processing stages.
//!
//! - [`diff_changes`] extracts the newly published head of the feed
//! - [`match_subscriptions`] keeps the items some subscription asks for
//! - [`Dispatcher`] hands matched items to a sink in bounded, ordered batches
//!
//! The first two are pure; only the dispatcher has side effects.

mod diff;
mod dispatch;
mod matcher;

pub use diff::{diff_changes, Diff};
pub use dispatch::{partition, DispatchReport, Dispatcher, DEFAULT_BATCH_SIZE};
pub use matcher::match_subscriptions;
