//! Read-only access to the standing subscription queries.
//!
//! Subscriptions are created and removed by an outside tool; the watcher only ever
//! lists them, once per change event.

mod schema;
mod subscriptions;
mod types;

use async_trait::async_trait;

pub use schema::SubscriptionStore;
pub use types::{StoreError, Subscription};

/// Capability for listing the current subscription set.
///
/// Implementations must return a fresh view on every call; the pipeline never caches
/// the result across events.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, StoreError>;
}
