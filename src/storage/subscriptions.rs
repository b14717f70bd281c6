use async_trait::async_trait;

use super::schema::SubscriptionStore;
use super::types::{StoreError, Subscription, SubscriptionRow};
use super::SubscriptionSource;

impl SubscriptionStore {
    /// List every subscription, oldest first.
    ///
    /// Rows whose query is blank are skipped: an empty query is a substring of every
    /// title and would forward the whole feed.
    pub async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows: Vec<SubscriptionRow> =
            sqlx::query_as("SELECT id, query FROM subscriptions ORDER BY created_at, id")
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;

        let total = rows.len();
        let subscriptions: Vec<Subscription> = rows
            .into_iter()
            .filter(|row| !row.query.trim().is_empty())
            .map(Subscription::from)
            .collect();

        if subscriptions.len() < total {
            tracing::warn!(
                skipped = total - subscriptions.len(),
                "Ignoring subscriptions with blank queries"
            );
        }

        Ok(subscriptions)
    }
}

#[async_trait]
impl SubscriptionSource for SubscriptionStore {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        self.list().await
    }
}
