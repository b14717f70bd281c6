use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_error, StoreError};

// ============================================================================
// SubscriptionStore
// ============================================================================

/// SQLite-backed subscription table.
#[derive(Clone)]
pub struct SubscriptionStore {
    pub(crate) pool: SqlitePool,
}

impl SubscriptionStore {
    /// Open (creating if needed) the subscription database and ensure its schema.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Locked` if another process holds the database lock,
    /// `StoreError::Migration` if the schema cannot be created and
    /// `StoreError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .pragma("busy_timeout", "5000");

        // Every connection to ":memory:" is its own database, so tests get exactly one.
        let max_connections = if path == ":memory:" { 1 } else { 2 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let store = Self { pool };
        store.migrate().await.map_err(|e| {
            if is_lock_error(&e.to_string()) {
                StoreError::Locked
            } else {
                StoreError::Migration(e.to_string())
            }
        })?;

        tracing::debug!(path = %path, "Subscription store opened");
        Ok(store)
    }

    /// All schema statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                query TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_subscriptions_created ON subscriptions(created_at)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
