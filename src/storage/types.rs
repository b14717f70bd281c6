use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Subscription store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the database lock
    #[error("Subscription database is locked by another process")]
    Locked,

    /// Migration failed
    #[error("Subscription database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_error(&err.to_string()) {
            return StoreError::Locked;
        }
        StoreError::Other(err)
    }
}

// SQLITE_BUSY (5), SQLITE_LOCKED (6)
pub(crate) fn is_lock_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
}

// ============================================================================
// Data Structures
// ============================================================================

/// A standing interest query, matched case-insensitively against item titles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub query: String,
}

impl Subscription {
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
        }
    }
}

/// Internal row type for subscription queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubscriptionRow {
    pub id: String,
    pub query: String,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            id: row.id,
            query: row.query,
        }
    }
}
