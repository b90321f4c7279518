mod sql;

pub use sql::SeaOrmMessageLogStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::MessageLogEntry;
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Corrupt message log row '{message_id}': {reason}")]
    Corrupt { message_id: String, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for the outbound message log.
///
/// Every mutation only applies to a `PENDING` row and reports whether it did,
/// so a terminal status can never be overwritten by a late writer.
#[async_trait]
pub trait MessageLogStore: Send + Sync {
    /// Insert the row for a freshly published message.
    async fn record(&self, entry: &MessageLogEntry) -> Result<(), StoreError>;

    async fn get(&self, message_id: &str) -> Result<Option<MessageLogEntry>, StoreError>;

    /// `PENDING` entries whose `next_retry_at` is at or before `now`, at most `limit`.
    async fn fetch_overdue_pending(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<MessageLogEntry>, StoreError>;

    /// Move `expected_attempt` to `expected_attempt + 1` and store the new retry time.
    ///
    /// Returns `false` when the row is gone, no longer pending, or its attempt
    /// count has moved on.
    async fn increment_attempt(
        &self,
        message_id: &str,
        expected_attempt: u32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Undo an increment whose publish definitely did not reach the broker,
    /// restoring `attempt` and `next_retry_at`.
    async fn rollback_attempt(
        &self,
        message_id: &str,
        attempt: u32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn mark_failed(&self, message_id: &str) -> Result<bool, StoreError>;

    async fn mark_delivered(&self, message_id: &str) -> Result<bool, StoreError>;
}
