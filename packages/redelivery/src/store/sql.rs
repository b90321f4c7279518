use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MessageLogEntry, MsgLogStatus};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use tracing::{error, warn};

use super::{MessageLogStore, StoreError};
use crate::entity::msg_log;

/// [`MessageLogStore`] over any SeaORM connection (Postgres in production, SQLite in tests).
#[derive(Clone)]
pub struct SeaOrmMessageLogStore {
    db: DatabaseConnection,
}

impl SeaOrmMessageLogStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Set `status` on a pending row.
    async fn settle(&self, message_id: &str, status: MsgLogStatus) -> Result<bool, StoreError> {
        let result = msg_log::Entity::update_many()
            .col_expr(msg_log::Column::Status, Expr::value(status))
            .col_expr(msg_log::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(msg_log::Column::MessageId.eq(message_id))
            .filter(msg_log::Column::Status.eq(MsgLogStatus::Pending))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Compare-and-set on the attempt count of a pending row.
    async fn swap_attempt(
        &self,
        message_id: &str,
        from: u32,
        to: u32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = msg_log::Entity::update_many()
            .col_expr(msg_log::Column::TryCount, Expr::value(db_count(to)))
            .col_expr(msg_log::Column::NextTryTime, Expr::value(next_retry_at))
            .col_expr(msg_log::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(msg_log::Column::MessageId.eq(message_id))
            .filter(msg_log::Column::Status.eq(MsgLogStatus::Pending))
            .filter(msg_log::Column::TryCount.eq(db_count(from)))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Take an unreadable pending row out of the overdue set so it cannot
    /// hold the head of every batch.
    async fn quarantine(&self, message_id: &str, reason: &str) {
        error!(
            message_id,
            reason,
            outcome = "deliver_failed",
            "Corrupt message log row, marking delivery failed"
        );

        if let Err(e) = self.settle(message_id, MsgLogStatus::DeliverFailed).await {
            warn!(message_id, error = %e, "Failed to mark corrupt message log row");
        }
    }
}

fn db_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

fn into_entry(model: msg_log::Model) -> Result<MessageLogEntry, StoreError> {
    let attempt_count = u32::try_from(model.try_count).map_err(|_| StoreError::Corrupt {
        message_id: model.message_id.clone(),
        reason: format!("negative try_count {}", model.try_count),
    })?;

    Ok(MessageLogEntry {
        message_id: model.message_id,
        exchange: model.exchange,
        routing_key: model.routing_key,
        payload: model.payload,
        attempt_count,
        next_retry_at: model.next_try_time,
        status: model.status,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

#[async_trait]
impl MessageLogStore for SeaOrmMessageLogStore {
    async fn record(&self, entry: &MessageLogEntry) -> Result<(), StoreError> {
        let model = msg_log::ActiveModel {
            message_id: Set(entry.message_id.clone()),
            exchange: Set(entry.exchange.clone()),
            routing_key: Set(entry.routing_key.clone()),
            payload: Set(entry.payload.clone()),
            try_count: Set(db_count(entry.attempt_count)),
            status: Set(entry.status),
            next_try_time: Set(entry.next_retry_at),
            created_at: Set(entry.created_at),
            updated_at: Set(entry.updated_at),
        };
        model.insert(&self.db).await?;
        Ok(())
    }

    async fn get(&self, message_id: &str) -> Result<Option<MessageLogEntry>, StoreError> {
        msg_log::Entity::find_by_id(message_id.to_string())
            .one(&self.db)
            .await?
            .map(into_entry)
            .transpose()
    }

    async fn fetch_overdue_pending(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<MessageLogEntry>, StoreError> {
        let models = msg_log::Entity::find()
            .filter(msg_log::Column::Status.eq(MsgLogStatus::Pending))
            .filter(msg_log::Column::NextTryTime.lte(now))
            .order_by_asc(msg_log::Column::NextTryTime)
            .limit(limit)
            .all(&self.db)
            .await?;

        let mut entries = Vec::with_capacity(models.len());
        for model in models {
            match into_entry(model) {
                Ok(entry) => entries.push(entry),
                Err(StoreError::Corrupt { message_id, reason }) => {
                    self.quarantine(&message_id, &reason).await;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(entries)
    }

    async fn increment_attempt(
        &self,
        message_id: &str,
        expected_attempt: u32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.swap_attempt(
            message_id,
            expected_attempt,
            expected_attempt.saturating_add(1),
            next_retry_at,
        )
        .await
    }

    async fn rollback_attempt(
        &self,
        message_id: &str,
        attempt: u32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.swap_attempt(message_id, attempt.saturating_add(1), attempt, next_retry_at)
            .await
    }

    async fn mark_failed(&self, message_id: &str) -> Result<bool, StoreError> {
        self.settle(message_id, MsgLogStatus::DeliverFailed).await
    }

    async fn mark_delivered(&self, message_id: &str) -> Result<bool, StoreError> {
        self.settle(message_id, MsgLogStatus::Delivered).await
    }
}
