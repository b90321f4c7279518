use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::msg_log_status::MsgLogStatus;

/// Attempts allowed before an entry is marked `DELIVER_FAILED`.
pub const DEFAULT_MAX_TRY_COUNT: u32 = 3;

/// One tracked outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLogEntry {
    /// Correlates the logical message across retries and broker confirmations.
    pub message_id: String,
    pub exchange: String,
    pub routing_key: String,
    /// Serialized message body. Never inspected by the sweeper.
    pub payload: serde_json::Value,
    /// Delivery attempts made so far; 1 after the initial publish.
    pub attempt_count: u32,
    /// The entry is not eligible for resend before this instant.
    pub next_retry_at: DateTime<Utc>,
    pub status: MsgLogStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageLogEntry {
    /// Build the log row for a message that has just been published for the first time.
    pub fn new_pending(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: serde_json::Value,
        next_retry_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            message_id: Uuid::new_v4().to_string(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            payload,
            attempt_count: 1,
            next_retry_at,
            status: MsgLogStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true when the sweeper should pick this entry up at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.next_retry_at <= now
    }
}
