use mq::MqError;
use thiserror::Error;

use crate::store::StoreError;

/// Failure while redelivering a single message log entry.
///
/// Never escapes a sweep: it is logged against the entry and the sweep moves on.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Publish error: {0}")]
    Publish(#[from] MqError),
}
