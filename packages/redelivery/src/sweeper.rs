use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{MessageLogEntry, RedeliveryConfig, RetryPolicy};
use mq::MessagePublisher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SweepError;
use crate::store::MessageLogStore;

/// What the retry policy says to do with one overdue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeliveryAction {
    /// Retry ceiling reached: mark the entry `DELIVER_FAILED`, do not publish.
    GiveUp,
    /// Publish again as attempt number `attempt`.
    Retry {
        attempt: u32,
        next_retry_at: DateTime<Utc>,
    },
}

pub fn decide(
    entry: &MessageLogEntry,
    max_try_count: u32,
    policy: &dyn RetryPolicy,
    now: DateTime<Utc>,
) -> RedeliveryAction {
    if entry.attempt_count >= max_try_count {
        return RedeliveryAction::GiveUp;
    }

    let attempt = entry.attempt_count + 1;
    RedeliveryAction::Retry {
        attempt,
        next_retry_at: policy.next_retry_at(attempt, now),
    }
}

/// Result of handling one entry inside a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Attempt recorded and the broker call returned.
    Republished,
    /// Attempt recorded but the publish call timed out; the outcome is unknown.
    Unconfirmed,
    /// Marked `DELIVER_FAILED`.
    Failed,
    /// Another writer settled or advanced the entry first; left alone.
    Conflict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub fetched: usize,
    pub republished: usize,
    pub unconfirmed: usize,
    pub failed: usize,
    pub conflicts: usize,
    pub errors: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Republished => self.republished += 1,
            EntryOutcome::Unconfirmed => self.unconfirmed += 1,
            EntryOutcome::Failed => self.failed += 1,
            EntryOutcome::Conflict => self.conflicts += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// A previous sweep was still running.
    Skipped,
    Completed(SweepReport),
}

/// Clears the in-flight flag when the sweep ends, including on panic.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Resends overdue pending messages and gives up on those past the retry ceiling.
pub struct RedeliverySweeper {
    store: Arc<dyn MessageLogStore>,
    publisher: Arc<dyn MessagePublisher>,
    policy: Arc<dyn RetryPolicy>,
    max_try_count: u32,
    publish_timeout: Duration,
    batch_size: u64,
    in_flight: AtomicBool,
}

impl RedeliverySweeper {
    pub fn new(
        store: Arc<dyn MessageLogStore>,
        publisher: Arc<dyn MessagePublisher>,
        config: &RedeliveryConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            policy: config.retry.build(),
            max_try_count: config.max_try_count,
            publish_timeout: config.publish_timeout(),
            batch_size: config.batch_size,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Replace the retry policy built from configuration.
    pub fn with_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_publish_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one sweep over the overdue pending entries.
    ///
    /// Returns [`SweepOutcome::Skipped`] without touching the store when another
    /// sweep is in flight. Per-entry failures are logged and counted, never returned.
    pub async fn sweep(&self) -> SweepOutcome {
        self.sweep_until(&CancellationToken::new()).await
    }

    /// Like [`sweep`](Self::sweep), but stops before the next entry once
    /// `shutdown` is cancelled. Untouched entries wait for the next run.
    pub async fn sweep_until(&self, shutdown: &CancellationToken) -> SweepOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            warn!("Previous redelivery sweep still running, skipping");
            return SweepOutcome::Skipped;
        };

        info!("Starting redelivery sweep");

        let now = Utc::now();
        let entries = match self.store.fetch_overdue_pending(now, self.batch_size).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Failed to fetch overdue messages");
                return SweepOutcome::Completed(SweepReport {
                    errors: 1,
                    ..Default::default()
                });
            }
        };

        let mut report = SweepReport {
            fetched: entries.len(),
            ..Default::default()
        };
        let mut seen = HashSet::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            if shutdown.is_cancelled() {
                info!(
                    remaining = entries.len() - index,
                    "Shutdown requested, ending redelivery sweep early"
                );
                break;
            }
            if entry.status.is_terminal() || !seen.insert(entry.message_id.as_str()) {
                continue;
            }

            match self.redeliver(entry, now).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    report.errors += 1;
                    error!(
                        message_id = %entry.message_id,
                        attempt = entry.attempt_count,
                        error = %e,
                        "Failed to redeliver message"
                    );
                }
            }
        }

        info!(
            fetched = report.fetched,
            republished = report.republished,
            unconfirmed = report.unconfirmed,
            failed = report.failed,
            conflicts = report.conflicts,
            errors = report.errors,
            "Finished redelivery sweep"
        );

        SweepOutcome::Completed(report)
    }

    async fn redeliver(
        &self,
        entry: &MessageLogEntry,
        now: DateTime<Utc>,
    ) -> Result<EntryOutcome, SweepError> {
        let message_id = entry.message_id.as_str();

        let (attempt, next_retry_at) =
            match decide(entry, self.max_try_count, self.policy.as_ref(), now) {
                RedeliveryAction::GiveUp => return self.give_up(entry).await,
                RedeliveryAction::Retry {
                    attempt,
                    next_retry_at,
                } => (attempt, next_retry_at),
            };

        // The attempt is persisted before the broker sees the message. A crash
        // between the two loses that attempt, and the entry comes back once
        // next_retry_at passes. A crash after the publish but before the
        // confirmation lands means the broker may get the message twice.
        let claimed = self
            .store
            .increment_attempt(message_id, entry.attempt_count, next_retry_at)
            .await?;
        if !claimed {
            debug!(message_id, attempt, "Entry changed since fetch, skipping");
            return Ok(EntryOutcome::Conflict);
        }

        let publish =
            self.publisher
                .publish(&entry.exchange, &entry.routing_key, &entry.payload, message_id);

        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(Ok(())) => {
                info!(message_id, attempt, outcome = "republished", "Redelivered message");
                Ok(EntryOutcome::Republished)
            }
            Ok(Err(e)) => {
                self.release_attempt(entry).await;
                Err(e.into())
            }
            Err(_) => {
                warn!(
                    message_id,
                    attempt,
                    timeout_ms = self.publish_timeout.as_millis() as u64,
                    outcome = "unconfirmed",
                    "Publish timed out, attempt consumed"
                );
                Ok(EntryOutcome::Unconfirmed)
            }
        }
    }

    async fn give_up(&self, entry: &MessageLogEntry) -> Result<EntryOutcome, SweepError> {
        let message_id = entry.message_id.as_str();

        if !self.store.mark_failed(message_id).await? {
            debug!(message_id, "Entry settled since fetch, not marking failed");
            return Ok(EntryOutcome::Conflict);
        }

        warn!(
            message_id,
            attempts = entry.attempt_count,
            outcome = "deliver_failed",
            "Retry ceiling reached, message delivery failed"
        );
        Ok(EntryOutcome::Failed)
    }

    /// The broker refused the message, so hand the attempt back.
    async fn release_attempt(&self, entry: &MessageLogEntry) {
        let message_id = entry.message_id.as_str();

        match self
            .store
            .rollback_attempt(message_id, entry.attempt_count, entry.next_retry_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(message_id, "Entry changed after publish failure, keeping it"),
            Err(e) => warn!(
                message_id,
                error = %e,
                "Failed to roll back attempt after publish failure, attempt consumed"
            ),
        }
    }
}
