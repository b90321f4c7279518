use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MessageLogEntry, MsgLogStatus, RedeliveryConfig};
use mq::{MessagePublisher, MqError};
use redelivery::{MessageLogStore, RedeliverySweeper, StoreError};
use serde_json::json;
use tokio::sync::Notify;

/// In-memory message log with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MessageLogEntry>>,
    failing_updates: Mutex<HashSet<String>>,
    fail_fetch: AtomicBool,
    mutations: AtomicUsize,
}

impl MemoryStore {
    pub fn with_entries(entries: impl IntoIterator<Item = MessageLogEntry>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut map = store.entries.lock().unwrap();
            for entry in entries {
                map.insert(entry.message_id.clone(), entry);
            }
        }
        Arc::new(store)
    }

    pub fn entry(&self, message_id: &str) -> MessageLogEntry {
        self.entries
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .unwrap_or_else(|| panic!("no entry {message_id}"))
    }

    /// Every conditional update on `message_id` fails with `StoreError::Unavailable`.
    pub fn fail_updates_for(&self, message_id: &str) {
        self.failing_updates
            .lock()
            .unwrap()
            .insert(message_id.to_string());
    }

    pub fn fail_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    /// Pull `next_retry_at` into the past, as if the retry delay elapsed.
    pub fn make_overdue(&self, message_id: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(message_id) {
            entry.next_retry_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    /// Successful writes applied so far.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn update<F>(&self, message_id: &str, apply: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut MessageLogEntry) -> bool,
    {
        if self.failing_updates.lock().unwrap().contains(message_id) {
            return Err(StoreError::Unavailable(format!(
                "injected failure for {message_id}"
            )));
        }

        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(message_id) else {
            return Ok(false);
        };
        if entry.status != MsgLogStatus::Pending {
            return Ok(false);
        }

        let applied = apply(entry);
        if applied {
            entry.updated_at = Utc::now();
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(applied)
    }
}

#[async_trait]
impl MessageLogStore for MemoryStore {
    async fn record(&self, entry: &MessageLogEntry) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(entry.message_id.clone(), entry.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, message_id: &str) -> Result<Option<MessageLogEntry>, StoreError> {
        Ok(self.entries.lock().unwrap().get(message_id).cloned())
    }

    async fn fetch_overdue_pending(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<MessageLogEntry>, StoreError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected fetch failure".into()));
        }

        let mut overdue: Vec<_> = self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by(|a, b| {
            a.next_retry_at
                .cmp(&b.next_retry_at)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        overdue.truncate(limit as usize);
        Ok(overdue)
    }

    async fn increment_attempt(
        &self,
        message_id: &str,
        expected_attempt: u32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.update(message_id, |entry| {
            if entry.attempt_count != expected_attempt {
                return false;
            }
            entry.attempt_count += 1;
            entry.next_retry_at = next_retry_at;
            true
        })
    }

    async fn rollback_attempt(
        &self,
        message_id: &str,
        attempt: u32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.update(message_id, |entry| {
            if entry.attempt_count != attempt + 1 {
                return false;
            }
            entry.attempt_count = attempt;
            entry.next_retry_at = next_retry_at;
            true
        })
    }

    async fn mark_failed(&self, message_id: &str) -> Result<bool, StoreError> {
        self.update(message_id, |entry| {
            entry.status = MsgLogStatus::DeliverFailed;
            true
        })
    }

    async fn mark_delivered(&self, message_id: &str) -> Result<bool, StoreError> {
        self.update(message_id, |entry| {
            entry.status = MsgLogStatus::Delivered;
            true
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub payload: serde_json::Value,
    pub correlation_id: String,
}

/// Records every publish call; can be told to reject, stall, or block on a gate.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Published>>,
    rejecting: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    gate: Option<Gate>,
}

/// Lets a test hold a publish call open until it calls `release`.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every publish takes `delay` before returning.
    pub fn stalling(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn gated(gate: Gate) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Default::default()
        })
    }

    pub fn reject(&self, correlation_id: &str) {
        self.rejecting
            .lock()
            .unwrap()
            .insert(correlation_id.to_string());
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn count_for(&self, correlation_id: &str) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.correlation_id == correlation_id)
            .count()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
        correlation_id: &str,
    ) -> Result<(), MqError> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.rejecting.lock().unwrap().contains(correlation_id) {
            return Err(MqError::Publish {
                topic: mq::topic_for(exchange, routing_key),
                reason: "connection refused".into(),
            });
        }

        self.published.lock().unwrap().push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.clone(),
            correlation_id: correlation_id.to_string(),
        });
        Ok(())
    }
}

/// A pending entry with `attempt_count` attempts whose retry time is `offset` from now.
pub fn pending_entry(
    message_id: &str,
    attempt_count: u32,
    offset: chrono::Duration,
) -> MessageLogEntry {
    let mut entry = MessageLogEntry::new_pending(
        "mail.exchange",
        "mail.routing.key",
        json!({"to": format!("{message_id}@example.com"), "subject": "welcome"}),
        Utc::now() + offset,
    );
    entry.message_id = message_id.to_string();
    entry.attempt_count = attempt_count;
    entry
}

pub fn overdue(message_id: &str, attempt_count: u32) -> MessageLogEntry {
    pending_entry(message_id, attempt_count, chrono::Duration::seconds(-10))
}

pub fn test_config() -> RedeliveryConfig {
    RedeliveryConfig {
        publish_timeout_secs: 5,
        ..Default::default()
    }
}

pub fn sweeper(
    store: &Arc<MemoryStore>,
    publisher: &Arc<RecordingPublisher>,
) -> RedeliverySweeper {
    let store: Arc<dyn MessageLogStore> = store.clone();
    let publisher: Arc<dyn MessagePublisher> = publisher.clone();
    RedeliverySweeper::new(store, publisher, &test_config())
}
