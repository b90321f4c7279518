use std::sync::Arc;

use async_trait::async_trait;
use common::{Confirmation, DeliveryEnvelope};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::{Mq, MqError};

/// Outbound side of the broker.
///
/// A call is a single delivery attempt. Whether the broker accepted the
/// message is reported out-of-band, keyed by `correlation_id`.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
        correlation_id: &str,
    ) -> Result<(), MqError>;
}

/// Broker topic for an exchange / routing key pair.
pub fn topic_for(exchange: &str, routing_key: &str) -> String {
    if routing_key.is_empty() {
        exchange.to_string()
    } else {
        format!("{exchange}.{routing_key}")
    }
}

/// [`MessagePublisher`] backed by a `broccoli_queue` Redis broker.
pub struct BroccoliPublisher {
    mq: Arc<Mq>,
    confirmations: Option<UnboundedSender<Confirmation>>,
}

impl BroccoliPublisher {
    pub fn new(mq: Arc<Mq>) -> Self {
        Self {
            mq,
            confirmations: None,
        }
    }

    /// Report every broker outcome on `sender`.
    pub fn with_confirmations(mut self, sender: UnboundedSender<Confirmation>) -> Self {
        self.confirmations = Some(sender);
        self
    }

    fn confirm(&self, confirmation: Confirmation) {
        let Some(sender) = &self.confirmations else {
            return;
        };
        if let Err(e) = sender.send(confirmation) {
            debug!(
                correlation_id = %e.0.correlation_id,
                "Confirmation listener gone, dropping broker outcome"
            );
        }
    }
}

#[async_trait]
impl MessagePublisher for BroccoliPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
        correlation_id: &str,
    ) -> Result<(), MqError> {
        let topic = topic_for(exchange, routing_key);
        let envelope = DeliveryEnvelope {
            correlation_id: correlation_id.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.clone(),
        };

        match self.mq.publish(&topic, None, &envelope, None).await {
            Ok(_) => {
                debug!(topic = %topic, correlation_id, "Broker accepted message");
                self.confirm(Confirmation::acked(correlation_id));
                Ok(())
            }
            Err(e) => {
                warn!(topic = %topic, correlation_id, error = %e, "Broker rejected message");
                self.confirm(Confirmation::nacked(correlation_id, e.to_string()));
                Err(MqError::Publish {
                    topic,
                    reason: e.to_string(),
                })
            }
        }
    }
}
