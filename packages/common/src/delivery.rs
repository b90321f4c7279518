use serde::{Deserialize, Serialize};

/// What travels over the broker for every publish, first attempt or redelivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryEnvelope {
    /// Equal to the message log id, so the broker acknowledgement can be matched back.
    pub correlation_id: String,
    pub exchange: String,
    pub routing_key: String,
    pub payload: serde_json::Value,
}

/// Out-of-band broker acknowledgement for one publish call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Confirmation {
    pub correlation_id: String,
    pub ack: bool,
    /// Broker-supplied reason when `ack` is false.
    pub cause: Option<String>,
}

impl Confirmation {
    pub fn acked(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ack: true,
            cause: None,
        }
    }

    pub fn nacked(correlation_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ack: false,
            cause: Some(cause.into()),
        }
    }
}
