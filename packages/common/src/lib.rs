pub mod config;
pub mod delivery;
pub mod msg_log;
pub mod msg_log_status;
pub mod retry;

pub use config::{MqAppConfig, RedeliveryConfig};
pub use delivery::{Confirmation, DeliveryEnvelope};
pub use msg_log::{DEFAULT_MAX_TRY_COUNT, MessageLogEntry};
pub use msg_log_status::{MsgLogStatus, ParseStatusError};
pub use retry::{ExponentialBackoff, FixedDelay, RetryPolicy, RetryPolicyConfig};
