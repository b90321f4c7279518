pub mod error;
pub mod models;
pub mod publisher;

pub use error::MqError;
pub use models::{BroccoliError, MqConfig, MqQueue, init_mq};
pub use publisher::{BroccoliPublisher, MessagePublisher, topic_for};

pub type Mq = MqQueue;
