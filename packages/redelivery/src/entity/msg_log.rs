use common::MsgLogStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per outbound message, written on first publish and advanced by the sweeper.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "msg_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub message_id: String,

    pub exchange: String,

    pub routing_key: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub payload: serde_json::Value,

    pub try_count: i32,

    /// One of: PENDING, DELIVERED, DELIVER_FAILED
    #[sea_orm(indexed)]
    pub status: MsgLogStatus,

    #[sea_orm(indexed)]
    pub next_try_time: DateTimeUtc,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
