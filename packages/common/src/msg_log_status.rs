#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery status of a message log entry.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MsgLogStatus {
    /// Published at least once, broker confirmation not yet received.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "PENDING"))]
    Pending,
    /// Broker confirmed the message.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "DELIVERED"))]
    Delivered,
    /// Retry ceiling reached without a confirmation.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "DELIVER_FAILED"))]
    DeliverFailed,
}

impl MsgLogStatus {
    /// Returns true once no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// All possible status values.
    pub const ALL: &'static [MsgLogStatus] = &[Self::Pending, Self::Delivered, Self::DeliverFailed];

    /// Returns the string representation stored in the log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Delivered => "DELIVERED",
            Self::DeliverFailed => "DELIVER_FAILED",
        }
    }
}

impl fmt::Display for MsgLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid message log status '{}'. Valid values: {}",
            self.invalid,
            MsgLogStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for MsgLogStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "DELIVERED" => Ok(Self::Delivered),
            "DELIVER_FAILED" => Ok(Self::DeliverFailed),
            _ => Err(ParseStatusError {
                invalid: s.to_string(),
            }),
        }
    }
}
