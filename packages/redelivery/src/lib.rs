pub mod config;
pub mod confirm;
pub mod database;
pub mod entity;
pub mod error;
pub mod scheduler;
pub mod store;
pub mod sweeper;

pub use confirm::{ConfirmOutcome, ConfirmationHandler, run_confirmation_listener};
pub use error::SweepError;
pub use scheduler::SweepScheduler;
pub use store::{MessageLogStore, SeaOrmMessageLogStore, StoreError};
pub use sweeper::{
    EntryOutcome, RedeliveryAction, RedeliverySweeper, SweepOutcome, SweepReport, decide,
};
