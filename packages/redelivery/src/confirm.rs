use std::sync::Arc;

use common::Confirmation;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::store::{MessageLogStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Entry moved from `PENDING` to `DELIVERED`.
    Delivered,
    /// Entry was already terminal (or unknown); nothing changed.
    AlreadySettled,
    /// Broker refused the message; the entry stays `PENDING` for the sweeper.
    Nacked,
}

/// Applies broker acknowledgements to the message log.
///
/// Shares nothing with the sweeper except the store's status column.
#[derive(Clone)]
pub struct ConfirmationHandler {
    store: Arc<dyn MessageLogStore>,
}

impl ConfirmationHandler {
    pub fn new(store: Arc<dyn MessageLogStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, confirmation: &Confirmation) -> Result<ConfirmOutcome, StoreError> {
        let message_id = confirmation.correlation_id.as_str();

        if !confirmation.ack {
            warn!(
                message_id,
                cause = confirmation.cause.as_deref().unwrap_or("unknown"),
                "Broker did not accept message, leaving it for redelivery"
            );
            return Ok(ConfirmOutcome::Nacked);
        }

        if self.store.mark_delivered(message_id).await? {
            debug!(message_id, "Message delivery confirmed");
            Ok(ConfirmOutcome::Delivered)
        } else {
            debug!(message_id, "Confirmation for settled or unknown message ignored");
            Ok(ConfirmOutcome::AlreadySettled)
        }
    }
}

/// Drain broker confirmations until the channel closes or `shutdown` fires.
pub async fn run_confirmation_listener(
    handler: ConfirmationHandler,
    mut confirmations: UnboundedReceiver<Confirmation>,
    shutdown: CancellationToken,
) {
    info!("Starting confirmation listener");

    loop {
        let confirmation = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = confirmations.recv() => match received {
                Some(confirmation) => confirmation,
                None => break,
            },
        };

        if let Err(e) = handler.handle(&confirmation).await {
            error!(
                message_id = %confirmation.correlation_id,
                ack = confirmation.ack,
                error = %e,
                "Failed to apply broker confirmation"
            );
        }
    }

    info!("Confirmation listener stopped");
}
