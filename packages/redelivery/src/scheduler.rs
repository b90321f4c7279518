use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::sweeper::RedeliverySweeper;

/// Owns the periodic trigger for a [`RedeliverySweeper`].
///
/// Each tick spawns a sweep so a slow sweep never delays the clock; the
/// sweeper's own guard turns an overlapping tick into a skip.
#[derive(Debug)]
pub struct SweepScheduler {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl SweepScheduler {
    pub fn start(sweeper: Arc<RedeliverySweeper>, period: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(sweeper, period, shutdown.clone()));

        info!(period_secs = period.as_secs_f64(), "Started redelivery scheduler");

        Self { shutdown, handle }
    }

    /// Stop ticking and wait for an in-flight sweep to finish.
    ///
    /// A running sweep ends after the entry it is handling, so the wait is
    /// bounded by one publish timeout plus its store writes.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(error) = self.handle.await {
            warn!(%error, "Redelivery scheduler task panicked");
        }
        info!("Stopped redelivery scheduler");
    }
}

async fn run(sweeper: Arc<RedeliverySweeper>, period: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut sweeps: Vec<JoinHandle<()>> = Vec::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                sweeps.retain(|sweep| !sweep.is_finished());

                let sweeper = Arc::clone(&sweeper);
                let shutdown = shutdown.clone();
                sweeps.push(tokio::spawn(async move {
                    sweeper.sweep_until(&shutdown).await;
                }));
            }
        }
    }

    for sweep in sweeps {
        if let Err(error) = sweep.await {
            warn!(%error, "Redelivery sweep task panicked");
        }
    }
}
