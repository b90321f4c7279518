use std::sync::Arc;

use anyhow::Context;
use mq::{BroccoliPublisher, MqConfig, init_mq};
use redelivery::config::AppConfig;
use redelivery::database::init_db;
use redelivery::{
    ConfirmationHandler, MessageLogStore, RedeliverySweeper, SeaOrmMessageLogStore,
    SweepScheduler, run_confirmation_listener,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    let level = config.log.max_level().context("Invalid log configuration")?;
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .init();

    if !config.redelivery.enabled {
        warn!("Redelivery disabled by configuration, exiting");
        return Ok(());
    }

    let db = init_db(&config.database)
        .await
        .context("Failed to initialize database")?;

    let mq = Arc::new(
        init_mq(MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("Failed to initialize MQ")?,
    );

    info!(
        interval_secs = config.redelivery.interval_secs,
        max_try_count = config.redelivery.max_try_count,
        publish_timeout_secs = config.redelivery.publish_timeout_secs,
        retry = ?config.redelivery.retry,
        "MQ connected"
    );

    let store: Arc<dyn MessageLogStore> = Arc::new(SeaOrmMessageLogStore::new(db));
    let shutdown = CancellationToken::new();

    let (confirm_tx, confirm_rx) = mpsc::unbounded_channel();
    let listener = tokio::spawn(run_confirmation_listener(
        ConfirmationHandler::new(Arc::clone(&store)),
        confirm_rx,
        shutdown.clone(),
    ));

    let publisher = Arc::new(BroccoliPublisher::new(mq).with_confirmations(confirm_tx));
    let sweeper = Arc::new(RedeliverySweeper::new(
        Arc::clone(&store),
        publisher,
        &config.redelivery,
    ));
    let scheduler = SweepScheduler::start(sweeper, config.redelivery.interval());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    scheduler.stop().await;
    shutdown.cancel();
    if let Err(e) = listener.await {
        warn!(error = %e, "Confirmation listener task panicked");
    }

    Ok(())
}
