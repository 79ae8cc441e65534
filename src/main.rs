use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use notification_pipeline::{
    api::{AppState, run_api_server},
    clients::rbmq::BrokerGateway,
    config::Config,
    pipeline::{Pipeline, consumer::spawn_consumers, handler::ChannelRules},
    store::{StatusStore, StoreConfig},
    utils::{retry_with_backoff, shutdown_signal},
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format.eq_ignore_ascii_case("pretty") {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing(&config);

    let gateway = Arc::new(BrokerGateway::new(&config));
    retry_with_backoff(&config.reconnect_config(), || gateway.connect())
        .await
        .map_err(|e| anyhow!("Unable to connect to RabbitMQ: {}", e))?;

    let store = Arc::new(StatusStore::new(StoreConfig::from_config(&config)));
    let queues = config.queue_names();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = Arc::clone(&store).spawn_sweeper(
        Duration::from_secs(config.status_sweep_interval_seconds),
        shutdown_rx.clone(),
    );

    let pipeline = Pipeline::new(
        Arc::clone(&store),
        gateway.clone(),
        Arc::new(ChannelRules),
        queues.clone(),
        config.retry_config(),
    )
    .with_shutdown(shutdown_rx.clone());

    let mut consumers = spawn_consumers(
        Arc::clone(&gateway),
        Arc::new(pipeline),
        config.reconnect_config(),
        shutdown_rx.clone(),
    );

    let state = AppState::new(Arc::clone(&store), gateway.clone(), &queues);
    let mut server_shutdown = shutdown_rx.clone();
    let mut server = tokio::spawn(run_api_server(config.server_port, state, async move {
        loop {
            if *server_shutdown.borrow() {
                break;
            }
            if server_shutdown.changed().await.is_err() {
                break;
            }
        }
    }));

    info!("Notification pipeline started");

    let mut escalated = None;

    tokio::select! {
        _ = shutdown_signal() => {}
        Some(joined) = consumers.join_next() => {
            let failure = match joined {
                Ok((stage, Err(e))) => anyhow!("{} consumer failed: {}", stage, e),
                Ok((stage, Ok(()))) => anyhow!("{} consumer stopped unexpectedly", stage),
                Err(e) => anyhow!("Consumer task panicked: {}", e),
            };
            error!(error = %failure, "Unrecoverable broker failure, shutting down");
            escalated = Some(failure);
        }
        served = &mut server => {
            let failure = match served {
                Ok(Ok(())) => anyhow!("API server stopped unexpectedly"),
                Ok(Err(e)) => anyhow!("API server failed: {}", e),
                Err(e) => anyhow!("API server task panicked: {}", e),
            };
            error!(error = %failure, "API server exited, shutting down");
            escalated = Some(failure);
        }
    }

    let _ = shutdown_tx.send(true);

    if !server.is_finished() {
        if let Err(e) = (&mut server).await {
            error!(error = %e, "API server task failed during shutdown");
        }
    }

    while let Some(joined) = consumers.join_next().await {
        match joined {
            Ok((stage, Err(e))) => error!(stage = %stage, error = %e, "Consumer stopped with error"),
            Ok((stage, Ok(()))) => info!(stage = %stage, "Consumer stopped"),
            Err(e) => error!(error = %e, "Consumer task panicked"),
        }
    }

    let _ = sweeper.await;
    gateway.close().await;

    info!("Notification pipeline stopped");

    match escalated {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}
