//! Event consumer service.
//!
//! Subscribes to every analytics topic on the bus, normalizes payloads
//! into canonical events and appends them to the analytical store. One
//! reader task per topic keeps per-topic ordering while topics proceed
//! concurrently.

pub mod consumer;

use std::sync::Arc;
use std::time::Duration;

use axum_helpers::{health_router, shutdown_signal};
use core_config::bus::BusConfig;
use core_config::clickhouse::ClickHouseConfig;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use domain_analytics::{ClickHouseStore, IngestPipeline, Topic};
use eyre::{Result, WrapErr};
use redis::aio::ConnectionManager;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::consumer::{backoff_delay, TopicConsumer};

/// Connect to Redis with bounded retries. Startup is the one place a
/// broker outage is fatal; after this the connection manager handles
/// reconnects itself.
async fn connect_bus(config: &BusConfig) -> Result<ConnectionManager> {
    let client = redis::Client::open(config.url.as_str()).wrap_err("invalid Redis URL")?;

    let mut attempt = 0;
    loop {
        match client.get_connection_manager().await {
            Ok(connection) => {
                info!(url = %config.url, "connected to Redis");
                return Ok(connection);
            }
            Err(e) if attempt + 1 < config.connect_retries => {
                let delay = backoff_delay(
                    attempt,
                    config.connect_backoff_ms,
                    config.connect_backoff_max_ms,
                );
                warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "Redis connect failed, retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(e).wrap_err_with(|| {
                    format!("failed to connect to Redis after {} attempts", attempt + 1)
                });
            }
        }
    }
}

/// Ping ClickHouse with bounded retries, then ensure the schema.
async fn connect_store(config: &ClickHouseConfig, bus: &BusConfig) -> Result<ClickHouseStore> {
    let store = ClickHouseStore::new(config).wrap_err("failed to build ClickHouse client")?;

    let mut attempt = 0;
    loop {
        match store.ping().await {
            Ok(()) => break,
            Err(e) if attempt + 1 < bus.connect_retries => {
                let delay =
                    backoff_delay(attempt, bus.connect_backoff_ms, bus.connect_backoff_max_ms);
                warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "ClickHouse ping failed, retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(e).wrap_err_with(|| {
                    format!("ClickHouse unreachable after {} attempts", attempt + 1)
                });
            }
        }
    }

    store
        .init_schema()
        .await
        .wrap_err("failed to initialize ClickHouse schema")?;
    Ok(store)
}

async fn start_health_server(port: u16) -> Result<()> {
    let app = health_router("event-consumer", env!("CARGO_PKG_VERSION"));
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind health server to {addr}"))?;

    info!(port, "health server listening");
    axum::serve(listener, app).await.wrap_err("health server failed")?;
    Ok(())
}

pub async fn run() -> Result<()> {
    install_color_eyre();
    let environment = Environment::from_env();
    init_tracing(&environment);

    info!(version = env!("CARGO_PKG_VERSION"), "starting event consumer");

    let bus_config = BusConfig::from_env().wrap_err("failed to load bus configuration")?;
    let clickhouse_config =
        ClickHouseConfig::from_env().wrap_err("failed to load ClickHouse configuration")?;

    let health_port: u16 = std::env::var("HEALTH_PORT")
        .unwrap_or_else(|_| "8081".to_string())
        .parse()
        .unwrap_or(8081);

    let redis = connect_bus(&bus_config).await?;
    let store = connect_store(&clickhouse_config, &bus_config).await?;
    let pipeline = Arc::new(IngestPipeline::new(Arc::new(store)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_port).await {
            error!(error = %e, "health server failed");
        }
    });

    let mut tasks = JoinSet::new();
    for topic in Topic::ALL {
        let consumer = TopicConsumer::new(
            redis.clone(),
            topic,
            pipeline.clone(),
            bus_config.clone(),
        );
        tasks.spawn(consumer.run(shutdown_rx.clone()));
    }
    info!(topics = Topic::ALL.len(), group = %bus_config.consumer_group, "consumers started");

    // Wait for shutdown or for every consumer to exit on its own.
    let mut shutdown_watch = shutdown_rx.clone();
    loop {
        tokio::select! {
            _ = shutdown_watch.changed() => break,
            joined = tasks.join_next() => match joined {
                Some(Ok(())) => warn!("consumer task exited"),
                Some(Err(e)) => error!(error = %e, "consumer task panicked"),
                None => break,
            }
        }
    }

    // Give in-flight messages a grace period, then cut the rest loose.
    let grace = Duration::from_millis(bus_config.shutdown_grace_ms);
    let drained = tokio::time::timeout(grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(grace_ms = bus_config.shutdown_grace_ms, "grace period elapsed, aborting consumers");
        tasks.abort_all();
    }

    info!("event consumer stopped");
    Ok(())
}
