//! Analytics API server assembly.

pub mod auth;
pub mod openapi;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum_helpers::shutdown_signal;
use core_config::clickhouse::ClickHouseConfig;
use core_config::identity::IdentityConfig;
use core_config::server::ServerConfig;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use domain_analytics::{ClickHouseStore, IdentityClient};
use eyre::WrapErr;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;

pub async fn run() -> eyre::Result<()> {
    install_color_eyre();
    let environment = Environment::from_env();
    init_tracing(&environment);

    let server_config = ServerConfig::from_env()?;
    let clickhouse_config = ClickHouseConfig::from_env()?;
    let identity_config = IdentityConfig::from_env()?;

    let store = Arc::new(
        ClickHouseStore::new(&clickhouse_config).wrap_err("failed to build ClickHouse client")?,
    );
    store
        .ping()
        .await
        .wrap_err("ClickHouse is not reachable")?;
    store
        .init_schema()
        .await
        .wrap_err("failed to initialize ClickHouse schema")?;

    let identity = IdentityClient::new(&identity_config)?;
    let state = AppState::new(store, identity);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive());

    let address = server_config.address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .wrap_err_with(|| format!("failed to bind {address}"))?;

    info!(%address, "analytics API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    info!("analytics API shutdown complete");
    Ok(())
}
