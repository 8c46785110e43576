//! Dashboard Stream Server
//!
//! Serves live, deterministic snapshots of Kubernetes resources from many
//! clusters over server-sent events.
//!
//! Every (configuration, cluster) pair listed in the tenant file gets its own
//! client. Streams of the same resource kind on the same tenant share one
//! watch session; bursts of changes are coalesced into bounded-rate flushes.

mod config;
mod error;
mod routes;
mod sse;
mod state;
mod tenants;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::state::AppState;
use crate::tenants::TenantsFile;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use watch_engine::{EngineContext, KubeBackend};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube uses rustls; pick the ring provider before any client is built
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Dashboard Stream Server");

    let config = ServerConfig::from_env()?;
    info!("Configuration:");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Tenants file: {}", config.tenants_file.display());
    info!("  Sync timeout: {:?}", config.engine.sync_timeout);
    info!(
        "  Ticks: fast {:?}, slow {:?}",
        config.engine.fast_tick, config.engine.slow_tick
    );

    let tenants = TenantsFile::load(&config.tenants_file)?;
    let backend = KubeBackend::new();
    let registered = tenants::register_all(&backend, &tenants).await;
    info!("Registered {} of {} tenants", registered, tenants.tenants.len());

    let engine = Arc::new(EngineContext::new(
        config.engine.clone(),
        Arc::new(backend.clone()),
        Arc::new(backend),
    ));
    let app = routes::router(AppState::new(Arc::clone(&engine)));

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down watch sessions");
    engine.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
