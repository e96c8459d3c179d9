//! qos-gateway server entry point.
//!
//! Loads configuration, opens the store, wires the services and serves
//! the REST API until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use qos_gateway::api;
use qos_gateway::app_state::AppState;
use qos_gateway::config::{LogFormat, PlatformConfig};
use qos_gateway::domain::EventBus;
use qos_gateway::payment::PayosGateway;
use qos_gateway::persistence::event_log::spawn_event_log;
use qos_gateway::persistence::memory::MemoryStore;
use qos_gateway::persistence::postgres::PostgresStore;
use qos_gateway::persistence::{LifecycleStore, load_catalog};
use qos_gateway::service::{HttpProbe, spawn_sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = PlatformConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting qos-gateway");

    // Storage and catalog
    let store: Arc<dyn LifecycleStore> = if config.persistence_enabled {
        let pg = PostgresStore::connect(
            &config.database_url,
            config.database_max_connections,
            config.database_min_connections,
            Duration::from_secs(config.database_connect_timeout_secs),
        )
        .await
        .context("connecting to PostgreSQL")?;
        pg.migrate().await.context("running migrations")?;
        Arc::new(pg)
    } else {
        tracing::warn!("persistence disabled, state lives in memory only");
        Arc::new(MemoryStore::new())
    };
    let catalog = Arc::new(load_catalog(store.as_ref()).await?);

    // Events
    let event_bus = EventBus::new(config.event_bus_capacity);
    if config.persistence_enabled && config.event_log_enabled {
        spawn_event_log(&event_bus, Arc::clone(&store));
    }

    // External collaborators
    if !config.payos.is_configured() {
        tracing::warn!("PayOS credentials missing, checkout will fail until configured");
    }
    let gateway = Arc::new(PayosGateway::new(config.payos.clone())?);
    let probe = Arc::new(HttpProbe::new(config.health_probe_timeout())?);

    // Services
    let state = AppState::new(store, catalog, gateway, probe, event_bus, &config);
    match config.sweep_interval() {
        Some(every) => {
            spawn_sweeper(Arc::clone(&state.subscriptions), every);
        }
        None => tracing::info!("lifecycle sweeper disabled"),
    }

    // Serve
    let app = api::build_app(state, Duration::from_secs(config.request_timeout_secs));
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
