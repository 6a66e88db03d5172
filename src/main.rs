use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use weather_relay::{
    ambient::AmbientClient,
    api::{self, AppState},
    config::Config,
    db::{self, PgReadingStore},
    poller::PollScheduler,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present; variables may also come from the environment
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting weather relay");

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        poll_interval_minutes = config.poll_interval_minutes,
        http_port = config.http_port,
        location_override = config.device_location.is_some(),
        "Configuration validated"
    );

    // Connect to DB and apply the schema; either failing is fatal.
    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    info!("Database ready");

    let store = Arc::new(PgReadingStore::new(pool.clone()));
    let client = AmbientClient::new(&config).context("failed to build Ambient Weather client")?;
    info!("Ambient Weather API client initialized");

    let scheduler =
        PollScheduler::new(Arc::new(client), store.clone(), config.poll_interval())?.spawn();

    let state = AppState {
        store,
        location_override: config.device_location.clone(),
        poll_interval_minutes: config.poll_interval_minutes,
    };

    let addr = format!("{}:{}", config.server_host, config.http_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    db::close(&pool).await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
