#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use rsvp_adapter::{build_router, AppState, RsvpAdapterConfig};
use rsvp_storage::{JournalKvStore, KvStore, MemoryKvStore};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RsvpAdapterConfig::from_env()?;
    let store: Arc<dyn KvStore> = match &config.store_path {
        Some(path) => Arc::new(JournalKvStore::open(path.clone()).await?),
        None => {
            info!("RSVP_STORE_PATH unset; records are kept in memory only");
            Arc::new(MemoryKvStore::new())
        }
    };

    let app = build_router(AppState::new(&config, store.clone()));
    let listener = TcpListener::bind(config.bind).await?;
    info!(
        addr = %config.bind,
        store = store.backend_tag(),
        attendance_policy = config.intake.attendance_policy.as_str(),
        "rsvp_adapter_http listening"
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("rsvp_adapter_http stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("cannot listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!("cannot listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}
