mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use appshelf_api::routes;
use appshelf_api::session::{self, SessionStore};
use appshelf_api::state::{AppState, AppStateInner};
use appshelf_api::storage::Storage;
use appshelf_db::Database;

use crate::config::Config;

/// How often idle sessions are swept.
const SESSION_SWEEP_SECS: u64 = 600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config::DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = Config::from_env()?;
    if let Some(problem) = config.secret_problem() {
        eprintln!("FATAL: APPSHELF_SESSION_SECRET {}.", problem);
        eprintln!("       Use a random string of at least 32 bytes.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    // Init DB and storage
    let db = Arc::new(Database::open(&config.db_path)?);
    let storage = Arc::new(Storage::new(config.upload_dir.clone()).await?);
    let sessions = SessionStore::new(config.session_secret.as_bytes(), config.session_ttl)?;

    tokio::spawn(session::run_sweep_loop(sessions.clone(), SESSION_SWEEP_SECS));

    let state: AppState = Arc::new(AppStateInner::new(db, storage, sessions));

    let app = routes::router(state, config.max_upload_bytes)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("AppShelf listening on {}", addr);
    info!(
        "Uploads in {}, max {} MiB per request",
        config.upload_dir.display(),
        config.max_upload_bytes / (1024 * 1024)
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
