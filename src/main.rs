use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use annotater_api::auth::{Argon2Hasher, TokenService};
use annotater_api::config::AppConfig;
use annotater_api::database::DatabaseManager;
use annotater_api::detection::HttpDetectionModel;
use annotater_api::storage::FileStorage;
use annotater_api::{router, AppState, Components};

#[derive(Parser)]
#[command(name = "annotater-api")]
#[command(about = "Document annotation API - detection, curation and report generation")]
#[command(version)]
struct Args {
    #[arg(long, help = "YAML configuration file, overridden by environment variables")]
    config: Option<PathBuf>,

    #[arg(long, help = "Listen address, e.g. 0.0.0.0:8080")]
    addr: Option<String>,

    #[arg(long, help = "Keep metadata in memory even when DATABASE_URL is set")]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("annotater_api=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    tracing::info!("Starting annotater-api in {:?} mode", config.environment);

    let document_store = FileStorage::new(&config.storage.document_path, &config.storage.document_ext);
    let report_store = FileStorage::new(&config.storage.report_path, &config.storage.report_ext);
    document_store.init().await.context("failed to prepare document storage")?;
    report_store.init().await.context("failed to prepare report storage")?;

    let detector = Arc::new(HttpDetectionModel::new(&config.model));
    let hasher = Arc::new(Argon2Hasher::new()?);

    let components = match (&config.database.url, args.in_memory) {
        (Some(_), false) => {
            let pool = DatabaseManager::connect(&config.database).await?;
            DatabaseManager::bootstrap_schema(&pool).await?;
            tracing::info!("Using PostgreSQL metadata store");
            Components::postgres(pool, Arc::new(document_store), Arc::new(report_store), detector, hasher)
        }
        _ => {
            tracing::warn!("Using in-memory metadata store; data is lost on shutdown");
            Components::in_memory(Arc::new(document_store), Arc::new(report_store), detector, hasher)
        }
    };

    let tokens = TokenService::new(
        &config.security.jwt_secret,
        chrono::Duration::hours(config.security.jwt_expiry_hours as i64),
    )?;
    let state = AppState::assemble(components, tokens, &config);

    if let Some(admin) = &config.security.bootstrap_admin {
        state
            .auth
            .ensure_admin(&admin.handle, &admin.password)
            .await
            .context("failed to bootstrap admin account")?;
    }

    let app = router(state, &config);
    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.addr))?;
    tracing::info!("annotater-api listening on http://{}", config.server.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
