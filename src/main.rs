use std::{env, sync::Arc};

use academy_runtime::{
    app,
    config::{Config, StorageKind},
    db,
    store::{MemoryStore, PgStore, Store},
    AppState,
};
use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "academy_runtime=info,axum=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    let store: Arc<dyn Store> = match config.storage {
        StorageKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL not set")?;
            let pool = db::connect(url).await?;
            // crate-relative path for sqlx migrations
            sqlx::migrate!("./migrations").run(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageKind::Memory => {
            tracing::warn!("using in-memory storage, records are lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, &config);
    let app = app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(storage = %config.storage, "listening on http://0.0.0.0:{}", config.port);

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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
    tracing::info!("shutdown signal received");
}
