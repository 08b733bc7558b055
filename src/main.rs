//! `resource-server`: serves the `shows` resource over HTTP.
//!
//! Configuration comes from the environment (and an optional `.env`); without
//! `DATABASE_URL` records are kept in memory.

use std::sync::Arc;

use resource_sdk::{build_app, connect_with_retry, Datastore, PgStore, ServerConfig, Show};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_sdk=info,resource_server=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let pg = match &config.database_url {
        Some(url) => {
            let pool = connect_with_retry(
                url,
                config.db_max_connections,
                config.db_connect_retry,
                config.db_connect_attempts,
            )
            .await?;
            let store = Arc::new(PgStore::new(pool));
            store.ensure_table(Show::DDL).await?;
            tracing::info!("connected to database");
            Some(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping records in memory");
            None
        }
    };
    let datastore = match &pg {
        Some(store) => Datastore::new(store.clone()),
        None => Datastore::in_memory(),
    };

    let app = build_app(datastore, &config)?;
    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(store) = pg {
        store.close().await;
    }
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
