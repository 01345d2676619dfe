// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use vector_store::api::rest::{create_app, ApiConfig};
use vector_store::core::error::StoreError;
use vector_store::store::{StoreConfig, VectorStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vector_store=info,tower_http=debug".into()),
        )
        .init();

    let api_config = ApiConfig::from_env().context("invalid server configuration")?;
    let store_config = StoreConfig::from_env().context("invalid store configuration")?;

    let store = Arc::new(
        VectorStore::open(store_config)
            .await
            .context("failed to open vector store")?,
    );

    match store.load().await {
        Ok(()) => info!("Restored committed snapshot"),
        Err(StoreError::NotFound(_)) => info!("No committed snapshot, starting empty"),
        Err(e) => return Err(e).context("failed to load committed snapshot"),
    }

    info!(
        "Starting vector store server on {}:{}",
        api_config.host, api_config.port
    );
    let app = create_app(store.clone(), &api_config);

    let addr: SocketAddr = format!("{}:{}", api_config.host, api_config.port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = store.persist().await {
        warn!("Final persist failed: {}", e);
        return Err(e.into());
    }
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
