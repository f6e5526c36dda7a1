//! Rill notebook server.
//!
//! Serves the REST surface and the SSE event stream over one shared
//! scheduler.
//!
//! # Architecture
//!
//! - **Protocol**: request/response body types
//! - **Routes**: HTTP handlers and the SSE stream
//! - **Error**: response mapping for core errors

pub mod error;
pub mod protocol;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use rill_core::{EventBus, NotebookRepository, PoolManager, Scheduler};

pub use error::{ServerError, ServerResult};
pub use routes::{create_router, AppState};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Build a scheduler wired to a fresh repository, bus, and pool registry.
pub fn build_scheduler() -> Arc<Scheduler> {
    Arc::new(Scheduler::new(
        Arc::new(NotebookRepository::new()),
        EventBus::new(),
        Arc::new(PoolManager::new()),
    ))
}

/// Start the Rill server and block until shutdown.
pub async fn serve(scheduler: Arc<Scheduler>, config: ServerConfig) -> ServerResult<()> {
    let state = Arc::new(AppState {
        scheduler: scheduler.clone(),
    });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", config.host, config.port)))?;

    tracing::info!("starting Rill server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    // release pooled connections before exiting
    scheduler.shutdown().await;
    tracing::info!("server shutdown complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
    }
}
