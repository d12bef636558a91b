//! Agent API Server
//!
//! Runs the intercepting proxy listener: `/__agent/*` control routes plus
//! the fallback that hands every other request to the agent.

use crate::agent::Agent;
use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::rest::AgentRouter;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Proxy bind address
    pub listen_addr: SocketAddr,
    /// Max intercepted request body size
    pub max_body_size: usize,
    /// Allow cross-origin calls to the control routes
    pub permissive_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8090)),
            max_body_size: 10 * 1024 * 1024, // 10MB
            permissive_cors: true,
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

pub struct ApiServer {
    config: ApiServerConfig,
    agent: Arc<Agent>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, agent: Arc<Agent>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            agent,
            shutdown_tx,
        }
    }

    /// Run until shutdown is triggered
    pub async fn run(&self) -> Result<()> {
        info!("Starting agent API server on {}", self.config.listen_addr);

        let handle = self.spawn_proxy_server();
        match handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Proxy server error: {}", e);
                Err(e)
            }
            Err(e) => Err(Error::Internal(format!("Proxy server task failed: {}", e))),
        }
    }

    fn spawn_proxy_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let config = self.config.clone();
        let agent = self.agent.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move { run_proxy_server(config, agent, shutdown_rx).await })
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Handle that can trigger shutdown from another task
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }
}

async fn run_proxy_server(
    config: ApiServerConfig,
    agent: Arc<Agent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let app = AgentRouter::new(agent)
        .max_body_size(config.max_body_size)
        .permissive_cors(config.permissive_cors)
        .build();

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind proxy server: {}", e)))?;

    info!("Proxy listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Proxy server shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("Proxy server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiServerConfig::default();
        assert_eq!(config.listen_addr.port(), 8090);
        assert!(config.listen_addr.ip().is_loopback());
        assert_eq!(config.max_body_size, 10 * 1024 * 1024);
    }
}
