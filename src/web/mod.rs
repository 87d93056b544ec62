//! Panorama catalog HTTP server
//!
//! JSON API over a [`PanoramaCatalog`](crate::catalog::PanoramaCatalog),
//! static panorama files and prompt forwarding.

pub mod api;
pub mod generate;
pub mod routes;

use axum::Router;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::WebError;
use crate::AppState;

/// Web server for the catalog API
pub struct WebServer {
    app_state: Arc<AppState>,
    config: ServerConfig,
}

impl WebServer {
    /// Create a new web server
    pub fn new(app_state: Arc<AppState>, config: &ServerConfig) -> Self {
        Self {
            app_state,
            config: config.clone(),
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        routes::create_router(Arc::clone(&self.app_state), &self.config)
    }

    /// Bind and serve until the shared shutdown signal fires
    pub async fn serve(self) -> Result<(), WebError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| WebError::Bind(format!("{}: {}", addr, e)))?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(self, listener: tokio::net::TcpListener) -> Result<(), WebError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("HTTP server listening on {}", addr);
        }

        let app = self.router();
        let mut shutdown_rx = self.app_state.subscribe_shutdown();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .map_err(|e| WebError::Startup(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
