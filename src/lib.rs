//! Holoscape - panorama viewer and catalog service
//!
//! - Fetches panorama metadata, colour image and depth map from a catalog API
//! - Renders the panorama on the inside of a displaced sphere, one at a time
//! - Serves a filesystem panorama catalog over HTTP
//! - Forwards text prompts to an image-generation workflow service

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod loader;
pub mod panorama;
pub mod render;
pub mod web;

#[cfg(feature = "native-ui")]
pub mod ui;

pub use config::Config;
pub use error::{HoloscapeError, Result};

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use catalog::PanoramaCatalog;
use web::generate::{ComfyUiClient, GenerationBackend};

/// Server state shared across request handlers
pub struct AppState {
    /// Current configuration
    pub config: RwLock<Config>,
    /// Panorama store behind the API
    pub catalog: PanoramaCatalog,
    /// Generation service, if an endpoint is configured
    pub generator: Option<Arc<dyn GenerationBackend>>,
    /// Shutdown signal
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create the state, connecting the generation backend from config
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let generator = ComfyUiClient::from_config(&config.generation)?
            .map(|client| Arc::new(client) as Arc<dyn GenerationBackend>);
        Ok(Self::with_generator(config, generator))
    }

    /// Create the state with an explicit generation backend
    pub fn with_generator(config: Config, generator: Option<Arc<dyn GenerationBackend>>) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let catalog = PanoramaCatalog::new(config.server.panoramas_dir.clone());

        Arc::new(Self {
            config: RwLock::new(config),
            catalog,
            generator,
            shutdown_tx,
        })
    }

    /// Subscribe to shutdown signal
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
