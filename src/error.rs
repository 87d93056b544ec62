//! Error types for Holoscape

use thiserror::Error;

use crate::render::TextureSlot;

/// Main error type for Holoscape
#[derive(Error, Debug)]
pub enum HoloscapeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Texture load error: {0}")]
    Load(#[from] LoadError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Config sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Web server error: {0}")]
    Web(#[from] WebError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Failure to fetch a JSON record from the remote API
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    /// HTTP status code, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Reason an image resource could not be turned into a texture
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadFailure {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("image decode failed: {0}")]
    Decode(String),
}

/// Failure to load one texture slot. Carries the slot so callers can tell a
/// missing depth map (ignorable) from a missing colour map (degraded).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{slot} texture {url}: {reason}")]
pub struct LoadError {
    pub slot: TextureSlot,
    pub url: String,
    pub reason: LoadFailure,
}

impl LoadError {
    pub fn new(slot: TextureSlot, url: impl Into<String>, reason: LoadFailure) -> Self {
        Self {
            slot,
            url: url.into(),
            reason,
        }
    }

    /// Depth maps are optional; losing one never degrades the panorama
    pub fn is_ignorable(&self) -> bool {
        self.slot == TextureSlot::Displacement
    }
}

/// Panorama lifecycle errors reported to the caller of a selection
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Failed to fetch metadata for panorama '{panorama}': {source}")]
    Metadata {
        panorama: String,
        #[source]
        source: FetchError,
    },

    #[error("Selection of panorama '{panorama}' was superseded by generation {latest}")]
    Superseded { panorama: String, latest: u64 },

    #[error("Failed to attach panorama '{panorama}': {source}")]
    Attach {
        panorama: String,
        #[source]
        source: RenderError,
    },

    #[error("No panorama is currently loaded")]
    NothingLoaded,
}

/// Rendering backend errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Failed to upload asset {0}: {1}")]
    Upload(u64, String),

    #[error("Unknown GPU handle {0}")]
    UnknownHandle(u64),

    #[error("Draw failed: {0}")]
    Draw(String),
}

/// Config push errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to reach {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{url} rejected the update with HTTP {status}")]
    Rejected { url: String, status: u16 },
}

/// Generation service errors
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Upstream(String),

    #[error("Generation response could not be decoded: {0}")]
    Decode(String),
}

/// Panorama catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Invalid panorama id: '{0}'")]
    InvalidId(String),

    #[error("Panorama not found: {0}")]
    NotFound(String),

    #[error("Malformed config for panorama {id}: {message}")]
    MalformedConfig { id: String, message: String },

    #[error("Catalog IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Web server errors
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    #[error("Server startup failed: {0}")]
    Startup(String),
}

/// Result type alias for Holoscape operations
pub type Result<T> = std::result::Result<T, HoloscapeError>;
