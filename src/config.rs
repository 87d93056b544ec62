//! Configuration parsing and management for Holoscape

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, HoloscapeError};

/// Environment variable that overrides `generation.endpoint`
pub const GENERATION_ENDPOINT_ENV: &str = "COMFYUI_ENDPOINT";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub viewer: ViewerConfig,
    pub display: DisplayConfig,
    pub generation: GenerationConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, HoloscapeError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, HoloscapeError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, HoloscapeError> {
        let paths = [
            PathBuf::from("holoscape.toml"),
            PathBuf::from("config/holoscape.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Apply environment overrides (currently only the generation endpoint)
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var(GENERATION_ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                self.generation.endpoint = Some(endpoint);
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), HoloscapeError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "Port must be greater than 0"));
        }

        if self.viewer.frame_rate == 0 {
            return Err(invalid("viewer.frame_rate", "Frame rate must be greater than 0"));
        }

        if !(self.viewer.field_of_view > 0.0 && self.viewer.field_of_view < 180.0) {
            return Err(invalid(
                "viewer.field_of_view",
                "Field of view must be between 0 and 180 degrees",
            ));
        }

        if !(self.viewer.near > 0.0 && self.viewer.near < self.viewer.far) {
            return Err(invalid("viewer.near", "Near plane must be positive and below far"));
        }

        if !self.viewer.metadata_path.contains("{id}") {
            return Err(invalid("viewer.metadata_path", "Path must contain the {id} placeholder"));
        }

        if url_parse(&self.viewer.api_base_url).is_none() {
            return Err(invalid("viewer.api_base_url", "Not an absolute http(s) URL"));
        }

        let display = &self.display;
        for (field, range) in [
            ("display.sphere_size_range", display.sphere_size_range),
            ("display.depth_scale_range", display.depth_scale_range),
        ] {
            if !(range.min < range.max && range.step > 0.0) {
                return Err(invalid(field, "Range must have min < max and a positive step"));
            }
        }

        let mesh = display.mesh_resolution_range;
        if !(mesh.min < mesh.max && mesh.step > 0) {
            return Err(invalid(
                "display.mesh_resolution_range",
                "Range must have min < max and a positive step",
            ));
        }

        if display.sphere_size <= 0.0 {
            return Err(invalid("display.sphere_size", "Sphere size must be positive"));
        }

        if display.mesh_resolution < 3 {
            return Err(invalid("display.mesh_resolution", "Mesh resolution must be at least 3"));
        }

        if let Some(ref endpoint) = self.generation.endpoint {
            if url_parse(endpoint).is_none() {
                tracing::warn!("Generation endpoint is not an absolute URL: {}", endpoint);
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> HoloscapeError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn url_parse(s: &str) -> Option<reqwest::Url> {
    reqwest::Url::parse(s)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

/// Catalog HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server host
    pub host: String,
    /// HTTP server port
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Directory holding one sub-directory per panorama
    pub panoramas_dir: PathBuf,
    /// Directory of static pages served as fallback
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_enabled: true,
            panoramas_dir: PathBuf::from("./panoramas"),
            static_dir: PathBuf::from("./public"),
        }
    }
}

/// Viewer (client) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Base URL of the panorama API
    pub api_base_url: String,
    /// Path of the panorama list, relative to the base
    pub list_path: String,
    /// Path of one metadata record; `{id}` is replaced by the panorama id
    pub metadata_path: String,
    /// Vertical field of view in degrees
    pub field_of_view: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
    /// Camera Z offset from the sphere centre
    pub camera_offset: f32,
    /// Scene clear colour as 0xRRGGBB
    pub background: u32,
    /// Idle rotation around Y per frame, radians
    pub idle_spin: f32,
    /// Radius of the idle orbit of the sphere centre
    pub idle_orbit_radius: f32,
    /// Headless frame loop rate in Hz
    pub frame_rate: u32,
    /// HTTP request timeout in seconds (0 disables)
    pub request_timeout_secs: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/".to_string(),
            list_path: "api/panorama_list".to_string(),
            metadata_path: "api/panorama/{id}".to_string(),
            field_of_view: 70.0,
            near: 0.1,
            far: 2000.0,
            camera_offset: 0.01,
            background: 0x101010,
            idle_spin: 0.001,
            idle_orbit_radius: 0.2,
            frame_rate: 60,
            request_timeout_secs: 0,
        }
    }
}

/// A continuous slider range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliderRange {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

/// An integer slider range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRange {
    pub min: u32,
    pub max: u32,
    pub step: u32,
}

/// Display defaults and editable control ranges
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Sphere radius used when metadata omits it
    pub sphere_size: f32,
    /// Sphere segments (both axes) used when metadata omits it
    pub mesh_resolution: u32,
    /// Displacement scale used when metadata omits it
    pub depth_scale: f32,
    pub sphere_size_range: SliderRange,
    pub depth_scale_range: SliderRange,
    pub mesh_resolution_range: StepRange,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            sphere_size: 6.0,
            mesh_resolution: 256,
            depth_scale: 4.0,
            sphere_size_range: SliderRange {
                min: 3.0,
                max: 30.0,
                step: 0.1,
            },
            depth_scale_range: SliderRange {
                min: -10.0,
                max: 10.0,
                step: 0.1,
            },
            mesh_resolution_range: StepRange {
                min: 256,
                max: 8192,
                step: 256,
            },
        }
    }
}

/// Image-generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of the generation service
    pub endpoint: Option<String>,
    /// Path appended to the endpoint for workflow submission
    pub workflow_path: String,
    /// Request timeout in seconds (0 disables)
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            workflow_path: "/v1/run_workflow".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("holoscape");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/holoscape");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/holoscape");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("holoscape");
        }
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.display.sphere_size, 6.0);
        assert_eq!(config.display.mesh_resolution, 256);
        assert_eq!(config.viewer.field_of_view, 70.0);
        assert!(config.generation.endpoint.is_none());
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(matches!(
            config.validate(),
            Err(HoloscapeError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_rejects_relative_api_url() {
        let mut config = Config::default();
        config.viewer.api_base_url = "panoramas/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [server]
            port = 9000
            panoramas_dir = "/srv/panos"

            [display]
            depth_scale = -4.0

            [generation]
            endpoint = "http://comfy.local:8188"
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.panoramas_dir, PathBuf::from("/srv/panos"));
        assert_eq!(config.display.depth_scale, -4.0);
        assert_eq!(config.display.sphere_size, 6.0);
        assert_eq!(
            config.generation.endpoint.as_deref(),
            Some("http://comfy.local:8188")
        );
        assert_eq!(config.generation.workflow_path, "/v1/run_workflow");
    }
}
