//! Metadata → renderable description. Pure; no I/O.

use serde::Serialize;

use super::metadata::{DisplaySettings, PanoramaMetadata};
use crate::config::DisplayConfig;
use crate::render::{AssetId, MaterialDescriptor, Orientation, RenderableAsset, SphereGeometry};

pub const DEFAULT_SPHERE_SIZE: f32 = 6.0;
pub const DEFAULT_MESH_RESOLUTION: u32 = 256;
pub const DEFAULT_DEPTH_SCALE: f32 = 4.0;

/// Values used for fields the metadata leaves out
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildDefaults {
    pub sphere_size: f32,
    pub mesh_resolution: u32,
    pub depth_scale: f32,
}

impl Default for BuildDefaults {
    fn default() -> Self {
        Self {
            sphere_size: DEFAULT_SPHERE_SIZE,
            mesh_resolution: DEFAULT_MESH_RESOLUTION,
            depth_scale: DEFAULT_DEPTH_SCALE,
        }
    }
}

impl From<&DisplayConfig> for BuildDefaults {
    fn from(config: &DisplayConfig) -> Self {
        Self {
            sphere_size: config.sphere_size,
            mesh_resolution: config.mesh_resolution,
            depth_scale: config.depth_scale,
        }
    }
}

/// Where the two textures come from. Relative paths are resolved against
/// the API base URL by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextureSources {
    pub color: Option<String>,
    pub displacement: Option<String>,
}

/// Everything needed to create the renderable for one panorama
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetDescriptor {
    pub panorama_id: String,
    pub name: Option<String>,
    pub geometry: SphereGeometry,
    pub material: MaterialDescriptor,
    pub sources: TextureSources,
    /// Effective display values, mirrored into the UI controls
    pub settings: DisplaySettings,
}

impl AssetDescriptor {
    /// Instantiate with empty texture slots
    pub fn instantiate(&self, id: AssetId) -> RenderableAsset {
        RenderableAsset::new(id, self.panorama_id.clone(), self.geometry, self.material)
    }
}

/// Build with the built-in defaults (sphere 6, resolution 256)
pub fn build(metadata: &PanoramaMetadata) -> AssetDescriptor {
    build_with(metadata, &BuildDefaults::default())
}

/// Build an [`AssetDescriptor`]; output depends only on the inputs
pub fn build_with(metadata: &PanoramaMetadata, defaults: &BuildDefaults) -> AssetDescriptor {
    let sphere_size = metadata
        .sphere_size
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or(defaults.sphere_size);
    let mesh_resolution = metadata
        .mesh_resolution
        .filter(|r| *r > 0)
        .unwrap_or(defaults.mesh_resolution);
    let depth_scale = metadata
        .depth_scale
        .filter(|d| d.is_finite())
        .unwrap_or(defaults.depth_scale);

    let geometry = SphereGeometry::new(sphere_size, mesh_resolution);

    AssetDescriptor {
        panorama_id: metadata.id.clone(),
        name: metadata.name.clone(),
        geometry,
        material: MaterialDescriptor {
            orientation: Orientation::Inside,
            displacement_scale: depth_scale,
        },
        sources: TextureSources {
            color: source_or_default(metadata.image_url.as_deref(), &metadata.id, "image.png"),
            displacement: source_or_default(metadata.depth_url.as_deref(), &metadata.id, "depth.png"),
        },
        settings: DisplaySettings {
            sphere_size,
            depth_scale,
            mesh_resolution: geometry.width_segments,
        },
    }
}

fn source_or_default(explicit: Option<&str>, id: &str, file: &str) -> Option<String> {
    match explicit.map(str::trim) {
        Some(url) if !url.is_empty() => Some(url.to_string()),
        _ if !id.is_empty() => Some(format!("panoramas/{}/{}", id, file)),
        _ => None,
    }
}
