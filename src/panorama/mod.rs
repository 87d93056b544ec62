//! Panorama records, asset building and the load/render lifecycle

pub mod builder;
pub mod lifecycle;
pub mod metadata;

pub use builder::{
    build, build_with, AssetDescriptor, BuildDefaults, TextureSources, DEFAULT_DEPTH_SCALE,
    DEFAULT_MESH_RESOLUTION, DEFAULT_SPHERE_SIZE,
};
pub use lifecycle::{
    Generation, LifecyclePhase, LifecycleStatus, LoadOutcome, PanoramaLifecycle, SettingsApplied,
    TextureLoad,
};
pub use metadata::{DisplaySettings, PanoramaMetadata};
