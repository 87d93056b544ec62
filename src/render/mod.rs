//! Engine-side rendering primitives
//!
//! Holds the renderable types shared between the lifecycle manager and the
//! viewer runtime: textures, sphere geometry, material descriptors and the
//! [`RenderableAsset`] that pairs them with a GPU disposal handle.

pub mod backend;
pub mod geometry;
pub mod runtime;

pub use backend::{Frame, GpuHandle, HeadlessBackend, HeadlessStats, RenderBackend};
pub use geometry::{SphereGeometry, SphereMesh, SphereVertex};
pub use runtime::{lock_viewer, Camera, SharedViewer, ViewerRuntime};

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identifies one renderable asset for its whole life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u64);

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The two texture slots of a panorama material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureSlot {
    /// Colour map (the panorama image itself)
    Color,
    /// Grayscale depth map driving vertex displacement
    Displacement,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 2] = [TextureSlot::Color, TextureSlot::Displacement];

    /// Sampling parameters every texture loaded into this slot gets
    pub fn sampling(self) -> Sampling {
        match self {
            TextureSlot::Color => Sampling {
                color_space: ColorSpace::Srgb,
                filter: FilterMode::Nearest,
                generate_mipmaps: false,
            },
            TextureSlot::Displacement => Sampling {
                color_space: ColorSpace::Linear,
                filter: FilterMode::Nearest,
                generate_mipmaps: false,
            },
        }
    }
}

impl std::fmt::Display for TextureSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextureSlot::Color => write!(f, "color"),
            TextureSlot::Displacement => write!(f, "displacement"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// How a texture is sampled by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampling {
    pub color_space: ColorSpace,
    pub filter: FilterMode,
    pub generate_mipmaps: bool,
}

/// Decoded RGBA8 pixels plus sampling parameters
pub struct TextureData {
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub sampling: Sampling,
}

/// Ready-to-use texture handle. Cloning shares the pixel data.
#[derive(Clone)]
pub struct Texture(Arc<TextureData>);

impl Texture {
    /// Wrap raw RGBA8 pixels; `pixels.len()` must be `width * height * 4`
    pub fn from_rgba(
        source: impl Into<String>,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        slot: TextureSlot,
    ) -> Option<Self> {
        if pixels.len() != (width as usize) * (height as usize) * 4 {
            return None;
        }
        Some(Self(Arc::new(TextureData {
            source: source.into(),
            width,
            height,
            pixels,
            sampling: slot.sampling(),
        })))
    }

    /// Convert a decoded image into a texture for the given slot
    pub fn from_image(source: impl Into<String>, image: image::DynamicImage, slot: TextureSlot) -> Self {
        let rgba = image.into_rgba8();
        let (width, height) = rgba.dimensions();
        Self(Arc::new(TextureData {
            source: source.into(),
            width,
            height,
            pixels: rgba.into_raw(),
            sampling: slot.sampling(),
        }))
    }

    pub fn source(&self) -> &str {
        &self.0.source
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.0.width, self.0.height)
    }

    pub fn data(&self) -> &TextureData {
        &self.0
    }

    /// True when both handles share the same pixel buffer
    pub fn ptr_eq(&self, other: &Texture) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("source", &self.0.source)
            .field("width", &self.0.width)
            .field("height", &self.0.height)
            .field("sampling", &self.0.sampling)
            .finish()
    }
}

/// Which faces of the sphere are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Camera sits at the centre looking outwards
    Inside,
}

/// Texture-independent material parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialDescriptor {
    pub orientation: Orientation,
    /// Signed scale applied to the displacement map along vertex normals
    pub displacement_scale: f32,
}

/// Model transform driven by the idle animation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub position: Vec3,
    pub rotation_y: f32,
}

impl Transform {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position) * Mat4::from_rotation_y(self.rotation_y)
    }
}

/// Geometry + material pairing attached to the scene for one panorama.
///
/// Texture slots are filled at most once; the GPU handle is released at most
/// once, by the [`ViewerRuntime`] that uploaded it.
#[derive(Debug)]
pub struct RenderableAsset {
    id: AssetId,
    label: String,
    geometry: SphereGeometry,
    material: MaterialDescriptor,
    color_map: Option<Texture>,
    displacement_map: Option<Texture>,
    transform: Transform,
    gpu: Option<GpuHandle>,
    disposed: bool,
}

impl RenderableAsset {
    pub fn new(
        id: AssetId,
        label: impl Into<String>,
        geometry: SphereGeometry,
        material: MaterialDescriptor,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            geometry,
            material,
            color_map: None,
            displacement_map: None,
            transform: Transform::default(),
            gpu: None,
            disposed: false,
        }
    }

    /// Pre-fill a slot before the asset is attached
    pub fn with_texture(mut self, slot: TextureSlot, texture: Texture) -> Self {
        *self.slot_mut(slot) = Some(texture);
        self
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn geometry(&self) -> &SphereGeometry {
        &self.geometry
    }

    pub fn material(&self) -> &MaterialDescriptor {
        &self.material
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&Texture> {
        match slot {
            TextureSlot::Color => self.color_map.as_ref(),
            TextureSlot::Displacement => self.displacement_map.as_ref(),
        }
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    pub fn gpu_handle(&self) -> Option<GpuHandle> {
        self.gpu
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Fill an empty slot. Returns false if the slot was already written or
    /// the asset has been disposed.
    pub(crate) fn fill_slot(&mut self, slot: TextureSlot, texture: Texture) -> bool {
        if self.disposed {
            return false;
        }
        let target = self.slot_mut(slot);
        if target.is_some() {
            return false;
        }
        *target = Some(texture);
        true
    }

    pub(crate) fn set_gpu_handle(&mut self, handle: GpuHandle) {
        self.gpu = Some(handle);
    }

    /// Hand out the GPU handle for release. Yields it exactly once.
    pub(crate) fn take_gpu_handle(&mut self) -> Option<GpuHandle> {
        self.disposed = true;
        self.gpu.take()
    }

    fn slot_mut(&mut self, slot: TextureSlot) -> &mut Option<Texture> {
        match slot {
            TextureSlot::Color => &mut self.color_map,
            TextureSlot::Displacement => &mut self.displacement_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(slot: TextureSlot) -> Texture {
        Texture::from_rgba("mem://px", 1, 1, vec![255, 255, 255, 255], slot).unwrap()
    }

    fn asset() -> RenderableAsset {
        RenderableAsset::new(
            AssetId(1),
            "p1",
            SphereGeometry::new(6.0, 8),
            MaterialDescriptor {
                orientation: Orientation::Inside,
                displacement_scale: -4.0,
            },
        )
    }

    #[test]
    fn test_from_rgba_checks_length() {
        assert!(Texture::from_rgba("x", 2, 2, vec![0; 15], TextureSlot::Color).is_none());
        assert!(Texture::from_rgba("x", 2, 2, vec![0; 16], TextureSlot::Color).is_some());
    }

    #[test]
    fn test_slot_sampling() {
        let color = TextureSlot::Color.sampling();
        assert_eq!(color.color_space, ColorSpace::Srgb);
        assert_eq!(color.filter, FilterMode::Nearest);
        assert!(!color.generate_mipmaps);
        assert_eq!(TextureSlot::Displacement.sampling().color_space, ColorSpace::Linear);
    }

    #[test]
    fn test_slots_are_write_once() {
        let mut asset = asset();
        assert!(asset.fill_slot(TextureSlot::Color, pixel(TextureSlot::Color)));
        assert!(!asset.fill_slot(TextureSlot::Color, pixel(TextureSlot::Color)));
        assert!(asset.texture(TextureSlot::Displacement).is_none());
    }

    #[test]
    fn test_disposed_asset_rejects_textures() {
        let mut asset = asset();
        asset.set_gpu_handle(GpuHandle(7));
        assert_eq!(asset.take_gpu_handle(), Some(GpuHandle(7)));
        assert_eq!(asset.take_gpu_handle(), None);
        assert!(asset.is_disposed());
        assert!(!asset.fill_slot(TextureSlot::Color, pixel(TextureSlot::Color)));
    }
}
