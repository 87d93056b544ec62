//! Render backend seam
//!
//! The viewer runtime talks to the 3D engine only through [`RenderBackend`].
//! [`HeadlessBackend`] keeps book on uploads and releases without a GPU and
//! drives the `view` command when no window is requested.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::runtime::Camera;
use super::{AssetId, MaterialDescriptor, RenderableAsset, SphereGeometry, Texture, TextureSlot};
use crate::error::RenderError;

/// Engine-side handle to uploaded geometry + material buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuHandle(pub u64);

/// Everything a backend needs to draw one frame
#[derive(Debug)]
pub struct Frame<'a> {
    pub camera: &'a Camera,
    pub background: [f32; 3],
    pub asset: Option<&'a RenderableAsset>,
    pub elapsed: f32,
}

/// Opaque 3D engine interface
pub trait RenderBackend: Send {
    /// Allocate geometry and material buffers for an asset
    fn upload(
        &mut self,
        id: AssetId,
        geometry: &SphereGeometry,
        material: &MaterialDescriptor,
    ) -> Result<GpuHandle, RenderError>;

    /// Bind a texture into one material slot of an uploaded asset
    fn bind_texture(
        &mut self,
        handle: GpuHandle,
        slot: TextureSlot,
        texture: &Texture,
    ) -> Result<(), RenderError>;

    /// Free the buffers behind a handle
    fn release(&mut self, handle: GpuHandle);

    /// Draw one frame. Must tolerate assets with empty texture slots.
    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), RenderError>;

    fn resize(&mut self, _width: u32, _height: u32) {}
}

/// Counters exposed by [`HeadlessBackend`]
#[derive(Debug, Default)]
pub struct HeadlessStats {
    uploads: AtomicU64,
    releases: AtomicU64,
    double_releases: AtomicU64,
    texture_binds: AtomicU64,
    draws: AtomicU64,
    textured_draws: AtomicU64,
    live: Mutex<HashSet<u64>>,
}

impl HeadlessStats {
    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    /// Releases of handles that were already freed or never existed
    pub fn double_releases(&self) -> u64 {
        self.double_releases.load(Ordering::Relaxed)
    }

    pub fn texture_binds(&self) -> u64 {
        self.texture_binds.load(Ordering::Relaxed)
    }

    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Relaxed)
    }

    /// Frames drawn with a colour map bound
    pub fn textured_draws(&self) -> u64 {
        self.textured_draws.load(Ordering::Relaxed)
    }

    /// Number of handles uploaded and not yet released
    pub fn live_handles(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// GPU-less backend
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_handle: u64,
    uploaded: HashMap<GpuHandle, AssetId>,
    stats: Arc<HeadlessStats>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counters, still readable after the backend is boxed
    pub fn stats(&self) -> Arc<HeadlessStats> {
        Arc::clone(&self.stats)
    }
}

impl RenderBackend for HeadlessBackend {
    fn upload(
        &mut self,
        id: AssetId,
        geometry: &SphereGeometry,
        _material: &MaterialDescriptor,
    ) -> Result<GpuHandle, RenderError> {
        if !(geometry.radius.is_finite() && geometry.radius > 0.0) {
            return Err(RenderError::Upload(id.0, format!("invalid radius {}", geometry.radius)));
        }

        self.next_handle += 1;
        let handle = GpuHandle(self.next_handle);
        self.uploaded.insert(handle, id);
        self.stats.uploads.fetch_add(1, Ordering::Relaxed);
        self.stats
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.0);

        tracing::debug!(
            "Headless upload: asset {} -> handle {} ({} vertices)",
            id,
            handle.0,
            geometry.vertex_count()
        );
        Ok(handle)
    }

    fn bind_texture(
        &mut self,
        handle: GpuHandle,
        slot: TextureSlot,
        texture: &Texture,
    ) -> Result<(), RenderError> {
        if !self.uploaded.contains_key(&handle) {
            return Err(RenderError::UnknownHandle(handle.0));
        }
        let (width, height) = texture.dimensions();
        tracing::debug!("Headless bind: handle {} {} {}x{}", handle.0, slot, width, height);
        self.stats.texture_binds.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn release(&mut self, handle: GpuHandle) {
        if self.uploaded.remove(&handle).is_none() {
            tracing::warn!("Release of unknown GPU handle {}", handle.0);
            self.stats.double_releases.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.stats.releases.fetch_add(1, Ordering::Relaxed);
        self.stats
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0);
    }

    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), RenderError> {
        if let Some(asset) = frame.asset {
            let handle = asset
                .gpu_handle()
                .ok_or_else(|| RenderError::Draw(format!("asset {} was never uploaded", asset.id())))?;
            if !self.uploaded.contains_key(&handle) {
                return Err(RenderError::UnknownHandle(handle.0));
            }
            if asset.texture(TextureSlot::Color).is_some() {
                self.stats.textured_draws.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.stats.draws.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
