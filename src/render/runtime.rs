//! Viewer runtime: scene, camera, idle animation and the per-frame draw.
//!
//! The runtime knows nothing about panoramas. It holds at most one attached
//! [`RenderableAsset`] and releases its GPU buffers when the asset is detached
//! or the runtime is dropped.

use glam::{Mat4, Vec3};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::backend::{Frame, RenderBackend};
use super::{AssetId, RenderableAsset, Texture, TextureSlot};
use crate::config::ViewerConfig;
use crate::error::RenderError;

/// Runtime shared between the frame loop and the lifecycle manager
pub type SharedViewer = Arc<Mutex<ViewerRuntime>>;

/// Lock the shared viewer, recovering the guard if a previous holder panicked
pub fn lock_viewer(viewer: &SharedViewer) -> MutexGuard<'_, ViewerRuntime> {
    viewer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Perspective camera at the sphere centre
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Vertical field of view in degrees
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
}

impl Camera {
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            fov_y: config.field_of_view,
            aspect: 16.0 / 9.0,
            near: config.near,
            far: config.far,
            // Slightly off centre so look_at has a direction
            position: Vec3::new(0.0, 0.0, config.camera_offset),
            target: Vec3::ZERO,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Slow spin plus a small horizontal orbit of the attached asset
#[derive(Debug, Clone, Copy, PartialEq)]
struct IdleAnimation {
    spin: f32,
    orbit_radius: f32,
}

impl IdleAnimation {
    fn apply(&self, asset: &mut RenderableAsset, elapsed: f32) {
        let transform = asset.transform_mut();
        transform.rotation_y += self.spin;
        transform.position.x = elapsed.sin() * self.orbit_radius;
        transform.position.z = elapsed.cos() * self.orbit_radius;
    }
}

/// Owns the scene, camera and render backend
pub struct ViewerRuntime {
    backend: Box<dyn RenderBackend>,
    camera: Camera,
    background: [f32; 3],
    attached: Option<RenderableAsset>,
    idle: IdleAnimation,
    presenting: bool,
    started: Instant,
    frames: u64,
}

impl ViewerRuntime {
    pub fn new(config: &ViewerConfig, backend: Box<dyn RenderBackend>) -> Self {
        Self {
            backend,
            camera: Camera::from_config(config),
            background: rgb_from_hex(config.background),
            attached: None,
            idle: IdleAnimation {
                spin: config.idle_spin,
                orbit_radius: config.idle_orbit_radius,
            },
            presenting: false,
            started: Instant::now(),
            frames: 0,
        }
    }

    /// Wrap into the shared form handed to the lifecycle manager
    pub fn into_shared(self) -> SharedViewer {
        Arc::new(Mutex::new(self))
    }

    /// Upload and attach an asset. Anything still attached is detached and
    /// disposed first, so the scene never holds two assets.
    pub fn attach(&mut self, mut asset: RenderableAsset) -> Result<(), RenderError> {
        if let Some(current) = self.attached_id() {
            tracing::warn!("Attaching {} over {}, detaching the old asset", asset.id(), current);
            self.detach(current);
        }

        let handle = self
            .backend
            .upload(asset.id(), asset.geometry(), asset.material())?;

        for slot in TextureSlot::ALL {
            if let Some(texture) = asset.texture(slot) {
                if let Err(e) = self.backend.bind_texture(handle, slot, texture) {
                    tracing::warn!("Failed to bind {} map for {}: {}", slot, asset.id(), e);
                }
            }
        }

        asset.set_gpu_handle(handle);
        tracing::debug!("Attached asset {} ({})", asset.id(), asset.label());
        self.attached = Some(asset);
        Ok(())
    }

    /// Detach and dispose the asset with the given id. Detaching an asset
    /// that is not attached is a no-op and returns false.
    pub fn detach(&mut self, id: AssetId) -> bool {
        if self.attached_id() != Some(id) {
            return false;
        }
        if let Some(mut asset) = self.attached.take() {
            self.dispose(&mut asset);
            tracing::debug!("Detached asset {} ({})", asset.id(), asset.label());
        }
        true
    }

    /// Detach whatever is attached
    pub fn clear(&mut self) -> Option<AssetId> {
        let id = self.attached_id()?;
        self.detach(id);
        Some(id)
    }

    fn dispose(&mut self, asset: &mut RenderableAsset) {
        if let Some(handle) = asset.take_gpu_handle() {
            self.backend.release(handle);
        }
    }

    /// Write a texture into a slot of the attached asset. Returns false when
    /// `id` is not the attached asset or the slot is already filled.
    pub fn bind_texture(&mut self, id: AssetId, slot: TextureSlot, texture: Texture) -> bool {
        let Some(asset) = self.attached.as_mut().filter(|a| a.id() == id) else {
            return false;
        };
        let Some(handle) = asset.gpu_handle() else {
            return false;
        };
        if asset.texture(slot).is_some() {
            return false;
        }

        if let Err(e) = self.backend.bind_texture(handle, slot, &texture) {
            tracing::warn!("Backend refused {} map for {}: {}", slot, id, e);
            return false;
        }
        asset.fill_slot(slot, texture)
    }

    pub fn attached(&self) -> Option<&RenderableAsset> {
        self.attached.as_ref()
    }

    pub fn attached_id(&self) -> Option<AssetId> {
        self.attached.as_ref().map(|a| a.id())
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Enter or leave immersive presentation; the idle animation only runs
    /// outside it
    pub fn set_presenting(&mut self, presenting: bool) {
        if self.presenting != presenting {
            tracing::info!("Immersive presentation {}", if presenting { "started" } else { "ended" });
        }
        self.presenting = presenting;
    }

    pub fn is_presenting(&self) -> bool {
        self.presenting
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.camera.aspect = width as f32 / height as f32;
        self.backend.resize(width, height);
    }

    /// Frame callback. Never blocks and never does I/O.
    pub fn render_frame(&mut self) {
        let elapsed = self.started.elapsed().as_secs_f32();
        self.render_frame_at(elapsed);
    }

    /// Frame callback with an explicit clock reading in seconds
    pub fn render_frame_at(&mut self, elapsed: f32) {
        if !self.presenting {
            if let Some(asset) = self.attached.as_mut() {
                self.idle.apply(asset, elapsed);
            }
        }

        let frame = Frame {
            camera: &self.camera,
            background: self.background,
            asset: self.attached.as_ref(),
            elapsed,
        };

        if let Err(e) = self.backend.draw(&frame) {
            tracing::error!("An error occurred during render: {}", e);
        }
        self.frames += 1;
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}

impl Drop for ViewerRuntime {
    fn drop(&mut self) {
        self.clear();
    }
}

fn rgb_from_hex(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}
