//! Panorama viewport inside the egui central panel.
//!
//! Each frame the viewer runtime is resized to the panel's physical pixels
//! and advanced, which hands the renderer a fresh draw snapshot. The paint
//! callback then renders that snapshot offscreen and composites it.

#![cfg(feature = "native-ui")]

use eframe::egui;
use eframe::egui_wgpu;
use eframe::wgpu;
use std::sync::Arc;

use super::renderer::SphereRenderer;
use crate::render::{lock_viewer, SharedViewer};

/// Fill `ui` with the panorama: size the viewer to the panel, run one
/// viewer frame and queue the GPU pass.
pub fn show_panorama(ui: &mut egui::Ui, viewer: &SharedViewer, renderer: &Arc<SphereRenderer>) {
    let available = ui.available_size();
    let (rect, _response) = ui.allocate_exact_size(available, egui::Sense::hover());
    let [width, height] = physical_size(available, ui.ctx().pixels_per_point());

    {
        let mut viewer = lock_viewer(viewer);
        viewer.resize(width, height);
        viewer.render_frame();
    }

    ui.painter().add(egui_wgpu::Callback::new_paint_callback(
        rect,
        PanoramaPaintCallback {
            renderer: Arc::clone(renderer),
            width,
            height,
        },
    ));
}

/// Panel size in device pixels, never zero
fn physical_size(logical: egui::Vec2, pixels_per_point: f32) -> [u32; 2] {
    [
        ((logical.x * pixels_per_point) as u32).max(1),
        ((logical.y * pixels_per_point) as u32).max(1),
    ]
}

/// Renders the latest sphere snapshot offscreen in `prepare` and blits it in
/// `paint`
struct PanoramaPaintCallback {
    renderer: Arc<SphereRenderer>,
    width: u32,
    height: u32,
}

impl egui_wgpu::CallbackTrait for PanoramaPaintCallback {
    fn prepare(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        _screen_descriptor: &egui_wgpu::ScreenDescriptor,
        _egui_encoder: &mut wgpu::CommandEncoder,
        _callback_resources: &mut egui_wgpu::CallbackResources,
    ) -> Vec<wgpu::CommandBuffer> {
        // Target follows the panel; a no-op when the size is unchanged
        self.renderer.resize(device, self.width, self.height);
        self.renderer.render_offscreen(device, queue);
        Vec::new()
    }

    fn paint(
        &self,
        _info: egui::PaintCallbackInfo,
        render_pass: &mut wgpu::RenderPass<'static>,
        _callback_resources: &egui_wgpu::CallbackResources,
    ) {
        self.renderer.blit(render_pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_size_scales_by_pixels_per_point() {
        assert_eq!(physical_size(egui::vec2(640.0, 360.0), 2.0), [1280, 720]);
    }

    #[test]
    fn test_physical_size_never_zero() {
        assert_eq!(physical_size(egui::vec2(0.0, 0.4), 1.0), [1, 1]);
    }
}
