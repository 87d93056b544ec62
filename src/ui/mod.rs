//! Native egui UI for holoscape.
//!
//! Provides a desktop window with:
//! - Panorama viewport rendered through wgpu
//! - Panorama selector and display sliders
//! - Prompt box for the generation service
//!
//! Enabled via `--features native-ui`.

mod app;
mod renderer;
mod viewport;

pub use app::HoloscapeApp;
pub use renderer::{SphereRenderer, WgpuBackend};
