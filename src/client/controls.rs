//! Editable display controls

use crate::config::{DisplayConfig, SliderRange, StepRange};
use crate::panorama::DisplaySettings;

/// Slider state for sphere size, depth scale and mesh resolution.
/// User edits are clamped to their range and snapped to their step; values
/// mirrored from a loaded panorama are shown as the panorama has them.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPanel {
    sphere_size: f32,
    depth_scale: f32,
    mesh_resolution: u32,
    sphere_size_range: SliderRange,
    depth_scale_range: SliderRange,
    mesh_resolution_range: StepRange,
}

impl ControlPanel {
    pub fn new(config: &DisplayConfig) -> Self {
        Self {
            sphere_size: config.sphere_size,
            depth_scale: config.depth_scale,
            mesh_resolution: config.mesh_resolution,
            sphere_size_range: config.sphere_size_range,
            depth_scale_range: config.depth_scale_range,
            mesh_resolution_range: config.mesh_resolution_range,
        }
    }

    pub fn sphere_size(&self) -> f32 {
        self.sphere_size
    }

    pub fn depth_scale(&self) -> f32 {
        self.depth_scale
    }

    pub fn mesh_resolution(&self) -> u32 {
        self.mesh_resolution
    }

    pub fn sphere_size_range(&self) -> SliderRange {
        self.sphere_size_range
    }

    pub fn depth_scale_range(&self) -> SliderRange {
        self.depth_scale_range
    }

    pub fn mesh_resolution_range(&self) -> StepRange {
        self.mesh_resolution_range
    }

    pub fn set_sphere_size(&mut self, value: f32) -> f32 {
        self.sphere_size = snap(value, self.sphere_size_range);
        self.sphere_size
    }

    pub fn set_depth_scale(&mut self, value: f32) -> f32 {
        self.depth_scale = snap(value, self.depth_scale_range);
        self.depth_scale
    }

    pub fn set_mesh_resolution(&mut self, value: u32) -> u32 {
        self.mesh_resolution = snap_steps(value, self.mesh_resolution_range);
        self.mesh_resolution
    }

    /// Mirror the effective settings of a freshly loaded panorama. Values
    /// outside the slider ranges are kept, so a later apply writes back what
    /// the server sent.
    pub fn update_from(&mut self, settings: &DisplaySettings) {
        self.sphere_size = settings.sphere_size;
        self.depth_scale = settings.depth_scale;
        self.mesh_resolution = settings.mesh_resolution;
    }

    /// Current values, ready to apply
    pub fn settings(&self) -> DisplaySettings {
        DisplaySettings {
            sphere_size: self.sphere_size,
            depth_scale: self.depth_scale,
            mesh_resolution: self.mesh_resolution,
        }
    }

    pub fn sphere_size_label(&self) -> String {
        format!("Sphere Size: {}", trim_float(self.sphere_size))
    }

    pub fn depth_scale_label(&self) -> String {
        format!("Depth Scale: {}", trim_float(self.depth_scale))
    }

    pub fn mesh_resolution_label(&self) -> String {
        format!("Mesh Resolution: {}", self.mesh_resolution)
    }
}

fn snap(value: f32, range: SliderRange) -> f32 {
    if !value.is_finite() {
        return range.min;
    }
    let clamped = value.clamp(range.min, range.max);
    let steps = ((clamped - range.min) / range.step).round();
    let snapped = range.min + steps * range.step;
    // drop accumulated float noise (6.0000005 -> 6)
    ((snapped * 1000.0).round() / 1000.0).clamp(range.min, range.max)
}

fn snap_steps(value: u32, range: StepRange) -> u32 {
    let clamped = value.clamp(range.min, range.max);
    let offset = clamped - range.min;
    let steps = (offset + range.step / 2) / range.step;
    (range.min + steps * range.step).min(range.max)
}

fn trim_float(value: f32) -> String {
    let text = format!("{:.1}", value);
    text.strip_suffix(".0").map(str::to_string).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> ControlPanel {
        ControlPanel::new(&DisplayConfig::default())
    }

    #[test]
    fn test_starts_at_display_defaults() {
        let panel = panel();
        assert_eq!(panel.sphere_size(), 6.0);
        assert_eq!(panel.depth_scale(), 4.0);
        assert_eq!(panel.mesh_resolution(), 256);
    }

    #[test]
    fn test_values_are_clamped() {
        let mut panel = panel();
        assert_eq!(panel.set_sphere_size(100.0), 30.0);
        assert_eq!(panel.set_sphere_size(0.5), 3.0);
        assert_eq!(panel.set_depth_scale(-25.0), -10.0);
        assert_eq!(panel.set_mesh_resolution(64), 256);
        assert_eq!(panel.set_mesh_resolution(100_000), 8192);
        assert_eq!(panel.set_sphere_size(f32::NAN), 3.0);
    }

    #[test]
    fn test_values_snap_to_step() {
        let mut panel = panel();
        assert!((panel.set_sphere_size(6.04) - 6.0).abs() < 1e-4);
        assert!((panel.set_depth_scale(-4.26) - -4.3).abs() < 1e-4);
        assert_eq!(panel.set_mesh_resolution(700), 768);
        assert_eq!(panel.set_mesh_resolution(600), 512);
    }

    #[test]
    fn test_update_from_metadata_settings() {
        let mut panel = panel();
        panel.update_from(&DisplaySettings {
            sphere_size: 12.0,
            depth_scale: -4.0,
            mesh_resolution: 1024,
        });
        assert_eq!(
            panel.settings(),
            DisplaySettings {
                sphere_size: 12.0,
                depth_scale: -4.0,
                mesh_resolution: 1024,
            }
        );
    }

    #[test]
    fn test_update_from_keeps_out_of_range_values() {
        let mut panel = panel();
        let remote = DisplaySettings {
            sphere_size: 50.0,
            depth_scale: -4.0,
            mesh_resolution: 128,
        };
        panel.update_from(&remote);
        assert_eq!(panel.settings(), remote);
        assert_eq!(panel.mesh_resolution_label(), "Mesh Resolution: 128");

        // only an edit pulls the value back into range
        assert_eq!(panel.set_mesh_resolution(panel.mesh_resolution()), 256);
        assert_eq!(panel.sphere_size(), 50.0);
    }

    #[test]
    fn test_labels() {
        let mut panel = panel();
        assert_eq!(panel.sphere_size_label(), "Sphere Size: 6");
        assert_eq!(panel.depth_scale_label(), "Depth Scale: 4");
        panel.set_depth_scale(-2.5);
        assert_eq!(panel.depth_scale_label(), "Depth Scale: -2.5");
        assert_eq!(panel.mesh_resolution_label(), "Mesh Resolution: 256");
    }
}
