//! UV-sphere geometry.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

/// Fewest segments that still close the sphere
pub const MIN_SEGMENTS: u32 = 3;

/// Sphere geometry descriptor. Both axes always share one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereGeometry {
    pub radius: f32,
    pub width_segments: u32,
    pub height_segments: u32,
}

impl SphereGeometry {
    pub fn new(radius: f32, resolution: u32) -> Self {
        let segments = resolution.max(MIN_SEGMENTS);
        Self {
            radius,
            width_segments: segments,
            height_segments: segments,
        }
    }

    pub fn vertex_count(&self) -> usize {
        (self.width_segments as usize + 1) * (self.height_segments as usize + 1)
    }

    /// Triangles skip the degenerate pole quads, two rows of `width_segments`
    pub fn index_count(&self) -> usize {
        let w = self.width_segments as usize;
        let h = self.height_segments as usize;
        w * (2 * h - 2) * 3
    }

    /// Build the vertex and index buffers.
    ///
    /// Rows run from the +Y pole (v = 0) to the -Y pole; the first and last
    /// rows shift their U by half a segment so pole texels line up.
    pub fn tessellate(&self) -> SphereMesh {
        let w = self.width_segments;
        let h = self.height_segments;
        let mut vertices = Vec::with_capacity(self.vertex_count());
        let mut indices = Vec::with_capacity(self.index_count());

        for iy in 0..=h {
            let v = iy as f32 / h as f32;
            let u_offset = if iy == 0 {
                0.5 / w as f32
            } else if iy == h {
                -0.5 / w as f32
            } else {
                0.0
            };

            for ix in 0..=w {
                let u = ix as f32 / w as f32;
                let direction = Vec3::new(
                    -(u * TAU).cos() * (v * PI).sin(),
                    (v * PI).cos(),
                    (u * TAU).sin() * (v * PI).sin(),
                );
                vertices.push(SphereVertex {
                    position: (direction * self.radius).to_array(),
                    normal: direction.normalize_or_zero().to_array(),
                    uv: [u + u_offset, 1.0 - v],
                });
            }
        }

        let row = w + 1;
        for iy in 0..h {
            for ix in 0..w {
                let a = iy * row + ix + 1;
                let b = iy * row + ix;
                let c = (iy + 1) * row + ix;
                let d = (iy + 1) * row + ix + 1;

                if iy != 0 {
                    indices.extend_from_slice(&[a, b, d]);
                }
                if iy != h - 1 {
                    indices.extend_from_slice(&[b, c, d]);
                }
            }
        }

        SphereMesh { vertices, indices }
    }
}

/// Vertex layout shared with GPU backends
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SphereVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Tessellated sphere
#[derive(Debug, Clone)]
pub struct SphereMesh {
    pub vertices: Vec<SphereVertex>,
    pub indices: Vec<u32>,
}
