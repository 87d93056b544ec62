//! wgpu rendering pipeline for the panorama sphere.
//!
//! [`SphereRenderer`] owns the pipelines and the offscreen render target with
//! depth. [`WgpuBackend`] implements [`RenderBackend`] on top of it, so the
//! viewer runtime uploads, binds and releases sphere buffers without knowing
//! about wgpu.

#![cfg(feature = "native-ui")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytemuck::{Pod, Zeroable};
use eframe::egui_wgpu;
use eframe::wgpu;

use crate::error::RenderError;
use crate::render::geometry::MIN_SEGMENTS;
use crate::render::{
    AssetId, ColorSpace, Frame, GpuHandle, MaterialDescriptor, RenderBackend, SphereGeometry,
    SphereVertex, Texture, TextureSlot,
};

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const VERTEX_ATTRIBS: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<SphereVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBS,
    }
}

/// Uniform buffer layout matching `sphere.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    mvp: [[f32; 4]; 4],
    /// x: displacement scale, y: displacement bound, z: colour bound
    params: [f32; 4],
}

/// GPU resources of one uploaded sphere
struct GpuSphere {
    asset: AssetId,
    vertex_buffer: Arc<wgpu::Buffer>,
    index_buffer: Arc<wgpu::Buffer>,
    uniform_buffer: wgpu::Buffer,
    num_indices: u32,
    color: Option<(wgpu::Texture, wgpu::TextureView)>,
    displacement: Option<(wgpu::Texture, wgpu::TextureView)>,
    bind_group: Arc<wgpu::BindGroup>,
}

/// What the next offscreen pass draws
struct DrawSnapshot {
    vertex_buffer: Arc<wgpu::Buffer>,
    index_buffer: Arc<wgpu::Buffer>,
    bind_group: Arc<wgpu::BindGroup>,
    num_indices: u32,
}

struct SceneState {
    draw: Option<DrawSnapshot>,
    clear: wgpu::Color,
}

/// Mutable offscreen state behind a Mutex for resize support.
struct OffscreenState {
    _offscreen_texture: wgpu::Texture,
    offscreen_view: wgpu::TextureView,
    _depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    blit_bind_group: wgpu::BindGroup,
    offscreen_size: [u32; 2],
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pipelines, samplers and the offscreen target shared by the backend and
/// the egui paint callback.
pub struct SphereRenderer {
    scene_pipeline: wgpu::RenderPipeline,
    blit_pipeline: wgpu::RenderPipeline,
    scene_bind_group_layout: wgpu::BindGroupLayout,
    blit_bind_group_layout: wgpu::BindGroupLayout,
    blit_sampler: wgpu::Sampler,
    map_sampler: wgpu::Sampler,
    // Stand-ins for empty texture slots
    _blank_color: wgpu::Texture,
    blank_color_view: wgpu::TextureView,
    _blank_displacement: wgpu::Texture,
    blank_displacement_view: wgpu::TextureView,
    offscreen: Mutex<OffscreenState>,
    scene: Mutex<SceneState>,
}

impl SphereRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let scene_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sphere_scene_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("sphere.wgsl").into()),
        });
        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sphere_blit_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("blit.wgsl").into()),
        });

        let map_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        // Uniforms, colour map, displacement map, sampler
        let scene_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sphere_scene_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                map_entry(1),
                map_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let scene_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sphere_scene_pl"),
            bind_group_layouts: &[&scene_bind_group_layout],
            push_constant_ranges: &[],
        });

        let scene_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sphere_scene_pipeline"),
            layout: Some(&scene_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &scene_shader,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &scene_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: OFFSCREEN_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                // Viewed from inside
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let blit_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sphere_blit_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let blit_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sphere_blit_pl"),
            bind_group_layouts: &[&blit_bind_group_layout],
            push_constant_ranges: &[],
        });

        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sphere_blit_pipeline"),
            layout: Some(&blit_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: Some("vs_blit"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: Some("fs_blit"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let blit_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sphere_blit_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // Panorama maps: nearest filtering, no mipmaps, wrap around the seam
        let map_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sphere_map_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let (blank_color, blank_color_view) = upload_texture(
            device,
            queue,
            "sphere_blank_color",
            1,
            1,
            &[255, 255, 255, 255],
            wgpu::TextureFormat::Rgba8UnormSrgb,
        );
        let (blank_displacement, blank_displacement_view) = upload_texture(
            device,
            queue,
            "sphere_blank_displacement",
            1,
            1,
            &[0, 0, 0, 255],
            wgpu::TextureFormat::Rgba8Unorm,
        );

        let width = width.max(1);
        let height = height.max(1);
        let (offscreen_texture, offscreen_view) = create_color_texture(device, width, height);
        let (depth_texture, depth_view) = create_depth_texture(device, width, height);
        let blit_bind_group = create_blit_bind_group(device, &blit_bind_group_layout, &offscreen_view, &blit_sampler);

        Self {
            scene_pipeline,
            blit_pipeline,
            scene_bind_group_layout,
            blit_bind_group_layout,
            blit_sampler,
            map_sampler,
            _blank_color: blank_color,
            blank_color_view,
            _blank_displacement: blank_displacement,
            blank_displacement_view,
            offscreen: Mutex::new(OffscreenState {
                _offscreen_texture: offscreen_texture,
                offscreen_view,
                _depth_texture: depth_texture,
                depth_view,
                blit_bind_group,
                offscreen_size: [width, height],
            }),
            scene: Mutex::new(SceneState {
                draw: None,
                clear: wgpu::Color::BLACK,
            }),
        }
    }

    /// Resize the offscreen render target if the viewport size changed.
    pub fn resize(&self, device: &wgpu::Device, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        let mut state = lock(&self.offscreen);
        if state.offscreen_size == [width, height] {
            return;
        }
        state.offscreen_size = [width, height];

        let (texture, view) = create_color_texture(device, width, height);
        let (depth_texture, depth_view) = create_depth_texture(device, width, height);
        state.blit_bind_group =
            create_blit_bind_group(device, &self.blit_bind_group_layout, &view, &self.blit_sampler);
        state._offscreen_texture = texture;
        state.offscreen_view = view;
        state._depth_texture = depth_texture;
        state.depth_view = depth_view;
    }

    /// Render the current scene offscreen. Call this in `prepare()`.
    pub fn render_offscreen(&self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let state = lock(&self.offscreen);
        let scene = lock(&self.scene);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("sphere_offscreen_encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sphere_offscreen_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &state.offscreen_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(scene.clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &state.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            if let Some(draw) = scene.draw.as_ref() {
                pass.set_pipeline(&self.scene_pipeline);
                pass.set_bind_group(0, Some(draw.bind_group.as_ref()), &[]);
                pass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
                pass.set_index_buffer(draw.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.num_indices, 0, 0..1);
            }
        }

        drop(scene);
        drop(state);
        queue.submit(std::iter::once(encoder.finish()));
    }

    /// Blit the offscreen texture to the current render pass. Call this in `paint()`.
    pub fn blit(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        let state = lock(&self.offscreen);
        render_pass.set_pipeline(&self.blit_pipeline);
        render_pass.set_bind_group(0, Some(&state.blit_bind_group), &[]);
        drop(state);
        render_pass.draw(0..3, 0..1);
    }

    fn set_scene(&self, draw: Option<DrawSnapshot>, background: [f32; 3]) {
        let mut scene = lock(&self.scene);
        scene.draw = draw;
        scene.clear = wgpu::Color {
            r: f64::from(background[0]),
            g: f64::from(background[1]),
            b: f64::from(background[2]),
            a: 1.0,
        };
    }

    fn scene_bind_group(
        &self,
        device: &wgpu::Device,
        uniform_buffer: &wgpu::Buffer,
        color: Option<&wgpu::TextureView>,
        displacement: Option<&wgpu::TextureView>,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sphere_scene_bg"),
            layout: &self.scene_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(color.unwrap_or(&self.blank_color_view)),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(
                        displacement.unwrap_or(&self.blank_displacement_view),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.map_sampler),
                },
            ],
        })
    }
}

/// [`RenderBackend`] drawing through a [`SphereRenderer`]
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    renderer: Arc<SphereRenderer>,
    spheres: HashMap<GpuHandle, GpuSphere>,
    next_handle: u64,
}

impl WgpuBackend {
    pub fn new(render_state: &egui_wgpu::RenderState, renderer: Arc<SphereRenderer>) -> Self {
        Self {
            device: Arc::clone(&render_state.device),
            queue: Arc::clone(&render_state.queue),
            renderer,
            spheres: HashMap::new(),
            next_handle: 1,
        }
    }

    fn rebuild_bind_group(&self, sphere: &mut GpuSphere) {
        let bind_group = self.renderer.scene_bind_group(
            &self.device,
            &sphere.uniform_buffer,
            sphere.color.as_ref().map(|(_, view)| view),
            sphere.displacement.as_ref().map(|(_, view)| view),
        );
        sphere.bind_group = Arc::new(bind_group);
    }
}

impl RenderBackend for WgpuBackend {
    fn upload(
        &mut self,
        id: AssetId,
        geometry: &SphereGeometry,
        _material: &MaterialDescriptor,
    ) -> Result<GpuHandle, RenderError> {
        let max_buffer_size = self.device.limits().max_buffer_size;
        let fitted = fit_geometry_to_limit(geometry, max_buffer_size).ok_or_else(|| {
            RenderError::Upload(
                id.0,
                format!("sphere does not fit in {} byte buffers", max_buffer_size),
            )
        })?;
        if fitted.width_segments != geometry.width_segments {
            tracing::warn!(
                "Sphere for asset {} reduced from {} to {} segments to fit buffer limit {}",
                id,
                geometry.width_segments,
                fitted.width_segments,
                max_buffer_size
            );
        }

        let mesh = fitted.tessellate();
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Err(RenderError::Upload(id.0, "empty sphere mesh".to_string()));
        }

        let vertex_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("sphere_vb_{}", id.0)),
            size: std::mem::size_of_val(mesh.vertices.as_slice()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&vertex_buffer, 0, bytemuck::cast_slice(&mesh.vertices));

        let index_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("sphere_ib_{}", id.0)),
            size: std::mem::size_of_val(mesh.indices.as_slice()) as u64,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&index_buffer, 0, bytemuck::cast_slice(&mesh.indices));

        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("sphere_ub_{}", id.0)),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self
            .renderer
            .scene_bind_group(&self.device, &uniform_buffer, None, None);

        let handle = GpuHandle(self.next_handle);
        self.next_handle += 1;
        self.spheres.insert(
            handle,
            GpuSphere {
                asset: id,
                vertex_buffer: Arc::new(vertex_buffer),
                index_buffer: Arc::new(index_buffer),
                uniform_buffer,
                num_indices: mesh.indices.len() as u32,
                color: None,
                displacement: None,
                bind_group: Arc::new(bind_group),
            },
        );

        tracing::debug!(
            "Uploaded sphere for asset {}: {} vertices, {} indices",
            id,
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(handle)
    }

    fn bind_texture(
        &mut self,
        handle: GpuHandle,
        slot: TextureSlot,
        texture: &Texture,
    ) -> Result<(), RenderError> {
        let mut sphere = self
            .spheres
            .remove(&handle)
            .ok_or(RenderError::UnknownHandle(handle.0))?;

        let data = texture.data();
        let format = match data.sampling.color_space {
            ColorSpace::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            ColorSpace::Linear => wgpu::TextureFormat::Rgba8Unorm,
        };

        let max = self.device.limits().max_texture_dimension_2d;
        let fitted = fit_to_limit(data.width, data.height, &data.pixels, max);
        let (width, height, pixels) = match fitted.as_ref() {
            Some(image) => (image.width(), image.height(), image.as_raw().as_slice()),
            None => (data.width, data.height, data.pixels.as_slice()),
        };
        if fitted.is_some() {
            tracing::warn!(
                "{} map {} is {}x{}, downscaled to {}x{} for the GPU",
                slot,
                data.source,
                data.width,
                data.height,
                width,
                height
            );
        }

        let label = format!("sphere_{}_{}", slot, sphere.asset.0);
        let uploaded = upload_texture(&self.device, &self.queue, &label, width, height, pixels, format);
        match slot {
            TextureSlot::Color => sphere.color = Some(uploaded),
            TextureSlot::Displacement => sphere.displacement = Some(uploaded),
        }
        self.rebuild_bind_group(&mut sphere);
        self.spheres.insert(handle, sphere);
        Ok(())
    }

    fn release(&mut self, handle: GpuHandle) {
        match self.spheres.remove(&handle) {
            Some(sphere) => tracing::debug!("Released sphere for asset {}", sphere.asset),
            None => tracing::warn!("Release of unknown GPU handle {}", handle.0),
        }
    }

    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), RenderError> {
        let Some(asset) = frame.asset else {
            self.renderer.set_scene(None, frame.background);
            return Ok(());
        };
        let handle = asset
            .gpu_handle()
            .ok_or_else(|| RenderError::Draw(format!("asset {} has no GPU handle", asset.id())))?;
        let sphere = self
            .spheres
            .get(&handle)
            .ok_or(RenderError::UnknownHandle(handle.0))?;

        let mvp = frame.camera.view_projection() * asset.transform().matrix();
        let flag = |bound: bool| if bound { 1.0 } else { 0.0 };
        let uniforms = Uniforms {
            mvp: mvp.to_cols_array_2d(),
            params: [
                asset.material().displacement_scale,
                flag(sphere.displacement.is_some()),
                flag(sphere.color.is_some()),
                0.0,
            ],
        };
        self.queue
            .write_buffer(&sphere.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        self.renderer.set_scene(
            Some(DrawSnapshot {
                vertex_buffer: Arc::clone(&sphere.vertex_buffer),
                index_buffer: Arc::clone(&sphere.index_buffer),
                bind_group: Arc::clone(&sphere.bind_group),
                num_indices: sphere.num_indices,
            }),
            frame.background,
        );
        Ok(())
    }
}

/// Downscale pixels that exceed the device's texture limit
fn fit_to_limit(width: u32, height: u32, pixels: &[u8], max: u32) -> Option<image::RgbaImage> {
    if width <= max && height <= max {
        return None;
    }
    let scale = f64::from(max) / f64::from(width.max(height));
    let new_width = ((f64::from(width) * scale) as u32).clamp(1, max);
    let new_height = ((f64::from(height) * scale) as u32).clamp(1, max);
    let source = image::RgbaImage::from_raw(width, height, pixels.to_vec())?;
    Some(image::imageops::resize(
        &source,
        new_width,
        new_height,
        image::imageops::FilterType::Triangle,
    ))
}

/// Bytes of the larger of a sphere's vertex and index buffers
fn mesh_buffer_size(geometry: &SphereGeometry) -> u64 {
    let vertices = geometry.vertex_count() * std::mem::size_of::<SphereVertex>();
    let indices = geometry.index_count() * std::mem::size_of::<u32>();
    vertices.max(indices) as u64
}

/// Reduce the segment count until both mesh buffers fit in `max_buffer_size`.
/// None when not even the coarsest sphere fits.
fn fit_geometry_to_limit(geometry: &SphereGeometry, max_buffer_size: u64) -> Option<SphereGeometry> {
    if mesh_buffer_size(geometry) <= max_buffer_size {
        return Some(*geometry);
    }

    // (n + 1)^2 vertices dominate the index count
    let vertex_size = std::mem::size_of::<SphereVertex>() as f64;
    let estimate = ((max_buffer_size as f64 / vertex_size).sqrt() as u32).saturating_sub(1);
    let mut segments = estimate.min(geometry.width_segments);
    while segments >= MIN_SEGMENTS {
        let candidate = SphereGeometry::new(geometry.radius, segments);
        if mesh_buffer_size(&candidate) <= max_buffer_size {
            return Some(candidate);
        }
        segments -= 1;
    }
    None
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    pixels: &[u8],
    format: wgpu::TextureFormat,
) -> (wgpu::Texture, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&Default::default());
    (texture, view)
}

fn create_blit_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("sphere_blit_bg"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_color_texture(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("sphere_offscreen_color"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&Default::default());
    (texture, view)
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("sphere_offscreen_depth"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&Default::default());
    (texture, view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within_limit_is_untouched() {
        assert!(fit_to_limit(4, 2, &[0; 32], 8).is_none());
    }

    #[test]
    fn test_fit_downscales_keeping_aspect() {
        let pixels = vec![128u8; 16 * 8 * 4];
        let fitted = fit_to_limit(16, 8, &pixels, 4).unwrap();
        assert_eq!(fitted.dimensions(), (4, 2));
    }

    #[test]
    fn test_sphere_within_buffer_limit_is_untouched() {
        let geometry = SphereGeometry::new(6.0, 256);
        assert_eq!(fit_geometry_to_limit(&geometry, 256 << 20), Some(geometry));
    }

    #[test]
    fn test_oversized_sphere_is_reduced_to_fit() {
        let limit = 256u64 << 20;
        let geometry = SphereGeometry::new(6.0, 8192);
        assert!(mesh_buffer_size(&geometry) > limit);

        let fitted = fit_geometry_to_limit(&geometry, limit).unwrap();
        assert!(mesh_buffer_size(&fitted) <= limit);
        assert!(fitted.width_segments < 8192);
        assert!(fitted.width_segments > 2048);
        assert_eq!(fitted.width_segments, fitted.height_segments);
        assert_eq!(fitted.radius, 6.0);
    }

    #[test]
    fn test_sphere_that_never_fits() {
        let geometry = SphereGeometry::new(6.0, 64);
        assert_eq!(fit_geometry_to_limit(&geometry, 64), None);
    }

    #[test]
    fn test_vertex_layout_matches_sphere_vertex() {
        let layout = vertex_layout();
        assert_eq!(layout.array_stride, 32);
        assert_eq!(layout.attributes.len(), 3);
        assert_eq!(layout.attributes[2].offset, 24);
    }
}
