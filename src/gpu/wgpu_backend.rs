//! wgpu implementation of [`GpuBackend`]
//!
//! Draws are recorded while a pass is open and submitted as one render pass
//! when the pass ends. Pipelines are created lazily per
//! (topology, blend mode, depth attachment) combination.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::{
    validate_size, DrawCall, GeometryHandle, GpuBackend, GpuError, GpuResult, MeshData,
    RenderTarget, TextureDesc, TextureFormat, TextureHandle, TextureUsage, Topology, Vertex,
};
use crate::compositor::BlendMode;
use crate::shaders::{ProgramKind, SCENE_SHADER};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4, 2 => Float32x2];

/// Per-draw uniforms (must match `DrawUniforms` in scene.wgsl)
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniforms {
    projection: [[f32; 4]; 4],
    modelview: [[f32; 4]; 4],
    color: [f32; 4],
    /// brightness, contrast, saturation, processing enabled
    adjust: [f32; 4],
}

impl DrawUniforms {
    fn from_call(call: &DrawCall<'_>) -> Self {
        let float = |name: &str, default: f32| {
            call.uniforms
                .get(name)
                .and_then(|v| v.as_f32())
                .unwrap_or(default)
        };
        let processing = if call.program == ProgramKind::ImageProcessing {
            1.0
        } else {
            0.0
        };
        Self {
            projection: call.projection.to_cols_array_2d(),
            modelview: call.modelview.to_cols_array_2d(),
            color: call.color.to_array(),
            adjust: [
                float("brightness", 0.0),
                float("contrast", 1.0),
                float("saturation", 1.0),
                processing,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    topology: Topology,
    blend: BlendMode,
    depth: bool,
}

#[derive(Debug)]
struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

#[derive(Debug)]
struct GpuGeometry {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    topology: Topology,
}

#[derive(Debug)]
struct PendingDraw {
    pipeline: PipelineKey,
    geometry: GeometryHandle,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug)]
struct PendingPass {
    target: RenderTarget,
    clear: [f32; 4],
    draws: Vec<PendingDraw>,
}

/// GPU backend rendering through wgpu.
#[derive(Debug)]
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    max_dimension: u32,
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    textures: HashMap<TextureHandle, GpuTexture>,
    geometries: HashMap<GeometryHandle, GpuGeometry>,
    passes: Vec<PendingPass>,
    next_id: u64,
}

impl WgpuBackend {
    /// Request a headless device (no surface) and build the backend on it.
    pub fn new() -> GpuResult<Self> {
        pollster::block_on(Self::request())
    }

    async fn request() -> GpuResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        tracing::info!("Using GPU: {}", adapter.get_info().name);
        tracing::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Immersive Mixer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| GpuError::DeviceRequest(e.to_string()))?;

        Ok(Self::from_parts(device, queue, adapter.get_info().name))
    }

    /// Build the backend on a device owned by the host application.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue, adapter_name: String) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(SCENE_SHADER.into()),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Scene Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &[
                // Draw uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Texture
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let max_dimension = device.limits().max_texture_dimension_2d;

        Self {
            device,
            queue,
            adapter_name,
            max_dimension,
            module,
            bind_group_layout,
            pipeline_layout,
            sampler,
            pipelines: HashMap::new(),
            textures: HashMap::new(),
            geometries: HashMap::new(),
            passes: Vec::new(),
            next_id: 1,
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// View of a texture, e.g. to present a frame buffer in the host UI
    pub fn texture_view(&self, texture: TextureHandle) -> Option<&wgpu::TextureView> {
        self.textures.get(&texture).map(|t| &t.view)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        let device = &self.device;
        let layout = &self.pipeline_layout;
        let module = &self.module;
        self.pipelines
            .entry(key)
            .or_insert_with(|| create_pipeline(device, layout, module, key));
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    key: PipelineKey,
) -> wgpu::RenderPipeline {
    let (topology, strip_index_format) = match key.topology {
        Topology::TriangleList => (wgpu::PrimitiveTopology::TriangleList, None),
        Topology::TriangleStrip => (
            wgpu::PrimitiveTopology::TriangleStrip,
            Some(wgpu::IndexFormat::Uint32),
        ),
        Topology::LineList => (wgpu::PrimitiveTopology::LineList, None),
        Topology::LineStrip => (
            wgpu::PrimitiveTopology::LineStrip,
            Some(wgpu::IndexFormat::Uint32),
        ),
        Topology::PointList => (wgpu::PrimitiveTopology::PointList, None),
    };

    // Draw order comes from the scene graph, depth is attached but never rejects
    let depth_stencil = key.depth.then(|| wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Always,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    });

    tracing::debug!("Creating scene pipeline {:?}", key);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Scene Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &VERTEX_ATTRIBUTES,
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: Some(key.blend.to_blend_state()),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> GpuResult<TextureHandle> {
        validate_size(desc.width, desc.height, self.max_dimension)?;

        let (format, usage) = match (desc.format, desc.usage) {
            (TextureFormat::Depth, _) | (_, TextureUsage::DepthAttachment) => {
                (DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT)
            }
            (TextureFormat::Rgba8, TextureUsage::Sampled) => (
                COLOR_FORMAT,
                wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
            ),
            (TextureFormat::Rgba8, TextureUsage::RenderTarget) => (
                COLOR_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
            ),
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let handle = TextureHandle(self.next_id());
        self.textures.insert(
            handle,
            GpuTexture {
                texture,
                view,
                width: desc.width,
                height: desc.height,
            },
        );
        log::debug!(
            "Created texture '{}' {}x{} ({:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.usage
        );
        Ok(handle)
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> GpuResult<()> {
        let entry = self
            .textures
            .get(&texture)
            .ok_or(GpuError::UnknownTexture(texture))?;
        if entry.width != width || entry.height != height {
            return Err(GpuError::InvalidSize { width, height });
        }
        let expected = (width as usize) * (height as usize) * 4;
        if rgba.len() != expected {
            return Err(GpuError::DataSizeMismatch {
                expected,
                actual: rgba.len(),
            });
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.textures.remove(&texture) {
            entry.texture.destroy();
        }
    }

    fn create_geometry(&mut self, mesh: &MeshData) -> GpuResult<GeometryHandle> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Err(GpuError::GeometryCreationFailed("empty mesh".to_string()));
        }

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Scene Vertex Buffer"),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Scene Index Buffer"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let handle = GeometryHandle(self.next_id());
        self.geometries.insert(
            handle,
            GpuGeometry {
                vertex_buffer,
                index_buffer,
                index_count: mesh.indices.len() as u32,
                topology: mesh.topology,
            },
        );
        Ok(handle)
    }

    fn destroy_geometry(&mut self, geometry: GeometryHandle) {
        if let Some(entry) = self.geometries.remove(&geometry) {
            entry.vertex_buffer.destroy();
            entry.index_buffer.destroy();
        }
    }

    fn begin_pass(&mut self, target: &RenderTarget, clear: [f32; 4]) -> GpuResult<()> {
        if !self.textures.contains_key(&target.color) {
            return Err(GpuError::UnknownTexture(target.color));
        }
        self.passes.push(PendingPass {
            target: *target,
            clear,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn end_pass(&mut self) -> GpuResult<()> {
        let pass = self.passes.pop().ok_or(GpuError::NoActivePass)?;
        let color = self
            .textures
            .get(&pass.target.color)
            .ok_or(GpuError::UnknownTexture(pass.target.color))?;
        let depth_view = match pass.target.depth {
            Some(depth) => Some(
                &self
                    .textures
                    .get(&depth)
                    .ok_or(GpuError::UnknownTexture(depth))?
                    .view,
            ),
            None => None,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Scene Pass Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: pass.clear[0] as f64,
                            g: pass.clear[1] as f64,
                            b: pass.clear[2] as f64,
                            a: pass.clear[3] as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth_view.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Discard,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &pass.draws {
                let (Some(pipeline), Some(geometry)) = (
                    self.pipelines.get(&draw.pipeline),
                    self.geometries.get(&draw.geometry),
                ) else {
                    continue;
                };
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &draw.bind_group, &[]);
                render_pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
                render_pass.set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..geometry.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> GpuResult<()> {
        let target = self
            .passes
            .last()
            .map(|p| p.target)
            .ok_or(GpuError::NoActivePass)?;
        if call.texture == target.color {
            return Err(GpuError::SamplingRenderTarget(call.texture));
        }
        let topology = self
            .geometries
            .get(&call.geometry)
            .map(|g| g.topology)
            .ok_or(GpuError::UnknownGeometry(call.geometry))?;
        let texture = self
            .textures
            .get(&call.texture)
            .ok_or(GpuError::UnknownTexture(call.texture))?;

        let uniforms = DrawUniforms::from_call(call);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Draw Uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let key = PipelineKey {
            topology,
            blend: call.blend,
            depth: target.depth.is_some(),
        };
        self.ensure_pipeline(key);

        if let Some(pass) = self.passes.last_mut() {
            pass.draws.push(PendingDraw {
                pipeline: key,
                geometry: call.geometry,
                bind_group,
            });
        }
        Ok(())
    }

    fn copy_texture(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        width: u32,
        height: u32,
    ) -> GpuResult<()> {
        let src_entry = self.textures.get(&src).ok_or(GpuError::UnknownTexture(src))?;
        let dst_entry = self.textures.get(&dst).ok_or(GpuError::UnknownTexture(dst))?;
        if src_entry.width < width
            || src_entry.height < height
            || dst_entry.width < width
            || dst_entry.height < height
        {
            return Err(GpuError::InvalidSize { width, height });
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Blit Encoder"),
            });
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &src_entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst_entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
