//! The built-in wgpu implementation of the backend traits.
//!
//! wgpu draws only exist inside a render pass, so this backend does not
//! execute `draw_instanced` immediately. Each draw is prepared into a queued
//! command (pipeline selection, uniform upload, bind group) when the engine
//! submits it, and [`WgpuBackend::flush`] replays the queue into a
//! caller-supplied `wgpu::RenderPass` later in the frame.
//!
//! Pipelines are cached per (shader, state, topology) combination and
//! samplers per preset; both caches are tiny in practice since sprite
//! batching rarely leaves the defaults.

use std::sync::Arc;

use ahash::HashMap;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::backend::{
    BufferHandle, BufferKind, QuadBindings, RenderBackend, ShaderHandle, ShaderInputs,
    TextureHandle, TextureProvider,
};
use crate::context::GraphicsContext;
use crate::instance::{InstanceRecord, QuadVertex};
use crate::states::{DepthMode, RenderStates, SamplerMode};

/// The embedded instancing shader.
const SHADER_SOURCE: &str = include_str!("shaders/sprite_instancing.wgsl");

/// Per-draw uniform block. Matches the `Uniforms` struct in the shader.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct DrawUniforms {
    view_proj: [[f32; 4]; 4],
    texture_extent: [f32; 2],
    _pad: [f32; 2],
}

// SAFETY: DrawUniforms is repr(C) with only f32 fields, no padding holes.
unsafe impl Pod for DrawUniforms {}
unsafe impl Zeroable for DrawUniforms {}

struct TextureEntry {
    /// Kept alive so the view stays valid for textures we created ourselves.
    _texture: Option<wgpu::Texture>,
    view: wgpu::TextureView,
    size: (u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    shader: ShaderHandle,
    states: RenderStates,
    topology: wgpu::PrimitiveTopology,
}

/// One queued instanced draw, ready for replay.
struct PreparedDraw {
    pipeline: PipelineKey,
    bind_group: wgpu::BindGroup,
    vertices: BufferHandle,
    indices: BufferHandle,
    instances: BufferHandle,
    index_count: u32,
    instance_count: u32,
}

/// [`RenderBackend`] + [`TextureProvider`] over a wgpu device.
pub struct WgpuBackend {
    context: Arc<GraphicsContext>,
    target_format: wgpu::TextureFormat,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,

    shaders: HashMap<ShaderHandle, wgpu::ShaderModule>,
    textures: HashMap<TextureHandle, TextureEntry>,
    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    samplers: HashMap<SamplerMode, wgpu::Sampler>,
    next_shader_id: u64,
    next_texture_id: u64,
    next_buffer_id: u64,

    default_shader: ShaderHandle,
    states: RenderStates,
    bound: Option<QuadBindings>,
    inputs: Option<ShaderInputs>,
    draws: Vec<PreparedDraw>,
}

impl WgpuBackend {
    /// Create a backend drawing into targets of `target_format`.
    pub fn new(context: Arc<GraphicsContext>, target_format: wgpu::TextureFormat) -> Self {
        let device = context.device();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stampede_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
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
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("stampede_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("stampede_instancing_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let default_shader = ShaderHandle::new(1);
        let mut shaders = HashMap::default();
        shaders.insert(default_shader, module);

        Self {
            context,
            target_format,
            bind_group_layout,
            pipeline_layout,
            shaders,
            textures: HashMap::default(),
            buffers: HashMap::default(),
            pipelines: HashMap::default(),
            samplers: HashMap::default(),
            next_shader_id: 2,
            next_texture_id: 1,
            next_buffer_id: 1,
            default_shader,
            states: RenderStates::default(),
            bound: None,
            inputs: None,
            draws: Vec::new(),
        }
    }

    /// The embedded instancing shader, registered at construction.
    pub fn default_shader(&self) -> ShaderHandle {
        self.default_shader
    }

    /// Register a caller-compiled shader module.
    ///
    /// The module must expose `vs_main`/`fs_main` entry points over the
    /// quad + instance vertex layouts and the standard bind group.
    pub fn register_shader(&mut self, module: wgpu::ShaderModule) -> ShaderHandle {
        let handle = ShaderHandle::new(self.next_shader_id);
        self.next_shader_id += 1;
        self.shaders.insert(handle, module);
        handle
    }

    /// Register an existing texture view with its extent.
    pub fn register_texture_view(
        &mut self,
        view: wgpu::TextureView,
        width: u32,
        height: u32,
    ) -> TextureHandle {
        self.insert_texture(TextureEntry {
            _texture: None,
            view,
            size: (width, height),
        })
    }

    /// Create and register a texture from raw RGBA8 data.
    ///
    /// `data` must hold `width * height * 4` bytes.
    pub fn register_texture_rgba8(&mut self, data: &[u8], width: u32, height: u32) -> TextureHandle {
        let device = self.context.device();
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("stampede_spritesheet"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.context.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.insert_texture(TextureEntry {
            _texture: Some(texture),
            view,
            size: (width, height),
        })
    }

    fn insert_texture(&mut self, entry: TextureEntry) -> TextureHandle {
        let handle = TextureHandle::new(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(handle, entry);
        handle
    }

    /// Drop draws left over from a frame that never flushed.
    pub fn begin_frame(&mut self) {
        if !self.draws.is_empty() {
            tracing::warn!("dropping {} unflushed draws", self.draws.len());
            self.draws.clear();
        }
    }

    /// Number of draws queued and waiting for [`flush`](Self::flush).
    pub fn pending_draws(&self) -> usize {
        self.draws.len()
    }

    /// Replay all queued draws into a render pass, in submission order.
    ///
    /// The pass target format must match the one this backend was created
    /// with, and must carry a `Depth32Float` attachment when draws used
    /// [`DepthMode::TestAndWrite`].
    pub fn flush(&mut self, pass: &mut wgpu::RenderPass<'_>) {
        let draws = std::mem::take(&mut self.draws);
        for draw in draws {
            let Some(pipeline) = self.pipelines.get(&draw.pipeline) else {
                continue;
            };
            let (Some(vertices), Some(indices), Some(instances)) = (
                self.buffers.get(&draw.vertices),
                self.buffers.get(&draw.indices),
                self.buffers.get(&draw.instances),
            ) else {
                tracing::warn!("queued draw references a destroyed buffer, skipping");
                continue;
            };

            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &draw.bind_group, &[]);
            pass.set_vertex_buffer(0, vertices.slice(..));
            pass.set_vertex_buffer(1, instances.slice(..));
            pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..draw.index_count, 0, 0..draw.instance_count);
        }
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> bool {
        if self.pipelines.contains_key(&key) {
            return true;
        }
        let Some(shader) = self.shaders.get(&key.shader) else {
            tracing::warn!("unknown shader {:?}", key.shader);
            return false;
        };

        let depth_stencil = match key.states.depth {
            DepthMode::Disabled => None,
            DepthMode::TestAndWrite => Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::GreaterEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
        };

        let pipeline = self
            .context
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("stampede_pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[QuadVertex::layout(), InstanceRecord::layout()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.target_format,
                        blend: key.states.blend.to_blend_state(),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: key.topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: key.states.cull.to_face(),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        self.pipelines.insert(key, pipeline);
        true
    }

    fn ensure_sampler(&mut self, mode: SamplerMode) {
        self.samplers
            .entry(mode)
            .or_insert_with(|| self.context.device().create_sampler(&mode.descriptor()));
    }
}

impl RenderBackend for WgpuBackend {
    fn create_buffer(&mut self, kind: BufferKind, size: u64) -> BufferHandle {
        let usage = match kind {
            BufferKind::Vertex | BufferKind::Instance => {
                wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST
            }
            BufferKind::Index => wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        };
        // Copy alignment: keep every buffer writable in whole.
        let size = size.max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

        let buffer = self.context.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("stampede_buffer"),
            size,
            usage,
            mapped_at_creation: false,
        });
        let handle = BufferHandle::new(self.next_buffer_id);
        self.next_buffer_id += 1;
        self.buffers.insert(handle, buffer);
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, bytes: &[u8]) {
        let Some(target) = self.buffers.get(&buffer) else {
            tracing::warn!("write to unknown buffer {:?}", buffer);
            return;
        };
        self.context.queue().write_buffer(target, 0, bytes);
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(target) = self.buffers.remove(&buffer) {
            target.destroy();
        }
    }

    fn apply_render_states(&mut self, states: &RenderStates) {
        self.states = *states;
    }

    fn bind_quad_buffers(&mut self, bindings: &QuadBindings) {
        self.bound = Some(*bindings);
    }

    fn set_shader_inputs(&mut self, inputs: &ShaderInputs) {
        self.inputs = Some(*inputs);
    }

    fn draw_instanced(
        &mut self,
        topology: wgpu::PrimitiveTopology,
        primitive_count: u32,
        instance_count: u32,
    ) {
        let Some(bound) = self.bound else {
            tracing::warn!("draw_instanced with no buffers bound");
            return;
        };
        let Some(inputs) = self.inputs else {
            tracing::warn!("draw_instanced with no shader inputs set");
            return;
        };
        if !self.textures.contains_key(&inputs.texture) {
            tracing::warn!("draw_instanced with unknown texture {:?}", inputs.texture);
            return;
        }

        let key = PipelineKey {
            shader: inputs.shader,
            states: self.states,
            topology,
        };

        let uniforms = DrawUniforms {
            view_proj: inputs.view_transform.to_cols_array_2d(),
            texture_extent: inputs.texture_extent.to_array(),
            _pad: [0.0; 2],
        };
        let uniform_buffer =
            self.context
                .device()
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("stampede_draw_uniforms"),
                    contents: bytemuck::bytes_of(&uniforms),
                    usage: wgpu::BufferUsages::UNIFORM,
                });

        let sampler_mode = self.states.sampler;
        self.ensure_sampler(sampler_mode);
        let Some(texture) = self.textures.get(&inputs.texture) else {
            return;
        };
        let Some(sampler) = self.samplers.get(&sampler_mode) else {
            return;
        };

        let bind_group = self
            .context
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("stampede_draw_bind_group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            });

        if !self.ensure_pipeline(key) {
            return;
        }

        self.draws.push(PreparedDraw {
            pipeline: key,
            bind_group,
            vertices: bound.vertices,
            indices: bound.indices,
            instances: bound.instances,
            index_count: primitive_count * 3,
            instance_count,
        });
    }
}

impl TextureProvider for WgpuBackend {
    fn texture_extent(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|entry| entry.size)
    }
}
