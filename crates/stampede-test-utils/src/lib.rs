//! GPU-free backend for testing the stampede engines.
//!
//! [`RecordingBackend`] implements [`RenderBackend`] and [`TextureProvider`]
//! without touching a device: every call is appended to a log, buffer writes
//! are kept as bytes, and each `draw_instanced` is folded into a
//! [`DrawSubmission`] snapshot with the instance records decoded back out of
//! the most recent upload. Tests drive an engine end to end and then assert
//! on the log and the snapshots.

use std::collections::HashMap;

use stampede::{
    BufferHandle, BufferKind, InstanceRecord, QuadBindings, RenderBackend, RenderStates,
    ShaderHandle, ShaderInputs, TextureHandle, TextureProvider,
};

/// One recorded backend call, in arrival order.
#[derive(Debug, Clone)]
pub enum BackendCall {
    CreateBuffer {
        buffer: BufferHandle,
        kind: BufferKind,
        size: u64,
    },
    WriteBuffer {
        buffer: BufferHandle,
        len: usize,
    },
    DestroyBuffer {
        buffer: BufferHandle,
    },
    ApplyRenderStates {
        states: RenderStates,
    },
    BindQuadBuffers {
        bindings: QuadBindings,
    },
    SetShaderInputs {
        inputs: ShaderInputs,
    },
    DrawInstanced {
        topology: wgpu::PrimitiveTopology,
        primitive_count: u32,
        instance_count: u32,
    },
}

/// A fully assembled instanced draw, snapshotted at `draw_instanced` time.
#[derive(Debug, Clone)]
pub struct DrawSubmission {
    /// Buffers bound for the draw.
    pub bindings: QuadBindings,
    /// Shader inputs supplied for the draw.
    pub inputs: ShaderInputs,
    /// Instance records decoded from the latest upload to the bound
    /// instance buffer.
    pub records: Vec<InstanceRecord>,
    pub topology: wgpu::PrimitiveTopology,
    pub primitive_count: u32,
    pub instance_count: u32,
}

/// A [`RenderBackend`] + [`TextureProvider`] that records instead of drawing.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Vec<BackendCall>,
    submissions: Vec<DrawSubmission>,
    textures: HashMap<TextureHandle, (u32, u32)>,
    /// Live buffers and their latest uploaded contents.
    buffers: HashMap<BufferHandle, Vec<u8>>,
    destroyed: Vec<BufferHandle>,
    bound: Option<QuadBindings>,
    inputs: Option<ShaderInputs>,
    next_texture_id: u64,
    next_buffer_id: u64,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle tests pass as the engine's shader.
    pub fn shader(&self) -> ShaderHandle {
        ShaderHandle::new(1)
    }

    /// Register a fake texture with the given extent.
    pub fn add_texture(&mut self, width: u32, height: u32) -> TextureHandle {
        self.next_texture_id += 1;
        let handle = TextureHandle::new(self.next_texture_id);
        self.textures.insert(handle, (width, height));
        handle
    }

    /// Every backend call, in arrival order.
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Every instanced draw, in submission order.
    pub fn submissions(&self) -> &[DrawSubmission] {
        &self.submissions
    }

    /// Number of draws submitted so far.
    pub fn draw_count(&self) -> usize {
        self.submissions.len()
    }

    /// Number of buffers created and not yet destroyed.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// How many times a buffer has been destroyed. Anything above one is a
    /// double release.
    pub fn destroy_count(&self, buffer: BufferHandle) -> usize {
        self.destroyed.iter().filter(|&&b| b == buffer).count()
    }

    /// Handles passed to `destroy_buffer`, in order.
    pub fn destroyed_buffers(&self) -> &[BufferHandle] {
        &self.destroyed
    }

    /// Render states applied so far, in order.
    pub fn applied_states(&self) -> Vec<RenderStates> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::ApplyRenderStates { states } => Some(*states),
                _ => None,
            })
            .collect()
    }
}

impl RenderBackend for RecordingBackend {
    fn create_buffer(&mut self, kind: BufferKind, size: u64) -> BufferHandle {
        self.next_buffer_id += 1;
        let buffer = BufferHandle::new(self.next_buffer_id);
        self.buffers.insert(buffer, Vec::new());
        self.calls.push(BackendCall::CreateBuffer { buffer, kind, size });
        buffer
    }

    fn write_buffer(&mut self, buffer: BufferHandle, bytes: &[u8]) {
        self.calls.push(BackendCall::WriteBuffer {
            buffer,
            len: bytes.len(),
        });
        if let Some(contents) = self.buffers.get_mut(&buffer) {
            contents.clear();
            contents.extend_from_slice(bytes);
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.calls.push(BackendCall::DestroyBuffer { buffer });
        self.destroyed.push(buffer);
        self.buffers.remove(&buffer);
    }

    fn apply_render_states(&mut self, states: &RenderStates) {
        self.calls.push(BackendCall::ApplyRenderStates { states: *states });
    }

    fn bind_quad_buffers(&mut self, bindings: &QuadBindings) {
        self.calls.push(BackendCall::BindQuadBuffers {
            bindings: *bindings,
        });
        self.bound = Some(*bindings);
    }

    fn set_shader_inputs(&mut self, inputs: &ShaderInputs) {
        self.calls.push(BackendCall::SetShaderInputs { inputs: *inputs });
        self.inputs = Some(*inputs);
    }

    fn draw_instanced(
        &mut self,
        topology: wgpu::PrimitiveTopology,
        primitive_count: u32,
        instance_count: u32,
    ) {
        self.calls.push(BackendCall::DrawInstanced {
            topology,
            primitive_count,
            instance_count,
        });

        let (Some(bindings), Some(inputs)) = (self.bound, self.inputs) else {
            panic!("draw_instanced before buffers and shader inputs were supplied");
        };
        let bytes = self
            .buffers
            .get(&bindings.instances)
            .expect("instance buffer was destroyed before the draw");
        let records: Vec<InstanceRecord> = bytemuck::pod_collect_to_vec(bytes);
        self.submissions.push(DrawSubmission {
            bindings,
            inputs,
            records,
            topology,
            primitive_count,
            instance_count,
        });
    }
}

impl TextureProvider for RecordingBackend {
    fn texture_extent(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).copied()
    }
}
