//! Collaborator interfaces between the batching engines and the renderer.
//!
//! The engines never talk to a GPU API directly. Everything they need
//! (buffer lifetime, pipeline state, shader inputs, the instanced draw
//! itself) goes through [`RenderBackend`], and texture metadata comes from
//! [`TextureProvider`]. [`crate::wgpu_backend::WgpuBackend`] implements both
//! on a real device; the test-utils crate implements them with plain call
//! recording.

use glam::{Mat4, Vec2};

use crate::states::RenderStates;

/// Opaque identifier of a texture owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(u64);

impl TextureHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Opaque identifier of a shader program owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(u64);

impl ShaderHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Opaque identifier of a GPU buffer owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

impl BufferHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

/// What a buffer created through the backend will hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Static quad corner vertices.
    Vertex,
    /// Static quad triangle indices.
    Index,
    /// Per-frame instance records, rewritten wholesale every submission.
    Instance,
}

/// The buffer set bound for an instanced quad draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadBindings {
    /// Quad corner vertices (slot 0).
    pub vertices: BufferHandle,
    /// 16-bit triangle indices.
    pub indices: BufferHandle,
    /// Instance record stream (slot 1).
    pub instances: BufferHandle,
}

/// Per-draw shader inputs, supplied by name to the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderInputs {
    /// The shader program to draw with.
    pub shader: ShaderHandle,
    /// The spritesheet to sample.
    pub texture: TextureHandle,
    /// The spritesheet extent in texels.
    pub texture_extent: Vec2,
    /// The derived view transform for the batch.
    pub view_transform: Mat4,
}

/// The rendering subsystem the engines submit finished batches to.
///
/// Calls arrive in a fixed shape per submission: states were applied at
/// `begin`; then per draw the instance data is written, buffers are bound,
/// shader inputs are set, and exactly one `draw_instanced` follows. Backends
/// may execute immediately or queue and replay later; the engines do not
/// care.
pub trait RenderBackend {
    /// Allocate a buffer of the given kind and byte size.
    fn create_buffer(&mut self, kind: BufferKind, size: u64) -> BufferHandle;

    /// Replace a buffer's contents from the start. Discard semantics: any
    /// previous contents are gone, `bytes` may be shorter than the buffer.
    fn write_buffer(&mut self, buffer: BufferHandle, bytes: &[u8]);

    /// Release a buffer. The handle must not be used afterwards.
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Apply pipeline state for the coming draws.
    fn apply_render_states(&mut self, states: &RenderStates);

    /// Bind the quad geometry, index, and instance buffers.
    fn bind_quad_buffers(&mut self, bindings: &QuadBindings);

    /// Supply the per-draw shader inputs.
    fn set_shader_inputs(&mut self, inputs: &ShaderInputs);

    /// Issue one instanced draw over the bound quad.
    fn draw_instanced(
        &mut self,
        topology: wgpu::PrimitiveTopology,
        primitive_count: u32,
        instance_count: u32,
    );
}

/// Source of texture metadata, queried whenever a texture is (re)bound.
pub trait TextureProvider {
    /// The extent of a texture in texels, or `None` for unknown handles.
    fn texture_extent(&self, texture: TextureHandle) -> Option<(u32, u32)>;
}
