//! The single-texture instanced sprite batcher.
//!
//! One [`SpriteInstancer`] owns one spritesheet binding and one record
//! arena. Sprites recorded between `begin` and `end` land in the arena;
//! `end` re-uploads the live records to a GPU instance buffer in one write
//! and submits exactly one instanced draw over the shared quad. Draw order
//! equals record order, back to front.
//!
//! The engine is strictly single-threaded: every method takes `&mut self`,
//! runs to completion, and there is no internal locking.

use glam::{Mat4, Vec2};

use crate::backend::{
    BufferHandle, BufferKind, QuadBindings, RenderBackend, ShaderHandle, ShaderInputs,
    TextureHandle, TextureProvider,
};
use crate::batch::{BeginDescriptor, EngineState, InstanceBatch, SpriteDescriptor};
use crate::error::{BatchError, BatchResult};
use crate::instance::{
    InstanceRecord, QUAD_INDICES, QUAD_PRIMITIVES, QUAD_VERTICES, TINT_WHITE,
};
use crate::region::SheetRegion;
use crate::transform::{Viewport, view_projection};

/// A texture binding with its extent cached at bind time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SheetBinding {
    pub texture: TextureHandle,
    pub width: u32,
    pub height: u32,
}

impl SheetBinding {
    /// Resolve a handle through the provider, caching its extent.
    pub fn resolve<P: TextureProvider>(provider: &P, texture: TextureHandle) -> BatchResult<Self> {
        let (width, height) = provider
            .texture_extent(texture)
            .ok_or(BatchError::UnknownTexture { texture })?;
        Ok(Self {
            texture,
            width,
            height,
        })
    }

    /// The region covering the whole sheet.
    pub fn full_region(&self) -> SheetRegion {
        SheetRegion::full_sheet(self.width, self.height)
    }

    /// Extent as floats for the shader.
    pub fn extent(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

/// Create the static quad vertex/index buffers and the initial one-record
/// instance buffer through a backend.
pub(crate) fn create_quad_resources<B: RenderBackend>(
    backend: &mut B,
) -> (BufferHandle, BufferHandle, BufferHandle) {
    let vertices = backend.create_buffer(
        BufferKind::Vertex,
        std::mem::size_of_val(QUAD_VERTICES) as u64,
    );
    backend.write_buffer(vertices, bytemuck::cast_slice(QUAD_VERTICES));

    let indices = backend.create_buffer(
        BufferKind::Index,
        std::mem::size_of_val(QUAD_INDICES) as u64,
    );
    backend.write_buffer(indices, bytemuck::cast_slice(QUAD_INDICES));

    let instances = backend.create_buffer(BufferKind::Instance, InstanceRecord::SIZE);
    (vertices, indices, instances)
}

/// Batches sprites from one spritesheet into single instanced draws.
///
/// Construction allocates the quad geometry, quad index, and a one-record
/// instance buffer through the backend; both the record arena and the GPU
/// instance buffer only ever grow, so a warmed-up engine stops allocating.
///
/// # Example
///
/// ```ignore
/// let mut batcher = SpriteInstancer::new(backend, viewport, shader, Some(sheet))?;
/// batcher.begin(&BeginDescriptor::default())?;
/// batcher.record(Vec2::new(10.0, 10.0));
/// batcher.record_with(Vec2::new(64.0, 32.0), &SpriteDescriptor::from_region(frame));
/// batcher.end()?;
/// ```
pub struct SpriteInstancer<B: RenderBackend + TextureProvider> {
    backend: B,
    viewport: Viewport,
    shader: ShaderHandle,
    sheet: Option<SheetBinding>,
    batch: InstanceBatch,
    state: EngineState,
    view_transform: Mat4,
    quad_vertices: Option<BufferHandle>,
    quad_indices: Option<BufferHandle>,
    instances: Option<BufferHandle>,
    /// Capacity of the GPU instance buffer, in records.
    instance_capacity: usize,
}

impl<B: RenderBackend + TextureProvider> SpriteInstancer<B> {
    /// Create an engine over the given backend.
    ///
    /// `texture` may be `None` to start unbound; begin/record/end then run
    /// as no-ops until a sheet is bound. An initial texture the provider
    /// cannot size is an error.
    pub fn new(
        mut backend: B,
        viewport: Viewport,
        shader: ShaderHandle,
        texture: Option<TextureHandle>,
    ) -> BatchResult<Self> {
        let sheet = match texture {
            Some(handle) => Some(SheetBinding::resolve(&backend, handle)?),
            None => None,
        };
        let (quad_vertices, quad_indices, instances) = create_quad_resources(&mut backend);
        Ok(Self {
            backend,
            viewport,
            shader,
            sheet,
            batch: InstanceBatch::new(),
            state: EngineState::Idle,
            view_transform: Mat4::IDENTITY,
            quad_vertices: Some(quad_vertices),
            quad_indices: Some(quad_indices),
            instances: Some(instances),
            instance_capacity: 1,
        })
    }

    /// Open a recording, applying pipeline state to the backend.
    ///
    /// Fails if a recording is already open. With no texture bound the state
    /// still flips to `Recording` (a matching [`end`](Self::end) stays
    /// required) but no other setup happens.
    pub fn begin(&mut self, desc: &BeginDescriptor) -> BatchResult<()> {
        if self.state == EngineState::Recording {
            return Err(BatchError::RecordingAlreadyStarted);
        }
        self.state = EngineState::Recording;
        if self.sheet.is_none() {
            return Ok(());
        }

        let states = desc.render_states.unwrap_or_default();
        self.backend.apply_render_states(&states);
        self.view_transform = view_projection(self.viewport, desc.transform);
        self.batch.reset();
        Ok(())
    }

    /// Open a recording while leaving the backend's pipeline state alone.
    ///
    /// For callers interleaving batches with their own draws that already
    /// configured blending and sampling for the frame.
    pub fn begin_keep_states(&mut self, transform: Option<Mat4>) -> BatchResult<()> {
        if self.state == EngineState::Recording {
            return Err(BatchError::RecordingAlreadyStarted);
        }
        self.state = EngineState::Recording;
        if self.sheet.is_none() {
            return Ok(());
        }

        self.view_transform = view_projection(self.viewport, transform);
        self.batch.reset();
        Ok(())
    }

    /// Rebind the spritesheet and open a recording in one call.
    pub fn begin_with_texture(
        &mut self,
        texture: TextureHandle,
        desc: &BeginDescriptor,
    ) -> BatchResult<()> {
        if self.state == EngineState::Recording {
            return Err(BatchError::RecordingAlreadyStarted);
        }
        self.sheet = Some(SheetBinding::resolve(&self.backend, texture)?);
        self.begin(desc)
    }

    /// Record the whole sheet at `position`, centre-anchored, with default
    /// rotation, scale, and tint. No-op without a bound texture.
    #[inline]
    pub fn record(&mut self, position: Vec2) {
        let Some(sheet) = self.sheet else { return };
        let region = sheet.full_region();
        self.push_record(position, region, 0.0, Vec2::ONE, TINT_WHITE);
    }

    /// Record a sprite at `position`, centre-anchored.
    ///
    /// The descriptor's `source` defaults to the whole sheet; rotation spins
    /// around the anchor.
    #[inline]
    pub fn record_with(&mut self, position: Vec2, sprite: &SpriteDescriptor) {
        let Some(sheet) = self.sheet else { return };
        let region = sprite.source.unwrap_or_else(|| sheet.full_region());
        self.push_record(position, region, sprite.rotation, sprite.scale, sprite.tint);
    }

    /// Record the whole sheet with `position` naming its top-left corner.
    #[inline]
    pub fn record_top_left(&mut self, position: Vec2) {
        let Some(sheet) = self.sheet else { return };
        let region = sheet.full_region();
        let centre = position + 0.5 * Vec2::new(region.width as f32, region.height as f32);
        self.push_record(centre, region, 0.0, Vec2::ONE, TINT_WHITE);
    }

    /// Record a sprite with `position` naming its top-left corner.
    ///
    /// The anchor is recentred by half the scaled region extent, so rotation
    /// still spins around the sprite's middle.
    #[inline]
    pub fn record_top_left_with(&mut self, position: Vec2, sprite: &SpriteDescriptor) {
        let Some(sheet) = self.sheet else { return };
        let region = sprite.source.unwrap_or_else(|| sheet.full_region());
        let half = 0.5
            * Vec2::new(region.width as f32, region.height as f32)
            * sprite.scale.abs();
        self.push_record(
            position + half,
            region,
            sprite.rotation,
            sprite.scale,
            sprite.tint,
        );
    }

    #[inline]
    fn push_record(
        &mut self,
        position: Vec2,
        region: SheetRegion,
        rotation: f32,
        scale: Vec2,
        tint: [u8; 4],
    ) {
        let depth = self.batch.len() as f32;
        self.batch
            .push(InstanceRecord::new(depth, rotation, tint, region, position, scale));
    }

    /// Close the recording and submit the batch as one instanced draw.
    ///
    /// Fails without an open recording. With no texture bound or nothing
    /// recorded this only flips the state back to `Idle`. The GPU instance
    /// buffer is grown (never shrunk) to the record count, then all live
    /// records are re-uploaded in one discard write.
    pub fn end(&mut self) -> BatchResult<()> {
        if self.state != EngineState::Recording {
            return Err(BatchError::RecordingNotStarted);
        }
        self.state = EngineState::Idle;

        let Some(sheet) = self.sheet else {
            return Ok(());
        };
        if self.batch.is_empty() {
            return Ok(());
        }
        // A disposed engine has nothing left to draw with.
        let (Some(vertices), Some(indices)) = (self.quad_vertices, self.quad_indices) else {
            return Ok(());
        };

        let count = self.batch.len();
        let instances = ensure_instance_buffer(
            &mut self.backend,
            &mut self.instances,
            &mut self.instance_capacity,
            count,
        );
        tracing::trace!("submitting {} instances", count);
        self.backend
            .write_buffer(instances, bytemuck::cast_slice(self.batch.records()));
        self.backend.bind_quad_buffers(&QuadBindings {
            vertices,
            indices,
            instances,
        });
        self.backend.set_shader_inputs(&ShaderInputs {
            shader: self.shader,
            texture: sheet.texture,
            texture_extent: sheet.extent(),
            view_transform: self.view_transform,
        });
        self.backend.draw_instanced(
            wgpu::PrimitiveTopology::TriangleList,
            QUAD_PRIMITIVES,
            count as u32,
        );
        Ok(())
    }

    /// Bind a new spritesheet. Fails mid-recording and for handles the
    /// provider cannot size.
    pub fn bind_texture(&mut self, texture: TextureHandle) -> BatchResult<()> {
        if self.state == EngineState::Recording {
            return Err(BatchError::RecordingInProgress {
                operation: "bind_texture",
            });
        }
        self.bind_texture_unchecked(texture)
    }

    /// Bind a new spritesheet even mid-recording.
    ///
    /// Records already accumulated keep their old source regions but will be
    /// submitted against the new sheet; callers taking this path accept that
    /// risk.
    pub fn bind_texture_unchecked(&mut self, texture: TextureHandle) -> BatchResult<()> {
        self.sheet = Some(SheetBinding::resolve(&self.backend, texture)?);
        tracing::debug!("bound spritesheet {:?}", texture);
        Ok(())
    }

    /// Drop the current spritesheet binding. Fails mid-recording.
    pub fn unbind_texture(&mut self) -> BatchResult<()> {
        if self.state == EngineState::Recording {
            return Err(BatchError::RecordingInProgress {
                operation: "unbind_texture",
            });
        }
        self.sheet = None;
        Ok(())
    }

    /// Replace the shader used for submissions.
    pub fn set_shader(&mut self, shader: ShaderHandle) {
        self.shader = shader;
    }

    /// Update the viewport after a resolution change. Fails on a zero
    /// dimension.
    pub fn set_viewport(&mut self, width: u32, height: u32) -> BatchResult<()> {
        self.viewport = Viewport::new(width, height)?;
        Ok(())
    }

    /// Grow the record arena to at least `capacity`. Fails on zero capacity
    /// or mid-recording.
    pub fn reserve(&mut self, capacity: usize) -> BatchResult<()> {
        self.check_capacity_request("reserve", capacity)?;
        self.batch.reserve(capacity);
        Ok(())
    }

    /// Resize the record arena to exactly `capacity`. Fails on zero capacity
    /// or mid-recording; no-op when the size already matches.
    pub fn set_batch_capacity(&mut self, capacity: usize) -> BatchResult<()> {
        self.check_capacity_request("set_batch_capacity", capacity)?;
        self.batch.set_capacity(capacity);
        Ok(())
    }

    /// Shrink the record arena to its live records. Fails mid-recording.
    pub fn shrink_to_fit(&mut self) -> BatchResult<()> {
        if self.state == EngineState::Recording {
            return Err(BatchError::RecordingInProgress {
                operation: "shrink_to_fit",
            });
        }
        self.batch.shrink_to_fit();
        Ok(())
    }

    fn check_capacity_request(
        &self,
        operation: &'static str,
        capacity: usize,
    ) -> BatchResult<()> {
        if capacity == 0 {
            return Err(BatchError::InvalidCapacity);
        }
        if self.state == EngineState::Recording {
            return Err(BatchError::RecordingInProgress { operation });
        }
        Ok(())
    }

    /// Release the engine's GPU buffers. Safe to call more than once; the
    /// engine's `Drop` also calls it.
    pub fn dispose(&mut self) {
        let buffers = [
            self.quad_vertices.take(),
            self.quad_indices.take(),
            self.instances.take(),
        ];
        for buffer in buffers.into_iter().flatten() {
            self.backend.destroy_buffer(buffer);
        }
        self.instance_capacity = 0;
    }

    /// The currently bound spritesheet, if any.
    pub fn texture(&self) -> Option<TextureHandle> {
        self.sheet.map(|sheet| sheet.texture)
    }

    /// Current record arena capacity.
    pub fn batch_capacity(&self) -> usize {
        self.batch.capacity()
    }

    /// Records accumulated since the last `begin`.
    pub fn instance_count(&self) -> usize {
        self.batch.len()
    }

    /// Whether a recording is open.
    pub fn is_recording(&self) -> bool {
        self.state == EngineState::Recording
    }

    /// The active viewport.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// The injected backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the injected backend (e.g. to flush queued draws).
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: RenderBackend + TextureProvider> Drop for SpriteInstancer<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Grow the shared GPU instance buffer to hold `count` records, recreating
/// it through the backend only when the current one is too small.
pub(crate) fn ensure_instance_buffer<B: RenderBackend>(
    backend: &mut B,
    buffer: &mut Option<BufferHandle>,
    capacity: &mut usize,
    count: usize,
) -> BufferHandle {
    match *buffer {
        Some(handle) if *capacity >= count => handle,
        _ => {
            if let Some(old) = buffer.take() {
                backend.destroy_buffer(old);
            }
            tracing::trace!("growing GPU instance buffer to {} records", count);
            let handle =
                backend.create_buffer(BufferKind::Instance, count as u64 * InstanceRecord::SIZE);
            *buffer = Some(handle);
            *capacity = count;
            handle
        }
    }
}
