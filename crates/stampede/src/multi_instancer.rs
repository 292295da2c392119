//! The multi-texture batch router.
//!
//! Where [`SpriteInstancer`](crate::SpriteInstancer) owns one spritesheet,
//! this engine owns an ordered set of texture slots, each with its own
//! record arena, and routes every record call to the slot of the addressed
//! texture. `end` walks the slots in registration order and submits one
//! instanced draw per non-empty slot, sharing a single GPU instance buffer
//! across them.
//!
//! Two addressing styles exist: by handle (validated by a linear scan, with
//! unregistered handles silently skipped, so a sprite whose atlas is not
//! part of this router is simply not drawn) and by slot index for hot loops
//! that already know their slot and want the scan gone.

use glam::{Mat4, Vec2};

use crate::backend::{
    BufferHandle, QuadBindings, RenderBackend, ShaderHandle, ShaderInputs, TextureHandle,
    TextureProvider,
};
use crate::batch::{BeginDescriptor, EngineState, InstanceBatch, SpriteDescriptor};
use crate::error::{BatchError, BatchResult};
use crate::instance::{InstanceRecord, QUAD_PRIMITIVES, TINT_WHITE};
use crate::instancer::{SheetBinding, create_quad_resources, ensure_instance_buffer};
use crate::region::SheetRegion;
use crate::transform::{Viewport, view_projection};

/// A registered texture with its own record arena.
struct TextureSlot {
    binding: SheetBinding,
    batch: InstanceBatch,
}

impl TextureSlot {
    fn new(binding: SheetBinding) -> Self {
        Self {
            binding,
            batch: InstanceBatch::new(),
        }
    }

    #[inline]
    fn push(
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
}

/// Batches sprites from several spritesheets, one instanced draw per sheet.
///
/// Slots are submitted in the order their textures were registered, so the
/// registration order doubles as a coarse layering order between sheets;
/// within a slot, record order is draw order as usual.
pub struct MultiSpriteInstancer<B: RenderBackend + TextureProvider> {
    backend: B,
    viewport: Viewport,
    shader: ShaderHandle,
    slots: Vec<TextureSlot>,
    state: EngineState,
    view_transform: Mat4,
    quad_vertices: Option<BufferHandle>,
    quad_indices: Option<BufferHandle>,
    instances: Option<BufferHandle>,
    /// Capacity of the shared GPU instance buffer, in records.
    instance_capacity: usize,
}

impl<B: RenderBackend + TextureProvider> MultiSpriteInstancer<B> {
    /// Create a router with an initial, ordered set of textures.
    ///
    /// Every handle must resolve through the texture provider; the set may
    /// be empty.
    pub fn new(
        mut backend: B,
        viewport: Viewport,
        shader: ShaderHandle,
        textures: &[TextureHandle],
    ) -> BatchResult<Self> {
        let slots = resolve_slots(&backend, textures)?;
        let (quad_vertices, quad_indices, instances) = create_quad_resources(&mut backend);
        Ok(Self {
            backend,
            viewport,
            shader,
            slots,
            state: EngineState::Idle,
            view_transform: Mat4::IDENTITY,
            quad_vertices: Some(quad_vertices),
            quad_indices: Some(quad_indices),
            instances: Some(instances),
            instance_capacity: 1,
        })
    }

    /// Replace the whole texture set, in the given order. Fails
    /// mid-recording; existing record arenas are discarded.
    pub fn set_textures(&mut self, textures: &[TextureHandle]) -> BatchResult<()> {
        self.check_idle("set_textures")?;
        self.slots = resolve_slots(&self.backend, textures)?;
        Ok(())
    }

    /// Append a texture as the last slot. Fails mid-recording.
    pub fn register_texture(&mut self, texture: TextureHandle) -> BatchResult<()> {
        self.check_idle("register_texture")?;
        let binding = SheetBinding::resolve(&self.backend, texture)?;
        tracing::debug!("registered spritesheet {:?} as slot {}", texture, self.slots.len());
        self.slots.push(TextureSlot::new(binding));
        Ok(())
    }

    /// Remove the first slot holding this texture. Fails mid-recording;
    /// an unregistered handle is silently ignored.
    pub fn remove_texture(&mut self, texture: TextureHandle) -> BatchResult<()> {
        self.check_idle("remove_texture")?;
        if let Some(index) = self.slot_index(texture) {
            self.slots.remove(index);
        }
        Ok(())
    }

    /// Drop every slot. Fails mid-recording.
    pub fn clear_textures(&mut self) -> BatchResult<()> {
        self.check_idle("clear_textures")?;
        self.slots.clear();
        Ok(())
    }

    /// Whether a texture is registered with this router.
    pub fn contains_texture(&self, texture: TextureHandle) -> bool {
        self.slot_index(texture).is_some()
    }

    /// The registered textures, in slot order.
    pub fn textures(&self) -> Vec<TextureHandle> {
        self.slots.iter().map(|slot| slot.binding.texture).collect()
    }

    /// Number of registered slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Open a recording, applying pipeline state and resetting every slot's
    /// cursor. Fails if a recording is already open.
    pub fn begin(&mut self, desc: &BeginDescriptor) -> BatchResult<()> {
        if self.state == EngineState::Recording {
            return Err(BatchError::RecordingAlreadyStarted);
        }
        self.state = EngineState::Recording;
        if self.slots.is_empty() {
            return Ok(());
        }

        let states = desc.render_states.unwrap_or_default();
        self.backend.apply_render_states(&states);
        self.start_recording(desc.transform);
        Ok(())
    }

    /// Open a recording without touching the backend's pipeline state.
    pub fn begin_keep_states(&mut self, transform: Option<Mat4>) -> BatchResult<()> {
        if self.state == EngineState::Recording {
            return Err(BatchError::RecordingAlreadyStarted);
        }
        self.state = EngineState::Recording;
        if self.slots.is_empty() {
            return Ok(());
        }

        self.start_recording(transform);
        Ok(())
    }

    fn start_recording(&mut self, transform: Option<Mat4>) {
        self.view_transform = view_projection(self.viewport, transform);
        for slot in &mut self.slots {
            slot.batch.reset();
        }
    }

    /// Record the whole sheet of `texture` at `position`, centre-anchored.
    /// Silently does nothing for unregistered handles.
    #[inline]
    pub fn record_for(&mut self, texture: TextureHandle, position: Vec2) {
        let Some(index) = self.slot_index(texture) else {
            return;
        };
        self.record_at(index, position);
    }

    /// Record a sprite from `texture`, centre-anchored. Silently does
    /// nothing for unregistered handles.
    #[inline]
    pub fn record_for_with(
        &mut self,
        texture: TextureHandle,
        position: Vec2,
        sprite: &SpriteDescriptor,
    ) {
        let Some(index) = self.slot_index(texture) else {
            return;
        };
        self.record_at_with(index, position, sprite);
    }

    /// Record the whole sheet of `texture` with `position` naming its
    /// top-left corner. Silently does nothing for unregistered handles.
    #[inline]
    pub fn record_for_top_left(&mut self, texture: TextureHandle, position: Vec2) {
        let Some(index) = self.slot_index(texture) else {
            return;
        };
        self.record_at_top_left(index, position);
    }

    /// Record a sprite from `texture` with `position` naming its top-left
    /// corner. Silently does nothing for unregistered handles.
    #[inline]
    pub fn record_for_top_left_with(
        &mut self,
        texture: TextureHandle,
        position: Vec2,
        sprite: &SpriteDescriptor,
    ) {
        let Some(index) = self.slot_index(texture) else {
            return;
        };
        self.record_at_top_left_with(index, position, sprite);
    }

    /// Record the whole sheet of slot `index` at `position`,
    /// centre-anchored.
    ///
    /// The index is trusted: it must come from registration order, and an
    /// out-of-range value panics. This is the hot path that skips the handle
    /// scan of [`record_for`](Self::record_for).
    #[inline]
    pub fn record_at(&mut self, index: usize, position: Vec2) {
        let slot = &mut self.slots[index];
        let region = slot.binding.full_region();
        slot.push(position, region, 0.0, Vec2::ONE, TINT_WHITE);
    }

    /// Record a sprite into slot `index`, centre-anchored. The index is
    /// trusted; out of range panics.
    #[inline]
    pub fn record_at_with(&mut self, index: usize, position: Vec2, sprite: &SpriteDescriptor) {
        let slot = &mut self.slots[index];
        let region = sprite.source.unwrap_or_else(|| slot.binding.full_region());
        slot.push(position, region, sprite.rotation, sprite.scale, sprite.tint);
    }

    /// Record the whole sheet of slot `index` with `position` naming its
    /// top-left corner. The index is trusted; out of range panics.
    #[inline]
    pub fn record_at_top_left(&mut self, index: usize, position: Vec2) {
        let slot = &mut self.slots[index];
        let region = slot.binding.full_region();
        let centre = position + 0.5 * Vec2::new(region.width as f32, region.height as f32);
        slot.push(centre, region, 0.0, Vec2::ONE, TINT_WHITE);
    }

    /// Record a sprite into slot `index` with `position` naming its top-left
    /// corner. The index is trusted; out of range panics.
    #[inline]
    pub fn record_at_top_left_with(
        &mut self,
        index: usize,
        position: Vec2,
        sprite: &SpriteDescriptor,
    ) {
        let slot = &mut self.slots[index];
        let region = sprite.source.unwrap_or_else(|| slot.binding.full_region());
        let half = 0.5
            * Vec2::new(region.width as f32, region.height as f32)
            * sprite.scale.abs();
        slot.push(
            position + half,
            region,
            sprite.rotation,
            sprite.scale,
            sprite.tint,
        );
    }

    /// Close the recording and submit one instanced draw per non-empty
    /// slot, in registration order.
    ///
    /// The GPU instance buffer is shared across slots: it grows to the
    /// largest slot submitted so far and every slot's records are
    /// discard-uploaded into it just before that slot's draw.
    pub fn end(&mut self) -> BatchResult<()> {
        if self.state != EngineState::Recording {
            return Err(BatchError::RecordingNotStarted);
        }
        self.state = EngineState::Idle;

        if self.slots.is_empty() {
            return Ok(());
        }
        // A disposed engine has nothing left to draw with.
        let (Some(vertices), Some(indices)) = (self.quad_vertices, self.quad_indices) else {
            return Ok(());
        };

        let mut draws = 0u32;
        for slot in &self.slots {
            if slot.batch.is_empty() {
                continue;
            }

            let count = slot.batch.len();
            let instances = ensure_instance_buffer(
                &mut self.backend,
                &mut self.instances,
                &mut self.instance_capacity,
                count,
            );
            self.backend
                .write_buffer(instances, bytemuck::cast_slice(slot.batch.records()));
            self.backend.bind_quad_buffers(&QuadBindings {
                vertices,
                indices,
                instances,
            });
            self.backend.set_shader_inputs(&ShaderInputs {
                shader: self.shader,
                texture: slot.binding.texture,
                texture_extent: slot.binding.extent(),
                view_transform: self.view_transform,
            });
            self.backend.draw_instanced(
                wgpu::PrimitiveTopology::TriangleList,
                QUAD_PRIMITIVES,
                count as u32,
            );
            draws += 1;
        }
        tracing::trace!("submitted {} slot draws", draws);
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

    /// Grow every slot's record arena to at least `capacity`. Fails on zero
    /// capacity or mid-recording.
    pub fn reserve(&mut self, capacity: usize) -> BatchResult<()> {
        self.check_capacity_request("reserve", capacity)?;
        for slot in &mut self.slots {
            slot.batch.reserve(capacity);
        }
        Ok(())
    }

    /// Grow one slot's record arena to at least `capacity`. Fails on zero
    /// capacity, mid-recording, or an out-of-range slot index.
    pub fn reserve_slot(&mut self, index: usize, capacity: usize) -> BatchResult<()> {
        self.check_capacity_request("reserve_slot", capacity)?;
        let slots = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(BatchError::SlotOutOfRange { index, slots })?;
        slot.batch.reserve(capacity);
        Ok(())
    }

    /// Resize every slot's record arena to exactly `capacity`. Fails on
    /// zero capacity or mid-recording; matching slots are left alone.
    pub fn set_batch_capacities(&mut self, capacity: usize) -> BatchResult<()> {
        self.check_capacity_request("set_batch_capacities", capacity)?;
        for slot in &mut self.slots {
            slot.batch.set_capacity(capacity);
        }
        Ok(())
    }

    /// Resize one slot's record arena to exactly `capacity`. Fails on zero
    /// capacity, mid-recording, or an out-of-range slot index.
    pub fn set_slot_capacity(&mut self, index: usize, capacity: usize) -> BatchResult<()> {
        self.check_capacity_request("set_slot_capacity", capacity)?;
        let slots = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(BatchError::SlotOutOfRange { index, slots })?;
        slot.batch.set_capacity(capacity);
        Ok(())
    }

    /// Shrink every slot's record arena to its live records. Fails
    /// mid-recording.
    pub fn shrink_to_fit(&mut self) -> BatchResult<()> {
        self.check_idle("shrink_to_fit")?;
        for slot in &mut self.slots {
            slot.batch.shrink_to_fit();
        }
        Ok(())
    }

    /// Record arena capacities, in slot order.
    pub fn batch_capacities(&self) -> Vec<usize> {
        self.slots.iter().map(|slot| slot.batch.capacity()).collect()
    }

    /// Records accumulated per slot since the last `begin`, in slot order.
    pub fn instance_counts(&self) -> Vec<usize> {
        self.slots.iter().map(|slot| slot.batch.len()).collect()
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

    /// Release the engine's GPU buffers and drop all slots. Safe to call
    /// more than once; the engine's `Drop` also calls it.
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
        self.slots.clear();
    }

    fn slot_index(&self, texture: TextureHandle) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.binding.texture == texture)
    }

    fn check_idle(&self, operation: &'static str) -> BatchResult<()> {
        if self.state == EngineState::Recording {
            return Err(BatchError::RecordingInProgress { operation });
        }
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
        self.check_idle(operation)
    }
}

impl<B: RenderBackend + TextureProvider> Drop for MultiSpriteInstancer<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn resolve_slots<P: TextureProvider>(
    provider: &P,
    textures: &[TextureHandle],
) -> BatchResult<Vec<TextureSlot>> {
    textures
        .iter()
        .map(|&texture| SheetBinding::resolve(provider, texture).map(TextureSlot::new))
        .collect()
}
