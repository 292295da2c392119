//! The per-frame record arena and the recording protocol types.

use bytemuck::Zeroable;
use glam::{Mat4, Vec2};

use crate::instance::{InstanceRecord, TINT_WHITE};
use crate::region::SheetRegion;
use crate::states::RenderStates;

/// Recording protocol state of an engine.
///
/// Engines start `Idle`; `begin` moves to `Recording` and the matching `end`
/// moves back. Every entry point that is only legal on one side of the
/// protocol checks this enum and fails otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No recording open; capacity and texture mutations are allowed.
    Idle,
    /// Between `begin` and `end`; records accumulate.
    Recording,
}

/// Configuration for `begin`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeginDescriptor {
    /// Caller scene transform. `None` renders in plain screen space.
    pub transform: Option<Mat4>,
    /// Pipeline states for the batch. `None` applies the engine defaults
    /// (alpha blend, no depth, linear clamp, no culling).
    pub render_states: Option<RenderStates>,
}

/// Per-sprite parameters beyond the anchor position.
#[derive(Debug, Clone, Copy)]
pub struct SpriteDescriptor {
    /// Source rectangle in the sheet. `None` samples the whole texture.
    pub source: Option<SheetRegion>,
    /// Rotation around the anchor in radians (default 0).
    pub rotation: f32,
    /// Per-axis scale (default (1, 1)); negative components mirror.
    pub scale: Vec2,
    /// RGBA tint (default opaque white).
    pub tint: [u8; 4],
}

impl Default for SpriteDescriptor {
    fn default() -> Self {
        Self {
            source: None,
            rotation: 0.0,
            scale: Vec2::ONE,
            tint: TINT_WHITE,
        }
    }
}

impl SpriteDescriptor {
    /// Shorthand for a tinted sprite with otherwise default parameters.
    pub fn tinted(tint: [u8; 4]) -> Self {
        Self {
            tint,
            ..Self::default()
        }
    }

    /// Shorthand for a sprite drawn from a source region.
    pub fn from_region(source: SheetRegion) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }
}

/// A growable arena of instance records with an explicit cursor.
///
/// The backing storage always holds `capacity` records; only `[0, len)` are
/// live, and entries past the cursor are stale from earlier frames. Growth
/// doubles the capacity; nothing ever shrinks implicitly, so steady-state
/// frames reuse the allocation untouched.
#[derive(Debug)]
pub struct InstanceBatch {
    records: Vec<InstanceRecord>,
    len: usize,
}

impl InstanceBatch {
    /// Create a batch with room for one record.
    pub fn new() -> Self {
        Self::with_capacity(1)
    }

    /// Create a batch with the given capacity (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: vec![InstanceRecord::zeroed(); capacity],
            len: 0,
        }
    }

    /// Number of allocated record slots.
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no records are live.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The live records, in insertion order.
    pub fn records(&self) -> &[InstanceRecord] {
        &self.records[..self.len]
    }

    /// Reset the cursor. Capacity is left untouched so the next frame does
    /// not reallocate.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// Append a record, doubling the capacity when full.
    #[inline]
    pub fn push(&mut self, record: InstanceRecord) {
        if self.len == self.records.len() {
            self.grow();
        }
        self.records[self.len] = record;
        self.len += 1;
    }

    /// Grow capacity to at least `capacity`, using the doubling schedule.
    pub fn reserve(&mut self, capacity: usize) {
        while self.records.len() < capacity {
            self.grow();
        }
    }

    /// Resize to exactly `capacity` slots (minimum 1), truncating the cursor
    /// if it no longer fits. No-op when the capacity already matches.
    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if self.records.len() != capacity {
            self.records.resize(capacity, InstanceRecord::zeroed());
            self.len = self.len.min(capacity);
        }
    }

    /// Drop the stale tail, shrinking capacity to the live records
    /// (minimum 1).
    pub fn shrink_to_fit(&mut self) {
        let capacity = self.len.max(1);
        self.records.truncate(capacity);
        self.records.shrink_to_fit();
    }

    fn grow(&mut self) {
        let new_capacity = self.records.len() * 2;
        tracing::trace!("growing instance batch to {} records", new_capacity);
        self.records.resize(new_capacity, InstanceRecord::zeroed());
    }
}

impl Default for InstanceBatch {
    fn default() -> Self {
        Self::new()
    }
}
