//! GPU-side data for instanced sprite rendering.
//!
//! One [`InstanceRecord`] is written per recorded sprite and streamed to the
//! instance buffer verbatim, so the struct layout here and the vertex layout
//! the pipelines consume are the same 36 bytes. The quad geometry every
//! instance is stretched over lives here too: four vertices, two triangles,
//! shared by all draws.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::region::SheetRegion;

/// Opaque white, the default sprite tint.
pub const TINT_WHITE: [u8; 4] = [255, 255, 255, 255];

/// Per-instance attributes for one sprite.
///
/// `depth` counts up in record order inside a batch; the renderer draws the
/// buffer in that order, so it is a stable back-to-front key rather than a
/// depth-test value. The source rectangle arrives packed (see
/// [`SheetRegion`]); `position` is the anchor in caller space and `scale`
/// multiplies the region extent per axis, with negative components mirroring
/// the sprite.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceRecord {
    /// Insertion index within the batch, as a float for the vertex stream.
    pub depth: f32,
    /// Rotation around the anchor, in radians.
    pub rotation: f32,
    /// RGBA tint multiplied over the sampled texel.
    pub tint: [u8; 4],
    /// Packed source rectangle position (`x << 16 | y & 0xFFFF`).
    pub source_offset: i32,
    /// Packed source rectangle extent (`width << 16 | height & 0xFFFF`).
    pub source_extent: i32,
    /// Anchor position in caller (world/screen) space.
    pub position: [f32; 2],
    /// Per-axis extent multiplier; sign flips mirror the sprite.
    pub scale: [f32; 2],
}

// SAFETY: InstanceRecord is repr(C) with only f32/i32/u8 fields summing to
// 36 bytes at alignment 4, so there are no padding holes.
unsafe impl Pod for InstanceRecord {}
unsafe impl Zeroable for InstanceRecord {}

impl InstanceRecord {
    /// Size of one record in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Build a record from unpacked parts.
    pub fn new(
        depth: f32,
        rotation: f32,
        tint: [u8; 4],
        region: SheetRegion,
        position: Vec2,
        scale: Vec2,
    ) -> Self {
        let (source_offset, source_extent) = region.pack();
        Self {
            depth,
            rotation,
            tint,
            source_offset,
            source_extent,
            position: position.to_array(),
            scale: scale.to_array(),
        }
    }

    /// The source rectangle this record samples from.
    pub fn region(&self) -> SheetRegion {
        SheetRegion::unpack(self.source_offset, self.source_extent)
    }

    /// The wgpu vertex buffer layout for the per-instance stream.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRS: &[wgpu::VertexAttribute] = &wgpu::vertex_attr_array![
            // location 2: depth (f32)
            2 => Float32,
            // location 3: rotation (f32)
            3 => Float32,
            // location 4: tint (rgba8, normalized)
            4 => Unorm8x4,
            // location 5: packed source offset (i32)
            5 => Sint32,
            // location 6: packed source extent (i32)
            6 => Sint32,
            // location 7: position (vec2)
            7 => Float32x2,
            // location 8: scale (vec2)
            8 => Float32x2,
        ];

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceRecord>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: ATTRS,
        }
    }
}

/// One corner of the shared unit quad.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

// SAFETY: QuadVertex is repr(C) with only f32 fields, no padding holes.
unsafe impl Pod for QuadVertex {}
unsafe impl Zeroable for QuadVertex {}

impl QuadVertex {
    /// The wgpu vertex buffer layout for the quad corner stream.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRS: &[wgpu::VertexAttribute] = &wgpu::vertex_attr_array![
            0 => Float32x2,  // position
            1 => Float32x2,  // tex_coords
        ];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: ATTRS,
        }
    }
}

/// Corner positions of the unit quad, spanning [-1,1] on both axes.
pub const QUAD_VERTICES: &[QuadVertex] = &[
    QuadVertex {
        position: [-1.0, -1.0],
        tex_coords: [0.0, 1.0], // bottom left
    },
    QuadVertex {
        position: [-1.0, 1.0],
        tex_coords: [0.0, 0.0], // top left
    },
    QuadVertex {
        position: [1.0, -1.0],
        tex_coords: [1.0, 1.0], // bottom right
    },
    QuadVertex {
        position: [1.0, 1.0],
        tex_coords: [1.0, 0.0], // top right
    },
];

/// Index list splitting the quad into its two triangles.
pub const QUAD_INDICES: &[u16] = &[0, 1, 2, 2, 1, 3];

/// Triangles per instanced quad draw.
pub const QUAD_PRIMITIVES: u32 = 2;
