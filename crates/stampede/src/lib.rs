//! Instanced spritesheet batching.
//!
//! Stampede collapses many per-sprite draw requests into one instanced draw
//! per spritesheet. Sprites recorded between [`begin`](SpriteInstancer::begin)
//! and [`end`](SpriteInstancer::end) accumulate as compact 36-byte records in
//! a growable arena; `end` uploads them in a single write and issues one
//! instanced draw over a shared quad, preserving record order back to front.
//!
//! The engines talk to the renderer through the narrow [`RenderBackend`] and
//! [`TextureProvider`] traits. [`WgpuBackend`] implements them on a wgpu
//! device with queued draws replayed into a caller's render pass; the
//! `stampede-test-utils` crate implements them with plain call recording so
//! the whole protocol is testable without a GPU.
//!
//! Two engines cover the common shapes:
//!
//! - [`SpriteInstancer`]: one spritesheet, one batch, one draw per `end`.
//! - [`MultiSpriteInstancer`]: one batch per registered sheet, routed by
//!   texture handle or slot index, one draw per non-empty sheet.

pub mod backend;
pub mod batch;
pub mod context;
pub mod error;
pub mod instance;
pub mod instancer;
pub mod multi_instancer;
pub mod region;
pub mod states;
pub mod transform;
pub mod wgpu_backend;

pub use backend::{
    BufferHandle, BufferKind, QuadBindings, RenderBackend, ShaderHandle, ShaderInputs,
    TextureHandle, TextureProvider,
};
pub use batch::{BeginDescriptor, EngineState, InstanceBatch, SpriteDescriptor};
pub use context::{GraphicsContext, GraphicsError};
pub use error::{BatchError, BatchResult};
pub use instance::{InstanceRecord, QUAD_INDICES, QUAD_VERTICES, QuadVertex, TINT_WHITE};
pub use instancer::SpriteInstancer;
pub use multi_instancer::MultiSpriteInstancer;
pub use region::SheetRegion;
pub use states::{BlendMode, CullMode, DepthMode, RenderStates, SamplerMode};
pub use transform::{Viewport, view_projection};
pub use wgpu_backend::WgpuBackend;
