//! Pipeline state presets applied at the start of a batch.
//!
//! The engines hand these to the backend once per `begin`; they deliberately
//! cover the handful of configurations sprite rendering actually uses, with
//! a `Custom` escape hatch on the blend axis for everything else.

/// How source fragments combine with the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Standard alpha blending: `src.rgb * src.a + dst.rgb * (1 - src.a)`.
    #[default]
    Alpha,

    /// Premultiplied alpha: `src.rgb + dst.rgb * (1 - src.a)`.
    Premultiplied,

    /// Additive: `src.rgb * src.a + dst.rgb`. Glow, particles.
    Additive,

    /// No blending; source replaces destination.
    Opaque,

    /// Caller-supplied blend state.
    Custom(wgpu::BlendState),
}

impl BlendMode {
    /// Convert to the wgpu blend state, `None` meaning no blending.
    pub fn to_blend_state(self) -> Option<wgpu::BlendState> {
        match self {
            BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
            BlendMode::Premultiplied => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            BlendMode::Additive => Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            }),
            BlendMode::Opaque => None,
            BlendMode::Custom(state) => Some(state),
        }
    }
}

/// Depth handling for batch draws.
///
/// Sprites rely on submission order, so the default leaves depth out
/// entirely. `TestAndWrite` is for callers compositing batches into a pass
/// that carries a depth attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthMode {
    /// No depth testing, no depth writes.
    #[default]
    Disabled,

    /// Greater-equal test with writes, against a `Depth32Float` attachment.
    TestAndWrite,
}

/// Texture sampling preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerMode {
    /// Bilinear filtering, clamped addressing.
    #[default]
    LinearClamp,

    /// Nearest-texel filtering, clamped addressing. Pixel art.
    PointClamp,

    /// Bilinear filtering, repeating addressing.
    LinearWrap,

    /// Nearest-texel filtering, repeating addressing.
    PointWrap,
}

impl SamplerMode {
    /// The wgpu sampler descriptor for this preset.
    pub fn descriptor(self) -> wgpu::SamplerDescriptor<'static> {
        let (filter, address) = match self {
            SamplerMode::LinearClamp => (wgpu::FilterMode::Linear, wgpu::AddressMode::ClampToEdge),
            SamplerMode::PointClamp => (wgpu::FilterMode::Nearest, wgpu::AddressMode::ClampToEdge),
            SamplerMode::LinearWrap => (wgpu::FilterMode::Linear, wgpu::AddressMode::Repeat),
            SamplerMode::PointWrap => (wgpu::FilterMode::Nearest, wgpu::AddressMode::Repeat),
        };
        wgpu::SamplerDescriptor {
            label: Some("stampede_sampler"),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        }
    }
}

/// Triangle culling preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Draw both windings. Required for mirrored sprites.
    #[default]
    None,

    /// Cull back faces.
    Back,

    /// Cull front faces.
    Front,
}

impl CullMode {
    /// Convert to the wgpu face selection.
    pub fn to_face(self) -> Option<wgpu::Face> {
        match self {
            CullMode::None => None,
            CullMode::Back => Some(wgpu::Face::Back),
            CullMode::Front => Some(wgpu::Face::Front),
        }
    }
}

/// The full pipeline state bundle applied at `begin`.
///
/// The defaults match conventional sprite batching: alpha blending, no depth
/// test, linear-clamp sampling, no culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderStates {
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub sampler: SamplerMode,
    pub cull: CullMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_sprite_conventions() {
        let states = RenderStates::default();
        assert_eq!(states.blend, BlendMode::Alpha);
        assert_eq!(states.depth, DepthMode::Disabled);
        assert_eq!(states.sampler, SamplerMode::LinearClamp);
        assert_eq!(states.cull, CullMode::None);
    }

    #[test]
    fn test_opaque_disables_blending() {
        assert_eq!(BlendMode::Opaque.to_blend_state(), None);
        assert!(BlendMode::Alpha.to_blend_state().is_some());
    }
}
