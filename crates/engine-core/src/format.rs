//! Aspect, filter and per-format capability types.

/// Image aspect a blit reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Aspect {
    Color,
    Depth,
}

impl Aspect {
    /// Aspect implied by a texture format. Stencil-only formats have no
    /// blittable aspect.
    pub fn of_format(format: wgpu::TextureFormat) -> Option<Self> {
        if format.has_depth_aspect() {
            Some(Aspect::Depth)
        } else if format.is_depth_stencil_format() {
            None
        } else {
            Some(Aspect::Color)
        }
    }

    pub fn to_wgpu(self) -> wgpu::TextureAspect {
        match self {
            Aspect::Color => wgpu::TextureAspect::All,
            Aspect::Depth => wgpu::TextureAspect::DepthOnly,
        }
    }
}

/// Filter applied when source and destination rectangles differ in size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlitFilter {
    #[default]
    Nearest,
    Linear,
}

impl BlitFilter {
    pub fn to_wgpu(self) -> wgpu::FilterMode {
        match self {
            BlitFilter::Nearest => wgpu::FilterMode::Nearest,
            BlitFilter::Linear => wgpu::FilterMode::Linear,
        }
    }

    /// Value of `BlitParams::filter_mode` in the blit shaders.
    pub fn shader_value(self) -> u32 {
        match self {
            BlitFilter::Nearest => engine_shaders::BlitUniforms::FILTER_NEAREST,
            BlitFilter::Linear => engine_shaders::BlitUniforms::FILTER_LINEAR,
        }
    }
}

/// What the backend can do with a texture format, queried once per format
/// and cached by the blitter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormatCaps {
    /// Usable as the source of an identity copy.
    pub copy_src: bool,
    /// Usable as the destination of an identity copy.
    pub copy_dst: bool,
    /// Usable as the source of a hardware scaled blit.
    pub blit_src: bool,
    /// Usable as the destination of a hardware scaled blit.
    pub blit_dst: bool,
    /// Hardware scaled blits from this format support linear filtering.
    pub blit_linear: bool,
    /// Can be bound as a sampled texture.
    pub sampled: bool,
    /// Sampling with a filtering sampler is allowed.
    pub filterable: bool,
    /// Multisampled images of this format can be resolved by the hardware.
    pub resolve: bool,
    /// Can be rendered to.
    pub renderable: bool,
}

impl FormatCaps {
    pub fn can_copy(src: &FormatCaps, dst: &FormatCaps) -> bool {
        src.copy_src && dst.copy_dst
    }

    pub fn can_blit(src: &FormatCaps, dst: &FormatCaps, filter: BlitFilter) -> bool {
        src.blit_src && dst.blit_dst && (filter == BlitFilter::Nearest || src.blit_linear)
    }
}

/// Backend-wide properties that are not tied to a single format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendFeatures {
    /// Copies of depth images must cover the whole subresource.
    pub depth_copy_requires_full_subresource: bool,
}

impl Default for BackendFeatures {
    fn default() -> Self {
        Self {
            depth_copy_requires_full_subresource: true,
        }
    }
}

/// Component type a color format is read and written as in shaders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Float,
    Uint,
    Sint,
}

impl ChannelKind {
    pub fn of_format(format: wgpu::TextureFormat) -> Self {
        use wgpu::TextureFormat as F;
        match format {
            F::R8Uint
            | F::R16Uint
            | F::R32Uint
            | F::Rg8Uint
            | F::Rg16Uint
            | F::Rg32Uint
            | F::Rgba8Uint
            | F::Rgba16Uint
            | F::Rgba32Uint
            | F::Rgb10a2Uint => ChannelKind::Uint,
            F::R8Sint
            | F::R16Sint
            | F::R32Sint
            | F::Rg8Sint
            | F::Rg16Sint
            | F::Rg32Sint
            | F::Rgba8Sint
            | F::Rgba16Sint
            | F::Rgba32Sint => ChannelKind::Sint,
            _ => ChannelKind::Float,
        }
    }
}

/// Integer formats are only readable with texel loads and never filtered.
pub(crate) fn is_integer_format(format: wgpu::TextureFormat) -> bool {
    ChannelKind::of_format(format) != ChannelKind::Float
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_follows_format() {
        assert_eq!(Aspect::of_format(wgpu::TextureFormat::Rgba8Unorm), Some(Aspect::Color));
        assert_eq!(Aspect::of_format(wgpu::TextureFormat::Depth32Float), Some(Aspect::Depth));
        assert_eq!(
            Aspect::of_format(wgpu::TextureFormat::Depth24PlusStencil8),
            Some(Aspect::Depth)
        );
        assert_eq!(Aspect::of_format(wgpu::TextureFormat::Stencil8), None);
    }

    #[test]
    fn linear_blit_needs_linear_support() {
        let src = FormatCaps {
            blit_src: true,
            ..Default::default()
        };
        let dst = FormatCaps {
            blit_dst: true,
            ..Default::default()
        };
        assert!(FormatCaps::can_blit(&src, &dst, BlitFilter::Nearest));
        assert!(!FormatCaps::can_blit(&src, &dst, BlitFilter::Linear));
    }

    #[test]
    fn integer_formats_detected() {
        assert!(is_integer_format(wgpu::TextureFormat::Rgba8Uint));
        assert!(!is_integer_format(wgpu::TextureFormat::Rgba8Unorm));
        assert!(!is_integer_format(wgpu::TextureFormat::Rgba16Float));
        assert_eq!(ChannelKind::of_format(wgpu::TextureFormat::Rgb10a2Uint), ChannelKind::Uint);
        assert_eq!(ChannelKind::of_format(wgpu::TextureFormat::R16Sint), ChannelKind::Sint);
        assert_eq!(
            ChannelKind::of_format(wgpu::TextureFormat::Depth32Float),
            ChannelKind::Float
        );
    }
}
