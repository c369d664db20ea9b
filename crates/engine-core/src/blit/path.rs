use crate::backend::Backend;
use crate::format::{Aspect, BackendFeatures, BlitFilter, FormatCaps};
use crate::render_target::{Attachment, RectPair};

use super::BlitterOptions;

/// How a blit was (or will be) serviced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlitPath {
    /// Identity-scale hardware copy.
    Copy,
    /// Hardware scaled blit.
    Scale,
    /// Hardware multisample resolve.
    Resolve,
    /// Full-screen triangle sampling the source.
    Shader,
}

impl BlitPath {
    pub fn is_fast(self) -> bool {
        !matches!(self, BlitPath::Shader)
    }
}

/// Everything path selection looks at besides format capabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathQuery {
    pub aspect: Aspect,
    pub src_format: wgpu::TextureFormat,
    pub dst_format: wgpu::TextureFormat,
    pub src_samples: u32,
    pub dst_samples: u32,
    pub src_usage: wgpu::TextureUsages,
    pub dst_usage: wgpu::TextureUsages,
    pub src_rect: RectPair,
    pub dst_rect: RectPair,
    pub src_extent: (u32, u32),
    pub dst_extent: (u32, u32),
    pub filter: BlitFilter,
}

impl PathQuery {
    pub fn new<B: Backend>(
        aspect: Aspect,
        src: &Attachment<B>,
        src_rect: &RectPair,
        dst: &Attachment<B>,
        dst_rect: &RectPair,
        filter: BlitFilter,
    ) -> Self {
        Self {
            aspect,
            src_format: src.format,
            dst_format: dst.format,
            src_samples: src.samples,
            dst_samples: dst.samples,
            src_usage: src.usage,
            dst_usage: dst.usage,
            src_rect: *src_rect,
            dst_rect: *dst_rect,
            src_extent: src.extent(),
            dst_extent: dst.extent(),
            filter,
        }
    }

    pub fn is_identity_scale(&self) -> bool {
        self.src_rect.width() == self.dst_rect.width()
            && self.src_rect.height() == self.dst_rect.height()
    }

    pub fn is_mirrored(&self) -> bool {
        self.src_rect.is_mirrored() || self.dst_rect.is_mirrored()
    }

    pub fn covers_both(&self) -> bool {
        self.src_rect.covers(self.src_extent.0, self.src_extent.1)
            && self.dst_rect.covers(self.dst_extent.0, self.dst_extent.1)
    }

    fn transfer_usage(&self) -> bool {
        self.src_usage.contains(wgpu::TextureUsages::COPY_SRC)
            && self.dst_usage.contains(wgpu::TextureUsages::COPY_DST)
    }

    fn attachment_usage(&self) -> bool {
        self.src_usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
            && self.dst_usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
    }
}

/// Choose how to service a blit. Pure: the same inputs always give the same
/// path.
pub fn select_path(
    query: &PathQuery,
    src_caps: &FormatCaps,
    dst_caps: &FormatCaps,
    features: &BackendFeatures,
    options: &BlitterOptions,
) -> BlitPath {
    if options.force_shader_path {
        return BlitPath::Shader;
    }

    let same_format = query.src_format == query.dst_format;
    let straight = query.is_identity_scale() && !query.is_mirrored();

    if query.src_samples > 1 {
        let resolvable = query.aspect == Aspect::Color
            && query.dst_samples == 1
            && same_format
            && straight
            && query.covers_both()
            && src_caps.resolve
            && query.attachment_usage();
        return if resolvable {
            BlitPath::Resolve
        } else {
            BlitPath::Shader
        };
    }

    if query.dst_samples > 1 {
        return BlitPath::Shader;
    }

    let copyable = straight
        && same_format
        && FormatCaps::can_copy(src_caps, dst_caps)
        && query.transfer_usage();

    match query.aspect {
        Aspect::Depth => {
            let coverage_ok =
                !features.depth_copy_requires_full_subresource || query.covers_both();
            if copyable && query.filter == BlitFilter::Nearest && coverage_ok {
                BlitPath::Copy
            } else {
                BlitPath::Shader
            }
        }
        Aspect::Color => {
            if copyable {
                BlitPath::Copy
            } else if options.allow_hardware_scaling
                && FormatCaps::can_blit(src_caps, dst_caps, query.filter)
                && query.transfer_usage()
            {
                BlitPath::Scale
            } else {
                BlitPath::Shader
            }
        }
    }
}
