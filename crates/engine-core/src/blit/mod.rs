//! Copying and rescaling between render-target attachments.
//!
//! [`Blitter`] picks a hardware command when the formats, sample counts and
//! rectangles allow it and otherwise draws a full-screen triangle that samples
//! the source. Both paths map rectangles and filter identically.

mod fast;
mod path;
mod resources;
mod slow;

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::cache::{FramebufferCache, PipelineCache, SamplerCache};
use crate::disposer::{Disposable, Disposer};
use crate::error::Result;
use crate::format::{Aspect, BackendFeatures, BlitFilter, ChannelKind, FormatCaps};
use crate::render_target::{Attachment, RectPair, RenderTarget};
use crate::stage_pool::StagePool;

pub use path::{BlitPath, PathQuery, select_path};
use resources::RetainedResources;

/// Fragment program used by a shader blit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlitProgram {
    Color,
    ColorUnfilterable,
    ColorMultisampled,
    Depth,
    DepthMultisampled,
    ColorUint,
    ColorSint,
    ColorUintMultisampled,
    ColorSintMultisampled,
}

impl BlitProgram {
    pub fn entry_point(self) -> &'static str {
        match self {
            BlitProgram::Color => engine_shaders::BLIT_FS_COLOR,
            BlitProgram::ColorUnfilterable => engine_shaders::BLIT_FS_COLOR_UNFILTERABLE,
            BlitProgram::ColorMultisampled => engine_shaders::BLIT_FS_COLOR_MULTISAMPLED,
            BlitProgram::Depth => engine_shaders::BLIT_FS_DEPTH,
            BlitProgram::DepthMultisampled => engine_shaders::BLIT_FS_DEPTH_MULTISAMPLED,
            BlitProgram::ColorUint => engine_shaders::BLIT_FS_COLOR_UINT,
            BlitProgram::ColorSint => engine_shaders::BLIT_FS_COLOR_SINT,
            BlitProgram::ColorUintMultisampled => engine_shaders::BLIT_FS_COLOR_UINT_MULTISAMPLED,
            BlitProgram::ColorSintMultisampled => engine_shaders::BLIT_FS_COLOR_SINT_MULTISAMPLED,
        }
    }

    /// Component type the program writes.
    pub fn output_kind(self) -> ChannelKind {
        match self {
            BlitProgram::ColorUint | BlitProgram::ColorUintMultisampled => ChannelKind::Uint,
            BlitProgram::ColorSint | BlitProgram::ColorSintMultisampled => ChannelKind::Sint,
            _ => ChannelKind::Float,
        }
    }

    /// Integer programs copy the nearest texel regardless of the filter.
    pub fn is_integer(self) -> bool {
        self.output_kind() != ChannelKind::Float
    }

    pub fn is_depth(self) -> bool {
        matches!(self, BlitProgram::Depth | BlitProgram::DepthMultisampled)
    }

    /// Programs that load texels and filter themselves; only `Color` uses
    /// the sampler.
    pub fn filters_in_shader(self) -> bool {
        self != BlitProgram::Color
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlitterOptions {
    /// Service every request with a shader blit.
    pub force_shader_path: bool,
    /// Allow hardware scaled blits where the backend supports them.
    pub allow_hardware_scaling: bool,
}

impl Default for BlitterOptions {
    fn default() -> Self {
        Self {
            force_shader_path: false,
            allow_hardware_scaling: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlitStats {
    pub fast: u64,
    pub slow: u64,
    pub initializations: u64,
}

/// Arguments of one blit call.
pub struct BlitRequest<'r, B: Backend> {
    pub dst: &'r RenderTarget<B>,
    pub dst_rect: RectPair,
    pub src: &'r RenderTarget<B>,
    pub src_rect: RectPair,
    pub filter: BlitFilter,
    /// Color attachment index on both targets. Ignored for depth blits.
    pub target_index: usize,
}

impl<'r, B: Backend> BlitRequest<'r, B> {
    pub fn new(
        dst: &'r RenderTarget<B>,
        dst_rect: RectPair,
        src: &'r RenderTarget<B>,
        src_rect: RectPair,
    ) -> Self {
        Self {
            dst,
            dst_rect,
            src,
            src_rect,
            filter: BlitFilter::Nearest,
            target_index: 0,
        }
    }

    pub fn with_filter(mut self, filter: BlitFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_target_index(mut self, index: usize) -> Self {
        self.target_index = index;
        self
    }
}

/// Shared objects a blitter borrows from its engine.
pub struct BlitContext<'a, B: Backend> {
    pub backend: &'a B,
    pub pipelines: &'a PipelineCache<B>,
    pub samplers: &'a SamplerCache<B>,
    pub framebuffers: &'a FramebufferCache<B>,
    pub stage_pool: &'a StagePool<B>,
    pub disposer: &'a Disposer<B>,
}

impl<B: Backend> Clone for BlitContext<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for BlitContext<'_, B> {}

/// One resolved blit: the attachments involved and how to map them.
pub(crate) struct BlitJob<'j, B: Backend> {
    pub aspect: Aspect,
    pub src: &'j Attachment<B>,
    pub src_rect: &'j RectPair,
    pub dst: &'j Attachment<B>,
    pub dst_rect: &'j RectPair,
    pub filter: BlitFilter,
}

pub struct Blitter<'a, B: Backend> {
    ctx: BlitContext<'a, B>,
    options: BlitterOptions,
    features: BackendFeatures,
    caps: HashMap<wgpu::TextureFormat, FormatCaps>,
    retained: Option<RetainedResources<B>>,
    shut_down: bool,
    stats: BlitStats,
}

impl<'a, B: Backend> Blitter<'a, B> {
    pub fn new(ctx: BlitContext<'a, B>, options: BlitterOptions) -> Self {
        Self {
            features: ctx.backend.features(),
            ctx,
            options,
            caps: HashMap::new(),
            retained: None,
            shut_down: false,
            stats: BlitStats::default(),
        }
    }

    /// Copy or rescale the color attachment at `request.target_index`.
    ///
    /// Panics on degenerate or out-of-bounds rectangles, a missing
    /// attachment, a request neither path can service, or use after
    /// [`Blitter::shutdown`].
    pub fn blit_color(
        &mut self,
        cmd: &mut B::CommandBuffer,
        request: &BlitRequest<'_, B>,
    ) -> Result<BlitPath> {
        let index = request.target_index;
        let src = request
            .src
            .color(index)
            .unwrap_or_else(|| panic!("source has no color attachment {index}"));
        let dst = request
            .dst
            .color(index)
            .unwrap_or_else(|| panic!("destination has no color attachment {index}"));
        self.blit(cmd, request, Aspect::Color, src, dst)
    }

    /// Copy or rescale the depth attachment. Same contract as
    /// [`Blitter::blit_color`]; `target_index` is ignored.
    pub fn blit_depth(
        &mut self,
        cmd: &mut B::CommandBuffer,
        request: &BlitRequest<'_, B>,
    ) -> Result<BlitPath> {
        let src = request
            .src
            .depth()
            .unwrap_or_else(|| panic!("source has no depth attachment"));
        let dst = request
            .dst
            .depth()
            .unwrap_or_else(|| panic!("destination has no depth attachment"));
        self.blit(cmd, request, Aspect::Depth, src, dst)
    }

    fn blit(
        &mut self,
        cmd: &mut B::CommandBuffer,
        request: &BlitRequest<'_, B>,
        aspect: Aspect,
        src: &Attachment<B>,
        dst: &Attachment<B>,
    ) -> Result<BlitPath> {
        assert!(!self.shut_down, "blit after Blitter::shutdown");
        check_rect("source", &request.src_rect, src);
        check_rect("destination", &request.dst_rect, dst);

        let src_caps = self.caps(src.format);
        let dst_caps = self.caps(dst.format);
        let query = PathQuery::new(
            aspect,
            src,
            &request.src_rect,
            dst,
            &request.dst_rect,
            request.filter,
        );
        let path = select_path(&query, &src_caps, &dst_caps, &self.features, &self.options);
        debug!(?aspect, ?path, src = ?src.format, dst = ?dst.format, "blit");

        let job = BlitJob {
            aspect,
            src,
            src_rect: &request.src_rect,
            dst,
            dst_rect: &request.dst_rect,
            filter: request.filter,
        };
        if path.is_fast() {
            fast::record(self.ctx.backend, cmd, path, &job);
            self.stats.fast += 1;
        } else {
            assert_serviceable(&job, &src_caps, &dst_caps);
            let program = BlitProgram::for_source(job.src, &src_caps);
            if aspect == Aspect::Color {
                let dst_kind = ChannelKind::of_format(dst.format);
                assert!(
                    program.output_kind() == dst_kind,
                    "unserviceable blit: {:?} source cannot be written to {:?} destination",
                    src.format,
                    dst.format
                );
            }
            let ctx = self.ctx;
            let retained = self.ensure_initialized()?;
            slow::record(ctx, retained, cmd, &job, program)?;
            self.stats.slow += 1;
        }
        Ok(path)
    }

    fn caps(&mut self, format: wgpu::TextureFormat) -> FormatCaps {
        let backend = self.ctx.backend;
        *self
            .caps
            .entry(format)
            .or_insert_with(|| backend.format_caps(format))
    }

    fn ensure_initialized(&mut self) -> Result<&mut RetainedResources<B>> {
        let retained = match self.retained.take() {
            Some(retained) => retained,
            None => {
                let retained = RetainedResources::create(self.ctx.backend)?;
                self.stats.initializations += 1;
                retained
            }
        };
        Ok(self.retained.insert(retained))
    }

    /// Whether the shader path's objects currently exist.
    pub fn is_initialized(&self) -> bool {
        self.retained.is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn options(&self) -> BlitterOptions {
        self.options
    }

    pub fn stats(&self) -> BlitStats {
        self.stats
    }

    /// Release the retained shader modules and geometry. Further blits
    /// panic; calling this again does nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        if let Some(retained) = self.retained.take() {
            self.ctx.pipelines.evict_shader_set(retained.shader_set);
            retained.destroy(self.ctx.backend);
        }
        self.shut_down = true;
        info!(
            fast = self.stats.fast,
            slow = self.stats.slow,
            pipelines = ?self.ctx.pipelines.stats(),
            samplers = ?self.ctx.samplers.stats(),
            "blitter shut down"
        );
    }
}

impl<B: Backend> Drop for Blitter<'_, B> {
    fn drop(&mut self) {
        if let Some(retained) = self.retained.take() {
            warn!("blitter dropped without shutdown; deferring its resources");
            self.ctx.pipelines.evict_shader_set(retained.shader_set);
            self.ctx
                .disposer
                .defer_destroy(Disposable::ShaderModule(retained.vertex_shader));
            self.ctx
                .disposer
                .defer_destroy(Disposable::ShaderModule(retained.fragment_shader));
            self.ctx
                .disposer
                .defer_destroy(Disposable::Buffer(retained.geometry));
        }
    }
}

fn check_rect<B: Backend>(side: &str, rect: &RectPair, attachment: &Attachment<B>) {
    assert!(!rect.is_degenerate(), "degenerate {side} rectangle {rect:?}");
    assert!(
        rect.depth() == 1,
        "{side} rectangle must span exactly one slice, got {}",
        rect.depth()
    );
    assert!(
        rect.fits_within(attachment.width, attachment.height),
        "{side} rectangle {rect:?} exceeds attachment extent {:?}",
        attachment.extent()
    );
}

fn assert_serviceable<B: Backend>(
    job: &BlitJob<'_, B>,
    src_caps: &FormatCaps,
    dst_caps: &FormatCaps,
) {
    assert!(
        src_caps.sampled && job.src.usage.contains(wgpu::TextureUsages::TEXTURE_BINDING),
        "unserviceable blit: source {:?} cannot be sampled",
        job.src.format
    );
    assert!(
        dst_caps.renderable && job.dst.usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT),
        "unserviceable blit: destination {:?} cannot be rendered to",
        job.dst.format
    );
}
