//! Shader blits: draw the retained triangle with the source bound as a
//! sampled texture and the destination as the render target.

use engine_shaders::{BlitUniforms, FULLSCREEN_TRIANGLE};
use tracing::{trace, warn};

use crate::backend::{Backend, BufferDesc, DrawPass, Viewport};
use crate::cache::{PipelineKey, RasterState, RenderPassKey, SamplerKey};
use crate::disposer::Disposable;
use crate::error::Result;
use crate::format::{Aspect, BlitFilter, ChannelKind, FormatCaps};
use crate::render_target::{Attachment, RectPair};
use crate::stage_pool::Upload;

use super::resources::RetainedResources;
use super::{BlitContext, BlitJob, BlitProgram};

impl BlitProgram {
    /// Program able to read `src` with the given capabilities.
    pub fn for_source<B: Backend>(src: &Attachment<B>, caps: &FormatCaps) -> Self {
        let multisampled = src.samples > 1;
        match (src.aspect, ChannelKind::of_format(src.format), multisampled) {
            (Aspect::Depth, _, true) => BlitProgram::DepthMultisampled,
            (Aspect::Depth, _, false) => BlitProgram::Depth,
            (Aspect::Color, ChannelKind::Uint, true) => BlitProgram::ColorUintMultisampled,
            (Aspect::Color, ChannelKind::Uint, false) => BlitProgram::ColorUint,
            (Aspect::Color, ChannelKind::Sint, true) => BlitProgram::ColorSintMultisampled,
            (Aspect::Color, ChannelKind::Sint, false) => BlitProgram::ColorSint,
            (Aspect::Color, ChannelKind::Float, true) => BlitProgram::ColorMultisampled,
            (Aspect::Color, ChannelKind::Float, false) if caps.filterable => BlitProgram::Color,
            (Aspect::Color, ChannelKind::Float, false) => BlitProgram::ColorUnfilterable,
        }
    }
}

/// Map the destination viewport's uv range onto the source rectangle.
/// Each destination corner samples the matching source corner, so mirroring
/// on either side flips the mapping.
pub(crate) fn blit_uniforms<B: Backend>(
    src: &Attachment<B>,
    src_rect: &RectPair,
    dst_rect: &RectPair,
    filter: BlitFilter,
) -> BlitUniforms {
    let (sx0, sx1) = (src_rect.min.x as f32, src_rect.max.x as f32);
    let (sy0, sy1) = (src_rect.min.y as f32, src_rect.max.y as f32);
    let (x0, x1) = if dst_rect.mirrored_x() { (sx1, sx0) } else { (sx0, sx1) };
    let (y0, y1) = if dst_rect.mirrored_y() { (sy1, sy0) } else { (sy0, sy1) };
    BlitUniforms {
        src_min: [x0, y0],
        src_max: [x1, y1],
        src_extent: [src.width as f32, src.height as f32],
        filter_mode: filter.shader_value(),
        sample_count: src.samples,
    }
}

fn viewport(rect: &RectPair) -> Viewport {
    let r = rect.normalized();
    Viewport {
        x: r.min.x as u32,
        y: r.min.y as u32,
        width: r.width(),
        height: r.height(),
    }
}

/// Record one shader blit with `program`. Nothing is recorded into `cmd`
/// unless every object the draw needs was obtained.
pub(super) fn record<B: Backend>(
    ctx: BlitContext<'_, B>,
    retained: &mut RetainedResources<B>,
    cmd: &mut B::CommandBuffer,
    job: &BlitJob<'_, B>,
    program: BlitProgram,
) -> Result<()> {
    match program {
        BlitProgram::DepthMultisampled => warn!("multisampled depth blit reads sample 0 only"),
        p if p.is_integer() && job.filter == BlitFilter::Linear => {
            warn!(format = ?job.src.format, "integer formats are blitted with nearest filtering")
        }
        _ => {}
    }

    let sampler_filter = if program.filters_in_shader() {
        BlitFilter::Nearest
    } else {
        job.filter
    };
    let sampler = ctx.samplers.get_or_create(SamplerKey::clamped(sampler_filter));

    let (pass_key, raster) = match job.aspect {
        Aspect::Color => (
            RenderPassKey::color(job.dst.format, job.dst.samples),
            RasterState::COLOR_ONLY,
        ),
        Aspect::Depth => (
            RenderPassKey::depth(job.dst.format, job.dst.samples),
            RasterState::DEPTH_ONLY,
        ),
    };
    let render_pass = ctx.framebuffers.get_or_create(pass_key);

    let key = PipelineKey {
        shader_set: retained.shader_set,
        program,
        target: pass_key,
        raster,
        vertex_layout: retained.primitive.layout,
    };
    let pipeline =
        ctx.pipelines
            .get_or_create(&key, &retained.vertex_shader, &retained.fragment_shader)?;

    let uniforms = blit_uniforms(job.src, job.src_rect, job.dst_rect, job.filter);
    let ubo = ctx.backend.create_buffer(&BufferDesc {
        label: "blit-params",
        size: std::mem::size_of::<BlitUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })?;

    let uploaded = {
        let mut uploads = Vec::with_capacity(2);
        if !retained.geometry_uploaded {
            uploads.push(Upload {
                dst: &retained.geometry,
                offset: 0,
                data: bytemuck::cast_slice(&FULLSCREEN_TRIANGLE),
            });
        }
        uploads.push(Upload {
            dst: &ubo,
            offset: 0,
            data: bytemuck::bytes_of(&uniforms),
        });
        ctx.stage_pool.upload_all(cmd, &uploads)
    };
    if let Err(err) = uploaded {
        ctx.backend.destroy_buffer(ubo);
        return Err(err);
    }
    retained.geometry_uploaded = true;

    trace!(?program, ?uniforms, "recording shader blit");
    ctx.backend.cmd_draw_pass(
        cmd,
        &DrawPass {
            target: job.dst,
            source: job.src,
            program,
            pipeline: &pipeline,
            render_pass: &render_pass,
            sampler: &sampler,
            uniforms: &ubo,
            geometry: &retained.geometry,
            primitive: &retained.primitive,
            viewport: viewport(job.dst_rect),
        },
    );
    ctx.disposer.defer_destroy(Disposable::Buffer(ubo));
    Ok(())
}
