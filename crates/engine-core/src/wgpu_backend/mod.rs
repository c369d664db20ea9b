//! Production backend on wgpu.
//!
//! wgpu tracks resource state itself, so attachments carry usage flags and no
//! layouts. It has no scaled-blit command: scaling always takes the shader
//! path and `format_caps` never reports blit support.

mod pipeline;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

pub use pipeline::WgpuPipeline;

use crate::backend::{Backend, BufferDesc, DrawPass, PipelineDesc, ShaderModuleDesc};
use crate::cache::{RenderPassKey, SamplerKey};
use crate::error::{BackendError, Result};
use crate::format::{BackendFeatures, BlitFilter, FormatCaps, is_integer_format};
use crate::render_target::{Attachment, RectPair};

/// Staging buffer: `MAP_WRITE | COPY_SRC`, mapped whenever `ready` is set.
#[derive(Debug)]
pub struct WgpuStage {
    buffer: wgpu::Buffer,
    capacity: u64,
    ready: Arc<AtomicBool>,
}

/// Render-pass compatibility info. wgpu builds passes per recording, so the
/// framebuffer cache only needs the attachment set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPassLayout {
    pub key: RenderPassKey,
}

pub struct WgpuBackend {
    adapter: Arc<wgpu::Adapter>,
    device: Arc<wgpu::Device>,
}

impl WgpuBackend {
    pub fn new(adapter: Arc<wgpu::Adapter>, device: Arc<wgpu::Device>) -> Self {
        Self { adapter, device }
    }

    /// Request an adapter and device without a surface.
    pub fn request_headless() -> Result<(Self, wgpu::Queue)> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or(BackendError::NoAdapter)?;
        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))?;
        debug!(adapter = ?adapter.get_info().name, "headless device created");
        Ok((Self::new(Arc::new(adapter), Arc::new(device)), queue))
    }

    pub fn device(&self) -> Arc<wgpu::Device> {
        self.device.clone()
    }

    pub fn adapter(&self) -> Arc<wgpu::Adapter> {
        self.adapter.clone()
    }

    pub fn create_texture(&self, desc: &wgpu::TextureDescriptor<'_>) -> Arc<wgpu::Texture> {
        Arc::new(self.device.create_texture(desc))
    }

    /// Run `create` inside a validation error scope.
    fn scoped<T>(&self, create: impl FnOnce() -> T) -> std::result::Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }
}

fn view(attachment: &Attachment<WgpuBackend>, aspect: wgpu::TextureAspect) -> wgpu::TextureView {
    attachment.texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("blit-view"),
        format: None,
        dimension: Some(wgpu::TextureViewDimension::D2),
        aspect,
        base_mip_level: attachment.level,
        mip_level_count: Some(1),
        base_array_layer: attachment.layer,
        array_layer_count: Some(1),
    })
}

fn copy_texture(
    attachment: &Attachment<WgpuBackend>,
    origin: [u32; 3],
) -> wgpu::ImageCopyTexture<'_> {
    wgpu::ImageCopyTexture {
        texture: attachment.texture.as_ref(),
        mip_level: attachment.level,
        origin: wgpu::Origin3d {
            x: origin[0],
            y: origin[1],
            z: origin[2],
        },
        aspect: wgpu::TextureAspect::All,
    }
}

const LOAD_STORE: wgpu::Operations<wgpu::Color> = wgpu::Operations {
    load: wgpu::LoadOp::Load,
    store: wgpu::StoreOp::Store,
};

impl Backend for WgpuBackend {
    type CommandBuffer = wgpu::CommandEncoder;
    type Texture = Arc<wgpu::Texture>;
    type ShaderModule = wgpu::ShaderModule;
    type Buffer = wgpu::Buffer;
    type Stage = WgpuStage;
    type Pipeline = Arc<WgpuPipeline>;
    type Sampler = Arc<wgpu::Sampler>;
    type RenderPass = RenderPassLayout;

    fn features(&self) -> BackendFeatures {
        BackendFeatures {
            depth_copy_requires_full_subresource: true,
        }
    }

    fn format_caps(&self, format: wgpu::TextureFormat) -> FormatCaps {
        let features = self.adapter.get_texture_format_features(format);
        let usages = features.allowed_usages;
        let flags = features.flags;
        let depth = format.has_depth_aspect();
        let integer = is_integer_format(format);
        // Texture-to-texture copies of packed depth formats are not portable.
        let copyable = !depth
            || matches!(
                format,
                wgpu::TextureFormat::Depth16Unorm | wgpu::TextureFormat::Depth32Float
            );
        FormatCaps {
            copy_src: copyable && usages.contains(wgpu::TextureUsages::COPY_SRC),
            copy_dst: copyable && usages.contains(wgpu::TextureUsages::COPY_DST),
            blit_src: false,
            blit_dst: false,
            blit_linear: false,
            sampled: usages.contains(wgpu::TextureUsages::TEXTURE_BINDING),
            filterable: !depth
                && !integer
                && flags.contains(wgpu::TextureFormatFeatureFlags::FILTERABLE),
            resolve: !integer
                && flags.contains(wgpu::TextureFormatFeatureFlags::MULTISAMPLE_RESOLVE),
            renderable: usages.contains(wgpu::TextureUsages::RENDER_ATTACHMENT),
        }
    }

    fn create_shader_module(&self, desc: &ShaderModuleDesc<'_>) -> Result<wgpu::ShaderModule> {
        self.scoped(|| {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            })
        })
        .map_err(|message| BackendError::ShaderCompilation {
            label: desc.label.to_owned(),
            message,
        })
    }

    fn destroy_shader_module(&self, module: wgpu::ShaderModule) {
        drop(module);
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<wgpu::Buffer> {
        self.scoped(|| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size: desc.size,
                usage: desc.usage,
                mapped_at_creation: false,
            })
        })
        .map_err(|message| BackendError::BufferAllocation {
            size: desc.size,
            message,
        })
    }

    fn destroy_buffer(&self, buffer: wgpu::Buffer) {
        buffer.destroy();
    }

    fn destroy_texture(&self, texture: Arc<wgpu::Texture>) {
        texture.destroy();
    }

    fn create_sampler(&self, key: &SamplerKey) -> Arc<wgpu::Sampler> {
        let filter = key.filter.to_wgpu();
        let wrap = key.wrap.to_wgpu();
        Arc::new(self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("blit-sampler"),
            address_mode_u: wrap,
            address_mode_v: wrap,
            address_mode_w: wrap,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        }))
    }

    fn create_render_pass(&self, key: &RenderPassKey) -> RenderPassLayout {
        RenderPassLayout { key: *key }
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> Result<Arc<WgpuPipeline>> {
        self.scoped(|| pipeline::create(&self.device, desc))
            .map(Arc::new)
            .map_err(|message| BackendError::PipelineCreation {
                label: desc.label.to_owned(),
                message,
            })
    }

    fn create_stage(&self, size: u64) -> Result<WgpuStage> {
        let buffer = self
            .scoped(|| {
                self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("blit-stage"),
                    size,
                    usage: wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: true,
                })
            })
            .map_err(|message| BackendError::BufferAllocation { size, message })?;
        Ok(WgpuStage {
            buffer,
            capacity: size,
            ready: Arc::new(AtomicBool::new(true)),
        })
    }

    fn stage_capacity(&self, stage: &WgpuStage) -> u64 {
        stage.capacity
    }

    fn stage_ready(&self, stage: &WgpuStage) -> bool {
        stage.ready.load(Ordering::Acquire)
    }

    fn write_stage(&self, stage: &WgpuStage, data: &[u8]) {
        debug_assert!(self.stage_ready(stage), "write to an unmapped stage");
        {
            let mut mapped = stage.buffer.slice(..data.len() as u64).get_mapped_range_mut();
            mapped.copy_from_slice(data);
        }
        stage.buffer.unmap();
        stage.ready.store(false, Ordering::Release);
    }

    fn recycle_stage(&self, stage: &WgpuStage) {
        let ready = stage.ready.clone();
        stage
            .buffer
            .slice(..)
            .map_async(wgpu::MapMode::Write, move |result| {
                if result.is_ok() {
                    ready.store(true, Ordering::Release);
                }
            });
    }

    fn destroy_stage(&self, stage: WgpuStage) {
        stage.buffer.destroy();
    }

    fn maintain(&self) {
        let _ = self.device.poll(wgpu::Maintain::Poll);
    }

    fn cmd_copy_buffer(
        &self,
        cmd: &mut wgpu::CommandEncoder,
        src: &WgpuStage,
        dst: &wgpu::Buffer,
        dst_offset: u64,
        size: u64,
    ) {
        cmd.copy_buffer_to_buffer(&src.buffer, 0, dst, dst_offset, size);
    }

    fn cmd_copy_texture(
        &self,
        cmd: &mut wgpu::CommandEncoder,
        src: &Attachment<Self>,
        src_origin: [u32; 3],
        dst: &Attachment<Self>,
        dst_origin: [u32; 3],
        extent: [u32; 3],
    ) {
        cmd.copy_texture_to_texture(
            copy_texture(src, src_origin),
            copy_texture(dst, dst_origin),
            wgpu::Extent3d {
                width: extent[0],
                height: extent[1],
                depth_or_array_layers: extent[2],
            },
        );
    }

    fn cmd_blit_texture(
        &self,
        _cmd: &mut wgpu::CommandEncoder,
        src: &Attachment<Self>,
        _src_rect: &RectPair,
        dst: &Attachment<Self>,
        _dst_rect: &RectPair,
        _filter: BlitFilter,
    ) {
        unreachable!(
            "scaled blit {:?} -> {:?} routed to wgpu, which never reports blit support",
            src.format, dst.format
        );
    }

    fn cmd_resolve_texture(
        &self,
        cmd: &mut wgpu::CommandEncoder,
        src: &Attachment<Self>,
        dst: &Attachment<Self>,
    ) {
        let src_view = view(src, wgpu::TextureAspect::All);
        let dst_view = view(dst, wgpu::TextureAspect::All);
        let _pass = cmd.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("blit-resolve"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &src_view,
                resolve_target: Some(&dst_view),
                ops: LOAD_STORE,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn cmd_draw_pass(&self, cmd: &mut wgpu::CommandEncoder, pass: &DrawPass<'_, Self>) {
        let target_view = view(pass.target, wgpu::TextureAspect::All);
        let source_view = view(pass.source, pass.source.aspect.to_wgpu());
        let bind_group = pipeline::bind_group(
            &self.device,
            pass.pipeline,
            &source_view,
            pass.sampler,
            pass.uniforms,
        );

        let depth_target = pass.program.is_depth();
        let color_attachments = if depth_target {
            Vec::new()
        } else {
            vec![Some(wgpu::RenderPassColorAttachment {
                view: &target_view,
                resolve_target: None,
                ops: LOAD_STORE,
            })]
        };
        let depth_stencil_attachment =
            depth_target.then(|| wgpu::RenderPassDepthStencilAttachment {
                view: &target_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: pass.target.format.has_stencil_aspect().then_some(
                    wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                ),
            });

        let mut rpass = cmd.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("blit-pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        let vp = pass.viewport;
        rpass.set_pipeline(&pass.pipeline.pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.set_vertex_buffer(0, pass.geometry.slice(..));
        rpass.set_viewport(
            vp.x as f32,
            vp.y as f32,
            vp.width as f32,
            vp.height as f32,
            0.0,
            1.0,
        );
        rpass.set_scissor_rect(vp.x, vp.y, vp.width, vp.height);
        rpass.draw(
            0..pass.primitive.vertex_count,
            0..pass.primitive.instance_count,
        );
    }
}
