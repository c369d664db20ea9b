//! The seam between the blitter and a concrete graphics API.

use std::fmt;

use crate::blit::BlitProgram;
use crate::cache::{PipelineKey, RenderPassKey, SamplerKey};
use crate::error::Result;
use crate::format::{BackendFeatures, BlitFilter, FormatCaps};
use crate::render_target::{Attachment, RectPair};

pub struct ShaderModuleDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
}

pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

pub struct PipelineDesc<'a, B: Backend> {
    pub label: &'a str,
    pub key: &'a PipelineKey,
    pub vertex: &'a B::ShaderModule,
    pub fragment: &'a B::ShaderModule,
}

/// Destination region of a draw, in texels of the target attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Vertex buffer layout of a [`RenderPrimitive`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub stride: u32,
    pub position_offset: u32,
    pub uv_offset: u32,
}

/// Draw-call description for a retained geometry buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPrimitive {
    pub layout: VertexLayout,
    pub vertex_count: u32,
    pub instance_count: u32,
}

/// One complete render pass: bind `source`, draw `primitive` into `target`
/// restricted to `viewport`, preserving the rest of the target.
pub struct DrawPass<'a, B: Backend> {
    pub target: &'a Attachment<B>,
    pub source: &'a Attachment<B>,
    pub program: BlitProgram,
    pub pipeline: &'a B::Pipeline,
    pub render_pass: &'a B::RenderPass,
    pub sampler: &'a B::Sampler,
    pub uniforms: &'a B::Buffer,
    pub geometry: &'a B::Buffer,
    pub primitive: &'a RenderPrimitive,
    pub viewport: Viewport,
}

/// Graphics API operations used by the blitter and its caches.
///
/// Object creation goes through `&self`; implementations use interior
/// mutability or rely on the underlying API being internally synchronized.
pub trait Backend: Sized {
    type CommandBuffer;
    type Texture: Clone + fmt::Debug;
    type ShaderModule;
    type Buffer;
    /// CPU-writable transfer buffer owned by the staging pool.
    type Stage;
    type Pipeline: Clone;
    type Sampler: Clone;
    /// Render-pass compatibility object handed out by the framebuffer cache.
    type RenderPass: Clone;

    fn features(&self) -> BackendFeatures;
    fn format_caps(&self, format: wgpu::TextureFormat) -> FormatCaps;

    fn create_shader_module(&self, desc: &ShaderModuleDesc<'_>) -> Result<Self::ShaderModule>;
    fn destroy_shader_module(&self, module: Self::ShaderModule);
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<Self::Buffer>;
    fn destroy_buffer(&self, buffer: Self::Buffer);
    fn destroy_texture(&self, texture: Self::Texture);
    fn create_sampler(&self, key: &SamplerKey) -> Self::Sampler;
    fn create_render_pass(&self, key: &RenderPassKey) -> Self::RenderPass;
    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> Result<Self::Pipeline>;

    fn create_stage(&self, size: u64) -> Result<Self::Stage>;
    fn stage_capacity(&self, stage: &Self::Stage) -> u64;
    /// Whether the stage can be written by the CPU right now.
    fn stage_ready(&self, stage: &Self::Stage) -> bool;
    /// Write `data` at offset 0. Only valid while [`Backend::stage_ready`].
    fn write_stage(&self, stage: &Self::Stage, data: &[u8]);
    /// Begin making a stage writable again once the GPU is done with it.
    fn recycle_stage(&self, stage: &Self::Stage);
    fn destroy_stage(&self, stage: Self::Stage);
    /// Process completed callbacks without blocking.
    fn maintain(&self);

    fn cmd_copy_buffer(
        &self,
        cmd: &mut Self::CommandBuffer,
        src: &Self::Stage,
        dst: &Self::Buffer,
        dst_offset: u64,
        size: u64,
    );
    fn cmd_copy_texture(
        &self,
        cmd: &mut Self::CommandBuffer,
        src: &Attachment<Self>,
        src_origin: [u32; 3],
        dst: &Attachment<Self>,
        dst_origin: [u32; 3],
        extent: [u32; 3],
    );
    fn cmd_blit_texture(
        &self,
        cmd: &mut Self::CommandBuffer,
        src: &Attachment<Self>,
        src_rect: &RectPair,
        dst: &Attachment<Self>,
        dst_rect: &RectPair,
        filter: BlitFilter,
    );
    fn cmd_resolve_texture(
        &self,
        cmd: &mut Self::CommandBuffer,
        src: &Attachment<Self>,
        dst: &Attachment<Self>,
    );
    fn cmd_draw_pass(&self, cmd: &mut Self::CommandBuffer, pass: &DrawPass<'_, Self>);
}
