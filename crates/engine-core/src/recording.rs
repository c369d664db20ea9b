//! Headless backend that records commands instead of executing them.
//!
//! Used by the test suites and for dry runs of blit command streams. Object
//! creation and destruction are counted so tests can check lifetimes, and the
//! per-format capability profile is configurable so both hardware-blit and
//! copy-only drivers can be modeled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use engine_shaders::BlitUniforms;

use crate::backend::{Backend, BufferDesc, DrawPass, PipelineDesc, ShaderModuleDesc, Viewport};
use crate::blit::BlitProgram;
use crate::cache::{PipelineKey, RenderPassKey, SamplerKey};
use crate::error::{BackendError, Result};
use crate::format::{Aspect, BackendFeatures, BlitFilter, FormatCaps, is_integer_format};
use crate::render_target::{Attachment, RectPair};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capability profile of a [`RecordingBackend`].
#[derive(Clone, Debug)]
pub struct FormatSupport {
    pub features: BackendFeatures,
    /// Applied to every format without an override.
    pub default_caps: FormatCaps,
    pub overrides: HashMap<wgpu::TextureFormat, FormatCaps>,
}

impl FormatSupport {
    /// A driver with hardware scaled blits and resolves on every
    /// non-integer format, similar to desktop Vulkan.
    pub fn hardware_blit() -> Self {
        Self {
            features: BackendFeatures {
                depth_copy_requires_full_subresource: false,
            },
            default_caps: FormatCaps {
                copy_src: true,
                copy_dst: true,
                blit_src: true,
                blit_dst: true,
                blit_linear: true,
                sampled: true,
                filterable: true,
                resolve: true,
                renderable: true,
            },
            overrides: HashMap::new(),
        }
    }

    /// A driver with identity copies only, similar to wgpu.
    pub fn copy_only() -> Self {
        Self {
            features: BackendFeatures {
                depth_copy_requires_full_subresource: true,
            },
            default_caps: FormatCaps {
                copy_src: true,
                copy_dst: true,
                blit_src: false,
                blit_dst: false,
                blit_linear: false,
                sampled: true,
                filterable: true,
                resolve: true,
                renderable: true,
            },
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, format: wgpu::TextureFormat, caps: FormatCaps) -> Self {
        self.overrides.insert(format, caps);
        self
    }

    fn caps(&self, format: wgpu::TextureFormat) -> FormatCaps {
        if let Some(caps) = self.overrides.get(&format) {
            return *caps;
        }
        let mut caps = self.default_caps;
        if is_integer_format(format) {
            caps.blit_linear = false;
            caps.filterable = false;
            caps.resolve = false;
        }
        if format.has_depth_aspect() {
            caps.blit_linear = false;
            caps.filterable = false;
            caps.resolve = false;
        }
        caps
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordingTexture {
    pub id: u64,
    pub label: String,
}

#[derive(Debug)]
pub struct RecordingShader {
    pub id: u64,
    pub label: String,
}

#[derive(Debug)]
pub struct RecordingBuffer {
    pub id: u64,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

#[derive(Debug)]
pub struct RecordingStage {
    pub id: u64,
    pub capacity: u64,
    ready: AtomicBool,
}

#[derive(Clone, Debug)]
pub struct RecordingPipeline {
    pub id: u64,
    pub key: PipelineKey,
}

#[derive(Clone, Debug)]
pub struct RecordingSampler {
    pub id: u64,
    pub key: SamplerKey,
}

#[derive(Clone, Debug)]
pub struct RecordingRenderPass {
    pub id: u64,
    pub key: RenderPassKey,
}

/// Subresource a recorded command touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordedSubresource {
    pub texture: u64,
    pub level: u32,
    pub layer: u32,
    pub aspect: Aspect,
}

impl RecordedSubresource {
    fn of(attachment: &Attachment<RecordingBackend>) -> Self {
        Self {
            texture: attachment.texture.id,
            level: attachment.level,
            layer: attachment.layer,
            aspect: attachment.aspect,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    pub target: RecordedSubresource,
    pub source: RecordedSubresource,
    pub program: BlitProgram,
    pub pipeline: PipelineKey,
    pub sampler: SamplerKey,
    pub render_pass: RenderPassKey,
    pub viewport: Viewport,
    /// Uniform contents as of recording time, if the buffer had been filled.
    pub uniforms: Option<BlitUniforms>,
    pub vertex_count: u32,
    pub instance_count: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCommand {
    CopyBuffer {
        stage: u64,
        dst: u64,
        offset: u64,
        size: u64,
    },
    CopyTexture {
        src: RecordedSubresource,
        src_origin: [u32; 3],
        dst: RecordedSubresource,
        dst_origin: [u32; 3],
        extent: [u32; 3],
    },
    BlitTexture {
        src: RecordedSubresource,
        src_rect: RectPair,
        dst: RecordedSubresource,
        dst_rect: RectPair,
        filter: BlitFilter,
    },
    ResolveTexture {
        src: RecordedSubresource,
        dst: RecordedSubresource,
    },
    RenderPass(RecordedDraw),
}

impl RecordedCommand {
    /// Whether this command reads or writes a texture.
    pub fn is_texture_operation(&self) -> bool {
        !matches!(self, RecordedCommand::CopyBuffer { .. })
    }
}

#[derive(Debug, Default)]
pub struct RecordingCommandBuffer {
    pub commands: Vec<RecordedCommand>,
}

impl RecordingCommandBuffer {
    pub fn texture_operations(&self) -> usize {
        self.commands.iter().filter(|c| c.is_texture_operation()).count()
    }

    pub fn draws(&self) -> impl Iterator<Item = &RecordedDraw> {
        self.commands.iter().filter_map(|c| match c {
            RecordedCommand::RenderPass(draw) => Some(draw),
            _ => None,
        })
    }
}

/// Creation and destruction counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectStats {
    pub shader_modules_created: u64,
    pub shader_modules_destroyed: u64,
    pub buffers_created: u64,
    pub buffers_destroyed: u64,
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub pipelines_created: u64,
    pub samplers_created: u64,
    pub render_passes_created: u64,
    pub stages_created: u64,
    pub stages_destroyed: u64,
}

impl ObjectStats {
    pub fn live_shader_modules(&self) -> u64 {
        self.shader_modules_created - self.shader_modules_destroyed
    }

    pub fn live_buffers(&self) -> u64 {
        self.buffers_created - self.buffers_destroyed
    }
}

pub struct RecordingBackend {
    support: FormatSupport,
    next_id: AtomicU64,
    stats: Mutex<ObjectStats>,
    fail_pipelines: AtomicBool,
    fail_shaders: AtomicBool,
    stage_budget: Mutex<Option<u64>>,
    stage_contents: Mutex<HashMap<u64, Vec<u8>>>,
    buffer_contents: Mutex<HashMap<u64, Vec<u8>>>,
    last_stage_capacity: Mutex<Option<u64>>,
}

impl RecordingBackend {
    pub fn new(support: FormatSupport) -> Self {
        Self {
            support,
            next_id: AtomicU64::new(1),
            stats: Mutex::new(ObjectStats::default()),
            fail_pipelines: AtomicBool::new(false),
            fail_shaders: AtomicBool::new(false),
            stage_budget: Mutex::new(None),
            stage_contents: Mutex::new(HashMap::new()),
            buffer_contents: Mutex::new(HashMap::new()),
            last_stage_capacity: Mutex::new(None),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn count(&self, update: impl FnOnce(&mut ObjectStats)) {
        update(&mut lock(&self.stats));
    }

    pub fn object_stats(&self) -> ObjectStats {
        *lock(&self.stats)
    }

    /// Make subsequent pipeline creations fail.
    pub fn fail_pipelines(&self, fail: bool) {
        self.fail_pipelines.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent shader module creations fail.
    pub fn fail_shaders(&self, fail: bool) {
        self.fail_shaders.store(fail, Ordering::Relaxed);
    }

    /// Fail staging buffer creation once `limit` stages exist in total.
    /// `None` lifts the limit.
    pub fn limit_stages(&self, limit: Option<u64>) {
        *lock(&self.stage_budget) = limit;
    }

    pub fn create_texture(&self, label: &str) -> RecordingTexture {
        self.count(|s| s.textures_created += 1);
        RecordingTexture {
            id: self.next_id(),
            label: label.to_owned(),
        }
    }

    /// Bytes copied into `buffer` by recorded buffer copies so far.
    pub fn buffer_contents(&self, buffer: &RecordingBuffer) -> Vec<u8> {
        lock(&self.buffer_contents)
            .get(&buffer.id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_stage_capacity(&self) -> Option<u64> {
        *lock(&self.last_stage_capacity)
    }
}

impl Backend for RecordingBackend {
    type CommandBuffer = RecordingCommandBuffer;
    type Texture = RecordingTexture;
    type ShaderModule = RecordingShader;
    type Buffer = RecordingBuffer;
    type Stage = RecordingStage;
    type Pipeline = RecordingPipeline;
    type Sampler = RecordingSampler;
    type RenderPass = RecordingRenderPass;

    fn features(&self) -> BackendFeatures {
        self.support.features
    }

    fn format_caps(&self, format: wgpu::TextureFormat) -> FormatCaps {
        self.support.caps(format)
    }

    fn create_shader_module(&self, desc: &ShaderModuleDesc<'_>) -> Result<RecordingShader> {
        if self.fail_shaders.load(Ordering::Relaxed) {
            return Err(BackendError::ShaderCompilation {
                label: desc.label.to_owned(),
                message: "injected failure".into(),
            });
        }
        self.count(|s| s.shader_modules_created += 1);
        Ok(RecordingShader {
            id: self.next_id(),
            label: desc.label.to_owned(),
        })
    }

    fn destroy_shader_module(&self, _module: RecordingShader) {
        self.count(|s| s.shader_modules_destroyed += 1);
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<RecordingBuffer> {
        self.count(|s| s.buffers_created += 1);
        Ok(RecordingBuffer {
            id: self.next_id(),
            size: desc.size,
            usage: desc.usage,
        })
    }

    fn destroy_buffer(&self, buffer: RecordingBuffer) {
        lock(&self.buffer_contents).remove(&buffer.id);
        self.count(|s| s.buffers_destroyed += 1);
    }

    fn destroy_texture(&self, _texture: RecordingTexture) {
        self.count(|s| s.textures_destroyed += 1);
    }

    fn create_sampler(&self, key: &SamplerKey) -> RecordingSampler {
        self.count(|s| s.samplers_created += 1);
        RecordingSampler {
            id: self.next_id(),
            key: *key,
        }
    }

    fn create_render_pass(&self, key: &RenderPassKey) -> RecordingRenderPass {
        self.count(|s| s.render_passes_created += 1);
        RecordingRenderPass {
            id: self.next_id(),
            key: *key,
        }
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> Result<RecordingPipeline> {
        if self.fail_pipelines.load(Ordering::Relaxed) {
            return Err(BackendError::PipelineCreation {
                label: desc.label.to_owned(),
                message: "injected failure".into(),
            });
        }
        self.count(|s| s.pipelines_created += 1);
        Ok(RecordingPipeline {
            id: self.next_id(),
            key: *desc.key,
        })
    }

    fn create_stage(&self, size: u64) -> Result<RecordingStage> {
        let budget = *lock(&self.stage_budget);
        if budget.is_some_and(|limit| self.object_stats().stages_created >= limit) {
            return Err(BackendError::BufferAllocation {
                size,
                message: "staging budget exhausted".into(),
            });
        }
        self.count(|s| s.stages_created += 1);
        *lock(&self.last_stage_capacity) = Some(size);
        Ok(RecordingStage {
            id: self.next_id(),
            capacity: size,
            ready: AtomicBool::new(true),
        })
    }

    fn stage_capacity(&self, stage: &RecordingStage) -> u64 {
        stage.capacity
    }

    fn stage_ready(&self, stage: &RecordingStage) -> bool {
        stage.ready.load(Ordering::Relaxed)
    }

    fn write_stage(&self, stage: &RecordingStage, data: &[u8]) {
        assert!(self.stage_ready(stage), "write to a stage that is still in use");
        assert!(data.len() as u64 <= stage.capacity, "stage overflow");
        lock(&self.stage_contents).insert(stage.id, data.to_vec());
        stage.ready.store(false, Ordering::Relaxed);
    }

    fn recycle_stage(&self, stage: &RecordingStage) {
        stage.ready.store(true, Ordering::Relaxed);
    }

    fn destroy_stage(&self, stage: RecordingStage) {
        lock(&self.stage_contents).remove(&stage.id);
        self.count(|s| s.stages_destroyed += 1);
    }

    fn maintain(&self) {}

    fn cmd_copy_buffer(
        &self,
        cmd: &mut RecordingCommandBuffer,
        src: &RecordingStage,
        dst: &RecordingBuffer,
        dst_offset: u64,
        size: u64,
    ) {
        let data = lock(&self.stage_contents)
            .get(&src.id)
            .cloned()
            .unwrap_or_default();
        let mut buffers = lock(&self.buffer_contents);
        let contents = buffers.entry(dst.id).or_default();
        let end = (dst_offset + size) as usize;
        if contents.len() < end {
            contents.resize(end, 0);
        }
        let n = data.len().min(size as usize);
        contents[dst_offset as usize..dst_offset as usize + n].copy_from_slice(&data[..n]);

        cmd.commands.push(RecordedCommand::CopyBuffer {
            stage: src.id,
            dst: dst.id,
            offset: dst_offset,
            size,
        });
    }

    fn cmd_copy_texture(
        &self,
        cmd: &mut RecordingCommandBuffer,
        src: &Attachment<Self>,
        src_origin: [u32; 3],
        dst: &Attachment<Self>,
        dst_origin: [u32; 3],
        extent: [u32; 3],
    ) {
        cmd.commands.push(RecordedCommand::CopyTexture {
            src: RecordedSubresource::of(src),
            src_origin,
            dst: RecordedSubresource::of(dst),
            dst_origin,
            extent,
        });
    }

    fn cmd_blit_texture(
        &self,
        cmd: &mut RecordingCommandBuffer,
        src: &Attachment<Self>,
        src_rect: &RectPair,
        dst: &Attachment<Self>,
        dst_rect: &RectPair,
        filter: BlitFilter,
    ) {
        cmd.commands.push(RecordedCommand::BlitTexture {
            src: RecordedSubresource::of(src),
            src_rect: *src_rect,
            dst: RecordedSubresource::of(dst),
            dst_rect: *dst_rect,
            filter,
        });
    }

    fn cmd_resolve_texture(
        &self,
        cmd: &mut RecordingCommandBuffer,
        src: &Attachment<Self>,
        dst: &Attachment<Self>,
    ) {
        cmd.commands.push(RecordedCommand::ResolveTexture {
            src: RecordedSubresource::of(src),
            dst: RecordedSubresource::of(dst),
        });
    }

    fn cmd_draw_pass(&self, cmd: &mut RecordingCommandBuffer, pass: &DrawPass<'_, Self>) {
        let uniforms = lock(&self.buffer_contents)
            .get(&pass.uniforms.id)
            .filter(|bytes| bytes.len() >= std::mem::size_of::<BlitUniforms>())
            .map(|bytes| {
                bytemuck::pod_read_unaligned::<BlitUniforms>(
                    &bytes[..std::mem::size_of::<BlitUniforms>()],
                )
            });
        cmd.commands.push(RecordedCommand::RenderPass(RecordedDraw {
            target: RecordedSubresource::of(pass.target),
            source: RecordedSubresource::of(pass.source),
            program: pass.program,
            pipeline: pass.pipeline.key,
            sampler: pass.sampler.key,
            render_pass: pass.render_pass.key,
            viewport: pass.viewport,
            uniforms,
            vertex_count: pass.primitive.vertex_count,
            instance_count: pass.primitive.instance_count,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_differ_in_blit_support() {
        let hw = FormatSupport::hardware_blit();
        let copy = FormatSupport::copy_only();
        let f = wgpu::TextureFormat::Rgba8Unorm;
        assert!(hw.caps(f).blit_src && hw.caps(f).blit_linear);
        assert!(!copy.caps(f).blit_src);
        assert!(copy.caps(f).copy_src);
    }

    #[test]
    fn depth_and_integer_formats_are_not_filterable() {
        let hw = FormatSupport::hardware_blit();
        assert!(!hw.caps(wgpu::TextureFormat::Depth32Float).filterable);
        assert!(!hw.caps(wgpu::TextureFormat::Depth32Float).blit_linear);
        let uint = hw.caps(wgpu::TextureFormat::Rgba8Uint);
        assert!(uint.sampled && !uint.filterable && !uint.blit_linear && !uint.resolve);
    }

    #[test]
    fn overrides_win() {
        let caps = FormatCaps {
            copy_src: false,
            ..Default::default()
        };
        let support =
            FormatSupport::copy_only().with_override(wgpu::TextureFormat::Bgra8Unorm, caps);
        assert_eq!(support.caps(wgpu::TextureFormat::Bgra8Unorm), caps);
    }

    #[test]
    fn buffer_copy_tracks_contents() {
        let backend = RecordingBackend::new(FormatSupport::copy_only());
        let stage = backend.create_stage(16).unwrap();
        let dst = backend
            .create_buffer(&BufferDesc {
                label: "dst",
                size: 16,
                usage: wgpu::BufferUsages::COPY_DST,
            })
            .unwrap();
        backend.write_stage(&stage, &[9, 8, 7, 6]);
        assert!(!backend.stage_ready(&stage));

        let mut cmd = RecordingCommandBuffer::default();
        backend.cmd_copy_buffer(&mut cmd, &stage, &dst, 4, 4);
        assert_eq!(backend.buffer_contents(&dst), vec![0, 0, 0, 0, 9, 8, 7, 6]);
        assert_eq!(cmd.texture_operations(), 0);
    }
}
