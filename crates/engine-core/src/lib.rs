//! engine-core: GPU backend plumbing and the attachment blitter.

use std::cell::Cell;
use std::sync::Arc;

use tracing::{info, trace};

/// Re-export wgpu for downstream crates while avoiding direct dependency leakage.
pub use wgpu;

pub mod backend;
pub mod blit;
pub mod cache;
pub mod disposer;
mod error;
pub mod format;
pub mod recording;
pub mod render_target;
pub mod stage_pool;
pub mod wgpu_backend;

pub use backend::Backend;
pub use blit::{BlitPath, BlitRequest, Blitter, BlitterOptions};
pub use cache::{CacheStats, FramebufferCache, PipelineCache, SamplerCache};
pub use disposer::{Disposable, Disposer};
pub use error::{BackendError, Result};
pub use format::{Aspect, BlitFilter, ChannelKind};
pub use render_target::{Attachment, MAX_COLOR_ATTACHMENTS, Offset3d, RectPair, RenderTarget};
pub use stage_pool::{StagePool, StagePoolOptions, Upload};
pub use wgpu_backend::WgpuBackend;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub blit: BlitterOptions,
    pub staging: StagePoolOptions,
}

/// Top-level engine handle. Owns the backend's shared caches and hands out
/// blitters that borrow them.
pub struct GraphicsEngine<B: Backend> {
    backend: Arc<B>,
    pipelines: PipelineCache<B>,
    samplers: SamplerCache<B>,
    framebuffers: FramebufferCache<B>,
    stage_pool: StagePool<B>,
    disposer: Disposer<B>,
    blit_options: BlitterOptions,
    generation: Cell<u64>,
}

impl<B: Backend> GraphicsEngine<B> {
    pub fn new(backend: B, options: EngineOptions) -> Self {
        Self::with_shared(Arc::new(backend), options)
    }

    /// Build an engine around a backend the caller keeps a handle to.
    pub fn with_shared(backend: Arc<B>, options: EngineOptions) -> Self {
        Self {
            pipelines: PipelineCache::new(backend.clone()),
            samplers: SamplerCache::new(backend.clone()),
            framebuffers: FramebufferCache::new(backend.clone()),
            stage_pool: StagePool::new(backend.clone(), options.staging),
            disposer: Disposer::new(backend.clone()),
            backend,
            blit_options: options.blit,
            generation: Cell::new(0),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_arc(&self) -> Arc<B> {
        self.backend.clone()
    }

    /// A blitter using the engine's configured options.
    pub fn blitter(&self) -> Blitter<'_, B> {
        self.blitter_with(self.blit_options)
    }

    pub fn blitter_with(&self, options: BlitterOptions) -> Blitter<'_, B> {
        Blitter::new(
            blit::BlitContext {
                backend: self.backend.as_ref(),
                pipelines: &self.pipelines,
                samplers: &self.samplers,
                framebuffers: &self.framebuffers,
                stage_pool: &self.stage_pool,
                disposer: &self.disposer,
            },
            options,
        )
    }

    /// Generation currently being recorded.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Close the current generation and return it. Submit its command
    /// buffers, then report it to [`GraphicsEngine::collect`] once the GPU
    /// has finished them.
    pub fn end_frame(&self) -> u64 {
        let finished = self.generation.get();
        let next = finished + 1;
        self.generation.set(next);
        self.stage_pool.advance(next);
        self.disposer.advance(next);
        trace!(finished, "frame ended");
        finished
    }

    /// Release everything used by generations up to `completed`.
    pub fn collect(&self, completed: u64) {
        self.backend.maintain();
        self.disposer.collect(completed);
        self.stage_pool.gc(completed);
    }

    /// Destroy all deferred objects, staging buffers and cached objects.
    /// The caller guarantees the GPU is idle and every blitter was shut down.
    pub fn shutdown(&self) {
        let disposed = self.disposer.drain();
        self.stage_pool.clear();
        info!(
            disposed,
            pipelines = ?self.pipelines.stats(),
            samplers = ?self.samplers.stats(),
            framebuffers = ?self.framebuffers.stats(),
            staging = ?self.stage_pool.stats(),
            "engine shut down"
        );
        self.pipelines.clear();
        self.samplers.clear();
        self.framebuffers.clear();
    }

    pub fn pipeline_cache(&self) -> &PipelineCache<B> {
        &self.pipelines
    }

    pub fn sampler_cache(&self) -> &SamplerCache<B> {
        &self.samplers
    }

    pub fn framebuffer_cache(&self) -> &FramebufferCache<B> {
        &self.framebuffers
    }

    pub fn stage_pool(&self) -> &StagePool<B> {
        &self.stage_pool
    }

    pub fn disposer(&self) -> &Disposer<B> {
        &self.disposer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{FormatSupport, RecordingBackend, RecordingCommandBuffer};

    fn engine() -> GraphicsEngine<RecordingBackend> {
        GraphicsEngine::new(
            RecordingBackend::new(FormatSupport::copy_only()),
            EngineOptions::default(),
        )
    }

    fn color_target(backend: &RecordingBackend, size: u32) -> RenderTarget<RecordingBackend> {
        let texture = backend.create_texture("color");
        RenderTarget::new(size, size).with_color(Attachment::new(
            texture,
            wgpu::TextureFormat::Rgba8Unorm,
            size,
            size,
        ))
    }

    #[test]
    fn generations_advance() {
        let engine = engine();
        assert_eq!(engine.generation(), 0);
        assert_eq!(engine.end_frame(), 0);
        assert_eq!(engine.end_frame(), 1);
        assert_eq!(engine.generation(), 2);
    }

    #[test]
    fn uniform_buffers_released_after_completion() {
        let engine = engine();
        let src = color_target(engine.backend(), 64);
        let dst = color_target(engine.backend(), 32);
        let mut blitter = engine.blitter();
        let mut cmd = RecordingCommandBuffer::default();
        let request = BlitRequest::new(
            &dst,
            RectPair::from_extent(32, 32),
            &src,
            RectPair::from_extent(64, 64),
        );
        assert_eq!(blitter.blit_color(&mut cmd, &request).unwrap(), BlitPath::Shader);
        assert_eq!(engine.disposer().pending(), 1);

        let frame = engine.end_frame();
        engine.collect(frame);
        assert_eq!(engine.disposer().pending(), 0);
        assert_eq!(engine.stage_pool().in_flight_count(), 0);

        blitter.shutdown();
        engine.shutdown();
        let stats = engine.backend().object_stats();
        assert_eq!(stats.live_buffers(), 0);
        assert_eq!(stats.live_shader_modules(), 0);
        assert_eq!(stats.stages_created, stats.stages_destroyed);
    }

    #[test]
    fn dropped_blitter_defers_its_resources() {
        let engine = engine();
        let src = color_target(engine.backend(), 16);
        let dst = color_target(engine.backend(), 8);
        {
            let mut blitter = engine.blitter();
            let mut cmd = RecordingCommandBuffer::default();
            let request = BlitRequest::new(
                &dst,
                RectPair::from_extent(8, 8),
                &src,
                RectPair::from_extent(16, 16),
            );
            blitter.blit_color(&mut cmd, &request).unwrap();
        }
        // uniform buffer plus the two shader modules and the triangle
        assert_eq!(engine.disposer().pending(), 4);
        engine.shutdown();
        assert_eq!(engine.backend().object_stats().live_shader_modules(), 0);
    }
}
