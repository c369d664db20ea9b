use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use super::{CacheStats, RenderPassKey};
use crate::backend::{Backend, PipelineDesc, VertexLayout};
use crate::blit::BlitProgram;
use crate::error::Result;

/// Fixed-function state of a blit pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub color_write: bool,
    pub depth_write: bool,
    pub depth_compare: Option<wgpu::CompareFunction>,
}

impl RasterState {
    pub const COLOR_ONLY: Self = Self {
        color_write: true,
        depth_write: false,
        depth_compare: None,
    };

    pub const DEPTH_ONLY: Self = Self {
        color_write: false,
        depth_write: true,
        depth_compare: Some(wgpu::CompareFunction::Always),
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// Identity of the shader modules the pipeline was built from.
    pub shader_set: u64,
    pub program: BlitProgram,
    pub target: RenderPassKey,
    pub raster: RasterState,
    pub vertex_layout: VertexLayout,
}

/// Compiled pipelines keyed by [`PipelineKey`].
pub struct PipelineCache<B: Backend> {
    backend: Arc<B>,
    entries: RefCell<HashMap<PipelineKey, B::Pipeline>>,
    stats: Cell<CacheStats>,
}

impl<B: Backend> PipelineCache<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            entries: RefCell::new(HashMap::new()),
            stats: Cell::new(CacheStats::default()),
        }
    }

    /// Return the pipeline for `key`, compiling it from the given modules on
    /// a miss. Failed compilations are not cached.
    pub fn get_or_create(
        &self,
        key: &PipelineKey,
        vertex: &B::ShaderModule,
        fragment: &B::ShaderModule,
    ) -> Result<B::Pipeline> {
        let mut stats = self.stats.get();
        if let Some(pipeline) = self.entries.borrow().get(key) {
            stats.hit();
            self.stats.set(stats);
            trace!(program = ?key.program, "pipeline cache hit");
            return Ok(pipeline.clone());
        }
        stats.miss();
        self.stats.set(stats);

        let label = format!("blit-pipeline:{}", key.program.entry_point());
        debug!(%label, target = ?key.target, "compiling blit pipeline");
        let pipeline = self.backend.create_pipeline(&PipelineDesc {
            label: &label,
            key,
            vertex,
            fragment,
        })?;
        self.entries.borrow_mut().insert(*key, pipeline.clone());
        Ok(pipeline)
    }

    /// Drop every pipeline built from the modules identified by
    /// `shader_set`. Returns how many were removed.
    pub fn evict_shader_set(&self, shader_set: u64) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|key, _| key.shader_set != shader_set);
        let evicted = before - entries.len();
        if evicted > 0 {
            trace!(shader_set, evicted, "evicted blit pipelines");
        }
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.get()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ShaderModuleDesc;
    use crate::cache::{SamplerCache, SamplerKey};
    use crate::format::BlitFilter;
    use crate::recording::{FormatSupport, RecordingBackend, RecordingShader};

    fn key(program: BlitProgram) -> PipelineKey {
        PipelineKey {
            shader_set: 1,
            program,
            target: RenderPassKey::color(wgpu::TextureFormat::Rgba8Unorm, 1),
            raster: RasterState::COLOR_ONLY,
            vertex_layout: VertexLayout {
                stride: 16,
                position_offset: 0,
                uv_offset: 8,
            },
        }
    }

    fn modules(backend: &RecordingBackend) -> (RecordingShader, RecordingShader) {
        let module = |label: &str| {
            backend
                .create_shader_module(&ShaderModuleDesc { label, source: "" })
                .unwrap()
        };
        (module("vs"), module("fs"))
    }

    #[test]
    fn second_lookup_hits() {
        let backend = Arc::new(RecordingBackend::new(FormatSupport::copy_only()));
        let cache = PipelineCache::new(backend.clone());
        let (vs, fs) = modules(&backend);

        let a = cache.get_or_create(&key(BlitProgram::Color), &vs, &fs).unwrap();
        let b = cache.get_or_create(&key(BlitProgram::Color), &vs, &fs).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
        assert_eq!(backend.object_stats().pipelines_created, 1);

        cache.get_or_create(&key(BlitProgram::Depth), &vs, &fs).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_compilation_is_not_cached() {
        let backend = Arc::new(RecordingBackend::new(FormatSupport::copy_only()));
        let cache = PipelineCache::new(backend.clone());
        let (vs, fs) = modules(&backend);

        backend.fail_pipelines(true);
        assert!(cache.get_or_create(&key(BlitProgram::Color), &vs, &fs).is_err());
        assert!(cache.is_empty());

        backend.fail_pipelines(false);
        assert!(cache.get_or_create(&key(BlitProgram::Color), &vs, &fs).is_ok());
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn eviction_only_touches_one_shader_set() {
        let backend = Arc::new(RecordingBackend::new(FormatSupport::copy_only()));
        let cache = PipelineCache::new(backend.clone());
        let (vs, fs) = modules(&backend);
        let other = PipelineKey {
            shader_set: 2,
            ..key(BlitProgram::Color)
        };
        cache.get_or_create(&key(BlitProgram::Color), &vs, &fs).unwrap();
        cache.get_or_create(&key(BlitProgram::Depth), &vs, &fs).unwrap();
        cache.get_or_create(&other, &vs, &fs).unwrap();

        assert_eq!(cache.evict_shader_set(1), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.evict_shader_set(1), 0);
        cache.get_or_create(&other, &vs, &fs).unwrap();
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn sampler_cache_dedupes_by_key() {
        let backend = Arc::new(RecordingBackend::new(FormatSupport::copy_only()));
        let cache = SamplerCache::new(backend.clone());
        cache.get_or_create(SamplerKey::clamped(BlitFilter::Linear));
        cache.get_or_create(SamplerKey::clamped(BlitFilter::Linear));
        cache.get_or_create(SamplerKey::clamped(BlitFilter::Nearest));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2 });
        assert_eq!(backend.object_stats().samplers_created, 2);
    }
}
