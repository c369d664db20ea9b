//! Backend object caches shared by every blitter of an engine.
//!
//! Lookups insert on miss and never evict; entries live until the owning
//! engine clears them at shutdown.

mod framebuffer;
mod pipeline;
mod sampler;

pub use framebuffer::{FramebufferCache, RenderPassKey};
pub use pipeline::{PipelineCache, PipelineKey, RasterState};
pub use sampler::{SamplerCache, SamplerKey, WrapMode};

/// Lookup counters of one cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    pub(crate) fn hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn miss(&mut self) {
        self.misses += 1;
    }
}
