use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::CacheStats;
use crate::backend::Backend;

/// Attachment set a pipeline renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderPassKey {
    pub color: Option<wgpu::TextureFormat>,
    pub depth: Option<wgpu::TextureFormat>,
    pub samples: u32,
}

impl RenderPassKey {
    pub fn color(format: wgpu::TextureFormat, samples: u32) -> Self {
        Self {
            color: Some(format),
            depth: None,
            samples,
        }
    }

    pub fn depth(format: wgpu::TextureFormat, samples: u32) -> Self {
        Self {
            color: None,
            depth: Some(format),
            samples,
        }
    }
}

/// Render-pass compatibility objects keyed by attachment set.
pub struct FramebufferCache<B: Backend> {
    backend: Arc<B>,
    entries: RefCell<HashMap<RenderPassKey, B::RenderPass>>,
    stats: Cell<CacheStats>,
}

impl<B: Backend> FramebufferCache<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            entries: RefCell::new(HashMap::new()),
            stats: Cell::new(CacheStats::default()),
        }
    }

    pub fn get_or_create(&self, key: RenderPassKey) -> B::RenderPass {
        let mut stats = self.stats.get();
        let mut entries = self.entries.borrow_mut();
        let pass = match entries.get(&key) {
            Some(pass) => {
                stats.hit();
                pass.clone()
            }
            None => {
                stats.miss();
                trace!(?key, "framebuffer cache miss");
                let pass = self.backend.create_render_pass(&key);
                entries.insert(key, pass.clone());
                pass
            }
        };
        self.stats.set(stats);
        pass
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
