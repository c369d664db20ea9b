use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::CacheStats;
use crate::backend::Backend;
use crate::format::BlitFilter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

impl WrapMode {
    pub fn to_wgpu(self) -> wgpu::AddressMode {
        match self {
            WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
            WrapMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub filter: BlitFilter,
    pub wrap: WrapMode,
}

impl SamplerKey {
    pub fn clamped(filter: BlitFilter) -> Self {
        Self {
            filter,
            wrap: WrapMode::ClampToEdge,
        }
    }
}

pub struct SamplerCache<B: Backend> {
    backend: Arc<B>,
    entries: RefCell<HashMap<SamplerKey, B::Sampler>>,
    stats: Cell<CacheStats>,
}

impl<B: Backend> SamplerCache<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            entries: RefCell::new(HashMap::new()),
            stats: Cell::new(CacheStats::default()),
        }
    }

    pub fn get_or_create(&self, key: SamplerKey) -> B::Sampler {
        let mut stats = self.stats.get();
        let mut entries = self.entries.borrow_mut();
        let sampler = match entries.get(&key) {
            Some(sampler) => {
                stats.hit();
                sampler.clone()
            }
            None => {
                stats.miss();
                trace!(?key, "sampler cache miss");
                let sampler = self.backend.create_sampler(&key);
                entries.insert(key, sampler.clone());
                sampler
            }
        };
        self.stats.set(stats);
        sampler
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
