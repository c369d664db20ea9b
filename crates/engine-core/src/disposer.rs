//! Deferred destruction of GPU objects.
//!
//! Objects handed to the disposer are tagged with the generation that was
//! being recorded and destroyed once the engine reports that generation as
//! complete on the GPU.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::backend::Backend;

pub enum Disposable<B: Backend> {
    Buffer(B::Buffer),
    Texture(B::Texture),
    ShaderModule(B::ShaderModule),
}

impl<B: Backend> Disposable<B> {
    fn destroy(self, backend: &B) {
        match self {
            Disposable::Buffer(buffer) => backend.destroy_buffer(buffer),
            Disposable::Texture(texture) => backend.destroy_texture(texture),
            Disposable::ShaderModule(module) => backend.destroy_shader_module(module),
        }
    }
}

struct DisposerState<B: Backend> {
    generation: u64,
    queue: VecDeque<(u64, Disposable<B>)>,
}

pub struct Disposer<B: Backend> {
    backend: Arc<B>,
    state: RefCell<DisposerState<B>>,
}

impl<B: Backend> Disposer<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: RefCell::new(DisposerState {
                generation: 0,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Destroy `object` once the current generation has completed.
    pub fn defer_destroy(&self, object: Disposable<B>) {
        let mut state = self.state.borrow_mut();
        let generation = state.generation;
        state.queue.push_back((generation, object));
    }

    pub fn advance(&self, generation: u64) {
        let mut state = self.state.borrow_mut();
        debug_assert!(generation >= state.generation, "generations must not go backwards");
        state.generation = generation;
    }

    /// Destroy everything queued at or before `completed`. Returns how many
    /// objects were destroyed.
    pub fn collect(&self, completed: u64) -> usize {
        let mut destroyed = 0;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                match state.queue.front() {
                    Some((generation, _)) if *generation <= completed => state.queue.pop_front(),
                    _ => None,
                }
            };
            let Some((_, object)) = next else { break };
            object.destroy(&self.backend);
            destroyed += 1;
        }
        if destroyed > 0 {
            trace!(destroyed, completed, "disposer collected");
        }
        destroyed
    }

    /// Destroy everything regardless of generation. The caller guarantees
    /// the GPU is idle.
    pub fn drain(&self) -> usize {
        let objects: Vec<_> = self.state.borrow_mut().queue.drain(..).collect();
        let count = objects.len();
        for (_, object) in objects {
            object.destroy(&self.backend);
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }
}

impl<B: Backend> Drop for Disposer<B> {
    fn drop(&mut self) {
        let pending = self.state.get_mut().queue.len();
        if pending > 0 {
            warn!(pending, "disposer dropped with objects still queued");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BufferDesc;
    use crate::recording::{FormatSupport, RecordingBackend};

    fn buffer(backend: &RecordingBackend) -> Disposable<RecordingBackend> {
        Disposable::Buffer(
            backend
                .create_buffer(&BufferDesc {
                    label: "ubo",
                    size: 32,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
                .unwrap(),
        )
    }

    #[test]
    fn collect_respects_generations() {
        let backend = Arc::new(RecordingBackend::new(FormatSupport::copy_only()));
        let disposer = Disposer::new(backend.clone());

        disposer.defer_destroy(buffer(&backend));
        disposer.advance(1);
        disposer.defer_destroy(buffer(&backend));
        disposer.defer_destroy(buffer(&backend));
        disposer.advance(2);

        assert_eq!(disposer.collect(0), 1);
        assert_eq!(disposer.pending(), 2);
        assert_eq!(backend.object_stats().buffers_destroyed, 1);

        assert_eq!(disposer.collect(1), 2);
        assert_eq!(disposer.pending(), 0);
        assert_eq!(disposer.collect(5), 0);
    }

    #[test]
    fn drain_destroys_everything() {
        let backend = Arc::new(RecordingBackend::new(FormatSupport::copy_only()));
        let disposer = Disposer::new(backend.clone());
        disposer.advance(4);
        disposer.defer_destroy(buffer(&backend));
        disposer.defer_destroy(Disposable::Texture(backend.create_texture("scratch")));
        assert_eq!(disposer.drain(), 2);
        let stats = backend.object_stats();
        assert_eq!(stats.buffers_destroyed, 1);
        assert_eq!(stats.textures_destroyed, 1);
    }
}
