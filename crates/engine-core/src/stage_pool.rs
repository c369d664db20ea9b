//! Pool of CPU-writable staging buffers for GPU uploads.
//!
//! A stage is handed out for one upload, retired with the generation that
//! recorded it, and returned to the free list once that generation is known
//! to be complete.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use tracing::trace;

use crate::backend::Backend;
use crate::error::Result;

const COPY_ALIGNMENT: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StagePoolOptions {
    /// Smallest stage ever allocated, in bytes.
    pub min_stage_size: u64,
    /// Free stages unused for longer than this many generations are destroyed.
    pub max_idle_generations: u64,
}

impl Default for StagePoolOptions {
    fn default() -> Self {
        Self {
            min_stage_size: 4096,
            max_idle_generations: 8,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StagePoolStats {
    pub uploads: u64,
    pub bytes_uploaded: u64,
    pub stages_created: u64,
    pub stages_reused: u64,
    pub stages_destroyed: u64,
}

/// One copy into a GPU buffer.
pub struct Upload<'d, B: Backend> {
    pub dst: &'d B::Buffer,
    pub offset: u64,
    pub data: &'d [u8],
}

struct InFlight<S> {
    stage: S,
    generation: u64,
}

struct Idle<S> {
    stage: S,
    since: u64,
}

struct PoolState<S> {
    generation: u64,
    free: Vec<Idle<S>>,
    in_flight: Vec<InFlight<S>>,
}

pub struct StagePool<B: Backend> {
    backend: Arc<B>,
    options: StagePoolOptions,
    state: RefCell<PoolState<B::Stage>>,
    stats: Cell<StagePoolStats>,
}

impl<B: Backend> StagePool<B> {
    pub fn new(backend: Arc<B>, options: StagePoolOptions) -> Self {
        Self {
            backend,
            options,
            state: RefCell::new(PoolState {
                generation: 0,
                free: Vec::new(),
                in_flight: Vec::new(),
            }),
            stats: Cell::new(StagePoolStats::default()),
        }
    }

    pub fn options(&self) -> StagePoolOptions {
        self.options
    }

    /// Copy `data` into `dst` at `offset` through a staging buffer. The copy
    /// is recorded into `cmd` and executes when `cmd` is submitted.
    pub fn upload(
        &self,
        cmd: &mut B::CommandBuffer,
        dst: &B::Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        self.upload_all(cmd, &[Upload { dst, offset, data }])
    }

    /// Record several uploads, or none: every stage is obtained before the
    /// first copy is recorded, and on failure nothing reaches `cmd`.
    pub fn upload_all(
        &self,
        cmd: &mut B::CommandBuffer,
        uploads: &[Upload<'_, B>],
    ) -> Result<()> {
        let mut stats = self.stats.get();
        let mut state = self.state.borrow_mut();

        let mut acquired = Vec::with_capacity(uploads.len());
        for upload in uploads.iter().filter(|u| !u.data.is_empty()) {
            let size = (upload.data.len() as u64).next_multiple_of(COPY_ALIGNMENT);
            match self.acquire(&mut state, &mut stats, size) {
                Ok(stage) => acquired.push((stage, upload, size)),
                Err(err) => {
                    let since = state.generation;
                    state
                        .free
                        .extend(acquired.into_iter().map(|(stage, ..)| Idle { stage, since }));
                    self.stats.set(stats);
                    return Err(err);
                }
            }
        }

        let generation = state.generation;
        for (stage, upload, size) in acquired {
            if size == upload.data.len() as u64 {
                self.backend.write_stage(&stage, upload.data);
            } else {
                let mut padded = upload.data.to_vec();
                padded.resize(size as usize, 0);
                self.backend.write_stage(&stage, &padded);
            }
            self.backend.cmd_copy_buffer(cmd, &stage, upload.dst, upload.offset, size);
            state.in_flight.push(InFlight { stage, generation });
            stats.uploads += 1;
            stats.bytes_uploaded += size;
        }
        self.stats.set(stats);
        Ok(())
    }

    /// Smallest ready free stage holding `size` bytes, or a new one.
    fn acquire(
        &self,
        state: &mut PoolState<B::Stage>,
        stats: &mut StagePoolStats,
        size: u64,
    ) -> Result<B::Stage> {
        let reusable = state
            .free
            .iter()
            .enumerate()
            .filter(|(_, idle)| {
                self.backend.stage_capacity(&idle.stage) >= size
                    && self.backend.stage_ready(&idle.stage)
            })
            .min_by_key(|(_, idle)| self.backend.stage_capacity(&idle.stage))
            .map(|(index, _)| index);

        match reusable {
            Some(index) => {
                stats.stages_reused += 1;
                Ok(state.free.swap_remove(index).stage)
            }
            None => {
                let capacity = size.next_power_of_two().max(self.options.min_stage_size);
                trace!(capacity, "allocating staging buffer");
                let stage = self.backend.create_stage(capacity)?;
                stats.stages_created += 1;
                Ok(stage)
            }
        }
    }

    /// Uploads recorded from now on belong to `generation`.
    pub fn advance(&self, generation: u64) {
        self.state.borrow_mut().generation = generation;
    }

    /// Recycle stages whose generation is `<= completed` and destroy free
    /// stages that have been idle for too long.
    pub fn gc(&self, completed: u64) {
        let mut state = self.state.borrow_mut();
        let current = state.generation;

        let (done, pending): (Vec<_>, Vec<_>) = state
            .in_flight
            .drain(..)
            .partition(|entry| entry.generation <= completed);
        state.in_flight = pending;
        for entry in done {
            self.backend.recycle_stage(&entry.stage);
            state.free.push(Idle {
                stage: entry.stage,
                since: current,
            });
        }

        let max_idle = self.options.max_idle_generations;
        let (expired, keep): (Vec<_>, Vec<_>) = state
            .free
            .drain(..)
            .partition(|idle| current.saturating_sub(idle.since) > max_idle);
        state.free = keep;
        if !expired.is_empty() {
            trace!(count = expired.len(), "destroying idle staging buffers");
            let mut stats = self.stats.get();
            stats.stages_destroyed += expired.len() as u64;
            self.stats.set(stats);
        }
        for idle in expired {
            self.backend.destroy_stage(idle.stage);
        }
    }

    /// Destroy every stage. The caller guarantees the GPU is idle.
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        let mut count = 0;
        for idle in state.free.drain(..) {
            self.backend.destroy_stage(idle.stage);
            count += 1;
        }
        for entry in state.in_flight.drain(..) {
            self.backend.destroy_stage(entry.stage);
            count += 1;
        }
        let mut stats = self.stats.get();
        stats.stages_destroyed += count;
        self.stats.set(stats);
    }

    pub fn free_count(&self) -> usize {
        self.state.borrow().free.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.borrow().in_flight.len()
    }

    pub fn stats(&self) -> StagePoolStats {
        self.stats.get()
    }
}
