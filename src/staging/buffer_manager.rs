// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The staging pool.

Every upload that must reach a device-resident buffer goes through
[BufferManager::allocate], a write into the returned range, and a copy command recorded
into the frame's encoder.  [BufferManager::flush] submits those copies once per frame.

# Strategies

Under [MapStrategy::Sync] each allocation gets its own ring buffer sized exactly to the
request.  The buffer is destroyed after the frame's copies are submitted.

Under [MapStrategy::Async] the pool keeps up to `max_buffer_count` ring buffers of
`per_buffer_bytes` each.  After a flush every touched buffer is asked to map again;
when that resolves the buffer rejoins the recyclable queue and may serve later frames.

# Completions

Map requests resolve outside the frame loop's call stack.  The continuation only posts
a [RemapCompletion] onto a channel; the pool drains that channel at the start of each
asynchronous allocation, inside the backpressure wait, and in [BufferManager::poll].
The recyclable queue is therefore only mutated by the frame loop itself.
*/

use crate::bittricks::STAGING_ALIGNMENT;
use crate::imp::{self, Device};
use crate::staging::ring_buffer::{RingBuffer, RingState};
use crate::sys::time::{Duration, Instant};
use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};

/// Hard ceiling on bytes charged against the pool.
pub const BUFFER_POOL_MAX_SIZE: usize = 409_600_000;
/// Most ring buffers an asynchronous pool will hold at once.
pub const BUFFER_MAX_COUNT: usize = 10;
/// Size of each asynchronous ring buffer under the default configuration.
pub const BUFFER_PER_ALLOCATE_SIZE: usize = BUFFER_POOL_MAX_SIZE / BUFFER_MAX_COUNT;

const DEFAULT_REMAP_WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// How staging regions are obtained each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MapStrategy {
    /// A fresh region per allocation, destroyed after the frame is submitted.
    #[default]
    Sync,
    /// Persistent regions, remapped after submission and reused.
    Async,
}

/**
Sizing and behavior of a [BufferManager].
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub capacity_bytes: usize,
    pub max_buffer_count: usize,
    pub strategy: MapStrategy,
    /// How long an asynchronous allocation may wait for a remap before giving up.
    pub remap_wait_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            capacity_bytes: BUFFER_POOL_MAX_SIZE,
            max_buffer_count: BUFFER_MAX_COUNT,
            strategy: MapStrategy::Sync,
            remap_wait_timeout: DEFAULT_REMAP_WAIT_TIMEOUT,
        }
    }
}

impl PoolConfig {
    pub fn new(strategy: MapStrategy) -> Self {
        PoolConfig {
            strategy,
            ..Default::default()
        }
    }

    /// Size of each ring buffer under [MapStrategy::Async].
    pub fn per_buffer_bytes(&self) -> usize {
        self.capacity_bytes / self.max_buffer_count
    }
}

/// Names one ring buffer for the lifetime of its pool.  Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RingBufferId(u64);

/**
A claimed range of a staging region.

Valid until the next [BufferManager::flush].
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub buffer: RingBufferId,
    pub offset: usize,
    /// Bytes claimed, after rounding to the staging alignment.
    pub size: usize,
}

/// Posted by a map continuation; consumed by the frame loop.
#[derive(Debug)]
pub struct RemapCompletion {
    pub buffer: RingBufferId,
    pub result: Result<(), imp::Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub used_bytes: usize,
    pub buffer_count: usize,
    pub active: usize,
    pub recyclable: usize,
    pub remapping: usize,
}

/**
A soft allocation failure.

None of these are fatal to the pool.  The caller logs the failure and skips the upload
for this frame; the next frame retries.
*/
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AllocError {
    #[error("memory upper limit: {requested} bytes requested with {used} of {capacity} bytes in use")]
    UpperLimit {
        requested: usize,
        used: usize,
        capacity: usize,
    },
    #[error("no staging buffer finished remapping within {waited:?}")]
    RemapTimeout { waited: Duration },
    #[error("recycled staging buffer has no room for {requested} bytes")]
    RecycledTooSmall { requested: usize },
    #[error("Device error {0}")]
    Device(#[from] imp::Error),
}

/**
Owns every staging ring buffer for one rendering context.
*/
pub struct BufferManager<D: Device> {
    device: Arc<D>,
    config: PoolConfig,
    used_bytes: usize,
    buffers: HashMap<RingBufferId, RingBuffer<D>>,
    next_id: u64,
    //ordered by first allocation this frame
    active: Vec<RingBufferId>,
    recyclable: VecDeque<RingBufferId>,
    //destroyed by destroy_buffer; kept alive until the frame's copies are submitted
    retiring: Vec<RingBuffer<D>>,
    completion_sender: Sender<RemapCompletion>,
    completion_receiver: Receiver<RemapCompletion>,
    encoder: Option<D::Encoder>,
    frame: u64,
}

impl<D: Device> Debug for BufferManager<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferManager")
            .field("config", &self.config)
            .field("used_bytes", &self.used_bytes)
            .field("buffers", &self.buffers)
            .field("active", &self.active)
            .field("recyclable", &self.recyclable)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl<D: Device> BufferManager<D> {
    /**
    Creates an empty pool.

    # Panics
    Panics if `max_buffer_count` is zero.
    */
    pub fn new(device: Arc<D>, config: PoolConfig) -> Self {
        assert!(config.max_buffer_count > 0, "pool needs at least one buffer");
        logwise::info_sync!(
            "Created staging pool: {capacity} bytes, {count} buffers, {strategy}",
            capacity = config.capacity_bytes,
            count = config.max_buffer_count,
            strategy = logwise::privacy::LogIt(&config.strategy)
        );
        let encoder = device.create_encoder("staging copies");
        let (completion_sender, completion_receiver) = channel();
        BufferManager {
            device,
            config,
            used_bytes: 0,
            buffers: HashMap::new(),
            next_id: 0,
            active: Vec::new(),
            recyclable: VecDeque::new(),
            retiring: Vec::new(),
            completion_sender,
            completion_receiver,
            encoder: Some(encoder),
            frame: 0,
        }
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn strategy(&self) -> MapStrategy {
        self.config.strategy
    }

    /// Bytes currently charged against the ceiling.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Buffers serving the current frame, in allocation order.
    pub fn active_buffers(&self) -> &[RingBufferId] {
        &self.active
    }

    /// Buffers ready for reuse, front first.
    pub fn recyclable_buffers(&self) -> impl Iterator<Item = RingBufferId> + '_ {
        self.recyclable.iter().copied()
    }

    pub fn ring(&self, id: RingBufferId) -> Option<&RingBuffer<D>> {
        self.buffers.get(&id)
    }

    /// Number of completed flushes.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            used_bytes: self.used_bytes,
            buffer_count: self.buffers.len(),
            active: self.active.len(),
            recyclable: self.recyclable.len(),
            remapping: self.remapping_count(),
        }
    }

    fn remapping_count(&self) -> usize {
        self.buffers
            .values()
            .filter(|ring| ring.state() == RingState::Remapping)
            .count()
    }

    fn take_id(&mut self) -> RingBufferId {
        let id = RingBufferId(self.next_id);
        self.next_id += 1;
        id
    }

    fn upper_limit(&self, requested: usize) -> AllocError {
        AllocError::UpperLimit {
            requested,
            used: self.used_bytes,
            capacity: self.config.capacity_bytes,
        }
    }

    /**
    Claims `size_bytes` of staging memory.

    The request is rounded up to the staging alignment.  On success the returned range
    is mapped and may be filled with [BufferManager::push].

    # Errors
    Every error is soft; see [AllocError].
    */
    pub fn allocate(&mut self, size_bytes: usize) -> Result<Allocation, AllocError> {
        let Some(size) = size_bytes.checked_next_multiple_of(STAGING_ALIGNMENT) else {
            return Err(self.upper_limit(size_bytes));
        };
        match self.config.strategy {
            MapStrategy::Sync => self.allocate_sync(size),
            MapStrategy::Async => self.allocate_async(size),
        }
    }

    fn allocate_sync(&mut self, size: usize) -> Result<Allocation, AllocError> {
        let total = self.used_bytes.checked_add(size);
        if total.is_none_or(|total| total > self.config.capacity_bytes) {
            return Err(self.upper_limit(size));
        }
        let id = self.take_id();
        let mut ring = RingBuffer::new(&*self.device, size, &format!("staging {}", id.0))?;
        let offset = ring.allocate(size);
        self.used_bytes += size;
        self.buffers.insert(id, ring);
        self.active.push(id);
        Ok(Allocation {
            buffer: id,
            offset,
            size,
        })
    }

    fn allocate_async(&mut self, size: usize) -> Result<Allocation, AllocError> {
        let per_buffer = self.config.per_buffer_bytes();
        if size > per_buffer {
            return Err(self.upper_limit(size));
        }
        self.drain_remap_completions();
        let id = match self.recyclable_with_room(size) {
            Some(id) => id,
            None => self.grow_or_wait(size)?,
        };
        if self.active.last() != Some(&id) {
            self.active.push(id);
        }
        let ring = self
            .buffers
            .get_mut(&id)
            .expect("recyclable queue refers to a retired buffer");
        let offset = ring.allocate(size);
        Ok(Allocation {
            buffer: id,
            offset,
            size,
        })
    }

    /// Pops queue heads that cannot hold `size` bytes.
    fn recyclable_with_room(&mut self, size: usize) -> Option<RingBufferId> {
        while let Some(&id) = self.recyclable.front() {
            match self.buffers.get(&id) {
                Some(ring) if ring.available_size() >= size => return Some(id),
                _ => {
                    self.recyclable.pop_front();
                }
            }
        }
        None
    }

    fn grow_or_wait(&mut self, size: usize) -> Result<RingBufferId, AllocError> {
        let per_buffer = self.config.per_buffer_bytes();
        if self.buffers.len() < self.config.max_buffer_count {
            if self.used_bytes + per_buffer > self.config.capacity_bytes {
                return Err(self.upper_limit(size));
            }
            let id = self.take_id();
            let ring = RingBuffer::new(&*self.device, per_buffer, &format!("staging {}", id.0))?;
            self.used_bytes += per_buffer;
            self.buffers.insert(id, ring);
            self.recyclable.push_back(id);
            logwise::info_sync!(
                "Staging pool grew to {count} buffers ({used} bytes)",
                count = self.buffers.len(),
                used = self.used_bytes
            );
            Ok(id)
        } else if self.remapping_count() > 0 {
            let id = self.wait_for_recyclable(size)?;
            let fits = self
                .buffers
                .get(&id)
                .is_some_and(|ring| ring.available_size() >= size);
            if !fits {
                self.recyclable.pop_front();
                return Err(AllocError::RecycledTooSmall { requested: size });
            }
            Ok(id)
        } else {
            Err(self.upper_limit(size))
        }
    }

    /**
    Waits until a buffer reaches the recyclable queue.

    Polls the device and drains completions until one arrives or the configured timeout
    elapses.  If every outstanding remap fails in the meantime there is nothing left to
    wait for and the pool reports its ceiling.
    */
    fn wait_for_recyclable(&mut self, size: usize) -> Result<RingBufferId, AllocError> {
        logwise::warn_sync!(
            "Staging pool exhausted; waiting on {remapping} remaps",
            remapping = self.remapping_count()
        );
        let wait = logwise::perfwarn_begin!("BufferManager::wait_for_recyclable");
        let start = Instant::now();
        loop {
            self.device.poll();
            self.drain_remap_completions();
            if let Some(&id) = self.recyclable.front() {
                drop(wait);
                return Ok(id);
            }
            if self.remapping_count() == 0 {
                return Err(self.upper_limit(size));
            }
            let waited = start.elapsed();
            if waited >= self.config.remap_wait_timeout {
                logwise::error_sync!(
                    "Gave up waiting for a staging buffer after {waited}",
                    waited = logwise::privacy::LogIt(&waited)
                );
                return Err(AllocError::RemapTimeout { waited });
            }
            std::hint::spin_loop();
        }
    }

    /**
    Applies every remap completion posted since the last drain.

    Returns the number of completions consumed.
    */
    pub fn drain_remap_completions(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(completion) = self.completion_receiver.try_recv() {
            drained += 1;
            let id = completion.buffer;
            match completion.result {
                Ok(()) => {
                    if let Some(ring) = self.buffers.get_mut(&id) {
                        ring.mark_mapped();
                        self.recyclable.push_back(id);
                    }
                }
                Err(e) => {
                    logwise::error_sync!(
                        "Remap of staging buffer failed, retiring it: {err}",
                        err = logwise::privacy::LogIt(&e)
                    );
                    if let Some(ring) = self.buffers.remove(&id) {
                        self.used_bytes -= ring.size();
                        ring.destroy(&*self.device);
                    }
                }
            }
        }
        drained
    }

    /// Lets the device deliver completions, then applies them.
    pub fn poll(&mut self) -> usize {
        self.device.poll();
        self.drain_remap_completions()
    }

    /**
    Writes `data` into `allocation` and records a copy of it to `dest` at `dest_offset`.

    # Panics
    Panics if `data` is larger than the allocation, or the allocation is from an earlier
    frame.
    */
    pub fn push(&mut self, allocation: &Allocation, dest: &D::GpuBuffer, dest_offset: usize, data: &[u8]) {
        assert!(
            data.len() <= allocation.size,
            "push of {len} bytes into a {size} byte allocation",
            len = data.len(),
            size = allocation.size
        );
        let device = &*self.device;
        let ring = self
            .buffers
            .get_mut(&allocation.buffer)
            .expect("allocation refers to a retired staging buffer");
        ring.write(device, allocation.offset, data);
        let encoder = self
            .encoder
            .get_or_insert_with(|| device.create_encoder("staging copies"));
        device.copy_staging_to_gpu(encoder, ring.staging(), allocation.offset, dest, dest_offset, data.len());
    }

    /// [BufferManager::allocate] followed by [BufferManager::push].
    pub fn upload(&mut self, dest: &D::GpuBuffer, dest_offset: usize, data: &[u8]) -> Result<Allocation, AllocError> {
        let allocation = self.allocate(data.len())?;
        self.push(&allocation, dest, dest_offset, data);
        Ok(allocation)
    }

    /**
    Submits the frame's copies and recycles or destroys every buffer they read from.

    Call exactly once per frame.
    */
    pub fn flush(&mut self) {
        let flush = logwise::perfwarn_begin!("BufferManager::flush");
        //the buffer still at the queue head is about to be remapped
        if let (Some(front), Some(last)) = (self.recyclable.front(), self.active.last()) {
            if front == last {
                self.recyclable.pop_front();
            }
        }
        debug_assert!(
            !self.recyclable.iter().any(|id| self.active.contains(id)),
            "active buffer left in the recyclable queue"
        );
        let device = &*self.device;
        for id in &self.active {
            if let Some(ring) = self.buffers.get_mut(id) {
                ring.flush(device);
            }
        }
        let encoder = self
            .encoder
            .take()
            .unwrap_or_else(|| device.create_encoder("staging copies"));
        device.submit(encoder);

        for ring in self.retiring.drain(..) {
            ring.destroy(device);
        }
        let touched = self.active.len();
        match self.config.strategy {
            MapStrategy::Sync => {
                for id in self.active.drain(..) {
                    if let Some(ring) = self.buffers.remove(&id) {
                        ring.destroy(device);
                    }
                }
                self.used_bytes = 0;
            }
            MapStrategy::Async => {
                for id in self.active.drain(..) {
                    if let Some(ring) = self.buffers.get_mut(&id) {
                        ring.release_retired(device);
                        let sender = self.completion_sender.clone();
                        ring.remap(
                            device,
                            Box::new(move |result| {
                                //the pool may be gone by now
                                let _ = sender.send(RemapCompletion { buffer: id, result });
                            }),
                        );
                    }
                }
            }
        }
        self.encoder = Some(device.create_encoder("staging copies"));
        self.frame += 1;
        drop(flush);
        logwise::trace_sync!(
            "Flushed frame {frame}: {touched} buffers, {used} bytes in use",
            frame = self.frame,
            touched = touched,
            used = self.used_bytes
        );
    }

    /**
    Replaces an active buffer's region with a fresh one of `size` bytes.

    Returns `false` if `id` is not active this frame or the ring buffer refuses the
    reset; the caller should destroy and recreate instead.
    */
    pub fn reset_buffer(&mut self, id: RingBufferId, size: usize) -> bool {
        if !self.active.contains(&id) {
            return false;
        }
        let Some(ring) = self.buffers.get_mut(&id) else {
            return false;
        };
        let old = ring.size();
        if !ring.reset(&*self.device, size) {
            return false;
        }
        self.used_bytes = self.used_bytes - old + size;
        true
    }

    /**
    Retires an active buffer and releases its bytes.

    Copies already recorded from it still run; the region is destroyed after the next
    submission.
    */
    pub fn destroy_buffer(&mut self, id: RingBufferId) -> bool {
        let Some(index) = self.active.iter().position(|a| *a == id) else {
            return false;
        };
        let Some(mut ring) = self.buffers.remove(&id) else {
            return false;
        };
        self.active.remove(index);
        self.recyclable.retain(|r| *r != id);
        self.used_bytes -= ring.size();
        ring.flush(&*self.device);
        self.retiring.push(ring);
        true
    }

    /**
    Destroys every buffer.  The pool is empty but usable afterwards.

    Outstanding remap completions are discarded.
    */
    pub fn dispose(&mut self) {
        let device = &*self.device;
        for (_, ring) in self.buffers.drain() {
            ring.destroy(device);
        }
        for ring in self.retiring.drain(..) {
            ring.destroy(device);
        }
        self.active.clear();
        self.recyclable.clear();
        self.used_bytes = 0;
        while self.completion_receiver.try_recv().is_ok() {}
        logwise::info_sync!("Disposed staging pool");
    }
}

impl<D: Device> Drop for BufferManager<D> {
    fn drop(&mut self) {
        if !self.buffers.is_empty() || !self.retiring.is_empty() {
            self.dispose();
        }
    }
}
