// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
In-memory device.

Staging regions and uniform buffers are plain byte vectors.  Copies are recorded into a
[SoftEncoder] and applied when the encoder is submitted.  Map requests are queued and
resolved by [Device::poll], which is the same shape as a real GPU: the request returns
immediately and the continuation runs later, outside the caller's stack.

The device enforces the ordering rules a real backend would report as validation
errors: writes require a mapped region, copies require the source to be unmapped at
submission, and a region may not be remapped while a request is outstanding.
*/

use crate::imp::{Device, Error, MapCallback};
use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::sync::Mutex;

/// WebGPU's `minUniformBufferOffsetAlignment` default.
const DEFAULT_UNIFORM_ALIGNMENT: usize = 256;

#[derive(Debug)]
struct Region {
    bytes: Vec<u8>,
    mapped: bool,
    map_pending: bool,
}

struct PendingMap {
    id: u64,
    callback: MapCallback,
}

impl Debug for PendingMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMap").field("id", &self.id).finish()
    }
}

#[derive(Debug, Default)]
struct SoftState {
    next_id: u64,
    staging: HashMap<u64, Region>,
    gpu: HashMap<u64, Vec<u8>>,
    pending_maps: VecDeque<PendingMap>,
    hold_maps: bool,
    fail_maps: bool,
    max_buffer_size: Option<usize>,
    submissions: usize,
    copies_submitted: usize,
    staging_created: usize,
    bind_groups_created: usize,
}

impl SoftState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_size(&self, size: usize) -> Result<(), Error> {
        match self.max_buffer_size {
            Some(limit) if size > limit => Err(Error::BufferTooLarge {
                requested: size,
                limit: limit as u64,
            }),
            _ => Ok(()),
        }
    }
}

/**
A device that lives entirely in host memory.
*/
#[derive(Debug)]
pub struct SoftDevice {
    state: Mutex<SoftState>,
    uniform_alignment: usize,
}

/// Staging region handle.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SoftStaging {
    id: u64,
    size: usize,
}

impl SoftStaging {
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Device-resident buffer handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoftBuffer {
    id: u64,
    size: usize,
}

impl SoftBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn size(&self) -> usize {
        self.size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftLayout {
    pub binding_size: usize,
    pub dynamic_offset: bool,
}

/**
A bind group records what it points at so tests can check the indirection.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftBindGroup {
    pub id: u64,
    pub buffer: u64,
    pub offset: usize,
    pub size: usize,
    pub dynamic_offset: bool,
}

#[derive(Debug, Clone, Copy)]
struct SoftCopy {
    source: u64,
    source_offset: usize,
    dest: u64,
    dest_offset: usize,
    len: usize,
}

#[derive(Debug, Default)]
pub struct SoftEncoder {
    copies: Vec<SoftCopy>,
}

impl SoftEncoder {
    pub fn recorded_copies(&self) -> usize {
        self.copies.len()
    }
}

impl Default for SoftDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftDevice {
    pub fn new() -> Self {
        Self::with_uniform_alignment(DEFAULT_UNIFORM_ALIGNMENT)
    }

    pub fn with_uniform_alignment(uniform_alignment: usize) -> Self {
        assert!(uniform_alignment.is_power_of_two(), "uniform alignment must be a power of two");
        SoftDevice {
            state: Mutex::new(SoftState::default()),
            uniform_alignment,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SoftState> {
        self.state.lock().expect("soft device state poisoned")
    }

    /**
    While held, [Device::poll] leaves map requests outstanding.

    Models a device that stops answering (for example after device loss).
    */
    pub fn hold_map_completions(&self, hold: bool) {
        self.state().hold_maps = hold;
    }

    /// Resolves subsequent map requests with an error.
    pub fn fail_map_completions(&self, fail: bool) {
        self.state().fail_maps = fail;
    }

    /// Refuses buffer creation above `limit` bytes, as a device with small limits would.
    pub fn set_max_buffer_size(&self, limit: Option<usize>) {
        self.state().max_buffer_size = limit;
    }

    pub fn pending_maps(&self) -> usize {
        self.state().pending_maps.len()
    }

    /// Number of staging regions that exist right now.
    pub fn live_staging_buffers(&self) -> usize {
        self.state().staging.len()
    }

    /// Number of uniform buffers that exist right now.
    pub fn live_uniform_buffers(&self) -> usize {
        self.state().gpu.len()
    }

    /// Number of staging regions ever created.
    pub fn staging_buffers_created(&self) -> usize {
        self.state().staging_created
    }

    pub fn bind_groups_created(&self) -> usize {
        self.state().bind_groups_created
    }

    pub fn submissions(&self) -> usize {
        self.state().submissions
    }

    pub fn copies_submitted(&self) -> usize {
        self.state().copies_submitted
    }

    pub fn is_mapped(&self, buffer: &SoftStaging) -> bool {
        self.state()
            .staging
            .get(&buffer.id)
            .map(|r| r.mapped)
            .unwrap_or(false)
    }

    /// Reads back the contents of a device-resident buffer.
    pub fn read_buffer(&self, buffer: &SoftBuffer) -> Vec<u8> {
        self.state()
            .gpu
            .get(&buffer.id)
            .cloned()
            .expect("reading a buffer that does not exist")
    }
}

impl Device for SoftDevice {
    type StagingBuffer = SoftStaging;
    type GpuBuffer = SoftBuffer;
    type BindGroupLayout = SoftLayout;
    type BindGroup = SoftBindGroup;
    type Encoder = SoftEncoder;

    fn create_staging_buffer(&self, size: usize, _debug_name: &str) -> Result<SoftStaging, Error> {
        let mut state = self.state();
        state.check_size(size)?;
        let id = state.next_id();
        state.staging.insert(
            id,
            Region {
                bytes: vec![0; size],
                mapped: true,
                map_pending: false,
            },
        );
        state.staging_created += 1;
        Ok(SoftStaging { id, size })
    }

    fn write_staging(&self, buffer: &SoftStaging, offset: usize, data: &[u8]) {
        let mut state = self.state();
        let region = state
            .staging
            .get_mut(&buffer.id)
            .expect("write to a destroyed staging buffer");
        assert!(region.mapped, "write to an unmapped staging buffer");
        assert!(
            offset + data.len() <= region.bytes.len(),
            "Write out of bounds"
        );
        region.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn unmap_staging(&self, buffer: &SoftStaging) {
        let mut state = self.state();
        if let Some(region) = state.staging.get_mut(&buffer.id) {
            region.mapped = false;
        }
    }

    fn map_staging_async(&self, buffer: &SoftStaging, on_mapped: MapCallback) {
        let mut state = self.state();
        let region = state
            .staging
            .get_mut(&buffer.id)
            .expect("map of a destroyed staging buffer");
        assert!(!region.mapped, "map of a staging buffer that is already mapped");
        assert!(!region.map_pending, "map of a staging buffer with a map outstanding");
        region.map_pending = true;
        state.pending_maps.push_back(PendingMap {
            id: buffer.id,
            callback: on_mapped,
        });
    }

    fn destroy_staging(&self, buffer: SoftStaging) {
        self.state().staging.remove(&buffer.id);
    }

    fn create_encoder(&self, _debug_name: &str) -> SoftEncoder {
        SoftEncoder::default()
    }

    fn copy_staging_to_gpu(
        &self,
        encoder: &mut SoftEncoder,
        source: &SoftStaging,
        source_offset: usize,
        dest: &SoftBuffer,
        dest_offset: usize,
        copy_len: usize,
    ) {
        assert!(source_offset + copy_len <= source.size, "copy source out of bounds");
        assert!(dest_offset + copy_len <= dest.size, "copy destination out of bounds");
        encoder.copies.push(SoftCopy {
            source: source.id,
            source_offset,
            dest: dest.id,
            dest_offset,
            len: copy_len,
        });
    }

    fn submit(&self, encoder: SoftEncoder) {
        let mut state = self.state();
        for copy in &encoder.copies {
            let region = state
                .staging
                .get(&copy.source)
                .expect("copy source was destroyed before submission");
            assert!(!region.mapped, "copy source is still mapped at submission");
            let bytes = region.bytes[copy.source_offset..copy.source_offset + copy.len].to_vec();
            let dest = state
                .gpu
                .get_mut(&copy.dest)
                .expect("copy destination was destroyed before submission");
            dest[copy.dest_offset..copy.dest_offset + copy.len].copy_from_slice(&bytes);
        }
        state.copies_submitted += encoder.copies.len();
        state.submissions += 1;
    }

    fn poll(&self) {
        let (ready, fail) = {
            let mut state = self.state();
            if state.hold_maps {
                return;
            }
            let ready: Vec<PendingMap> = state.pending_maps.drain(..).collect();
            let fail = state.fail_maps;
            for pending in &ready {
                if let Some(region) = state.staging.get_mut(&pending.id) {
                    region.map_pending = false;
                    region.mapped = !fail;
                }
            }
            (ready, fail)
        };
        //continuations run without the lock held
        for pending in ready {
            if fail {
                (pending.callback)(Err(Error::MapFailed("soft device refused the map".to_string())));
            } else {
                (pending.callback)(Ok(()));
            }
        }
    }

    fn create_uniform_buffer(&self, size: usize, _debug_name: &str) -> Result<SoftBuffer, Error> {
        let mut state = self.state();
        state.check_size(size)?;
        let id = state.next_id();
        state.gpu.insert(id, vec![0; size]);
        Ok(SoftBuffer { id, size })
    }

    fn destroy_uniform_buffer(&self, buffer: SoftBuffer) {
        self.state().gpu.remove(&buffer.id);
    }

    fn create_instance_layout(&self, binding_size: usize, dynamic_offset: bool) -> SoftLayout {
        SoftLayout {
            binding_size,
            dynamic_offset,
        }
    }

    fn create_bind_group(
        &self,
        layout: &SoftLayout,
        buffer: &SoftBuffer,
        offset: usize,
        size: usize,
        _debug_name: &str,
    ) -> SoftBindGroup {
        assert!(offset + size <= buffer.size, "bind group range exceeds buffer");
        assert_eq!(offset % self.uniform_alignment, 0, "misaligned bind group offset");
        let mut state = self.state();
        let id = state.next_id();
        state.bind_groups_created += 1;
        SoftBindGroup {
            id,
            buffer: buffer.id,
            offset,
            size,
            dynamic_offset: layout.dynamic_offset,
        }
    }

    fn uniform_offset_alignment(&self) -> usize {
        self.uniform_alignment
    }
}
