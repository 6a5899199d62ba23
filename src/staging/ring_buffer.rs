// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! A bump allocator over one mapped staging region.
//!
//! # Lifecycle
//!
//! A ring buffer moves through these states:
//! - `Writable`: mapped, accepting allocations and writes
//! - `Flushed`: unmapped with cursors rewound; copies sourcing from it are about to be submitted
//! - `Remapping`: a map request is outstanding (asynchronous strategy only)
//! - `Writable` again once the map request resolves
//!
//! Under the synchronous strategy a buffer is destroyed after its first flush instead of
//! being remapped.
//!
//! State transitions are checked; an out-of-order transition is a bug in the pool and
//! panics, the same way an allocation past the end of the region does.

use crate::imp::{Device, MapCallback};
use std::fmt::{Debug, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingState {
    Writable,
    Flushed,
    Remapping,
}

/**
A fixed-capacity linear allocator over a single staging region.

`capacity` is fixed when the buffer is created.  `size` is the length of the region
currently mapped, which [RingBuffer::reset] may shrink; allocations are bounded by
`size`.
*/
pub struct RingBuffer<D: Device> {
    staging: Option<D::StagingBuffer>,
    //regions replaced by reset; copies recorded this frame may still read them
    retired: Vec<D::StagingBuffer>,
    capacity: usize,
    size: usize,
    head: usize,
    tail: usize,
    state: RingState,
    debug_name: String,
}

impl<D: Device> Debug for RingBuffer<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("debug_name", &self.debug_name)
            .field("capacity", &self.capacity)
            .field("size", &self.size)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("state", &self.state)
            .field("retired", &self.retired.len())
            .finish()
    }
}

impl<D: Device> RingBuffer<D> {
    /**
    Creates an empty ring buffer backed by a freshly mapped region of `size` bytes.
    */
    pub fn new(device: &D, size: usize, debug_name: &str) -> Result<Self, crate::imp::Error> {
        let staging = device.create_staging_buffer(size, debug_name)?;
        Ok(RingBuffer {
            staging: Some(staging),
            retired: Vec::new(),
            capacity: size,
            size,
            head: 0,
            tail: 0,
            state: RingState::Writable,
            debug_name: debug_name.to_string(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length of the currently mapped region.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Bytes that can still be allocated before the next flush.
    pub fn available_size(&self) -> usize {
        self.size - self.tail
    }

    pub fn state(&self) -> RingState {
        self.state
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub(crate) fn staging(&self) -> &D::StagingBuffer {
        self.staging.as_ref().expect("ring buffer has no staging region")
    }

    /**
    Claims `size` bytes and returns their offset.

    # Panics
    Panics if fewer than `size` bytes remain.  Callers check [RingBuffer::available_size]
    first; running past the end means a request was mis-sized.
    */
    pub fn allocate(&mut self, size: usize) -> usize {
        assert_eq!(self.state, RingState::Writable, "allocate from a ring buffer that is not mapped");
        assert!(
            self.tail + size <= self.size,
            "Unable to allocate {size} bytes from {name}: {available} bytes available",
            name = self.debug_name,
            available = self.available_size()
        );
        let offset = self.tail;
        self.tail += size;
        offset
    }

    /**
    Writes `data` into a range previously returned by [RingBuffer::allocate].
    */
    pub fn write(&mut self, device: &D, offset: usize, data: &[u8]) {
        assert_eq!(self.state, RingState::Writable, "write to a ring buffer that is not mapped");
        assert!(
            offset >= self.head && offset + data.len() <= self.tail,
            "Write out of bounds"
        );
        device.write_staging(self.staging(), offset, data);
    }

    /**
    Rewinds the cursors and replaces the region with a freshly mapped one of `size` bytes.

    Returns `false`, leaving the buffer untouched, if `size` exceeds the capacity, a map
    request is outstanding, or the device refuses the new region.  The caller then destroys
    and recreates instead.

    The old region is unmapped and kept until [RingBuffer::release_retired], since copies
    recorded earlier in the frame may still source from it.
    */
    pub fn reset(&mut self, device: &D, size: usize) -> bool {
        if size > self.capacity || self.state == RingState::Remapping {
            return false;
        }
        let staging = match device.create_staging_buffer(size, &self.debug_name) {
            Ok(staging) => staging,
            Err(e) => {
                logwise::warn_sync!(
                    "Can't reset {name}: {err}",
                    name = logwise::privacy::LogIt(&self.debug_name),
                    err = logwise::privacy::LogIt(&e)
                );
                return false;
            }
        };
        if let Some(old) = self.staging.replace(staging) {
            if self.state == RingState::Writable {
                device.unmap_staging(&old);
            }
            self.retired.push(old);
        }
        self.head = 0;
        self.tail = 0;
        self.size = size;
        self.state = RingState::Writable;
        true
    }

    /**
    Ends CPU writing for this frame.

    The region is unmapped so copies may read from it, and the cursors are rewound.
    */
    pub fn flush(&mut self, device: &D) {
        assert_eq!(self.state, RingState::Writable, "flush of a ring buffer that is not mapped");
        self.head = 0;
        self.tail = 0;
        device.unmap_staging(self.staging());
        self.state = RingState::Flushed;
    }

    /**
    Asks the device to map the region again.

    `on_mapped` runs when the request resolves.  There is no way to cancel; the buffer
    stays in `Remapping` until the owner calls [RingBuffer::mark_mapped].
    */
    pub fn remap(&mut self, device: &D, on_mapped: MapCallback) {
        assert_eq!(self.state, RingState::Flushed, "remap of a ring buffer that was not flushed");
        self.state = RingState::Remapping;
        device.map_staging_async(self.staging(), on_mapped);
    }

    /// Records that an outstanding map request resolved successfully.
    pub(crate) fn mark_mapped(&mut self) {
        assert_eq!(self.state, RingState::Remapping, "map completion for a ring buffer that was not remapping");
        self.state = RingState::Writable;
    }

    /// Destroys regions replaced by [RingBuffer::reset].  Call after the frame's copies are submitted.
    pub(crate) fn release_retired(&mut self, device: &D) {
        for old in self.retired.drain(..) {
            device.destroy_staging(old);
        }
    }

    /// Releases the region permanently.
    pub fn destroy(mut self, device: &D) {
        self.release_retired(device);
        if let Some(staging) = self.staging.take() {
            device.destroy_staging(staging);
        }
    }
}
