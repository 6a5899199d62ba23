// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Growth-only storage for per-instance uniforms.

[InstanceResources] holds one device-resident buffer with a padded [FishPer] slot per
instance and the bind groups draws use to reach those slots.  Storage is replaced only
when the requested instance count exceeds the current capacity.  When the population
shrinks the buffer keeps its size and the tail slots simply go undrawn, so peak memory
is held for the life of the store.

# Binding modes

With dynamic offsets a single bind group covers one slot at offset 0, and each draw
supplies `stride * index` as its dynamic offset.  Without them the store creates one
bind group per instance, each fixed at its own slot.  The two shapes are the variants of
[InstanceBindings].
*/

use crate::bindings::uniforms::FishPer;
use crate::bittricks::constant_buffer_byte_size;
use crate::imp::{self, Device};
use crate::staging::{AllocError, Allocation, BufferManager};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The bind groups for one storage generation.
pub enum InstanceBindings<D: Device> {
    /// One group; draws pass a dynamic offset.
    Dynamic { group: D::BindGroup },
    /// One group per instance, in instance order.
    PerInstance { groups: Vec<D::BindGroup> },
}

impl<D: Device> InstanceBindings<D> {
    pub fn len(&self) -> usize {
        match self {
            InstanceBindings::Dynamic { .. } => 1,
            InstanceBindings::PerInstance { groups } => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, InstanceBindings::Dynamic { .. })
    }
}

impl<D: Device> Debug for InstanceBindings<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceBindings::Dynamic { group } => f.debug_struct("Dynamic").field("group", group).finish(),
            InstanceBindings::PerInstance { groups } => f
                .debug_struct("PerInstance")
                .field("groups", &groups.len())
                .finish(),
        }
    }
}

/// What a draw needs to address one instance's slot.
pub struct InstanceBinding<'a, D: Device> {
    pub group: &'a D::BindGroup,
    /// Byte offset to pass with the draw, in dynamic mode.
    pub dynamic_offset: Option<u32>,
}

impl<D: Device> Debug for InstanceBinding<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceBinding")
            .field("group", self.group)
            .field("dynamic_offset", &self.dynamic_offset)
            .finish()
    }
}

/// Outcome of [InstanceResources::reallocate].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reallocation {
    /// Storage was left as is; only the live count may have changed.
    Unchanged,
    /// Storage was torn down and recreated for a larger population.
    Grew { from: usize, to: usize },
    /// Capacity sufficed but the binding mode changed, so bind groups were rebuilt.
    Rebound { capacity: usize },
}

impl Reallocation {
    pub fn grew(&self) -> bool {
        matches!(self, Reallocation::Grew { .. })
    }
}

struct Storage<D: Device> {
    buffer: D::GpuBuffer,
    bindings: InstanceBindings<D>,
}

/**
Per-instance uniform storage with growth-only reallocation.
*/
pub struct InstanceResources<D: Device> {
    device: Arc<D>,
    stride: usize,
    capacity: usize,
    live: usize,
    dynamic_offset: bool,
    storage: Option<Storage<D>>,
    data: Vec<FishPer>,
    //padded upload image, reused across frames
    staged: Vec<u8>,
}

impl<D: Device> Debug for InstanceResources<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceResources")
            .field("stride", &self.stride)
            .field("capacity", &self.capacity)
            .field("live", &self.live)
            .field("dynamic_offset", &self.dynamic_offset)
            .field("bindings", &self.storage.as_ref().map(|s| &s.bindings))
            .finish_non_exhaustive()
    }
}

impl<D: Device> InstanceResources<D> {
    /// An unallocated store.  Nothing is created on the device until the first growth.
    pub fn new(device: Arc<D>) -> Self {
        let stride = FishPer::stride(device.uniform_offset_alignment());
        InstanceResources {
            device,
            stride,
            capacity: 0,
            live: 0,
            dynamic_offset: false,
            storage: None,
            data: Vec::new(),
            staged: Vec::new(),
        }
    }

    /// Bytes between consecutive instance slots.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Instances the current storage can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Instances drawn this frame.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn dynamic_offset(&self) -> bool {
        self.dynamic_offset
    }

    pub fn bindings(&self) -> Option<&InstanceBindings<D>> {
        self.storage.as_ref().map(|s| &s.bindings)
    }

    pub fn bind_group_count(&self) -> usize {
        self.bindings().map_or(0, InstanceBindings::len)
    }

    pub fn buffer(&self) -> Option<&D::GpuBuffer> {
        self.storage.as_ref().map(|s| &s.buffer)
    }

    /// Host-side records for the live instances.
    pub fn instance_data(&self) -> &[FishPer] {
        &self.data[..self.live]
    }

    /**
    Brings storage in line with a new instance count.

    `previous` is the count the caller last requested; it is only reported.  Growth is
    decided against the current capacity, so a request at or below any earlier peak never
    reallocates.  Requesting zero instances leaves storage in place and draws nothing.

    # Errors
    Fails if the device cannot create the new buffer.  The store is then unallocated.
    */
    pub fn reallocate(&mut self, previous: usize, requested: usize, dynamic_offset: bool) -> Result<Reallocation, imp::Error> {
        logwise::trace_sync!(
            "Instance count {previous} -> {requested} (capacity {capacity})",
            previous = previous,
            requested = requested,
            capacity = self.capacity
        );
        if requested > self.capacity {
            let from = self.capacity;
            self.release();
            let size = constant_buffer_byte_size(requested * self.stride);
            let buffer = self.device.create_uniform_buffer(size, "fish per")?;
            let bindings = self.build_bindings(&buffer, requested, dynamic_offset);
            self.storage = Some(Storage { buffer, bindings });
            self.data = vec![FishPer::default(); requested];
            self.capacity = requested;
            self.live = requested;
            self.dynamic_offset = dynamic_offset;
            logwise::info_sync!(
                "Instance storage grew from {from} to {to} slots ({size} bytes)",
                from = from,
                to = requested,
                size = size
            );
            return Ok(Reallocation::Grew { from, to: requested });
        }
        self.live = requested;
        if dynamic_offset != self.dynamic_offset {
            if let Some(storage) = self.storage.take() {
                let bindings = self.build_bindings(&storage.buffer, self.capacity, dynamic_offset);
                self.storage = Some(Storage {
                    buffer: storage.buffer,
                    bindings,
                });
                self.dynamic_offset = dynamic_offset;
                return Ok(Reallocation::Rebound { capacity: self.capacity });
            }
            self.dynamic_offset = dynamic_offset;
        }
        Ok(Reallocation::Unchanged)
    }

    fn build_bindings(&self, buffer: &D::GpuBuffer, count: usize, dynamic_offset: bool) -> InstanceBindings<D> {
        let layout = self.device.create_instance_layout(self.stride, dynamic_offset);
        if dynamic_offset {
            let group = self
                .device
                .create_bind_group(&layout, buffer, 0, self.stride, "fish per (dynamic)");
            InstanceBindings::Dynamic { group }
        } else {
            let groups = (0..count)
                .map(|index| {
                    self.device
                        .create_bind_group(&layout, buffer, index * self.stride, self.stride, "fish per")
                })
                .collect();
            InstanceBindings::PerInstance { groups }
        }
    }

    /**
    Stages one instance's uniforms for the next [InstanceResources::upload].

    # Panics
    Panics if `index` is not a live instance.
    */
    pub fn update_instance_data(
        &mut self,
        index: usize,
        world_position: [f32; 3],
        next_position: [f32; 3],
        scale: f32,
        time: f32,
    ) {
        self.set_instance(index, FishPer::new(world_position, scale, next_position, time));
    }

    pub fn set_instance(&mut self, index: usize, per: FishPer) {
        assert!(index < self.live, "instance {index} is not live ({live} live)", live = self.live);
        self.data[index] = per;
    }

    /**
    Copies the live instances' records into the device buffer through `pool`.

    Returns `Ok(None)` when there is nothing to upload.
    */
    pub fn upload(&mut self, pool: &mut BufferManager<D>) -> Result<Option<Allocation>, AllocError> {
        let Some(storage) = self.storage.as_ref() else {
            return Ok(None);
        };
        if self.live == 0 {
            return Ok(None);
        }
        let len = constant_buffer_byte_size(self.live * self.stride);
        self.staged.clear();
        self.staged.resize(len, 0);
        for (index, per) in self.data[..self.live].iter().enumerate() {
            let start = index * self.stride;
            self.staged[start..start + FishPer::SIZE].copy_from_slice(bytemuck::bytes_of(per));
        }
        pool.upload(&storage.buffer, 0, &self.staged).map(Some)
    }

    /**
    The bind group and offset a draw of instance `index` should use.

    `None` if `index` is not live.
    */
    pub fn binding(&self, index: usize) -> Option<InstanceBinding<'_, D>> {
        if index >= self.live {
            return None;
        }
        match &self.storage.as_ref()?.bindings {
            InstanceBindings::Dynamic { group } => Some(InstanceBinding {
                group,
                dynamic_offset: Some(dynamic_offset_of(self.stride, index)?),
            }),
            InstanceBindings::PerInstance { groups } => Some(InstanceBinding {
                group: groups.get(index)?,
                dynamic_offset: None,
            }),
        }
    }

    fn release(&mut self) {
        if let Some(storage) = self.storage.take() {
            //bind groups go first; they refer to the buffer
            drop(storage.bindings);
            self.device.destroy_uniform_buffer(storage.buffer);
        }
        self.data.clear();
        self.capacity = 0;
        self.live = 0;
    }

    /// Releases storage.  The store returns to the unallocated state.
    pub fn dispose(&mut self) {
        if self.storage.is_some() {
            logwise::info_sync!("Released instance storage ({capacity} slots)", capacity = self.capacity);
        }
        self.release();
    }
}

/// Byte offset of slot `index`, if it fits the 32-bit offset a draw accepts.
fn dynamic_offset_of(stride: usize, index: usize) -> Option<u32> {
    u32::try_from(stride.checked_mul(index)?).ok()
}

impl<D: Device> Drop for InstanceResources<D> {
    fn drop(&mut self) {
        self.release();
    }
}
