// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Backend abstraction.

The staging pool and the instance store only need a handful of things from a GPU:
mappable staging regions, device-resident uniform buffers, bind groups, and a way to
record and submit buffer-to-buffer copies. [Device] names exactly that surface.

Two backends implement it:

* [soft] is an in-memory device that completes map requests when polled.  It is always
  built and is what the test suites run against.
* `wgpu` (feature `backend_wgpu`) drives a real adapter.
*/

use std::fmt::Debug;

pub mod soft;

#[cfg(feature = "backend_wgpu")]
pub mod wgpu;

pub use soft::SoftDevice;

#[cfg(feature = "backend_wgpu")]
pub use self::wgpu::WgpuDevice;

/**
Continuation invoked when an asynchronous map request resolves.

Backends may call this from outside the frame loop's call stack (wgpu calls it from
inside `Device::poll`), so it must be `Send`.
*/
pub type MapCallback = Box<dyn FnOnce(Result<(), Error>) + Send + 'static>;

/**
The device/queue surface the staging pool and instance store are written against.

Handles are opaque to callers.  Every method takes `&self`; backends that need mutable
bookkeeping use interior mutability.
*/
pub trait Device: Debug {
    /// A CPU-writable region that can be the source of a copy.
    type StagingBuffer: Debug;
    /// A device-resident buffer that can be bound as a uniform.
    type GpuBuffer: Debug;
    type BindGroupLayout: Debug;
    type BindGroup: Debug;
    /// Records copy commands for one submission.
    type Encoder;

    /**
    Creates a staging region of `size` bytes, already mapped for writing.
    */
    fn create_staging_buffer(&self, size: usize, debug_name: &str) -> Result<Self::StagingBuffer, Error>;

    /**
    Writes `data` into a mapped staging region at `offset`.

    # Panics
    Panics if the region is not mapped or the write is out of bounds.
    */
    fn write_staging(&self, buffer: &Self::StagingBuffer, offset: usize, data: &[u8]);

    /// Ends CPU access to the region so that copies may read from it.
    fn unmap_staging(&self, buffer: &Self::StagingBuffer);

    /**
    Requests that the region be mapped for writing again.

    `on_mapped` runs once the request resolves, never synchronously inside this call.
    */
    fn map_staging_async(&self, buffer: &Self::StagingBuffer, on_mapped: MapCallback);

    /// Releases the region permanently.
    fn destroy_staging(&self, buffer: Self::StagingBuffer);

    fn create_encoder(&self, debug_name: &str) -> Self::Encoder;

    /**
    Records a copy from a staging region into a device-resident buffer.
    */
    fn copy_staging_to_gpu(
        &self,
        encoder: &mut Self::Encoder,
        source: &Self::StagingBuffer,
        source_offset: usize,
        dest: &Self::GpuBuffer,
        dest_offset: usize,
        copy_len: usize,
    );

    fn submit(&self, encoder: Self::Encoder);

    /// Gives the backend a chance to deliver pending map completions.
    fn poll(&self);

    fn create_uniform_buffer(&self, size: usize, debug_name: &str) -> Result<Self::GpuBuffer, Error>;

    /// Releases a buffer from [Device::create_uniform_buffer].  Submitted copies into it still land.
    fn destroy_uniform_buffer(&self, buffer: Self::GpuBuffer);

    /**
    Creates the layout for the per-instance uniform slot.

    When `dynamic_offset` is set, draws supply a byte offset alongside the bind group.
    */
    fn create_instance_layout(&self, binding_size: usize, dynamic_offset: bool) -> Self::BindGroupLayout;

    fn create_bind_group(
        &self,
        layout: &Self::BindGroupLayout,
        buffer: &Self::GpuBuffer,
        offset: usize,
        size: usize,
        debug_name: &str,
    ) -> Self::BindGroup;

    /// Minimum alignment of uniform buffer binding offsets.
    fn uniform_offset_alignment(&self) -> usize;
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("No such adapter")]
    NoSuchAdapter,
    #[cfg(feature = "backend_wgpu")]
    #[error("Can't request device {0}")]
    RequestDevice(#[from] ::wgpu::RequestDeviceError),
    #[error("Buffer map failed: {0}")]
    MapFailed(String),
    #[error("Buffer of {requested} bytes exceeds the device limit of {limit}")]
    BufferTooLarge { requested: usize, limit: u64 },
    #[error("Device lost")]
    DeviceLost,
}
