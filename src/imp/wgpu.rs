// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
wgpu backend.

Staging regions are `MAP_WRITE | COPY_SRC` buffers created mapped.  Remapping is
`map_async(MapMode::Write)` on the whole buffer, delivered when the device is polled.
Instance storage is `UNIFORM | COPY_DST`.
*/

mod bound_device;
mod buffer;

pub use bound_device::WgpuDevice;
pub use buffer::{WgpuEncoder, WgpuStaging};
