// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! aquarium is the resource engine behind a GPU fish-tank demo: a staging buffer pool
and a growth-only per-instance uniform store.

The demo draws thousands of fish, each with its own slice of a uniform buffer.  Two
things make that hard, and they are what this crate is about.

# Staging

Every byte that reaches a device-resident buffer is first written into a mapped staging
region and then copied by a recorded command.  [staging::BufferManager] owns those
regions:

| Strategy | Regions                             | After submit        | Memory bound                |
|----------|-------------------------------------|---------------------|-----------------------------|
| Sync     | One per allocation, sized to fit    | Destroyed           | Ceiling on bytes per frame  |
| Async    | Up to N, each `capacity / N` bytes  | Remapped and reused | Ceiling plus backpressure   |

Under the async strategy a region cannot be reused until its map request resolves.
When every region is busy the pool waits, with a timeout, for one to come back.

# Instance storage

[bindings::InstanceResources] holds the per-fish uniforms.  It only grows: when the
population exceeds the peak seen so far, the buffer and bind groups are recreated for
the new count; when it shrinks, the extra slots go undrawn.  Draws reach their slot
either through one bind group and a dynamic offset or through a bind group per fish.

# Backends

Both pieces are written against [imp::Device].  The default backend drives
[wgpu](https://wgpu.rs).  An in-memory backend, [imp::SoftDevice], resolves map
requests when polled and is what the tests run on.

# Example

```
use std::sync::Arc;
use aquarium::images::{AquariumOptions, Engine};
use aquarium::imp::SoftDevice;

let device = Arc::new(SoftDevice::new());
let options = AquariumOptions { fish_count: 100, ..Default::default() };
let mut engine = Engine::new(device, options).unwrap();
let report = engine.render_frame(1.0 / 60.0).unwrap();
assert_eq!(report.draws, 100);
```
*/

pub mod bindings;
mod bittricks;
pub mod images;
pub mod imp;
pub mod staging;
mod sys;

pub use bittricks::{CONSTANT_BUFFER_ALIGNMENT, STAGING_ALIGNMENT, align_up, constant_buffer_byte_size};
