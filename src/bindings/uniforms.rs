// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Uniform record layouts shared with the fish shaders.
*/

use crate::bittricks::align_up;

/**
One fish's slot in the per-instance uniform buffer.

Matches the shader's `FishPer` block: two vec3/float pairs, 32 bytes.  On upload each
record is padded out to the device's uniform offset alignment so that every instance
starts at a bindable offset.
*/
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FishPer {
    pub world_position: [f32; 3],
    pub scale: f32,
    pub next_position: [f32; 3],
    pub time: f32,
}

impl FishPer {
    /// Unpadded size in bytes.
    pub const SIZE: usize = std::mem::size_of::<FishPer>();

    pub fn new(world_position: [f32; 3], scale: f32, next_position: [f32; 3], time: f32) -> Self {
        FishPer {
            world_position,
            scale,
            next_position,
            time,
        }
    }

    /// Distance between consecutive records once padded to `uniform_offset_alignment`.
    pub const fn stride(uniform_offset_alignment: usize) -> usize {
        align_up(Self::SIZE, uniform_offset_alignment)
    }
}
