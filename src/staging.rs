// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Staging memory.

Uploads reach device-resident buffers by way of mapped staging regions.  [RingBuffer]
bump-allocates within one region; [BufferManager] decides which region serves each
request, enforces the pool's memory ceiling and recycles regions across frames.
*/

mod buffer_manager;
mod ring_buffer;

pub use buffer_manager::{
    AllocError, Allocation, BUFFER_MAX_COUNT, BUFFER_PER_ALLOCATE_SIZE, BUFFER_POOL_MAX_SIZE, BufferManager,
    MapStrategy, PoolConfig, PoolStats, RemapCompletion, RingBufferId,
};
pub use ring_buffer::{RingBuffer, RingState};
