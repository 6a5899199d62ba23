// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0

//! Staging buffers and copy recording for the wgpu backend.
//!
//! wgpu only allows `MAP_WRITE` together with `COPY_SRC`, so every upload is written
//! into a staging buffer and copied into its destination by a recorded command.

use crate::bittricks::align_up;
use crate::imp::{Error, MapCallback};
use wgpu::{BufferAddress, BufferDescriptor, BufferUsages, COPY_BUFFER_ALIGNMENT, MAP_ALIGNMENT, MapMode};

/**
A mappable staging buffer.
*/
#[derive(Debug)]
pub struct WgpuStaging {
    buffer: wgpu::Buffer,
    size: usize,
}

impl WgpuStaging {
    pub(super) fn new(device: &wgpu::Device, size: usize, debug_name: &str) -> Self {
        //mapped_at_creation requires a multiple of COPY_BUFFER_ALIGNMENT
        let padded = align_up(size.max(1), COPY_BUFFER_ALIGNMENT as usize);
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(debug_name),
            size: padded as BufferAddress,
            usage: BufferUsages::MAP_WRITE | BufferUsages::COPY_SRC,
            mapped_at_creation: true,
        });
        WgpuStaging { buffer, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub(super) fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub(super) fn write(&self, offset: usize, data: &[u8]) {
        assert_eq!(offset % MAP_ALIGNMENT as usize, 0, "staging write offset is not map aligned");
        assert!(offset + data.len() <= self.size, "Write out of bounds");
        //mapped views are sized in whole COPY_BUFFER_ALIGNMENT units
        let end = align_up(offset + data.len(), COPY_BUFFER_ALIGNMENT as usize).min(self.buffer.size() as usize);
        let mut view = self
            .buffer
            .slice(offset as BufferAddress..end as BufferAddress)
            .get_mapped_range_mut();
        view[..data.len()].copy_from_slice(data);
    }

    pub(super) fn unmap(&self) {
        self.buffer.unmap();
    }

    pub(super) fn map_async(&self, on_mapped: MapCallback) {
        self.buffer.slice(..).map_async(MapMode::Write, move |result| {
            on_mapped(result.map_err(|e| Error::MapFailed(e.to_string())));
        });
    }
}

/**
Copy commands for one submission.
*/
#[derive(Debug)]
pub struct WgpuEncoder {
    pub(super) encoder: wgpu::CommandEncoder,
    pub(super) copies: usize,
}

impl WgpuEncoder {
    pub(super) fn new(device: &wgpu::Device, debug_name: &str) -> Self {
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(debug_name),
        });
        WgpuEncoder { encoder, copies: 0 }
    }

    pub fn recorded_copies(&self) -> usize {
        self.copies
    }

    /**
    Records a copy.

    wgpu copies whole COPY_BUFFER_ALIGNMENT units, so `copy_len` is rounded up.  Callers
    stage into allocations that are already rounded.
    */
    pub(super) fn copy(
        &mut self,
        source: &WgpuStaging,
        source_offset: usize,
        dest: &wgpu::Buffer,
        dest_offset: usize,
        copy_len: usize,
    ) {
        let len = align_up(copy_len, COPY_BUFFER_ALIGNMENT as usize);
        self.encoder.copy_buffer_to_buffer(
            source.buffer(),
            source_offset as BufferAddress,
            dest,
            dest_offset as BufferAddress,
            len as BufferAddress,
        );
        self.copies += 1;
    }
}
