// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::bittricks::align_up;
use crate::imp::wgpu::buffer::{WgpuEncoder, WgpuStaging};
use crate::imp::{Device, Error, MapCallback};
use std::num::NonZeroU64;
use wgpu::{BufferAddress, Limits, PollType, Trace};

/**
An adapter, device and queue.

Map completions are delivered from [Device::poll], which the staging pool calls from
the frame loop; no polling thread is spawned.
*/
#[derive(Debug)]
pub struct WgpuDevice {
    //drop order: device and queue before the adapter and instance
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter: wgpu::Adapter,
    _instance: wgpu::Instance,
    uniform_alignment: usize,
    max_buffer_size: u64,
}

impl WgpuDevice {
    /// Binds the first adapter wgpu offers.
    pub async fn new() -> Result<Self, Error> {
        let descriptor = wgpu::InstanceDescriptor::from_env_or_default();
        let instance = wgpu::Instance::new(&descriptor);
        let options = wgpu::RequestAdapterOptions {
            power_preference: Default::default(),
            force_fallback_adapter: false,
            compatible_surface: None,
        };
        let adapter = instance
            .request_adapter(&options)
            .await
            .map_err(|_| Error::NoSuchAdapter)?;

        let label = wgpu::Label::from("aquarium device");
        //webGL enforces these, so stay inside them everywhere
        let limits = Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits());
        let descriptor = wgpu::DeviceDescriptor {
            label,
            required_features: Default::default(),
            required_limits: limits,
            memory_hints: Default::default(),
            trace: Trace::Off,
        };
        let (device, queue) = adapter.request_device(&descriptor).await?;
        let device_limits = device.limits();
        logwise::info_sync!(
            "Bound wgpu device on {adapter}",
            adapter = logwise::privacy::LogIt(&adapter.get_info().name)
        );
        Ok(WgpuDevice {
            uniform_alignment: device_limits.min_uniform_buffer_offset_alignment as usize,
            max_buffer_size: device_limits.max_buffer_size,
            device,
            queue,
            adapter,
            _instance: instance,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    fn check_size(&self, size: usize) -> Result<(), Error> {
        if size as u64 > self.max_buffer_size {
            Err(Error::BufferTooLarge {
                requested: size,
                limit: self.max_buffer_size,
            })
        } else {
            Ok(())
        }
    }
}

impl Device for WgpuDevice {
    type StagingBuffer = WgpuStaging;
    type GpuBuffer = wgpu::Buffer;
    type BindGroupLayout = wgpu::BindGroupLayout;
    type BindGroup = wgpu::BindGroup;
    type Encoder = WgpuEncoder;

    fn create_staging_buffer(&self, size: usize, debug_name: &str) -> Result<WgpuStaging, Error> {
        self.check_size(size)?;
        Ok(WgpuStaging::new(&self.device, size, debug_name))
    }

    fn write_staging(&self, buffer: &WgpuStaging, offset: usize, data: &[u8]) {
        buffer.write(offset, data);
    }

    fn unmap_staging(&self, buffer: &WgpuStaging) {
        buffer.unmap();
    }

    fn map_staging_async(&self, buffer: &WgpuStaging, on_mapped: MapCallback) {
        buffer.map_async(on_mapped);
    }

    fn destroy_staging(&self, buffer: WgpuStaging) {
        //wgpu frees the allocation once submitted work no longer reads it
        drop(buffer);
    }

    fn create_encoder(&self, debug_name: &str) -> WgpuEncoder {
        WgpuEncoder::new(&self.device, debug_name)
    }

    fn copy_staging_to_gpu(
        &self,
        encoder: &mut WgpuEncoder,
        source: &WgpuStaging,
        source_offset: usize,
        dest: &wgpu::Buffer,
        dest_offset: usize,
        copy_len: usize,
    ) {
        encoder.copy(source, source_offset, dest, dest_offset, copy_len);
    }

    fn submit(&self, encoder: WgpuEncoder) {
        let commands = encoder.encoder.finish();
        self.queue.submit(std::iter::once(commands));
    }

    fn poll(&self) {
        if let Err(e) = self.device.poll(PollType::Poll) {
            logwise::warn_sync!("wgpu poll failed: {err}", err = logwise::privacy::LogIt(&e));
        }
    }

    fn create_uniform_buffer(&self, size: usize, debug_name: &str) -> Result<wgpu::Buffer, Error> {
        let size = align_up(size.max(1), wgpu::COPY_BUFFER_ALIGNMENT as usize);
        self.check_size(size)?;
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(debug_name),
            size: size as BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    fn destroy_uniform_buffer(&self, buffer: wgpu::Buffer) {
        buffer.destroy();
    }

    fn create_instance_layout(&self, binding_size: usize, dynamic_offset: bool) -> wgpu::BindGroupLayout {
        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fish per layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: dynamic_offset,
                    min_binding_size: NonZeroU64::new(binding_size as u64),
                },
                count: None,
            }],
        })
    }

    fn create_bind_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
        offset: usize,
        size: usize,
        debug_name: &str,
    ) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(debug_name),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: offset as BufferAddress,
                    size: NonZeroU64::new(size as u64),
                }),
            }],
        })
    }

    fn uniform_offset_alignment(&self) -> usize {
        self.uniform_alignment
    }
}
