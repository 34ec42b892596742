//! Host-visible and device-local buffers.
//!
//! Every buffer type carries the same permissive usage flags so one buffer
//! can serve as vertex, index, uniform or storage data and as a transfer
//! source or destination.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use tracing::warn;

use crate::command::execute;
use crate::device::Device;
use crate::error::{GpuError, Result};
use crate::memory::GpuBuffer;

/// Usage flags shared by dynamic and static buffers.
pub const BUFFER_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::VERTEX_BUFFER.as_raw()
        | vk::BufferUsageFlags::INDEX_BUFFER.as_raw()
        | vk::BufferUsageFlags::UNIFORM_BUFFER.as_raw()
        | vk::BufferUsageFlags::STORAGE_BUFFER.as_raw()
        | vk::BufferUsageFlags::TRANSFER_SRC.as_raw()
        | vk::BufferUsageFlags::TRANSFER_DST.as_raw(),
);

/// Source offset, destination offset and size of a buffer-to-buffer copy.
///
/// A size of zero copies everything from `src_offset` to the end of the
/// source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyRegion {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

impl CopyRegion {
    /// Copy the whole source to the start of the destination.
    pub const fn whole() -> Self {
        Self {
            src_offset: 0,
            dst_offset: 0,
            size: 0,
        }
    }

    pub const fn new(src_offset: u64, dst_offset: u64, size: u64) -> Self {
        Self {
            src_offset,
            dst_offset,
            size,
        }
    }

    /// Resolve a zero size and check the region against the source length
    /// and the destination capacity.
    ///
    /// Returns the region with its actual size.
    pub fn validate(self, src_len: u64, dst_cap: u64) -> Result<Self> {
        let out_of_bounds = |size| GpuError::CopyOutOfBounds {
            size,
            src_offset: self.src_offset,
            src_len,
            dst_offset: self.dst_offset,
            dst_len: dst_cap,
        };

        let src_available = src_len
            .checked_sub(self.src_offset)
            .ok_or_else(|| out_of_bounds(self.size))?;
        let dst_available = dst_cap
            .checked_sub(self.dst_offset)
            .ok_or_else(|| out_of_bounds(self.size))?;

        let size = if self.size == 0 {
            src_available
        } else {
            self.size
        };
        if size > dst_available || size > src_available {
            return Err(out_of_bounds(size));
        }

        Ok(Self { size, ..self })
    }
}

/// Host-visible buffer, persistently mapped.
pub struct DynamicBuffer {
    device: Arc<Device>,
    buffer: GpuBuffer,
}

impl DynamicBuffer {
    /// Create a host-visible buffer of `size` bytes.
    pub fn new(device: &Arc<Device>, size: u64) -> Result<Self> {
        let buffer =
            device.create_buffer(size, BUFFER_USAGE, MemoryLocation::CpuToGpu, "dynamic buffer")?;
        Ok(Self {
            device: Arc::clone(device),
            buffer,
        })
    }

    /// Borrow the mapped memory.
    ///
    /// The allocation stays mapped for the lifetime of the buffer; the
    /// guard only scopes the CPU access.
    pub fn map(&mut self) -> Result<MappedBuffer<'_>> {
        let bytes = self
            .buffer
            .mapped_slice_mut()
            .ok_or_else(|| GpuError::InvalidState("Buffer not host visible".to_string()))?;
        Ok(MappedBuffer { bytes })
    }

    /// Copy `data` into the buffer at `offset`.
    pub fn update(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.buffer.write_bytes(offset, data)
    }

    /// Copy bytes out of the buffer starting at `offset`.
    pub fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.buffer.read_bytes(offset, out)
    }

    pub fn size(&self) -> u64 {
        self.buffer.size
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.buffer
    }
}

impl Drop for DynamicBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.free_buffer(&mut self.buffer) {
            warn!("Failed to free dynamic buffer: {}", e);
        }
    }
}

/// Mapped view of a [`DynamicBuffer`].
pub struct MappedBuffer<'a> {
    bytes: &'a mut [u8],
}

impl Deref for MappedBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl DerefMut for MappedBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.bytes
    }
}

/// Device-local buffer, filled through staged copies.
pub struct StaticBuffer {
    device: Arc<Device>,
    buffer: GpuBuffer,
}

impl StaticBuffer {
    /// Create a device-local buffer of `size` bytes.
    pub fn new(device: &Arc<Device>, size: u64) -> Result<Self> {
        let buffer =
            device.create_buffer(size, BUFFER_USAGE, MemoryLocation::GpuOnly, "static buffer")?;
        Ok(Self {
            device: Arc::clone(device),
            buffer,
        })
    }

    /// Create a buffer sized to `data` and upload it.
    pub fn with_data(device: &Arc<Device>, data: &[u8]) -> Result<Self> {
        let buffer = Self::new(device, data.len() as u64)?;
        buffer.update_bytes(data, 0)?;
        Ok(buffer)
    }

    /// Copy from a dynamic buffer.
    ///
    /// With `cmd` the copy is only recorded and the caller submits it.
    /// Without, it runs through a blocking single-shot command. The region
    /// is validated before any GPU work.
    pub fn update_from(
        &self,
        src: &DynamicBuffer,
        cmd: Option<vk::CommandBuffer>,
        region: CopyRegion,
    ) -> Result<()> {
        let region = region.validate(src.size(), self.size())?;
        if region.size == 0 {
            return Ok(());
        }

        let copy = vk::BufferCopy {
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        };
        let record = |cmd: vk::CommandBuffer| unsafe {
            self.device
                .raw()
                .cmd_copy_buffer(cmd, src.handle(), self.handle(), &[copy]);
        };

        match cmd {
            Some(cmd) => {
                record(cmd);
                Ok(())
            }
            None => execute(&*self.device, record),
        }
    }

    /// Stage `data` through a temporary dynamic buffer and copy it to
    /// `dst_offset`.
    pub fn update_bytes(&self, data: &[u8], dst_offset: u64) -> Result<()> {
        let len = data.len() as u64;
        CopyRegion::new(0, dst_offset, len).validate(len, self.size())?;
        if data.is_empty() {
            return Ok(());
        }

        let mut staging = DynamicBuffer::new(&self.device, len)?;
        staging.update(0, data)?;
        self.update_from(&staging, None, CopyRegion::new(0, dst_offset, len))
    }

    pub fn size(&self) -> u64 {
        self.buffer.size
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.buffer
    }
}

impl Drop for StaticBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.free_buffer(&mut self.buffer) {
            warn!("Failed to free static buffer: {}", e);
        }
    }
}

/// Host-visible buffer holding one uniform block.
pub struct UniformBuffer {
    device: Arc<Device>,
    buffer: GpuBuffer,
}

impl UniformBuffer {
    pub fn new(device: &Arc<Device>, size: u64) -> Result<Self> {
        let buffer = device.create_buffer(
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "uniform buffer",
        )?;
        Ok(Self {
            device: Arc::clone(device),
            buffer,
        })
    }

    /// Create a buffer sized for `T`.
    pub fn for_type<T: Pod>(device: &Arc<Device>) -> Result<Self> {
        Self::new(device, std::mem::size_of::<T>() as u64)
    }

    /// Overwrite the whole buffer with `value`. `T` must be exactly the
    /// buffer's size.
    pub fn update_uniform<T: Pod>(&mut self, value: &T) -> Result<()> {
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() as u64 != self.buffer.size {
            return Err(GpuError::InvalidState(format!(
                "Uniform of {} bytes written to a {} byte buffer",
                bytes.len(),
                self.buffer.size
            )));
        }
        self.buffer.write_bytes(0, bytes)
    }

    pub fn size(&self) -> u64 {
        self.buffer.size
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.buffer
    }

    /// Descriptor info covering the whole buffer.
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer.buffer,
            offset: 0,
            range: self.buffer.size,
        }
    }
}

impl Drop for UniformBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.free_buffer(&mut self.buffer) {
            warn!("Failed to free uniform buffer: {}", e);
        }
    }
}
