use super::{Allocator, Device};
use crate::gpu::GpuError;
use ash::vk;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme},
    MemoryLocation,
};
use std::ops::Deref;

pub struct Buffer {
    allocator: Allocator,
    buffer: vk::Buffer,
    allocated_mem: Allocation,
    size: vk::DeviceSize,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let allocated_mem = std::mem::take(&mut self.allocated_mem);
        self.allocator.destroy_buffer(self.buffer, allocated_mem);
    }
}

impl Deref for Buffer {
    type Target = vk::Buffer;
    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl Buffer {
    pub fn new_sized(
        device: &Device,
        allocator: &Allocator,
        label: &str,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        size: u64,
    ) -> Result<Self, GpuError> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size.max(1))
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocated_mem = match allocator.allocate_memory(&AllocationCreateDesc {
            name: label,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(mem) => mem,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        // from here on Drop releases both the buffer and its memory
        let buffer = Self {
            allocator: allocator.clone(),
            buffer,
            allocated_mem,
            size,
        };
        unsafe {
            device.bind_buffer_memory(
                buffer.buffer,
                buffer.allocated_mem.memory(),
                buffer.allocated_mem.offset(),
            )?
        };
        Ok(buffer)
    }

    pub fn as_raw(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Copies `data` into the mapped memory at `byte_offset`.
    pub fn write(&mut self, data: &[u8], byte_offset: u64) -> Result<(), GpuError> {
        let end = byte_offset + data.len() as u64;
        if end > self.size {
            return Err(GpuError::Backend(format!(
                "write of {} bytes at {} overflows buffer of {} bytes",
                data.len(),
                byte_offset,
                self.size
            )));
        }
        let Some(slice) = self.allocated_mem.mapped_slice_mut() else {
            return Err(GpuError::Backend("buffer memory is not host visible".into()));
        };
        slice[byte_offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }
}
