use super::{Device, Instance, PhysicalDevice};
use crate::gpu::GpuError;
use ash::vk;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, Allocator as GpuAllocator, AllocatorCreateDesc},
    AllocationError,
};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Allocator {
    // dropped before `device` so the last clone frees its memory blocks on a live device
    allocator: Arc<Mutex<GpuAllocator>>,
    device: Device,
}

impl Allocator {
    pub fn new(
        instance: &Instance,
        physical_device: &PhysicalDevice,
        device: &Device,
    ) -> Result<Self, GpuError> {
        let allocator = GpuAllocator::new(&AllocatorCreateDesc {
            instance: instance.as_raw().clone(),
            device: device.as_raw().clone(),
            physical_device: physical_device.as_raw(),
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|err| allocation_error("gpu allocator", err))?;
        Ok(Self {
            allocator: Arc::new(Mutex::new(allocator)),
            device: device.clone(),
        })
    }

    fn get_allocator(&self) -> MutexGuard<'_, GpuAllocator> {
        self.allocator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn allocate_memory(&self, create_info: &AllocationCreateDesc) -> Result<Allocation, GpuError> {
        self.get_allocator()
            .allocate(create_info)
            .map_err(|err| allocation_error(create_info.name, err))
    }

    pub fn destroy_buffer(&self, buffer: vk::Buffer, allocation: Allocation) {
        if let Err(err) = self.get_allocator().free(allocation) {
            log::error!("failed to free buffer memory: {}", err);
        }
        unsafe { self.device.destroy_buffer(buffer, None) };
    }

    pub fn destroy_image(&self, image: vk::Image, allocation: Allocation) {
        if let Err(err) = self.get_allocator().free(allocation) {
            log::error!("failed to free image memory: {}", err);
        }
        unsafe { self.device.destroy_image(image, None) };
    }
}

fn allocation_error(label: &str, err: AllocationError) -> GpuError {
    match err {
        AllocationError::OutOfMemory => GpuError::OutOfMemory(label.to_owned()),
        other => GpuError::ResourceCreation {
            label: label.to_owned(),
            reason: other.to_string(),
        },
    }
}
