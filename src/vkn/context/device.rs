use super::{instance::Instance, physical_device::PhysicalDevice, Queue};
use crate::gpu::GpuError;
use ash::vk;
use std::sync::Arc;

struct DeviceInner {
    device: ash::Device,
    // destroyed after the device
    _instance: Instance,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                log::error!("device_wait_idle failed during teardown: {}", err);
            }
            self.device.destroy_device(None);
        }
    }
}

#[derive(Clone)]
pub struct Device(Arc<DeviceInner>);

impl std::ops::Deref for Device {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.0.device
    }
}

impl Device {
    pub fn new(instance: &Instance, physical_device: &PhysicalDevice) -> Result<Self, GpuError> {
        let queue_priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.queue_family_index())
            .queue_priorities(&queue_priorities)];

        // the frame fence is a timeline semaphore
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .push_next(&mut features12);

        let device = unsafe {
            instance.create_device(physical_device.as_raw(), &device_create_info, None)?
        };
        Ok(Self(Arc::new(DeviceInner {
            device,
            _instance: instance.clone(),
        })))
    }

    pub fn as_raw(&self) -> &ash::Device {
        &self.0.device
    }

    pub fn wait_queue_idle(&self, queue: &Queue) -> Result<(), GpuError> {
        unsafe { self.as_raw().queue_wait_idle(queue.as_raw())? };
        Ok(())
    }

    /// Get a queue from the device, only the first queue of the family is used.
    pub fn get_queue(&self, queue_family_index: u32) -> Queue {
        let queue = unsafe { self.as_raw().get_device_queue(queue_family_index, 0) };
        Queue::new(queue)
    }
}
