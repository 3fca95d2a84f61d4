mod instance;
pub use instance::*;

mod physical_device;
pub use physical_device::*;

mod device;
pub use device::*;

mod queue;
pub use queue::*;

use crate::gpu::GpuError;

#[derive(Debug, Clone)]
pub struct VulkanContextDesc {
    pub app_name: String,
    /// Enables `VK_LAYER_KHRONOS_validation` when it is installed.
    pub enable_validation: bool,
}

impl Default for VulkanContextDesc {
    fn default() -> Self {
        Self {
            app_name: "re-terra".into(),
            enable_validation: cfg!(not(feature = "no_validation_layer")),
        }
    }
}

/// Instance, device and the single general queue. No surface: frames end at [`crate::gpu::Gpu::present`].
pub struct VulkanContext {
    pub instance: Instance,
    pub physical_device: PhysicalDevice,
    pub device: Device,
    pub queue: Queue,
}

impl VulkanContext {
    pub fn new(desc: &VulkanContextDesc) -> Result<Self, GpuError> {
        let instance = Instance::new(&desc.app_name, desc.enable_validation)?;
        let physical_device = PhysicalDevice::new(&instance)?;
        let device = Device::new(&instance, &physical_device)?;
        let queue = device.get_queue(physical_device.queue_family_index());
        Ok(Self {
            instance,
            physical_device,
            device,
            queue,
        })
    }

    pub fn queue_family_index(&self) -> u32 {
        self.physical_device.queue_family_index()
    }
}
