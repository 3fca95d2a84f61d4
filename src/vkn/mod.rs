//! Headless Vulkan backend for [`crate::gpu::Gpu`].

mod context;
pub use context::*;

mod allocator;
pub use allocator::*;

mod buffer;
pub use buffer::*;

mod command;
pub use command::*;

mod image;
pub use image::*;

mod timeline;
pub use timeline::*;

mod gpu;
pub use gpu::*;

use crate::gpu::GpuError;
use ash::vk;

impl From<vk::Result> for GpuError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => GpuError::DeviceLost,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                GpuError::OutOfMemory(format!("{:?}", result))
            }
            other => GpuError::Backend(format!("vulkan call failed: {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulkan_results_map_to_gpu_errors() {
        assert!(matches!(
            GpuError::from(vk::Result::ERROR_DEVICE_LOST),
            GpuError::DeviceLost
        ));
        assert!(matches!(
            GpuError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            GpuError::OutOfMemory(_)
        ));
        assert!(matches!(
            GpuError::from(vk::Result::ERROR_INITIALIZATION_FAILED),
            GpuError::Backend(_)
        ));
    }
}
