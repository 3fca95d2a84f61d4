use super::{Device, Queue};
use crate::gpu::GpuError;
use ash::vk;
use std::sync::Arc;

struct CommandPoolInner {
    device: Device,
    command_pool: vk::CommandPool,
}

impl Drop for CommandPoolInner {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// A `VkCommandPool`. The per-frame pools play the role of command allocators.
#[derive(Clone)]
pub struct CommandPool(Arc<CommandPoolInner>);

impl std::ops::Deref for CommandPool {
    type Target = vk::CommandPool;
    fn deref(&self) -> &Self::Target {
        &self.0.command_pool
    }
}

impl CommandPool {
    pub fn new(device: &Device, queue_family_index: u32) -> Result<Self, GpuError> {
        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool = unsafe { device.create_command_pool(&command_pool_info, None)? };
        Ok(Self(Arc::new(CommandPoolInner {
            device: device.clone(),
            command_pool,
        })))
    }

    pub fn as_raw(&self) -> vk::CommandPool {
        self.0.command_pool
    }

    /// Returns every command buffer of the pool to the initial state.
    pub fn reset(&self) -> Result<(), GpuError> {
        unsafe {
            self.0
                .device
                .reset_command_pool(self.0.command_pool, vk::CommandPoolResetFlags::empty())?
        };
        Ok(())
    }
}

struct CommandBufferInner {
    device: Device,
    command_pool: CommandPool,
    command_buffer: vk::CommandBuffer,
}

impl Drop for CommandBufferInner {
    fn drop(&mut self) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pool.as_raw(), &[self.command_buffer]);
        }
    }
}

#[derive(Clone)]
pub struct CommandBuffer(Arc<CommandBufferInner>);

impl std::ops::Deref for CommandBuffer {
    type Target = vk::CommandBuffer;
    fn deref(&self) -> &Self::Target {
        &self.0.command_buffer
    }
}

impl CommandBuffer {
    pub fn new(device: &Device, command_pool: &CommandPool) -> Result<Self, GpuError> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(command_pool.as_raw())
            .command_buffer_count(1);
        let command_buffer = unsafe { device.allocate_command_buffers(&allocate_info)? }
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::Backend("driver returned no command buffer".into()))?;
        Ok(Self(Arc::new(CommandBufferInner {
            device: device.clone(),
            command_pool: command_pool.clone(),
            command_buffer,
        })))
    }

    pub fn as_raw(&self) -> vk::CommandBuffer {
        self.0.command_buffer
    }

    pub fn begin(&self, is_onetime: bool) -> Result<(), GpuError> {
        let flags = if is_onetime {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe {
            self.0
                .device
                .begin_command_buffer(self.0.command_buffer, &begin_info)?
        };
        Ok(())
    }

    pub fn end(&self) -> Result<(), GpuError> {
        unsafe { self.0.device.end_command_buffer(self.0.command_buffer)? };
        Ok(())
    }

    pub fn submit(&self, queue: &Queue) -> Result<(), GpuError> {
        let command_buffers = [self.as_raw()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.0
                .device
                .queue_submit(queue.as_raw(), &[submit_info], vk::Fence::null())?
        };
        Ok(())
    }
}

/// Records `executor` into a fresh command buffer, submits it and waits for the queue to idle.
pub fn execute_one_time_command<R, F: FnOnce(&CommandBuffer) -> R>(
    device: &Device,
    pool: &CommandPool,
    queue: &Queue,
    executor: F,
) -> Result<R, GpuError> {
    let command_buffer = CommandBuffer::new(device, pool)?;

    command_buffer.begin(true)?;
    let result = executor(&command_buffer);
    command_buffer.end()?;

    command_buffer.submit(queue)?;
    device.wait_queue_idle(queue)?;
    Ok(result)
}
