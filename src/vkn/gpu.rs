use super::{
    execute_one_time_command, Allocator, Buffer, CommandBuffer, CommandPool, Device, Image, Queue,
    TimelineSemaphore, VulkanContext, VulkanContextDesc, WaitResult,
};
use crate::gpu::{
    BufferDesc, BufferId, BufferUsage, Command, CommandAllocatorId, CommandList, FenceValue, Gpu,
    GpuError, HostBuffer, TextureDesc, TextureId,
};
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::{Duration, Instant},
};

/// Translates the recorded passes into Vulkan commands.
///
/// Pipelines, render targets and the swapchain belong to the implementor; the backend only
/// provides the command buffer and resolves resource ids.
pub trait PassEncoder: Send {
    fn encode(
        &mut self,
        device: &Device,
        cmdbuf: &CommandBuffer,
        commands: &[Command],
        resources: &ResourceView<'_>,
    ) -> Result<(), GpuError>;

    fn present(&mut self, queue: &Queue) -> Result<(), GpuError>;
}

/// Read access to the raw handles behind resource ids during encoding.
pub struct ResourceView<'a> {
    table: &'a ResourceTable,
}

impl ResourceView<'_> {
    pub fn buffer(&self, id: BufferId) -> Option<vk::Buffer> {
        self.table.buffer_handles.get(&id.0).copied()
    }

    pub fn image(&self, id: TextureId) -> Option<vk::Image> {
        self.table.images.get(&id.0).map(|image| image.as_raw())
    }
}

struct FrameCommands {
    pool: CommandPool,
    cmdbuf: CommandBuffer,
}

#[derive(Default)]
struct ResourceTable {
    next_id: u64,
    // raw handles of every live buffer, host-visible ones included
    buffer_handles: HashMap<u64, vk::Buffer>,
    device_buffers: HashMap<u64, Buffer>,
    images: HashMap<u64, Image>,
    allocators: HashMap<u64, FrameCommands>,
}

impl ResourceTable {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct VulkanInner {
    // resources go first so they are released before the device and allocator they came from
    resources: Mutex<ResourceTable>,
    encoder: Mutex<Option<Box<dyn PassEncoder>>>,
    timeline: TimelineSemaphore,
    transfer_pool: CommandPool,
    allocator: Allocator,
    queue: Mutex<Queue>,
    last_signaled: AtomicU64,
    min_uniform_alignment: u64,
    device_name: String,
    queue_family_index: u32,
    context: VulkanContext,
}

/// [`Gpu`] on a headless Vulkan 1.2 device with a timeline semaphore as the completion fence.
#[derive(Clone)]
pub struct VulkanGpu(Arc<VulkanInner>);

impl VulkanGpu {
    pub fn new(desc: &VulkanContextDesc) -> Result<Self, GpuError> {
        let context = VulkanContext::new(desc)?;
        let allocator = Allocator::new(
            &context.instance,
            &context.physical_device,
            &context.device,
        )?;
        let transfer_pool = CommandPool::new(&context.device, context.queue_family_index())?;
        let timeline = TimelineSemaphore::new(&context.device, 0)?;
        let min_uniform_alignment = context
            .physical_device
            .limits()
            .min_uniform_buffer_offset_alignment
            .max(1);

        Ok(Self(Arc::new(VulkanInner {
            resources: Mutex::new(ResourceTable::default()),
            encoder: Mutex::new(None),
            timeline,
            transfer_pool,
            allocator,
            queue: Mutex::new(context.queue),
            last_signaled: AtomicU64::new(0),
            min_uniform_alignment,
            device_name: context.physical_device.name().to_owned(),
            queue_family_index: context.queue_family_index(),
            context,
        })))
    }

    /// Hands draw translation and presentation to `encoder`. Without one, submissions carry
    /// empty command buffers and presenting does nothing.
    pub fn set_pass_encoder(&self, encoder: Box<dyn PassEncoder>) {
        *lock(&self.0.encoder) = Some(encoder);
    }

    pub fn device(&self) -> &Device {
        &self.0.context.device
    }

    fn resources(&self) -> MutexGuard<'_, ResourceTable> {
        lock(&self.0.resources)
    }

    fn queue(&self) -> Queue {
        *lock(&self.0.queue)
    }

    fn upload_device_buffer(&self, desc: &BufferDesc, contents: &[u8]) -> Result<Buffer, GpuError> {
        let device = self.device();
        let usage = vk_buffer_usage(desc.usage) | vk::BufferUsageFlags::TRANSFER_DST;
        let buffer = Buffer::new_sized(
            device,
            &self.0.allocator,
            &desc.label,
            usage,
            MemoryLocation::GpuOnly,
            desc.size,
        )?;
        if contents.is_empty() {
            return Ok(buffer);
        }

        let mut staging = Buffer::new_sized(
            device,
            &self.0.allocator,
            "buffer staging",
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            contents.len() as u64,
        )?;
        staging.write(contents, 0)?;

        let queue = lock(&self.0.queue);
        execute_one_time_command(device, &self.0.transfer_pool, &queue, |cmdbuf| {
            let region = vk::BufferCopy::default().size(contents.len() as u64);
            unsafe {
                device.cmd_copy_buffer(cmdbuf.as_raw(), staging.as_raw(), buffer.as_raw(), &[region])
            };
        })?;
        Ok(buffer)
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn vk_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
    }
}

struct VulkanHostBuffer {
    gpu: VulkanGpu,
    id: BufferId,
    buffer: Buffer,
}

impl HostBuffer for VulkanHostBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn size(&self) -> u64 {
        self.buffer.size()
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) {
        if let Err(err) = self.buffer.write(bytes, offset) {
            panic!("host buffer {} write failed: {}", self.id.0, err);
        }
    }
}

impl Drop for VulkanHostBuffer {
    fn drop(&mut self) {
        self.gpu.resources().buffer_handles.remove(&self.id.0);
    }
}

impl Gpu for VulkanGpu {
    fn name(&self) -> String {
        format!("vulkan ({})", self.0.device_name)
    }

    fn min_uniform_buffer_alignment(&self) -> u64 {
        self.0.min_uniform_alignment
    }

    fn create_host_buffer(&self, desc: &BufferDesc) -> Result<Box<dyn HostBuffer>, GpuError> {
        let buffer = Buffer::new_sized(
            self.device(),
            &self.0.allocator,
            &desc.label,
            vk_buffer_usage(desc.usage),
            MemoryLocation::CpuToGpu,
            desc.size,
        )?;
        let mut resources = self.resources();
        let id = resources.allocate_id();
        resources.buffer_handles.insert(id, buffer.as_raw());
        Ok(Box::new(VulkanHostBuffer {
            gpu: self.clone(),
            id: BufferId(id),
            buffer,
        }))
    }

    fn create_device_buffer(
        &self,
        desc: &BufferDesc,
        contents: &[u8],
    ) -> Result<BufferId, GpuError> {
        let buffer = self.upload_device_buffer(desc, contents)?;
        let mut resources = self.resources();
        let id = resources.allocate_id();
        resources.buffer_handles.insert(id, buffer.as_raw());
        resources.device_buffers.insert(id, buffer);
        Ok(BufferId(id))
    }

    fn destroy_buffer(&self, id: BufferId) {
        let mut resources = self.resources();
        resources.buffer_handles.remove(&id.0);
        if resources.device_buffers.remove(&id.0).is_none() {
            log::warn!("destroy of unknown buffer {}", id.0);
        }
    }

    fn create_texture(&self, desc: &TextureDesc, texels: &[u8]) -> Result<TextureId, GpuError> {
        if texels.len() as u64 != desc.size_bytes() {
            return Err(GpuError::ResourceCreation {
                label: desc.label.clone(),
                reason: format!(
                    "expected {} bytes of texels, got {}",
                    desc.size_bytes(),
                    texels.len()
                ),
            });
        }
        let image = Image::new(
            self.device(),
            &self.0.allocator,
            &desc.label,
            [desc.width, desc.height],
            desc.format,
        )?;
        {
            let queue = lock(&self.0.queue);
            image.fill_with_raw_u8(self.device(), &queue, &self.0.transfer_pool, texels)?;
        }
        let mut resources = self.resources();
        let id = resources.allocate_id();
        resources.images.insert(id, image);
        Ok(TextureId(id))
    }

    fn destroy_texture(&self, id: TextureId) {
        if self.resources().images.remove(&id.0).is_none() {
            log::warn!("destroy of unknown texture {}", id.0);
        }
    }

    fn create_command_allocator(&self) -> Result<CommandAllocatorId, GpuError> {
        let pool = CommandPool::new(self.device(), self.0.queue_family_index)?;
        let cmdbuf = CommandBuffer::new(self.device(), &pool)?;
        let mut resources = self.resources();
        let id = resources.allocate_id();
        resources.allocators.insert(id, FrameCommands { pool, cmdbuf });
        Ok(CommandAllocatorId(id))
    }

    fn reset_command_allocator(&self, id: CommandAllocatorId) -> Result<(), GpuError> {
        let resources = self.resources();
        let frame = resources
            .allocators
            .get(&id.0)
            .ok_or_else(|| GpuError::Backend(format!("unknown command allocator {}", id.0)))?;
        frame.pool.reset()
    }

    fn destroy_command_allocator(&self, id: CommandAllocatorId) {
        self.resources().allocators.remove(&id.0);
    }

    fn submit(&self, commands: &CommandList) -> Result<(), GpuError> {
        let resources = self.resources();
        let frame = resources
            .allocators
            .get(&commands.allocator().0)
            .ok_or_else(|| {
                GpuError::Backend(format!(
                    "unknown command allocator {}",
                    commands.allocator().0
                ))
            })?;

        frame.cmdbuf.begin(true)?;
        match lock(&self.0.encoder).as_mut() {
            Some(encoder) => encoder.encode(
                self.device(),
                &frame.cmdbuf,
                commands.commands(),
                &ResourceView { table: &*resources },
            )?,
            None => log::trace!(
                "no pass encoder, skipping {} draws",
                commands.draw_count()
            ),
        }
        frame.cmdbuf.end()?;
        frame.cmdbuf.submit(&lock(&self.0.queue))
    }

    fn present(&self) -> Result<(), GpuError> {
        match lock(&self.0.encoder).as_mut() {
            Some(encoder) => encoder.present(&self.queue()),
            None => Ok(()),
        }
    }

    fn signal(&self, value: FenceValue) -> Result<(), GpuError> {
        let last = self.0.last_signaled.load(Ordering::Acquire);
        if value <= last {
            return Err(GpuError::Backend(format!(
                "fence must increase monotonically: {} after {}",
                value, last
            )));
        }
        self.0.timeline.signal_on(&lock(&self.0.queue), value)?;
        self.0.last_signaled.store(value, Ordering::Release);
        Ok(())
    }

    fn completed_value(&self) -> Result<FenceValue, GpuError> {
        self.0.timeline.value()
    }

    fn wait_for_value(
        &self,
        value: FenceValue,
        timeout: Option<Duration>,
    ) -> Result<(), GpuError> {
        let last_signaled = self.0.last_signaled.load(Ordering::Acquire);
        if value > last_signaled {
            return Err(GpuError::NeverSignaled {
                value,
                last_signaled,
            });
        }
        let started = Instant::now();
        match self.0.timeline.wait(value, timeout)? {
            WaitResult::Reached => Ok(()),
            WaitResult::TimedOut => Err(GpuError::Timeout {
                value,
                completed: self.0.timeline.value()?,
                waited: started.elapsed(),
            }),
        }
    }
}
