//! The execution and synchronization substrate the renderer runs on.
//!
//! Everything the frame loop needs from a graphics API goes through [`Gpu`]: buffer and texture
//! creation, command submission, presentation and a monotonically increasing completion fence.
//! Resources are referred to by small copyable ids so command lists can be recorded on the CPU
//! without borrowing backend objects.

mod command_list;
pub use command_list::*;

mod headless;
pub use headless::*;

use std::time::Duration;
use thiserror::Error;

/// A point on the GPU completion timeline. `0` means "never submitted".
pub type FenceValue = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandAllocatorId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Uniform,
    Vertex,
    Index,
}

#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    R32Float,
    Rgba8Unorm,
}

impl TextureFormat {
    pub fn texel_size(&self) -> u64 {
        match self {
            TextureFormat::R32Float => 4,
            TextureFormat::Rgba8Unorm => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureDesc {
    pub fn size_bytes(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.texel_size()
    }
}

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("gpu device lost")]
    DeviceLost,
    #[error("out of gpu memory while creating {0}")]
    OutOfMemory(String),
    #[error("timed out after {waited:?} waiting for fence value {value} (completed: {completed})")]
    Timeout {
        value: FenceValue,
        completed: FenceValue,
        waited: Duration,
    },
    #[error("fence value {value} was never signalled (last signalled: {last_signaled})")]
    NeverSignaled {
        value: FenceValue,
        last_signaled: FenceValue,
    },
    #[error("failed to create {label}: {reason}")]
    ResourceCreation { label: String, reason: String },
    #[error("gpu backend error: {0}")]
    Backend(String),
}

/// A CPU-writable, persistently mapped buffer the GPU reads directly.
///
/// There is intentionally no read-back: the GPU is the only reader.
pub trait HostBuffer {
    fn id(&self) -> BufferId;

    fn size(&self) -> u64;

    /// Copies `bytes` to `offset`. The range must lie inside the buffer.
    fn write(&mut self, offset: u64, bytes: &[u8]);
}

pub trait Gpu {
    /// Short human readable backend name, used in logs.
    fn name(&self) -> String;

    /// Required start alignment of each record in a constant buffer.
    fn min_uniform_buffer_alignment(&self) -> u64;

    fn create_host_buffer(&self, desc: &BufferDesc) -> Result<Box<dyn HostBuffer>, GpuError>;

    /// Creates a GPU-resident buffer and fills it with `contents` through a one-shot copy.
    fn create_device_buffer(&self, desc: &BufferDesc, contents: &[u8])
        -> Result<BufferId, GpuError>;

    fn destroy_buffer(&self, id: BufferId);

    /// Creates a sampled 2D texture in GPU-resident memory and uploads `texels` into it.
    fn create_texture(&self, desc: &TextureDesc, texels: &[u8]) -> Result<TextureId, GpuError>;

    fn destroy_texture(&self, id: TextureId);

    fn create_command_allocator(&self) -> Result<CommandAllocatorId, GpuError>;

    /// Recycles the memory of an allocator. The last submission recorded from it must have
    /// completed.
    fn reset_command_allocator(&self, id: CommandAllocatorId) -> Result<(), GpuError>;

    fn destroy_command_allocator(&self, id: CommandAllocatorId);

    fn submit(&self, commands: &CommandList) -> Result<(), GpuError>;

    fn present(&self) -> Result<(), GpuError>;

    /// Enqueues a signal of the completion fence to `value` after all prior submissions.
    fn signal(&self, value: FenceValue) -> Result<(), GpuError>;

    /// The highest fence value the GPU has reached.
    fn completed_value(&self) -> Result<FenceValue, GpuError>;

    /// Blocks until the completion fence reaches `value`. `None` waits forever.
    fn wait_for_value(&self, value: FenceValue, timeout: Option<Duration>)
        -> Result<(), GpuError>;
}
