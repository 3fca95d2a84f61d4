//! A simulated GPU that lives entirely in host memory.
//!
//! It executes nothing, but it keeps the same bookkeeping a real queue forces on the caller: every
//! submission is stamped with the fence value signalled after it, and the fence only advances
//! according to the configured [`CompletionMode`]. Any CPU access that would race an unfinished
//! submission is recorded as a [`Hazard`] instead of corrupting memory, which is what the tests
//! assert on.

use super::{
    BufferDesc, BufferId, CommandAllocatorId, CommandList, FenceValue, Gpu, GpuError, HostBuffer,
    TextureDesc, TextureId,
};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Alignment of constant buffer records on the reference hardware.
pub const DEFAULT_UNIFORM_ALIGNMENT: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Work finishes the moment its fence value is signalled.
    Immediate,
    /// Work only finishes when the CPU waits for it, so the CPU always runs as far ahead as the
    /// caller allows.
    OnDemand,
    /// The fence only moves through [`HeadlessGpu::complete_up_to`]. Waits block.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardKind {
    WriteInFlight,
    ResetInFlight,
    DestroyInFlight,
    UseOfDestroyed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hazard {
    pub kind: HazardKind,
    pub resource: String,
    pub last_use: FenceValue,
    pub completed: FenceValue,
}

/// One-shot failure injection for resource creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    HostBuffer,
    DeviceBuffer,
    Texture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ResourceKey {
    Buffer(u64),
    Texture(u64),
    Allocator(u64),
}

struct ResourceRecord {
    label: String,
    last_use: FenceValue,
    contents: Vec<u8>,
}

struct HeadlessState {
    mode: CompletionMode,
    completed: FenceValue,
    last_signaled: FenceValue,
    next_id: u64,
    resources: HashMap<ResourceKey, ResourceRecord>,
    pending: Vec<ResourceKey>,
    hazards: Vec<Hazard>,
    last_submission: Option<CommandList>,
    submission_count: u64,
    present_count: u64,
    fail_points: Vec<FailPoint>,
}

impl HeadlessState {
    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn take_fail_point(&mut self, point: FailPoint) -> bool {
        if let Some(idx) = self.fail_points.iter().position(|p| *p == point) {
            self.fail_points.remove(idx);
            true
        } else {
            false
        }
    }

    fn insert(&mut self, key: ResourceKey, label: &str, contents: Vec<u8>) {
        self.resources.insert(
            key,
            ResourceRecord {
                label: label.to_owned(),
                last_use: 0,
                contents,
            },
        );
    }

    /// Records a hazard if `key` is still referenced by unfinished work.
    fn check_idle(&mut self, key: ResourceKey, kind: HazardKind) {
        let completed = self.completed;
        let in_flight = self.pending.contains(&key);
        if let Some(record) = self.resources.get(&key) {
            if record.last_use > completed || in_flight {
                let hazard = Hazard {
                    kind,
                    resource: record.label.clone(),
                    last_use: record.last_use,
                    completed,
                };
                log::error!("gpu hazard: {:?}", hazard);
                self.hazards.push(hazard);
            }
        }
    }

    fn remove(&mut self, key: ResourceKey) {
        self.check_idle(key, HazardKind::DestroyInFlight);
        self.resources.remove(&key);
    }
}

struct HeadlessInner {
    state: Mutex<HeadlessState>,
    completion: Condvar,
    uniform_alignment: u64,
}

#[derive(Clone)]
pub struct HeadlessGpu(Arc<HeadlessInner>);

impl HeadlessGpu {
    pub fn new(mode: CompletionMode) -> Self {
        Self::with_uniform_alignment(mode, DEFAULT_UNIFORM_ALIGNMENT)
    }

    pub fn with_uniform_alignment(mode: CompletionMode, uniform_alignment: u64) -> Self {
        let state = HeadlessState {
            mode,
            completed: 0,
            last_signaled: 0,
            next_id: 1,
            resources: HashMap::new(),
            pending: Vec::new(),
            hazards: Vec::new(),
            last_submission: None,
            submission_count: 0,
            present_count: 0,
            fail_points: Vec::new(),
        };
        Self(Arc::new(HeadlessInner {
            state: Mutex::new(state),
            completion: Condvar::new(),
            uniform_alignment,
        }))
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        // the state stays consistent across a panicking test thread, so poisoning is ignored
        self.0
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lets the simulated GPU finish everything up to `value`, clamped to what was signalled.
    pub fn complete_up_to(&self, value: FenceValue) {
        let mut state = self.state();
        let target = value.min(state.last_signaled);
        if target > state.completed {
            log::trace!("headless gpu completed up to {}", target);
            state.completed = target;
        }
        drop(state);
        self.0.completion.notify_all();
    }

    pub fn complete_all(&self) {
        let last = self.state().last_signaled;
        self.complete_up_to(last);
    }

    pub fn last_signaled(&self) -> FenceValue {
        self.state().last_signaled
    }

    pub fn hazards(&self) -> Vec<Hazard> {
        self.state().hazards.clone()
    }

    pub fn submission_count(&self) -> u64 {
        self.state().submission_count
    }

    pub fn present_count(&self) -> u64 {
        self.state().present_count
    }

    pub fn last_submission(&self) -> Option<CommandList> {
        self.state().last_submission.clone()
    }

    /// What the GPU would read from a buffer, for inspecting uploads in tests.
    pub fn buffer_contents(&self, id: BufferId) -> Option<Vec<u8>> {
        self.state()
            .resources
            .get(&ResourceKey::Buffer(id.0))
            .map(|record| record.contents.clone())
    }

    pub fn texture_contents(&self, id: TextureId) -> Option<Vec<u8>> {
        self.state()
            .resources
            .get(&ResourceKey::Texture(id.0))
            .map(|record| record.contents.clone())
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state()
            .resources
            .keys()
            .filter(|key| matches!(key, ResourceKey::Buffer(_)))
            .count()
    }

    pub fn live_texture_count(&self) -> usize {
        self.state()
            .resources
            .keys()
            .filter(|key| matches!(key, ResourceKey::Texture(_)))
            .count()
    }

    /// Makes the next creation of the given kind fail.
    pub fn fail_next(&self, point: FailPoint) {
        self.state().fail_points.push(point);
    }
}

struct HeadlessHostBuffer {
    gpu: HeadlessGpu,
    id: BufferId,
    size: u64,
}

impl HostBuffer for HeadlessHostBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) {
        let end = offset + bytes.len() as u64;
        assert!(
            end <= self.size,
            "write of {} bytes at {} overflows host buffer of {} bytes",
            bytes.len(),
            offset,
            self.size
        );
        let mut state = self.gpu.state();
        let key = ResourceKey::Buffer(self.id.0);
        state.check_idle(key, HazardKind::WriteInFlight);
        if let Some(record) = state.resources.get_mut(&key) {
            record.contents[offset as usize..end as usize].copy_from_slice(bytes);
        }
    }
}

impl Drop for HeadlessHostBuffer {
    fn drop(&mut self) {
        self.gpu.state().remove(ResourceKey::Buffer(self.id.0));
    }
}

impl Gpu for HeadlessGpu {
    fn name(&self) -> String {
        "headless".to_owned()
    }

    fn min_uniform_buffer_alignment(&self) -> u64 {
        self.0.uniform_alignment
    }

    fn create_host_buffer(&self, desc: &BufferDesc) -> Result<Box<dyn HostBuffer>, GpuError> {
        let mut state = self.state();
        if state.take_fail_point(FailPoint::HostBuffer) {
            return Err(GpuError::OutOfMemory(desc.label.clone()));
        }
        let id = state.allocate_id();
        state.insert(
            ResourceKey::Buffer(id),
            &desc.label,
            vec![0; desc.size as usize],
        );
        drop(state);
        Ok(Box::new(HeadlessHostBuffer {
            gpu: self.clone(),
            id: BufferId(id),
            size: desc.size,
        }))
    }

    fn create_device_buffer(
        &self,
        desc: &BufferDesc,
        contents: &[u8],
    ) -> Result<BufferId, GpuError> {
        if contents.len() as u64 > desc.size {
            return Err(GpuError::ResourceCreation {
                label: desc.label.clone(),
                reason: format!(
                    "{} bytes of contents exceed buffer size {}",
                    contents.len(),
                    desc.size
                ),
            });
        }
        let mut state = self.state();
        if state.take_fail_point(FailPoint::DeviceBuffer) {
            return Err(GpuError::OutOfMemory(desc.label.clone()));
        }
        let id = state.allocate_id();
        let mut data = vec![0; desc.size as usize];
        data[..contents.len()].copy_from_slice(contents);
        state.insert(ResourceKey::Buffer(id), &desc.label, data);
        Ok(BufferId(id))
    }

    fn destroy_buffer(&self, id: BufferId) {
        self.state().remove(ResourceKey::Buffer(id.0));
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
        let mut state = self.state();
        if state.take_fail_point(FailPoint::Texture) {
            return Err(GpuError::OutOfMemory(desc.label.clone()));
        }
        let id = state.allocate_id();
        state.insert(ResourceKey::Texture(id), &desc.label, texels.to_vec());
        Ok(TextureId(id))
    }

    fn destroy_texture(&self, id: TextureId) {
        self.state().remove(ResourceKey::Texture(id.0));
    }

    fn create_command_allocator(&self) -> Result<CommandAllocatorId, GpuError> {
        let mut state = self.state();
        let id = state.allocate_id();
        state.insert(
            ResourceKey::Allocator(id),
            &format!("command allocator {}", id),
            Vec::new(),
        );
        Ok(CommandAllocatorId(id))
    }

    fn reset_command_allocator(&self, id: CommandAllocatorId) -> Result<(), GpuError> {
        self.state()
            .check_idle(ResourceKey::Allocator(id.0), HazardKind::ResetInFlight);
        Ok(())
    }

    fn destroy_command_allocator(&self, id: CommandAllocatorId) {
        self.state().remove(ResourceKey::Allocator(id.0));
    }

    fn submit(&self, commands: &CommandList) -> Result<(), GpuError> {
        let mut state = self.state();
        let keys = std::iter::once(ResourceKey::Allocator(commands.allocator().0))
            .chain(commands.referenced_buffers().map(|b| ResourceKey::Buffer(b.0)))
            .chain(
                commands
                    .referenced_textures()
                    .map(|t| ResourceKey::Texture(t.0)),
            )
            .collect::<Vec<_>>();

        for key in keys {
            if !state.resources.contains_key(&key) {
                let hazard = Hazard {
                    kind: HazardKind::UseOfDestroyed,
                    resource: format!("{:?}", key),
                    last_use: 0,
                    completed: state.completed,
                };
                log::error!("gpu hazard: {:?}", hazard);
                state.hazards.push(hazard);
                continue;
            }
            if !state.pending.contains(&key) {
                state.pending.push(key);
            }
        }

        state.submission_count += 1;
        state.last_submission = Some(commands.clone());
        log::trace!(
            "headless gpu: submission #{} with {} draws",
            state.submission_count,
            commands.draw_count()
        );
        Ok(())
    }

    fn present(&self) -> Result<(), GpuError> {
        self.state().present_count += 1;
        Ok(())
    }

    fn signal(&self, value: FenceValue) -> Result<(), GpuError> {
        let mut state = self.state();
        if value <= state.last_signaled {
            return Err(GpuError::Backend(format!(
                "fence must increase monotonically: {} after {}",
                value, state.last_signaled
            )));
        }
        let pending = std::mem::take(&mut state.pending);
        for key in pending {
            if let Some(record) = state.resources.get_mut(&key) {
                record.last_use = value;
            }
        }
        state.last_signaled = value;
        if state.mode == CompletionMode::Immediate {
            state.completed = value;
        }
        drop(state);
        self.0.completion.notify_all();
        Ok(())
    }

    fn completed_value(&self) -> Result<FenceValue, GpuError> {
        Ok(self.state().completed)
    }

    fn wait_for_value(
        &self,
        value: FenceValue,
        timeout: Option<Duration>,
    ) -> Result<(), GpuError> {
        let started = Instant::now();
        let mut state = self.state();
        loop {
            if state.completed >= value {
                return Ok(());
            }
            if state.mode != CompletionMode::Manual {
                if value > state.last_signaled {
                    return Err(GpuError::NeverSignaled {
                        value,
                        last_signaled: state.last_signaled,
                    });
                }
                state.completed = value;
                self.0.completion.notify_all();
                return Ok(());
            }

            state = match timeout {
                None => self
                    .0
                    .completion
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(limit) => {
                    let waited = started.elapsed();
                    if waited >= limit {
                        return Err(GpuError::Timeout {
                            value,
                            completed: state.completed,
                            waited,
                        });
                    }
                    self.0
                        .completion
                        .wait_timeout(state, limit - waited)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::BufferUsage;

    fn uniform_desc(size: u64) -> BufferDesc {
        BufferDesc {
            label: "test".into(),
            size,
            usage: BufferUsage::Uniform,
        }
    }

    #[test]
    fn write_while_in_flight_is_a_hazard() {
        let gpu = HeadlessGpu::new(CompletionMode::Manual);
        let mut buffer = gpu.create_host_buffer(&uniform_desc(256)).unwrap();
        let allocator = gpu.create_command_allocator().unwrap();

        let mut list = CommandList::new(allocator);
        list.push(crate::gpu::Command::BindConstants {
            slot: crate::gpu::ConstantSlot::Pass,
            buffer: buffer.id(),
            offset: 0,
            size: 256,
        });
        gpu.submit(&list).unwrap();
        gpu.signal(1).unwrap();

        buffer.write(0, &[1, 2, 3, 4]);
        let hazards = gpu.hazards();
        assert_eq!(hazards.len(), 1);
        assert_eq!(hazards[0].kind, HazardKind::WriteInFlight);
        assert_eq!(hazards[0].last_use, 1);

        gpu.complete_up_to(1);
        buffer.write(0, &[5, 6, 7, 8]);
        assert_eq!(gpu.hazards().len(), 1);
        assert_eq!(&gpu.buffer_contents(buffer.id()).unwrap()[..4], &[5, 6, 7, 8]);
    }

    #[test]
    fn on_demand_completes_only_when_waited() {
        let gpu = HeadlessGpu::new(CompletionMode::OnDemand);
        gpu.signal(1).unwrap();
        gpu.signal(2).unwrap();
        assert_eq!(gpu.completed_value().unwrap(), 0);

        gpu.wait_for_value(1, None).unwrap();
        assert_eq!(gpu.completed_value().unwrap(), 1);

        let err = gpu.wait_for_value(5, None).unwrap_err();
        assert!(matches!(err, GpuError::NeverSignaled { value: 5, .. }));
    }

    #[test]
    fn manual_wait_times_out() {
        let gpu = HeadlessGpu::new(CompletionMode::Manual);
        gpu.signal(1).unwrap();
        let err = gpu
            .wait_for_value(1, Some(Duration::from_millis(10)))
            .unwrap_err();
        assert!(matches!(err, GpuError::Timeout { value: 1, .. }));
    }

    #[test]
    fn fence_must_increase() {
        let gpu = HeadlessGpu::new(CompletionMode::Immediate);
        gpu.signal(3).unwrap();
        assert!(gpu.signal(3).is_err());
        assert_eq!(gpu.completed_value().unwrap(), 3);
    }

    #[test]
    fn injected_failure_fires_once() {
        let gpu = HeadlessGpu::new(CompletionMode::Immediate);
        gpu.fail_next(FailPoint::Texture);
        let desc = TextureDesc {
            label: "height".into(),
            width: 1,
            height: 1,
            format: crate::gpu::TextureFormat::R32Float,
        };
        assert!(gpu.create_texture(&desc, &[0; 4]).is_err());
        assert!(gpu.create_texture(&desc, &[0; 4]).is_ok());
        assert_eq!(gpu.live_texture_count(), 1);
    }
}
