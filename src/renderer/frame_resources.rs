use super::{
    MaterialConstants, ObjectConstants, PassConstants, TerrainConstants, UploadBuffer, Vertex,
    WaterConstants,
};
use crate::gpu::{CommandAllocatorId, FenceValue, Gpu, GpuError};
use std::time::Duration;

/// Capacities of the per-frame buffers.
#[derive(Debug, Clone, Copy)]
pub struct FrameResourcesDesc {
    pub pass_count: u32,
    pub object_count: u32,
    pub material_count: u32,
    pub water_count: u32,
    pub wave_vertex_count: u32,
}

/// Everything the CPU rewrites each frame, one copy per in-flight frame.
pub struct FrameResources {
    pub command_allocator: CommandAllocatorId,
    pub pass_cb: UploadBuffer<PassConstants>,
    pub object_cb: UploadBuffer<ObjectConstants>,
    pub material_cb: UploadBuffer<MaterialConstants>,
    pub water_cb: UploadBuffer<WaterConstants>,
    pub terrain_cb: UploadBuffer<TerrainConstants>,
    pub waves_vb: UploadBuffer<Vertex>,
}

impl FrameResources {
    pub fn new(gpu: &dyn Gpu, slot: usize, desc: &FrameResourcesDesc) -> Result<Self, GpuError> {
        let label = |name: &str| format!("frame {} {}", slot, name);
        Ok(Self {
            command_allocator: gpu.create_command_allocator()?,
            pass_cb: UploadBuffer::new(gpu, &label("pass cb"), desc.pass_count, true)?,
            object_cb: UploadBuffer::new(gpu, &label("object cb"), desc.object_count, true)?,
            material_cb: UploadBuffer::new(gpu, &label("material cb"), desc.material_count, true)?,
            water_cb: UploadBuffer::new(gpu, &label("water cb"), desc.water_count, true)?,
            terrain_cb: UploadBuffer::new(gpu, &label("terrain cb"), 1, true)?,
            waves_vb: UploadBuffer::new(gpu, &label("waves vb"), desc.wave_vertex_count, false)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Never submitted, or the GPU has finished the last submission that used the slot.
    Idle,
    /// Stamped with a fence value the GPU has not reached yet.
    Submitted(FenceValue),
}

struct Slot<S> {
    resources: S,
    fence: FenceValue,
}

/// Round-robin owner of the per-frame resource copies.
///
/// The ring keeps the CPU at most `len() - 1` frames ahead of the GPU: [`FrameRing::advance`]
/// blocks until the slot it is about to hand out has been released by the GPU. Fence values come
/// from one submission counter shared by every slot, so they increase strictly across the ring.
pub struct FrameRing<S> {
    slots: Vec<Slot<S>>,
    current: usize,
    submission_count: FenceValue,
    wait_timeout: Option<Duration>,
}

impl<S> FrameRing<S> {
    /// # Panics
    ///
    /// If `slots` is empty.
    pub fn new(slots: Vec<S>, wait_timeout: Option<Duration>) -> Self {
        assert!(!slots.is_empty(), "a frame ring needs at least one slot");
        let len = slots.len();
        Self {
            slots: slots
                .into_iter()
                .map(|resources| Slot {
                    resources,
                    fence: 0,
                })
                .collect(),
            // the first advance lands on slot 0
            current: len - 1,
            submission_count: 0,
            wait_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &S {
        &self.slots[self.current].resources
    }

    pub fn current_mut(&mut self) -> &mut S {
        &mut self.slots[self.current].resources
    }

    pub fn fence(&self, index: usize) -> FenceValue {
        self.slots[index].fence
    }

    pub fn submission_count(&self) -> FenceValue {
        self.submission_count
    }

    pub fn slot_state(&self, index: usize, completed: FenceValue) -> SlotState {
        let fence = self.slots[index].fence;
        if fence == 0 || completed >= fence {
            SlotState::Idle
        } else {
            SlotState::Submitted(fence)
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut S> {
        self.slots.iter_mut().map(|slot| &mut slot.resources)
    }

    /// Moves to the next slot, blocking until the GPU has finished the last submission that used
    /// it. Returns the index of the slot that is now safe to overwrite.
    pub fn advance(&mut self, gpu: &dyn Gpu) -> Result<usize, GpuError> {
        self.current = (self.current + 1) % self.slots.len();
        let fence = self.slots[self.current].fence;
        if fence != 0 {
            let completed = gpu.completed_value()?;
            if completed < fence {
                log::trace!(
                    "frame slot {} waits for fence {} (completed {})",
                    self.current,
                    fence,
                    completed
                );
                gpu.wait_for_value(fence, self.wait_timeout)?;
            }
        }
        Ok(self.current)
    }

    /// Stamps the current slot with the next submission id and signals the GPU fence to it.
    pub fn retire(&mut self, gpu: &dyn Gpu) -> Result<FenceValue, GpuError> {
        let value = self.submission_count + 1;
        gpu.signal(value)?;
        self.submission_count = value;
        self.slots[self.current].fence = value;
        Ok(value)
    }

    /// Waits until every slot is idle.
    pub fn drain(&self, gpu: &dyn Gpu) -> Result<(), GpuError> {
        let newest = self
            .slots
            .iter()
            .map(|slot| slot.fence)
            .max()
            .unwrap_or(0);
        if newest == 0 {
            return Ok(());
        }
        // fences increase monotonically, so reaching the newest one releases every slot
        if gpu.completed_value()? < newest {
            log::debug!("draining frame ring up to fence {}", newest);
            gpu.wait_for_value(newest, self.wait_timeout)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{CompletionMode, HeadlessGpu};
    use std::thread;
    use std::time::Instant;

    fn ring(len: usize, wait_timeout: Option<Duration>) -> FrameRing<()> {
        FrameRing::new(vec![(); len], wait_timeout)
    }

    #[test]
    fn slots_are_handed_out_round_robin() {
        let gpu = HeadlessGpu::new(CompletionMode::Immediate);
        let mut ring = ring(3, None);
        let mut order = Vec::new();
        for _ in 0..5 {
            order.push(ring.advance(&gpu).unwrap());
            ring.retire(&gpu).unwrap();
        }
        assert_eq!(order, vec![0, 1, 2, 0, 1]);
        assert_eq!(ring.submission_count(), 5);
        assert_eq!(ring.fence(0), 4);
        assert_eq!(ring.fence(1), 5);
        assert_eq!(ring.fence(2), 3);
    }

    #[test]
    fn first_cycle_never_waits() {
        let gpu = HeadlessGpu::new(CompletionMode::Manual);
        let mut ring = ring(3, Some(Duration::from_millis(1)));
        for expected in 0..3 {
            assert_eq!(ring.advance(&gpu).unwrap(), expected);
            assert_eq!(ring.slot_state(expected, 0), SlotState::Idle);
            ring.retire(&gpu).unwrap();
            assert_eq!(
                ring.slot_state(expected, 0),
                SlotState::Submitted(expected as FenceValue + 1)
            );
        }
    }

    #[test]
    fn advance_blocks_until_slot_is_released() {
        let gpu = HeadlessGpu::new(CompletionMode::Manual);
        let mut ring = ring(3, None);
        for _ in 0..3 {
            ring.advance(&gpu).unwrap();
            ring.retire(&gpu).unwrap();
        }

        let remote = gpu.clone();
        let started = Instant::now();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.complete_up_to(1);
        });

        assert_eq!(ring.advance(&gpu).unwrap(), 0);
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(gpu.completed_value().unwrap(), 1);
        worker.join().unwrap();
    }

    #[test]
    fn advance_reports_timeout_when_gpu_stalls() {
        let gpu = HeadlessGpu::new(CompletionMode::Manual);
        let mut ring = ring(2, Some(Duration::from_millis(10)));
        for _ in 0..2 {
            ring.advance(&gpu).unwrap();
            ring.retire(&gpu).unwrap();
        }
        let err = ring.advance(&gpu).unwrap_err();
        assert!(matches!(err, GpuError::Timeout { value: 1, .. }));
    }

    #[test]
    fn drain_waits_for_the_newest_fence() {
        let gpu = HeadlessGpu::new(CompletionMode::Manual);
        let mut ring = ring(3, None);
        for _ in 0..2 {
            ring.advance(&gpu).unwrap();
            ring.retire(&gpu).unwrap();
        }
        gpu.complete_up_to(1);

        let remote = gpu.clone();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            // releasing only the older fence again must not end the drain
            remote.complete_up_to(1);
            thread::sleep(Duration::from_millis(30));
            remote.complete_up_to(2);
        });

        ring.drain(&gpu).unwrap();
        assert_eq!(gpu.completed_value().unwrap(), 2);
        for index in 0..ring.len() {
            assert_eq!(ring.slot_state(index, 2), SlotState::Idle);
        }
        worker.join().unwrap();
    }

    #[test]
    fn drain_times_out() {
        let gpu = HeadlessGpu::new(CompletionMode::Manual);
        let mut ring = ring(3, Some(Duration::from_millis(10)));
        ring.advance(&gpu).unwrap();
        ring.retire(&gpu).unwrap();
        assert!(matches!(
            ring.drain(&gpu),
            Err(GpuError::Timeout { value: 1, .. })
        ));
    }

    #[test]
    fn drain_on_fresh_ring_is_a_no_op() {
        let gpu = HeadlessGpu::new(CompletionMode::Manual);
        ring(3, Some(Duration::from_millis(1))).drain(&gpu).unwrap();
    }
}
