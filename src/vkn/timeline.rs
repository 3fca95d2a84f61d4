use super::{Device, Queue};
use crate::gpu::{FenceValue, GpuError};
use ash::vk;
use std::sync::Arc;
use std::time::Duration;

struct TimelineSemaphoreInner {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Drop for TimelineSemaphoreInner {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// A monotonically increasing 64-bit counter the queue advances as work completes.
#[derive(Clone)]
pub struct TimelineSemaphore(Arc<TimelineSemaphoreInner>);

impl std::ops::Deref for TimelineSemaphore {
    type Target = vk::Semaphore;
    fn deref(&self) -> &Self::Target {
        &self.0.semaphore
    }
}

/// Outcome of [`TimelineSemaphore::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Reached,
    TimedOut,
}

impl TimelineSemaphore {
    pub fn new(device: &Device, initial_value: FenceValue) -> Result<Self, GpuError> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let semaphore_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let semaphore = unsafe { device.create_semaphore(&semaphore_info, None)? };
        Ok(Self(Arc::new(TimelineSemaphoreInner {
            device: device.clone(),
            semaphore,
        })))
    }

    pub fn as_raw(&self) -> vk::Semaphore {
        self.0.semaphore
    }

    pub fn value(&self) -> Result<FenceValue, GpuError> {
        let value = unsafe { self.0.device.get_semaphore_counter_value(self.0.semaphore)? };
        Ok(value)
    }

    /// Queues a signal to `value` behind everything already submitted to `queue`.
    pub fn signal_on(&self, queue: &Queue, value: FenceValue) -> Result<(), GpuError> {
        let semaphores = [self.as_raw()];
        let values = [value];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&values);
        let submit_info = vk::SubmitInfo::default()
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline_info);
        unsafe {
            self.0
                .device
                .queue_submit(queue.as_raw(), &[submit_info], vk::Fence::null())?
        };
        Ok(())
    }

    /// Blocks until the counter reaches `value`. `None` waits forever.
    pub fn wait(&self, value: FenceValue, timeout: Option<Duration>) -> Result<WaitResult, GpuError> {
        let semaphores = [self.as_raw()];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        let timeout_ns = timeout
            .map(|t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(u64::MAX);
        match unsafe { self.0.device.wait_semaphores(&wait_info, timeout_ns) } {
            Ok(()) => Ok(WaitResult::Reached),
            Err(vk::Result::TIMEOUT) => Ok(WaitResult::TimedOut),
            Err(err) => Err(err.into()),
        }
    }
}
