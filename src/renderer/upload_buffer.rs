use crate::gpu::{BufferDesc, BufferId, BufferUsage, Gpu, GpuError, HostBuffer};
use bytemuck::Pod;
use std::marker::PhantomData;

pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// A fixed-capacity array of `T` records in CPU-writable memory the GPU reads directly.
///
/// Constant buffer records are padded so every record starts on the device's uniform offset
/// alignment. The buffer is write-only: nothing is ever read back.
pub struct UploadBuffer<T: Pod> {
    buffer: Box<dyn HostBuffer>,
    capacity: u32,
    element_size: u64,
    _marker: PhantomData<T>,
}

impl<T: Pod> UploadBuffer<T> {
    pub fn new(
        gpu: &dyn Gpu,
        label: &str,
        capacity: u32,
        is_constant_buffer: bool,
    ) -> Result<Self, GpuError> {
        let record_size = std::mem::size_of::<T>() as u64;
        let (element_size, usage) = if is_constant_buffer {
            (
                align_up(record_size, gpu.min_uniform_buffer_alignment()),
                BufferUsage::Uniform,
            )
        } else {
            (record_size, BufferUsage::Vertex)
        };

        // zero-capacity buffers still get one record so the backend never sees an empty buffer
        let size = element_size * capacity.max(1) as u64;
        let buffer = gpu.create_host_buffer(&BufferDesc {
            label: label.to_owned(),
            size,
            usage,
        })?;

        Ok(Self {
            buffer,
            capacity,
            element_size,
            _marker: PhantomData,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn buffer_id(&self) -> BufferId {
        self.buffer.id()
    }

    /// Stride between consecutive records, including padding.
    pub fn element_size(&self) -> u64 {
        self.element_size
    }

    pub fn element_offset(&self, index: u32) -> u64 {
        index as u64 * self.element_size
    }

    /// # Panics
    ///
    /// If `index` is not below the capacity.
    pub fn write(&mut self, index: u32, record: &T) {
        assert!(
            index < self.capacity,
            "upload buffer index {} out of range (capacity {})",
            index,
            self.capacity
        );
        self.buffer
            .write(self.element_offset(index), bytemuck::bytes_of(record));
    }

    /// Writes a contiguous run of records starting at index 0.
    pub fn write_all(&mut self, records: &[T]) {
        assert!(
            records.len() <= self.capacity as usize,
            "{} records do not fit an upload buffer of capacity {}",
            records.len(),
            self.capacity
        );
        if self.element_size == std::mem::size_of::<T>() as u64 {
            self.buffer.write(0, bytemuck::cast_slice(records));
        } else {
            for (index, record) in records.iter().enumerate() {
                self.write(index as u32, record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{CompletionMode, HeadlessGpu};

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Small {
        a: f32,
        b: u32,
    }

    #[test]
    fn constant_records_start_on_alignment() {
        let gpu = HeadlessGpu::new(CompletionMode::Immediate);
        let mut buffer = UploadBuffer::<Small>::new(&gpu, "cb", 3, true).unwrap();
        assert_eq!(buffer.element_size(), 256);
        assert_eq!(buffer.element_offset(2), 512);

        buffer.write(1, &Small { a: 1.0, b: 7 });
        let contents = gpu.buffer_contents(buffer.buffer_id()).unwrap();
        assert_eq!(contents.len(), 768);
        assert_eq!(&contents[256..260], &1.0f32.to_ne_bytes());
        assert_eq!(&contents[260..264], &7u32.to_ne_bytes());
    }

    #[test]
    fn vertex_records_are_tightly_packed() {
        let gpu = HeadlessGpu::new(CompletionMode::Immediate);
        let mut buffer = UploadBuffer::<Small>::new(&gpu, "vb", 4, false).unwrap();
        assert_eq!(buffer.element_size(), 8);
        buffer.write_all(&[Small { a: 0.0, b: 1 }, Small { a: 0.0, b: 2 }]);
        let contents = gpu.buffer_contents(buffer.buffer_id()).unwrap();
        assert_eq!(&contents[12..16], &2u32.to_ne_bytes());
    }

    #[test]
    fn alignment_follows_device() {
        let gpu = HeadlessGpu::with_uniform_alignment(CompletionMode::Immediate, 64);
        let buffer = UploadBuffer::<Small>::new(&gpu, "cb", 1, true).unwrap();
        assert_eq!(buffer.element_size(), 64);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_write_panics() {
        let gpu = HeadlessGpu::new(CompletionMode::Immediate);
        let mut buffer = UploadBuffer::<Small>::new(&gpu, "cb", 2, true).unwrap();
        buffer.write(2, &Small { a: 0.0, b: 0 });
    }
}
