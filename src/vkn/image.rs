use super::{execute_one_time_command, Allocator, Buffer, CommandPool, Device, Queue};
use crate::gpu::{GpuError, TextureFormat};
use ash::vk;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme},
    MemoryLocation,
};

/// A sampled 2D image in device-local memory.
pub struct Image {
    allocator: Allocator,
    image: vk::Image,
    allocated_mem: Allocation,
    extent: [u32; 2],
}

impl Drop for Image {
    fn drop(&mut self) {
        let allocated_mem = std::mem::take(&mut self.allocated_mem);
        self.allocator.destroy_image(self.image, allocated_mem);
    }
}

impl std::ops::Deref for Image {
    type Target = vk::Image;
    fn deref(&self) -> &Self::Target {
        &self.image
    }
}

pub fn vk_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R32Float => vk::Format::R32_SFLOAT,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
    }
}

impl Image {
    pub fn new(
        device: &Device,
        allocator: &Allocator,
        label: &str,
        extent: [u32; 2],
        format: TextureFormat,
    ) -> Result<Self, GpuError> {
        let image_info = vk::ImageCreateInfo::default()
            .extent(vk::Extent3D {
                width: extent[0],
                height: extent[1],
                depth: 1,
            })
            .image_type(vk::ImageType::TYPE_2D)
            .mip_levels(1)
            .array_layers(1)
            .format(vk_format(format))
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { device.create_image(&image_info, None)? };
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let allocated_mem = match allocator.allocate_memory(&AllocationCreateDesc {
            name: label,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(mem) => mem,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(err);
            }
        };

        let image = Self {
            allocator: allocator.clone(),
            image,
            allocated_mem,
            extent,
        };
        unsafe {
            device.bind_image_memory(
                image.image,
                image.allocated_mem.memory(),
                image.allocated_mem.offset(),
            )?
        };
        Ok(image)
    }

    pub fn as_raw(&self) -> vk::Image {
        self.image
    }

    /// Copies `data` through a staging buffer and leaves the image ready for sampling.
    pub fn fill_with_raw_u8(
        &self,
        device: &Device,
        queue: &Queue,
        command_pool: &CommandPool,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let mut staging = Buffer::new_sized(
            device,
            &self.allocator,
            "image staging",
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            data.len() as u64,
        )?;
        staging.write(data, 0)?;

        execute_one_time_command(device, command_pool, queue, |cmdbuf| {
            record_image_transition_barrier(
                device,
                cmdbuf.as_raw(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                self.image,
            );
            let region = vk::BufferImageCopy::default()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D {
                    width: self.extent[0],
                    height: self.extent[1],
                    depth: 1,
                });
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmdbuf.as_raw(),
                    staging.as_raw(),
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                )
            }
            record_image_transition_barrier(
                device,
                cmdbuf.as_raw(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                self.image,
            );
        })
    }
}

/// Records a layout transition of the whole color subresource.
pub fn record_image_transition_barrier(
    device: &ash::Device,
    cmdbuf: vk::CommandBuffer,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    image: vk::Image,
) {
    let (src_access, src_stage) = map_src_stage_access_flags(old_layout);
    let (dst_access, dst_stage) = map_dst_stage_access_flags(new_layout);

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cmdbuf,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        )
    }
}

/// Which writes must be made available before leaving `old_layout`, and where they happen.
fn map_src_stage_access_flags(
    old_layout: vk::ImageLayout,
) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match old_layout {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::VERTEX_SHADER,
        ),
        _ => (
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
        ),
    }
}

/// Which accesses of `new_layout` must wait, and in which stages.
fn map_dst_stage_access_flags(
    new_layout: vk::ImageLayout,
) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match new_layout {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        // the height map is read by the terrain vertex shader
        _ => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
    }
}
