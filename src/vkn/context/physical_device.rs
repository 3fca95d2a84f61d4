use super::instance::Instance;
use crate::gpu::GpuError;
use ash::vk;
use comfy_table::Table;
use std::ffi::CStr;

#[derive(Debug, Clone)]
pub struct PhysicalDevice {
    device: vk::PhysicalDevice,
    name: String,
    limits: vk::PhysicalDeviceLimits,
    queue_family_index: u32,
}

impl PhysicalDevice {
    /// Evaluates every adapter, logs the report and picks the highest scoring suitable one.
    pub fn new(instance: &Instance) -> Result<Self, GpuError> {
        let devices = unsafe { instance.enumerate_physical_devices()? };
        let evaluations: Vec<DeviceEvaluation> = devices
            .iter()
            .map(|&device| evaluate(instance, device))
            .collect();

        log::info!("\n{}", evaluation_table(&evaluations));

        let best = evaluations
            .into_iter()
            .filter(|eval| eval.is_suitable())
            .max_by_key(|eval| eval.score)
            .ok_or_else(|| {
                GpuError::Backend(
                    "no suitable physical device, see the evaluation report above".into(),
                )
            })?;

        let queue_family_index = best
            .general_queue_family
            .ok_or_else(|| GpuError::Backend("selected device has no general queue".into()))?;
        log::info!(
            "selected physical device: {} (queue family {})",
            best.name,
            queue_family_index
        );

        Ok(Self {
            device: best.device,
            name: best.name,
            limits: best.limits,
            queue_family_index,
        })
    }

    pub fn as_raw(&self) -> vk::PhysicalDevice {
        self.device
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// A queue family with graphics, compute and transfer support.
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

struct DeviceEvaluation {
    device: vk::PhysicalDevice,
    name: String,
    device_type: vk::PhysicalDeviceType,
    total_memory_mb: f64,
    score: i32,
    limits: vk::PhysicalDeviceLimits,
    api_version: u32,
    timeline_semaphore: bool,
    general_queue_family: Option<u32>,
}

impl DeviceEvaluation {
    fn is_suitable(&self) -> bool {
        self.api_version >= vk::API_VERSION_1_2
            && self.timeline_semaphore
            && self.general_queue_family.is_some()
    }

    fn rejection_reason(&self) -> String {
        let mut reason = String::new();
        if self.api_version < vk::API_VERSION_1_2 {
            reason.push_str("Vulkan 1.2 is not supported. ");
        }
        if !self.timeline_semaphore {
            reason.push_str("Timeline semaphores are not supported. ");
        }
        if self.general_queue_family.is_none() {
            reason.push_str("No queue family supports graphics, compute and transfer. ");
        }
        reason
    }
}

fn evaluate(instance: &Instance, device: vk::PhysicalDevice) -> DeviceEvaluation {
    let props = unsafe { instance.get_physical_device_properties(device) };
    let mem_props = unsafe { instance.get_physical_device_memory_properties(device) };

    let name = unsafe {
        CStr::from_ptr(props.device_name.as_ptr())
            .to_string_lossy()
            .into_owned()
    };

    let total_vram: u64 = mem_props.memory_heaps[..mem_props.memory_heap_count as usize]
        .iter()
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size)
        .sum();
    let total_memory_mb = total_vram as f64 / (1024.0 * 1024.0);

    let type_score = match props.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 100,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 50,
        _ => 10,
    };
    let score = type_score + (total_memory_mb / 256.0).floor() as i32;

    let timeline_semaphore = if props.api_version >= vk::API_VERSION_1_2 {
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
        {
            let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features12);
            unsafe { instance.get_physical_device_features2(device, &mut features2) };
        }
        features12.timeline_semaphore == vk::TRUE
    } else {
        false
    };

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let required = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER;
    let general_queue_family = families
        .iter()
        .position(|family| family.queue_count > 0 && family.queue_flags.contains(required))
        .map(|index| index as u32);

    DeviceEvaluation {
        device,
        name,
        device_type: props.device_type,
        total_memory_mb,
        score,
        limits: props.limits,
        api_version: props.api_version,
        timeline_semaphore,
        general_queue_family,
    }
}

fn evaluation_table(evaluations: &[DeviceEvaluation]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Device",
        "Type",
        "Memory (MB)",
        "Score",
        "Suitability",
        "Reason",
    ]);
    if evaluations.is_empty() {
        table.add_row(vec!["No Vulkan-capable physical devices found."]);
        return table;
    }
    for eval in evaluations {
        let suitable = eval.is_suitable();
        table.add_row(vec![
            eval.name.clone(),
            format!("{:?}", eval.device_type),
            format!("{:.2}", eval.total_memory_mb),
            eval.score.to_string(),
            if suitable { "Suitable" } else { "Not Suitable" }.to_string(),
            if suitable {
                "All requirements met.".to_string()
            } else {
                eval.rejection_reason()
            },
        ]);
    }
    table
}
