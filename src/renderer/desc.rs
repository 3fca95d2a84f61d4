use crate::terrain::TerrainDesc;
use crate::waves::WavesDesc;
use glam::{Vec3, Vec4};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct FogDesc {
    pub color: Vec4,
    pub start: f32,
    pub range: f32,
}

impl Default for FogDesc {
    fn default() -> Self {
        Self {
            color: Vec4::new(0.3, 0.4, 0.7, 1.0),
            start: 55.0,
            range: 2000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RendererDesc {
    /// Number of frames the CPU may record ahead of the GPU.
    pub frame_count: usize,
    /// Upper bound for every fence wait. `None` waits forever.
    pub fence_timeout: Option<Duration>,
    pub max_render_items: u32,
    pub descriptor_capacity: u32,
    pub render_target_size: [u32; 2],
    pub fog: FogDesc,
    pub ambient_light: Vec4,
    pub water_color: Vec3,
    pub waves: WavesDesc,
    pub terrain: TerrainDesc,
    /// Text model drawn as an extra prop. Skipped with a warning when it cannot be loaded.
    pub skull_model: Option<PathBuf>,
    pub wireframe: bool,
}

impl Default for RendererDesc {
    fn default() -> Self {
        Self {
            frame_count: 3,
            fence_timeout: None,
            max_render_items: 64,
            descriptor_capacity: 64,
            render_target_size: [1280, 720],
            fog: FogDesc::default(),
            ambient_light: Vec4::new(0.2, 0.2, 0.2, 1.0),
            water_color: Vec3::new(0.65, 0.75, 0.90),
            waves: WavesDesc::default(),
            terrain: TerrainDesc::default(),
            skull_model: None,
            wireframe: false,
        }
    }
}
