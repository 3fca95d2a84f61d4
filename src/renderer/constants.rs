//! Plain-old-data records written into the per-frame upload buffers.
//!
//! Matrices are glam's column-major `Mat4`, which is the layout the shaders read, so they are
//! copied without a transpose.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

pub const MAX_LIGHTS: usize = 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectConstants {
    pub world: Mat4,
    pub tex_transform: Mat4,
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            tex_transform: Mat4::IDENTITY,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct Light {
    pub strength: Vec3,
    pub falloff_start: f32,
    pub direction: Vec3,
    pub falloff_end: f32,
    pub position: Vec3,
    pub spot_power: f32,
}

impl Light {
    pub fn directional(direction: Vec3, strength: Vec3) -> Self {
        Self {
            strength,
            falloff_start: 1.0,
            direction,
            falloff_end: 10.0,
            position: Vec3::ZERO,
            spot_power: 64.0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PassConstants {
    pub view: Mat4,
    pub inv_view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub eye_pos_w: Vec3,
    pub _pad0: f32,
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: Vec4,
    pub fog_color: Vec4,
    pub fog_start: f32,
    pub fog_range: f32,
    pub _pad1: [f32; 2],
    /// Directional lights first, then point lights, then spot lights.
    pub lights: [Light; MAX_LIGHTS],
}

impl Default for PassConstants {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            inv_view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            inv_proj: Mat4::IDENTITY,
            view_proj: Mat4::IDENTITY,
            inv_view_proj: Mat4::IDENTITY,
            eye_pos_w: Vec3::ZERO,
            _pad0: 0.0,
            render_target_size: Vec2::ZERO,
            inv_render_target_size: Vec2::ZERO,
            near_z: 0.0,
            far_z: 0.0,
            total_time: 0.0,
            delta_time: 0.0,
            ambient_light: Vec4::new(0.0, 0.0, 0.0, 1.0),
            fog_color: Vec4::new(0.7, 0.7, 0.7, 1.0),
            fog_start: 5.0,
            fog_range: 150.0,
            _pad1: [0.0; 2],
            lights: [Light::default(); MAX_LIGHTS],
        }
    }
}

/// The key, fill and back lights of the scene.
pub fn default_lights() -> [Light; 3] {
    [
        Light::directional(
            Vec3::new(0.57735, -0.57735, 0.57735),
            Vec3::splat(0.6),
        ),
        Light::directional(
            Vec3::new(-0.57735, -0.57735, 0.57735),
            Vec3::splat(0.3),
        ),
        Light::directional(
            Vec3::new(0.0, -0.707, -0.707),
            Vec3::splat(0.15),
        ),
    ]
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialConstants {
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub mat_transform: Mat4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct WaterConstants {
    pub world: Mat4,
    pub view_proj: Mat4,
    pub camera_pos: Vec3,
    pub time: f32,
    pub water_color: Vec3,
    pub _pad0: f32,
}

/// Height-band and slope blending parameters for the terrain shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainConstants {
    pub mud_threshold: f32,
    pub grass_threshold: f32,
    pub rock_threshold: f32,
    pub slope_start: f32,
    pub slope_end: f32,
    pub min_height: f32,
    pub max_height: f32,
    pub _pad0: f32,
    /// UV repeat counts for mud, grass and rock. `w` is unused.
    pub tiling: Vec4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec3,
    pub normal: Vec3,
    pub tex_c: Vec2,
}

impl Vertex {
    pub fn new(pos: Vec3, normal: Vec3, tex_c: Vec2) -> Self {
        Self {
            pos,
            normal,
            tex_c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 128);
        assert_eq!(std::mem::size_of::<Light>(), 48);
        assert_eq!(std::mem::size_of::<MaterialConstants>(), 96);
        assert_eq!(std::mem::size_of::<WaterConstants>(), 160);
        assert_eq!(std::mem::size_of::<TerrainConstants>(), 48);
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::size_of::<PassConstants>(), 480 + 48 * MAX_LIGHTS);
    }
}
