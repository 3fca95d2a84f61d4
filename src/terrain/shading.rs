use crate::renderer::TerrainConstants;
use glam::Vec4;

/// Height bands as fractions of the terrain's height range, slope blending limits and the
/// world-space distance over which each material texture repeats once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadingBandsDesc {
    pub mud: f32,
    pub grass: f32,
    pub rock: f32,
    pub slope_start: f32,
    pub slope_end: f32,
    pub mud_repeat: f32,
    pub grass_repeat: f32,
    pub rock_repeat: f32,
}

impl Default for ShadingBandsDesc {
    fn default() -> Self {
        Self {
            mud: 0.25,
            grass: 0.60,
            rock: 0.80,
            slope_start: 0.35,
            slope_end: 0.75,
            mud_repeat: 16.0,
            grass_repeat: 16.0,
            rock_repeat: 32.0,
        }
    }
}

/// How many times a texture repeats across `world_size`, never less than once.
pub fn tiling(world_size: f32, repeat_distance: f32) -> f32 {
    (world_size / repeat_distance).max(1.0)
}

pub fn terrain_constants(
    bands: &ShadingBandsDesc,
    min_height: f32,
    max_height: f32,
    world_size: f32,
) -> TerrainConstants {
    let range = max_height - min_height;
    let at = |fraction: f32| min_height + fraction * range;
    TerrainConstants {
        mud_threshold: at(bands.mud),
        grass_threshold: at(bands.grass),
        rock_threshold: at(bands.rock),
        slope_start: bands.slope_start,
        slope_end: bands.slope_end,
        min_height,
        max_height,
        _pad0: 0.0,
        tiling: Vec4::new(
            tiling(world_size, bands.mud_repeat),
            tiling(world_size, bands.grass_repeat),
            tiling(world_size, bands.rock_repeat),
            0.0,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiling_is_clamped_to_one() {
        assert_eq!(tiling(8.0, 16.0), 1.0);
        assert_eq!(tiling(160.0, 16.0), 10.0);
    }

    #[test]
    fn thresholds_follow_height_range() {
        let constants = terrain_constants(&ShadingBandsDesc::default(), -10.0, 30.0, 160.0);
        let close = |a: f32, b: f32| (a - b).abs() < 1e-4;
        assert!(close(constants.mud_threshold, 0.0));
        assert!(close(constants.grass_threshold, 14.0));
        assert!(close(constants.rock_threshold, 22.0));
        assert_eq!(constants.tiling, Vec4::new(10.0, 10.0, 5.0, 0.0));
        assert_eq!((constants.slope_start, constants.slope_end), (0.35, 0.75));
    }
}
