//! Procedural terrain: the noise height field, the terrain mesh and its shading constants.
//!
//! The mesh and the height field are two separate products. With
//! [`HeightSource::AnalyticHills`] the mesh follows a fixed hill function and ignores the noise
//! field that the shader samples, so the two visibly disagree. [`HeightSource::HeightField`]
//! displaces the mesh by the field instead.

mod height_field;
pub use height_field::*;

mod mesh;
pub use mesh::*;

mod shading;
pub use shading::*;

use crate::gpu::GpuError;
use crate::util::FreeListError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("invalid terrain parameters: {0}")]
    InvalidParameters(String),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("no room for the terrain: {0}")]
    Capacity(#[from] FreeListError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeightNormalization {
    /// Keep `0.5 * (sum + 1)` as is. Multi-octave sums may leave [0, 1].
    #[default]
    Raw,
    /// Remap the generated samples to exactly [0, 1].
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum HeightSource {
    /// `y = 0.3 * (z * sin(0.1 x) + x * cos(0.1 z))` with its analytic normal.
    #[default]
    AnalyticHills,
    /// Bilinear lookup of the noise field, multiplied by `vertical_scale`.
    HeightField { vertical_scale: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerrainDesc {
    /// Height field resolution in samples.
    pub width: u32,
    pub height: u32,
    /// Noise-space extent covered by the height field.
    pub scale: f32,
    pub octaves: u32,
    pub persistence: f32,
    pub seed: u32,
    pub normalization: HeightNormalization,
    /// World-space size of the terrain mesh.
    pub world_width: f32,
    pub world_depth: f32,
    /// Vertex counts of the terrain mesh along z and x.
    pub grid_rows: u32,
    pub grid_cols: u32,
    pub height_source: HeightSource,
    pub bands: ShadingBandsDesc,
}

impl Default for TerrainDesc {
    fn default() -> Self {
        Self {
            width: 160,
            height: 160,
            scale: 4.0,
            octaves: 4,
            persistence: 0.5,
            seed: 0,
            normalization: HeightNormalization::default(),
            world_width: 160.0,
            world_depth: 160.0,
            grid_rows: 50,
            grid_cols: 50,
            height_source: HeightSource::default(),
            bands: ShadingBandsDesc::default(),
        }
    }
}

impl TerrainDesc {
    pub fn validate(&self) -> Result<(), TerrainError> {
        let fail = |msg: String| Err(TerrainError::InvalidParameters(msg));
        if self.width == 0 || self.height == 0 {
            return fail(format!(
                "height field must be at least 1x1, got {}x{}",
                self.width, self.height
            ));
        }
        if self.octaves == 0 || self.octaves > 16 {
            return fail(format!("octaves must be in 1..=16, got {}", self.octaves));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return fail(format!("scale must be positive, got {}", self.scale));
        }
        if !self.persistence.is_finite() || self.persistence <= 0.0 {
            return fail(format!(
                "persistence must be positive, got {}",
                self.persistence
            ));
        }
        if self.grid_rows < 2 || self.grid_cols < 2 {
            return fail(format!(
                "terrain grid needs at least 2x2 vertices, got {}x{}",
                self.grid_rows, self.grid_cols
            ));
        }
        if !(self.world_width > 0.0 && self.world_depth > 0.0) {
            return fail(format!(
                "world size must be positive, got {}x{}",
                self.world_width, self.world_depth
            ));
        }
        if let HeightSource::HeightField { vertical_scale } = self.height_source {
            if !vertical_scale.is_finite() {
                return fail(format!(
                    "vertical scale must be finite, got {}",
                    vertical_scale
                ));
            }
        }
        Ok(())
    }

    /// The extent used for texture tiling.
    pub fn world_size(&self) -> f32 {
        self.world_width.max(self.world_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        TerrainDesc::default().validate().unwrap();
        TerrainDesc {
            height_source: HeightSource::HeightField {
                vertical_scale: 20.0,
            },
            ..Default::default()
        }
        .validate()
        .unwrap();
    }

    #[test]
    fn rejects_degenerate_parameters() {
        let cases = [
            TerrainDesc {
                width: 0,
                ..Default::default()
            },
            TerrainDesc {
                octaves: 0,
                ..Default::default()
            },
            TerrainDesc {
                scale: f32::NAN,
                ..Default::default()
            },
            TerrainDesc {
                persistence: -1.0,
                ..Default::default()
            },
            TerrainDesc {
                grid_rows: 1,
                ..Default::default()
            },
            TerrainDesc {
                world_depth: 0.0,
                ..Default::default()
            },
            TerrainDesc {
                height_source: HeightSource::HeightField {
                    vertical_scale: f32::NAN,
                },
                ..Default::default()
            },
            TerrainDesc {
                height_source: HeightSource::HeightField {
                    vertical_scale: f32::INFINITY,
                },
                ..Default::default()
            },
        ];
        for desc in cases {
            assert!(matches!(
                desc.validate(),
                Err(TerrainError::InvalidParameters(_))
            ));
        }
    }
}
