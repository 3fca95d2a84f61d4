use super::{HeightNormalization, TerrainDesc};
use noise::{NoiseFn, Perlin};

/// A `width` x `height` grid of terrain elevation samples, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl HeightField {
    /// Sums `octaves` layers of Perlin noise over the grid and remaps the sum from [-1, 1] to
    /// [0, 1] with `0.5 * (n + 1)`. The result is only clamped into [0, 1] when the
    /// normalization is [`HeightNormalization::Stretch`].
    pub fn generate(desc: &TerrainDesc) -> Self {
        let perlin = Perlin::new(desc.seed);
        let (width, height) = (desc.width, desc.height);
        let scale = desc.scale as f64;

        let unit = |i: u32, n: u32| {
            if n > 1 {
                i as f64 / (n - 1) as f64
            } else {
                0.0
            }
        };

        let mut data = Vec::with_capacity((width * height) as usize);
        for j in 0..height {
            let y = unit(j, height) * scale;
            for i in 0..width {
                let x = unit(i, width) * scale;

                let mut amplitude = 1.0;
                let mut frequency = 1.0;
                let mut sum = 0.0;
                for _ in 0..desc.octaves {
                    sum += perlin.get([x * frequency, y * frequency]) * amplitude;
                    amplitude *= desc.persistence as f64;
                    frequency *= 2.0;
                }
                data.push((0.5 * (sum + 1.0)) as f32);
            }
        }

        let mut field = Self {
            width,
            height,
            data,
        };
        if desc.normalization == HeightNormalization::Stretch {
            field.stretch();
        }
        field
    }

    pub fn from_data(width: u32, height: u32, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), (width * height) as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The samples as texel bytes for an R32 float texture.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Bilinear lookup at normalized coordinates, clamped to the edges.
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        let fx = u.clamp(0.0, 1.0) * (self.width - 1) as f32;
        let fy = v.clamp(0.0, 1.0) * (self.height - 1) as f32;
        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let top = self.get(x0, y0) * (1.0 - tx) + self.get(x1, y0) * tx;
        let bottom = self.get(x0, y1) * (1.0 - tx) + self.get(x1, y1) * tx;
        top * (1.0 - ty) + bottom * ty
    }

    /// Remaps the samples so the lowest becomes 0 and the highest 1. A flat field becomes all 0.
    fn stretch(&mut self) {
        let (lo, hi) = self.min_max();
        let range = hi - lo;
        if range <= f32::EPSILON {
            self.data.iter_mut().for_each(|v| *v = 0.0);
            return;
        }
        self.data.iter_mut().for_each(|v| *v = (*v - lo) / range);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(width: u32, height: u32, scale: f32, octaves: u32, seed: u32) -> TerrainDesc {
        TerrainDesc {
            width,
            height,
            scale,
            octaves,
            persistence: 0.5,
            seed,
            ..Default::default()
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let d = desc(4, 4, 1.0, 1, 0);
        let a = HeightField::generate(&d);
        let b = HeightField::generate(&d);
        assert_eq!(a, b);
    }

    #[test]
    fn seed_zero_grid_is_pinned() {
        #[rustfmt::skip]
        const EXPECTED: [u32; 16] = [
            0x3f000000, 0x3f4900f1, 0x3f4900f1, 0x3f000000,
            0x3ed34dca, 0x3f140319, 0x3f140319, 0x3ed34dca,
            0x3f16591b, 0x3ed7f9cf, 0x3ed7f9cf, 0x3f16591b,
            0x3f000000, 0x3e5bfc3b, 0x3e5bfc3b, 0x3f000000,
        ];
        let field = HeightField::generate(&desc(4, 4, 1.0, 1, 0));
        let bits: Vec<u32> = field.data().iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, EXPECTED);
    }

    #[test]
    fn lattice_points_sit_at_the_midpoint() {
        // with scale 3 on a 4x4 grid every sample lands on an integer lattice point, where
        // perlin noise is exactly zero
        let field = HeightField::generate(&desc(4, 4, 3.0, 1, 0));
        assert!(field.data().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn seeds_change_the_field() {
        let a = HeightField::generate(&desc(16, 16, 2.5, 3, 1));
        let b = HeightField::generate(&desc(16, 16, 2.5, 3, 2));
        assert_ne!(a, b);
    }

    #[test]
    fn single_sample_grid_uses_origin() {
        let field = HeightField::generate(&desc(1, 1, 10.0, 4, 7));
        assert_eq!(field.data(), &[0.5]);
    }

    #[test]
    fn stretch_spans_unit_range() {
        let mut d = desc(16, 16, 2.5, 4, 3);
        d.normalization = HeightNormalization::Stretch;
        let (lo, hi) = HeightField::generate(&d).min_max();
        assert_eq!(lo, 0.0);
        assert!((hi - 1.0).abs() < 1e-6);

        // a flat field collapses to zero instead of dividing by zero
        let mut flat = desc(4, 4, 3.0, 1, 0);
        flat.normalization = HeightNormalization::Stretch;
        assert!(HeightField::generate(&flat)
            .data()
            .iter()
            .all(|&v| v == 0.0));
    }

    #[test]
    fn bilinear_sample_interpolates() {
        let field = HeightField::from_data(2, 2, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(field.sample(0.0, 0.0), 0.0);
        assert_eq!(field.sample(1.0, 1.0), 3.0);
        assert!((field.sample(0.5, 0.5) - 1.5).abs() < 1e-6);
        assert_eq!(field.sample(-1.0, 2.0), 2.0);
    }
}
