//! Finite-difference water surface.
//!
//! The surface is a `rows` x `cols` grid of heights integrated with a damped wave equation at a
//! fixed time step. The renderer treats it as a black box that yields fresh vertices each frame.

use crate::geom::grid_indices;
use crate::renderer::Vertex;
use glam::{Vec2, Vec3};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq)]
pub struct WavesDesc {
    pub rows: u32,
    pub cols: u32,
    pub spatial_step: f32,
    pub time_step: f32,
    pub speed: f32,
    pub damping: f32,
    /// Seconds between random disturbances.
    pub disturb_interval: f32,
    pub disturb_magnitude: (f32, f32),
    pub seed: u64,
}

impl Default for WavesDesc {
    fn default() -> Self {
        Self {
            rows: 128,
            cols: 128,
            spatial_step: 1.0,
            time_step: 0.03,
            speed: 4.0,
            damping: 0.2,
            disturb_interval: 0.25,
            disturb_magnitude: (0.2, 0.5),
            seed: 0,
        }
    }
}

pub struct Waves {
    desc: WavesDesc,
    k1: f32,
    k2: f32,
    k3: f32,
    step_accumulator: f32,
    disturb_accumulator: f32,
    prev: Vec<Vec3>,
    curr: Vec<Vec3>,
    normals: Vec<Vec3>,
    rng: StdRng,
}

impl Waves {
    pub fn new(desc: WavesDesc) -> Self {
        // disturbances keep four cells away from the border
        let (rows, cols) = (desc.rows.max(10), desc.cols.max(10));
        let dx = desc.spatial_step;
        let dt = desc.time_step;

        let d = desc.damping * dt + 2.0;
        let e = (desc.speed * desc.speed) * (dt * dt) / (dx * dx);
        let k1 = (desc.damping * dt - 2.0) / d;
        let k2 = (4.0 - 8.0 * e) / d;
        let k3 = (2.0 * e) / d;

        let half_width = (cols - 1) as f32 * dx * 0.5;
        let half_depth = (rows - 1) as f32 * dx * 0.5;
        let grid: Vec<Vec3> = (0..rows)
            .flat_map(|i| {
                (0..cols).map(move |j| {
                    Vec3::new(-half_width + j as f32 * dx, 0.0, half_depth - i as f32 * dx)
                })
            })
            .collect();

        let rng = StdRng::seed_from_u64(desc.seed);
        Self {
            desc: WavesDesc { rows, cols, ..desc },
            k1,
            k2,
            k3,
            step_accumulator: 0.0,
            disturb_accumulator: 0.0,
            prev: grid.clone(),
            normals: vec![Vec3::Y; grid.len()],
            curr: grid,
            rng,
        }
    }

    pub fn rows(&self) -> u32 {
        self.desc.rows
    }

    pub fn cols(&self) -> u32 {
        self.desc.cols
    }

    pub fn vertex_count(&self) -> u32 {
        self.desc.rows * self.desc.cols
    }

    pub fn width(&self) -> f32 {
        self.desc.cols as f32 * self.desc.spatial_step
    }

    pub fn depth(&self) -> f32 {
        self.desc.rows as f32 * self.desc.spatial_step
    }

    pub fn indices(&self) -> Vec<u32> {
        grid_indices(self.desc.rows, self.desc.cols)
    }

    pub fn height(&self, i: u32, j: u32) -> f32 {
        self.curr[(i * self.desc.cols + j) as usize].y
    }

    /// Advances the simulation by `dt` seconds, including the periodic random disturbances.
    pub fn update(&mut self, dt: f32) {
        self.disturb_accumulator += dt;
        if self.disturb_accumulator >= self.desc.disturb_interval {
            self.disturb_accumulator = 0.0;
            let i = self.rng.random_range(4..self.desc.rows - 5);
            let j = self.rng.random_range(4..self.desc.cols - 5);
            let (lo, hi) = self.desc.disturb_magnitude;
            let magnitude = if hi > lo {
                self.rng.random_range(lo..hi)
            } else {
                lo
            };
            self.disturb(i, j, magnitude);
        }
        self.step(dt);
    }

    /// Integrates once `time_step` seconds have accumulated.
    pub fn step(&mut self, dt: f32) {
        self.step_accumulator += dt;
        if self.step_accumulator < self.desc.time_step {
            return;
        }
        self.step_accumulator = 0.0;

        let (rows, cols) = (self.desc.rows as usize, self.desc.cols as usize);
        for i in 1..rows - 1 {
            for j in 1..cols - 1 {
                let at = i * cols + j;
                // prev is overwritten in place with the next solution
                self.prev[at].y = self.k1 * self.prev[at].y
                    + self.k2 * self.curr[at].y
                    + self.k3
                        * (self.curr[at + cols].y
                            + self.curr[at - cols].y
                            + self.curr[at + 1].y
                            + self.curr[at - 1].y);
            }
        }
        std::mem::swap(&mut self.prev, &mut self.curr);

        let two_dx = 2.0 * self.desc.spatial_step;
        for i in 1..rows - 1 {
            for j in 1..cols - 1 {
                let at = i * cols + j;
                let l = self.curr[at - 1].y;
                let r = self.curr[at + 1].y;
                let t = self.curr[at - cols].y;
                let b = self.curr[at + cols].y;
                self.normals[at] = Vec3::new(l - r, two_dx, b - t).normalize();
            }
        }
    }

    /// Raises the height at (i, j) by `magnitude` and its four neighbours by half of it.
    ///
    /// # Panics
    ///
    /// If (i, j) is within two cells of the border.
    pub fn disturb(&mut self, i: u32, j: u32, magnitude: f32) {
        let (rows, cols) = (self.desc.rows, self.desc.cols);
        assert!(i > 1 && i < rows - 2, "disturb row {} too close to border", i);
        assert!(j > 1 && j < cols - 2, "disturb column {} too close to border", j);

        let cols = cols as usize;
        let at = i as usize * cols + j as usize;
        let half = 0.5 * magnitude;
        self.curr[at].y += magnitude;
        self.curr[at + 1].y += half;
        self.curr[at - 1].y += half;
        self.curr[at + cols].y += half;
        self.curr[at - cols].y += half;
    }

    /// The current surface as renderable vertices.
    pub fn vertices(&self) -> Vec<Vertex> {
        let (width, depth) = (self.width(), self.depth());
        self.curr
            .iter()
            .zip(&self.normals)
            .map(|(&pos, &normal)| {
                let tex_c = Vec2::new(0.5 + pos.x / width, 0.5 - pos.z / depth);
                Vertex::new(pos, normal, tex_c)
            })
            .collect()
    }
}
