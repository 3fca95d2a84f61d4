//! Procedural meshes for the scene props, the sky dome and the terrain and water grids.

use crate::renderer::Vertex;
use glam::{Vec2, Vec3};

#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(|v| v.pos)
    }
}

/// An axis-aligned box centred at the origin with per-face normals and texture coordinates.
pub fn create_box(width: f32, height: f32, depth: f32) -> MeshData {
    let (w, h, d) = (0.5 * width, 0.5 * height, 0.5 * depth);

    // (normal, u axis, v axis) per face; the face centre is normal * half extent
    let faces = [
        (Vec3::NEG_Z, Vec3::X, Vec3::NEG_Y),
        (Vec3::Z, Vec3::NEG_X, Vec3::NEG_Y),
        (Vec3::Y, Vec3::X, Vec3::Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_X, Vec3::NEG_Z, Vec3::NEG_Y),
        (Vec3::X, Vec3::Z, Vec3::NEG_Y),
    ];
    let half = Vec3::new(w, h, d);

    let mut mesh = MeshData::default();
    for (normal, u_axis, v_axis) in faces {
        let base = mesh.vertices.len() as u32;
        let center = normal * half;
        let u_extent = u_axis * half;
        let v_extent = v_axis * half;
        for (du, dv) in [(-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0), (1.0, 1.0)] {
            let pos = center + u_extent * du + v_extent * dv;
            let tex_c = Vec2::new(0.5 * (du + 1.0), 0.5 * (1.0 - dv));
            mesh.vertices.push(Vertex::new(pos, normal, tex_c));
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// A UV sphere with `slice_count` segments around the y axis and `stack_count` rings.
pub fn create_sphere(radius: f32, slice_count: u32, stack_count: u32) -> MeshData {
    let slice_count = slice_count.max(3);
    let stack_count = stack_count.max(2);
    let mut mesh = MeshData::default();

    mesh.vertices.push(Vertex::new(
        Vec3::new(0.0, radius, 0.0),
        Vec3::Y,
        Vec2::new(0.0, 0.0),
    ));

    let phi_step = std::f32::consts::PI / stack_count as f32;
    let theta_step = std::f32::consts::TAU / slice_count as f32;

    for i in 1..stack_count {
        let phi = i as f32 * phi_step;
        for j in 0..=slice_count {
            let theta = j as f32 * theta_step;
            let pos = Vec3::new(
                radius * phi.sin() * theta.cos(),
                radius * phi.cos(),
                radius * phi.sin() * theta.sin(),
            );
            let tex_c = Vec2::new(
                theta / std::f32::consts::TAU,
                phi / std::f32::consts::PI,
            );
            mesh.vertices
                .push(Vertex::new(pos, pos.normalize_or_zero(), tex_c));
        }
    }

    mesh.vertices.push(Vertex::new(
        Vec3::new(0.0, -radius, 0.0),
        Vec3::NEG_Y,
        Vec2::new(0.0, 1.0),
    ));

    // top cap
    for i in 1..=slice_count {
        mesh.indices.extend_from_slice(&[0, i + 1, i]);
    }

    let ring = slice_count + 1;
    let base = 1;
    for i in 0..stack_count - 2 {
        for j in 0..slice_count {
            let a = base + i * ring + j;
            let b = base + i * ring + j + 1;
            let c = base + (i + 1) * ring + j;
            let d = base + (i + 1) * ring + j + 1;
            mesh.indices.extend_from_slice(&[a, b, c, c, b, d]);
        }
    }

    // bottom cap
    let south_pole = mesh.vertices.len() as u32 - 1;
    let last_ring = south_pole - ring;
    for i in 0..slice_count {
        mesh.indices
            .extend_from_slice(&[south_pole, last_ring + i, last_ring + i + 1]);
    }
    mesh
}

/// A flat `width` x `depth` grid in the xz plane with `rows` x `cols` vertices, centred at the
/// origin. Row 0 lies at +z; texture coordinates run from (0, 0) at the first vertex to (1, 1)
/// at the last.
pub fn create_grid(width: f32, depth: f32, rows: u32, cols: u32) -> MeshData {
    let rows = rows.max(2);
    let cols = cols.max(2);
    let half_width = 0.5 * width;
    let half_depth = 0.5 * depth;
    let dx = width / (cols - 1) as f32;
    let dz = depth / (rows - 1) as f32;
    let du = 1.0 / (cols - 1) as f32;
    let dv = 1.0 / (rows - 1) as f32;

    let mut mesh = MeshData {
        vertices: Vec::with_capacity((rows * cols) as usize),
        indices: grid_indices(rows, cols),
    };
    for i in 0..rows {
        let z = half_depth - i as f32 * dz;
        for j in 0..cols {
            let x = -half_width + j as f32 * dx;
            mesh.vertices.push(Vertex::new(
                Vec3::new(x, 0.0, z),
                Vec3::Y,
                Vec2::new(j as f32 * du, i as f32 * dv),
            ));
        }
    }
    mesh
}

/// Two triangles per cell of a `rows` x `cols` vertex grid.
pub fn grid_indices(rows: u32, cols: u32) -> Vec<u32> {
    if rows < 2 || cols < 2 {
        return Vec::new();
    }
    let mut indices = Vec::with_capacity(((rows - 1) * (cols - 1) * 6) as usize);
    for i in 0..rows - 1 {
        for j in 0..cols - 1 {
            indices.extend_from_slice(&[
                i * cols + j,
                i * cols + j + 1,
                (i + 1) * cols + j,
                (i + 1) * cols + j,
                i * cols + j + 1,
                (i + 1) * cols + j + 1,
            ]);
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indices_in_range(mesh: &MeshData) {
        let count = mesh.vertices.len() as u32;
        assert!(mesh.indices.iter().all(|&i| i < count));
        assert_eq!(mesh.indices.len() % 3, 0);
    }

    #[test]
    fn grid_layout() {
        let grid = create_grid(160.0, 160.0, 50, 50);
        assert_eq!(grid.vertices.len(), 2500);
        assert_eq!(grid.indices.len(), 49 * 49 * 6);
        assert_indices_in_range(&grid);

        let first = grid.vertices[0];
        let last = grid.vertices[2499];
        assert_eq!(first.pos, Vec3::new(-80.0, 0.0, 80.0));
        assert!((last.pos - Vec3::new(80.0, 0.0, -80.0)).length() < 1e-3);
        assert_eq!(first.tex_c, Vec2::ZERO);
        assert!((last.tex_c - Vec2::ONE).length() < 1e-5);
    }

    #[test]
    fn box_and_sphere_are_closed_index_sets() {
        let cube = create_box(1.0, 2.0, 3.0);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert_indices_in_range(&cube);
        assert!(cube
            .vertices
            .iter()
            .all(|v| v.pos.abs().cmple(Vec3::new(0.5, 1.0, 1.5) + 1e-5).all()));

        let sphere = create_sphere(2.0, 12, 8);
        assert_eq!(sphere.vertices.len(), 2 + 7 * 13);
        assert_eq!(sphere.indices.len(), (12 * 3 * 2 + 12 * 6 * 6) as usize);
        assert_indices_in_range(&sphere);
        assert!(sphere
            .vertices
            .iter()
            .all(|v| (v.pos.length() - 2.0).abs() < 1e-4));
    }
}
