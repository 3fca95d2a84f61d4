use super::{HeightField, HeightSource, TerrainDesc};
use crate::geom::{create_grid, MeshData};
use glam::Vec3;

pub fn hill_height(x: f32, z: f32) -> f32 {
    0.3 * (z * (0.1 * x).sin() + x * (0.1 * z).cos())
}

pub fn hill_normal(x: f32, z: f32) -> Vec3 {
    Vec3::new(
        -0.03 * z * (0.1 * x).cos() - 0.3 * (0.1 * z).cos(),
        1.0,
        -0.3 * (0.1 * x).sin() + 0.03 * x * (0.1 * z).sin(),
    )
    .normalize()
}

/// Builds the terrain grid and lifts it according to the descriptor's height source.
/// Texture coordinates span [0, 1] across the whole terrain.
pub fn build_terrain_mesh(desc: &TerrainDesc, field: &HeightField) -> MeshData {
    let mut mesh = create_grid(
        desc.world_width,
        desc.world_depth,
        desc.grid_rows,
        desc.grid_cols,
    );

    match desc.height_source {
        HeightSource::AnalyticHills => {
            for v in mesh.vertices.iter_mut() {
                v.pos.y = hill_height(v.pos.x, v.pos.z);
                v.normal = hill_normal(v.pos.x, v.pos.z);
            }
        }
        HeightSource::HeightField { vertical_scale } => {
            for v in mesh.vertices.iter_mut() {
                v.pos.y = field.sample(v.tex_c.x, v.tex_c.y) * vertical_scale;
            }
            apply_grid_normals(&mut mesh, desc);
        }
    }
    mesh
}

/// Central-difference normals for a displaced grid laid out by `create_grid`.
fn apply_grid_normals(mesh: &mut MeshData, desc: &TerrainDesc) {
    let rows = desc.grid_rows as usize;
    let cols = desc.grid_cols as usize;
    let dx = desc.world_width / (cols - 1) as f32;
    let dz = desc.world_depth / (rows - 1) as f32;
    let heights: Vec<f32> = mesh.vertices.iter().map(|v| v.pos.y).collect();
    let h = |i: usize, j: usize| heights[i * cols + j];

    for i in 0..rows {
        // row index grows towards -z
        let (up, down) = (i.saturating_sub(1), (i + 1).min(rows - 1));
        for j in 0..cols {
            let (left, right) = (j.saturating_sub(1), (j + 1).min(cols - 1));
            let dydx = (h(i, right) - h(i, left)) / ((right - left) as f32 * dx);
            let dydz = (h(up, j) - h(down, j)) / ((down - up) as f32 * dz);
            mesh.vertices[i * cols + j].normal = Vec3::new(-dydx, 1.0, -dydz).normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_field() -> HeightField {
        HeightField::from_data(2, 2, vec![0.5; 4])
    }

    #[test]
    fn analytic_hills_ignore_the_field() {
        let desc = TerrainDesc {
            grid_rows: 5,
            grid_cols: 5,
            ..Default::default()
        };
        let mesh = build_terrain_mesh(&desc, &flat_field());
        for v in &mesh.vertices {
            assert_eq!(v.pos.y, hill_height(v.pos.x, v.pos.z));
            assert!((v.normal.length() - 1.0).abs() < 1e-5);
        }
        assert_eq!(hill_height(0.0, 0.0), 0.0);
        assert!((hill_normal(0.0, 0.0) - Vec3::new(-0.3, 1.0, 0.0).normalize()).length() < 1e-6);
    }

    #[test]
    fn height_field_source_displaces_grid() {
        // a ramp rising along +x
        let field = HeightField::from_data(2, 2, vec![0.0, 1.0, 0.0, 1.0]);
        let desc = TerrainDesc {
            world_width: 10.0,
            world_depth: 10.0,
            grid_rows: 3,
            grid_cols: 3,
            height_source: HeightSource::HeightField {
                vertical_scale: 10.0,
            },
            ..Default::default()
        };
        let mesh = build_terrain_mesh(&desc, &field);
        let ys: Vec<f32> = mesh.vertices.iter().map(|v| v.pos.y).collect();
        assert_eq!(&ys[0..3], &[0.0, 5.0, 10.0]);

        // slope 1 along x tilts every normal towards -x by 45 degrees
        let expected = Vec3::new(-1.0, 1.0, 0.0).normalize();
        for v in &mesh.vertices {
            assert!((v.normal - expected).length() < 1e-5);
        }
    }
}
