//! Static content of the scene: placeholder textures, the shape meshes and the optional model.

use super::{MeshGeometry, SceneAssets, SubmeshGeometry, TextureHandle, Vertex, VertexSource};
use crate::geom::MeshData;
use crate::gpu::{BufferDesc, BufferUsage, Gpu, GpuError, TextureDesc, TextureFormat};
use super::RendererError;
use indexmap::IndexMap;

const SOLID_TEXTURE_SIZE: u32 = 4;

/// Creates a small single-colour texture and registers it in the descriptor table.
pub(crate) fn create_solid_texture(
    gpu: &dyn Gpu,
    assets: &mut SceneAssets,
    name: &str,
    rgba: [u8; 4],
) -> Result<TextureHandle, RendererError> {
    let texels: Vec<u8> = rgba
        .iter()
        .copied()
        .cycle()
        .take((SOLID_TEXTURE_SIZE * SOLID_TEXTURE_SIZE * 4) as usize)
        .collect();
    let texture = gpu.create_texture(
        &TextureDesc {
            label: name.to_owned(),
            width: SOLID_TEXTURE_SIZE,
            height: SOLID_TEXTURE_SIZE,
            format: TextureFormat::Rgba8Unorm,
        },
        &texels,
    )?;
    match assets.add_texture(name, texture, SOLID_TEXTURE_SIZE, SOLID_TEXTURE_SIZE) {
        Ok(handle) => Ok(handle),
        Err(err) => {
            gpu.destroy_texture(texture);
            Err(err.into())
        }
    }
}

/// Concatenates `parts` into one vertex and one index buffer, one submesh per part.
pub(crate) fn upload_packed_mesh(
    gpu: &dyn Gpu,
    name: &str,
    parts: &[(&str, &MeshData)],
) -> Result<MeshGeometry, GpuError> {
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut submeshes = IndexMap::new();
    for (part_name, data) in parts {
        submeshes.insert(
            part_name.to_string(),
            SubmeshGeometry {
                index_count: data.indices.len() as u32,
                start_index: indices.len() as u32,
                base_vertex: vertices.len() as i32,
            },
        );
        vertices.extend_from_slice(&data.vertices);
        indices.extend_from_slice(&data.indices);
    }

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let vertex_buffer = gpu.create_device_buffer(
        &BufferDesc {
            label: format!("{} vertices", name),
            size: vertex_bytes.len() as u64,
            usage: BufferUsage::Vertex,
        },
        vertex_bytes,
    )?;
    let index_bytes: &[u8] = bytemuck::cast_slice(&indices);
    let index_buffer = match gpu.create_device_buffer(
        &BufferDesc {
            label: format!("{} indices", name),
            size: index_bytes.len() as u64,
            usage: BufferUsage::Index,
        },
        index_bytes,
    ) {
        Ok(buffer) => buffer,
        Err(err) => {
            gpu.destroy_buffer(vertex_buffer);
            return Err(err);
        }
    };

    Ok(MeshGeometry {
        name: name.to_owned(),
        vertex_source: VertexSource::Static(vertex_buffer),
        vertex_stride: std::mem::size_of::<Vertex>() as u32,
        vertex_count: vertices.len() as u32,
        index_buffer,
        index_count: indices.len() as u32,
        submeshes,
    })
}

/// A mesh whose vertices live in each frame's dynamic vertex buffer. Only the indices are
/// uploaded once.
pub(crate) fn upload_per_frame_mesh(
    gpu: &dyn Gpu,
    name: &str,
    vertex_count: u32,
    indices: &[u32],
) -> Result<MeshGeometry, GpuError> {
    let index_bytes: &[u8] = bytemuck::cast_slice(indices);
    let index_buffer = gpu.create_device_buffer(
        &BufferDesc {
            label: format!("{} indices", name),
            size: index_bytes.len() as u64,
            usage: BufferUsage::Index,
        },
        index_bytes,
    )?;
    let mut submeshes = IndexMap::new();
    submeshes.insert(
        name.to_owned(),
        SubmeshGeometry {
            index_count: indices.len() as u32,
            start_index: 0,
            base_vertex: 0,
        },
    );
    Ok(MeshGeometry {
        name: name.to_owned(),
        vertex_source: VertexSource::PerFrame,
        vertex_stride: std::mem::size_of::<Vertex>() as u32,
        vertex_count,
        index_buffer,
        index_count: indices.len() as u32,
        submeshes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{create_box, create_sphere};
    use crate::gpu::{CompletionMode, HeadlessGpu};

    #[test]
    fn packed_mesh_offsets_follow_each_part() {
        let gpu = HeadlessGpu::new(CompletionMode::Immediate);
        let cube = create_box(1.0, 1.0, 1.0);
        let ball = create_sphere(1.0, 8, 6);
        let mesh = upload_packed_mesh(&gpu, "shapes", &[("box", &cube), ("sphere", &ball)]).unwrap();

        let sphere = mesh.submesh("sphere").unwrap();
        assert_eq!(sphere.start_index, cube.indices.len() as u32);
        assert_eq!(sphere.base_vertex, cube.vertices.len() as i32);
        assert_eq!(mesh.index_count as usize, cube.indices.len() + ball.indices.len());
        assert_eq!(gpu.live_buffer_count(), 2);

        mesh.destroy(&gpu);
        assert_eq!(gpu.live_buffer_count(), 0);
    }

    #[test]
    fn solid_texture_takes_a_descriptor() {
        let gpu = HeadlessGpu::new(CompletionMode::Immediate);
        let mut assets = SceneAssets::new(3, 2);
        let a = create_solid_texture(&gpu, &mut assets, "a", [255, 0, 0, 255]).unwrap();
        let b = create_solid_texture(&gpu, &mut assets, "b", [0, 255, 0, 255]).unwrap();
        assert_eq!(assets.texture(a).descriptor(), 0);
        assert_eq!(assets.texture(b).descriptor(), 1);

        // the table is full, and the texture that did not fit is released again
        assert!(create_solid_texture(&gpu, &mut assets, "c", [0, 0, 255, 255]).is_err());
        assert_eq!(gpu.live_texture_count(), 2);
    }
}
