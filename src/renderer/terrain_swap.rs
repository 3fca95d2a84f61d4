use super::{
    DirtyCounter, DrawRange, FrameResources, FrameRing, MaterialHandle, MeshGeometry, MeshHandle,
    RenderItem, RenderItemId, RenderItemKind, RenderItemRegistry, RenderLayer, SceneAssets,
    SubmeshGeometry, TerrainConstants, TextureHandle, Vertex, VertexSource,
};
use crate::geom::Aabb;
use crate::gpu::{
    BufferDesc, BufferUsage, Gpu, TextureDesc, TextureFormat, TextureId,
};
use crate::terrain::{
    build_terrain_mesh, terrain_constants, HeightField, HeightSource, TerrainDesc, TerrainError,
};
use glam::Vec3;
use indexmap::IndexMap;

/// The live terrain and the handles it occupies.
pub(crate) struct TerrainState {
    pub desc: TerrainDesc,
    pub item: RenderItemId,
    pub mesh: MeshHandle,
    pub height_map: TextureHandle,
    pub material: MaterialHandle,
    pub constants: TerrainConstants,
    pub dirty: DirtyCounter,
}

/// GPU resources of a terrain that is not installed yet.
struct TerrainBuild {
    texture: TextureId,
    field_size: (u32, u32),
    mesh: MeshGeometry,
    constants: TerrainConstants,
}

fn build_terrain(gpu: &dyn Gpu, desc: &TerrainDesc) -> Result<TerrainBuild, TerrainError> {
    let field = HeightField::generate(desc);
    let (lo, hi) = field.min_max();
    log::debug!(
        "height field {}x{} spans [{:.3}, {:.3}]",
        field.width(),
        field.height(),
        lo,
        hi
    );

    let texture = gpu.create_texture(
        &TextureDesc {
            label: "terrain height map".into(),
            width: field.width(),
            height: field.height(),
            format: TextureFormat::R32Float,
        },
        field.as_bytes(),
    )?;

    if desc.height_source == HeightSource::AnalyticHills {
        log::debug!("terrain geometry follows the analytic hills, not the height map");
    }
    let mesh_data = build_terrain_mesh(desc, &field);

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh_data.vertices);
    let vertex_buffer = match gpu.create_device_buffer(
        &BufferDesc {
            label: "terrain vertices".into(),
            size: vertex_bytes.len() as u64,
            usage: BufferUsage::Vertex,
        },
        vertex_bytes,
    ) {
        Ok(buffer) => buffer,
        Err(err) => {
            gpu.destroy_texture(texture);
            return Err(err.into());
        }
    };

    let index_bytes: &[u8] = bytemuck::cast_slice(&mesh_data.indices);
    let index_buffer = match gpu.create_device_buffer(
        &BufferDesc {
            label: "terrain indices".into(),
            size: index_bytes.len() as u64,
            usage: BufferUsage::Index,
        },
        index_bytes,
    ) {
        Ok(buffer) => buffer,
        Err(err) => {
            gpu.destroy_buffer(vertex_buffer);
            gpu.destroy_texture(texture);
            return Err(err.into());
        }
    };

    let bounds = Aabb::from_points(mesh_data.positions()).unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));
    let constants = terrain_constants(
        &desc.bands,
        bounds.min().y,
        bounds.max().y,
        desc.world_size(),
    );

    let index_count = mesh_data.indices.len() as u32;
    let mut submeshes = IndexMap::new();
    submeshes.insert(
        "terrain".to_owned(),
        SubmeshGeometry {
            index_count,
            start_index: 0,
            base_vertex: 0,
        },
    );

    Ok(TerrainBuild {
        texture,
        field_size: (field.width(), field.height()),
        mesh: MeshGeometry {
            name: "terrain".into(),
            vertex_source: VertexSource::Static(vertex_buffer),
            vertex_stride: std::mem::size_of::<Vertex>() as u32,
            vertex_count: mesh_data.vertices.len() as u32,
            index_buffer,
            index_count,
            submeshes,
        },
        constants,
    })
}

fn terrain_item(material: MaterialHandle, mesh: MeshHandle, index_count: u32) -> RenderItem {
    RenderItem::new(
        RenderItemKind::Terrain,
        RenderLayer::Opaque,
        material,
        mesh,
        DrawRange {
            index_count,
            start_index: 0,
            base_vertex: 0,
        },
    )
}

/// Moves a finished build into the asset table. On failure the build's resources are released.
fn install(
    gpu: &dyn Gpu,
    assets: &mut SceneAssets,
    build: TerrainBuild,
) -> Result<(MeshHandle, TextureHandle, u32, TerrainConstants), TerrainError> {
    let TerrainBuild {
        texture,
        field_size,
        mesh,
        constants,
    } = build;
    let height_map =
        match assets.add_texture("terrain height map", texture, field_size.0, field_size.1) {
            Ok(handle) => handle,
            Err(err) => {
                mesh.destroy(gpu);
                gpu.destroy_texture(texture);
                return Err(err.into());
            }
        };
    let index_count = mesh.index_count;
    Ok((assets.add_mesh(mesh), height_map, index_count, constants))
}

/// Builds the first terrain of the scene.
pub(crate) fn create_terrain(
    gpu: &dyn Gpu,
    assets: &mut SceneAssets,
    registry: &mut RenderItemRegistry,
    material: MaterialHandle,
    desc: TerrainDesc,
    frame_count: u32,
) -> Result<TerrainState, TerrainError> {
    desc.validate()?;
    let build = build_terrain(gpu, &desc)?;
    let (mesh, height_map, index_count, constants) = install(gpu, assets, build)?;
    let item = registry.insert(terrain_item(material, mesh, index_count))?;
    Ok(TerrainState {
        desc,
        item,
        mesh,
        height_map,
        material,
        constants,
        dirty: DirtyCounter::new(frame_count),
    })
}

/// Replaces the live terrain with one built from `desc`.
///
/// Every frame slot is drained first because in-flight command lists may still read the old
/// texture and buffers. The new resources are complete before anything old is touched, so a
/// failure leaves the previous terrain in place.
pub(crate) fn regenerate_terrain(
    gpu: &dyn Gpu,
    ring: &FrameRing<FrameResources>,
    assets: &mut SceneAssets,
    registry: &mut RenderItemRegistry,
    state: &mut TerrainState,
    desc: TerrainDesc,
    frame_count: u32,
) -> Result<(), TerrainError> {
    // bad parameters must not stall the GPU
    desc.validate()?;
    ring.drain(gpu)?;

    let build = build_terrain(gpu, &desc)?;
    let (mesh, height_map, index_count, constants) = install(gpu, assets, build)?;

    // the new item goes to the end of the opaque bucket, after the props
    registry.remove(state.item);
    // the removal above freed an index, so this cannot run out of room
    let item = registry.insert(terrain_item(state.material, mesh, index_count))?;

    if let Some(old_mesh) = assets.remove_mesh(state.mesh) {
        old_mesh.destroy(gpu);
    }
    if let Some(old_texture) = assets.remove_texture(state.height_map) {
        gpu.destroy_texture(old_texture.texture);
    }

    state.desc = desc;
    state.item = item;
    state.mesh = mesh;
    state.height_map = height_map;
    state.constants = constants;
    state.dirty.reset(frame_count);
    Ok(())
}
