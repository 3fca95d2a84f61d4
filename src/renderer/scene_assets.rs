use super::DirtyCounter;
use crate::gpu::{BufferId, Gpu, TextureId};
use crate::util::{FreeListAllocator, FreeListError};
use glam::{Mat4, Vec3, Vec4};
use indexmap::IndexMap;

macro_rules! asset_handle {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn from_index(index: u32) -> Self {
                Self(index)
            }

            pub fn index(&self) -> u32 {
                self.0
            }
        }
    };
}

asset_handle!(MaterialHandle);
asset_handle!(MeshHandle);
asset_handle!(TextureHandle);

#[derive(Debug, Clone)]
pub struct MaterialDesc {
    pub name: String,
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub transform: Mat4,
    pub diffuse_texture: Option<TextureHandle>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse_albedo: Vec4::ONE,
            fresnel_r0: Vec3::splat(0.01),
            roughness: 0.25,
            transform: Mat4::IDENTITY,
            diffuse_texture: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    desc: MaterialDesc,
    dirty: DirtyCounter,
}

impl Material {
    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn desc(&self) -> &MaterialDesc {
        &self.desc
    }

    pub fn dirty(&self) -> DirtyCounter {
        self.dirty
    }

    pub fn consume_dirty(&mut self) {
        self.dirty.consume();
    }
}

/// Where a mesh's vertices come from at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexSource {
    /// A GPU-resident buffer written once at build time.
    Static(BufferId),
    /// The dynamic vertex buffer of whichever frame slot is being recorded.
    PerFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmeshGeometry {
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
}

#[derive(Debug, Clone)]
pub struct MeshGeometry {
    pub name: String,
    pub vertex_source: VertexSource,
    pub vertex_stride: u32,
    pub vertex_count: u32,
    pub index_buffer: BufferId,
    pub index_count: u32,
    pub submeshes: IndexMap<String, SubmeshGeometry>,
}

impl MeshGeometry {
    pub fn submesh(&self, name: &str) -> Option<SubmeshGeometry> {
        self.submeshes.get(name).copied()
    }

    /// Releases the GPU buffers the mesh owns.
    pub fn destroy(&self, gpu: &dyn Gpu) {
        if let VertexSource::Static(buffer) = self.vertex_source {
            gpu.destroy_buffer(buffer);
        }
        gpu.destroy_buffer(self.index_buffer);
    }
}

#[derive(Debug, Clone)]
pub struct TextureEntry {
    pub name: String,
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
    descriptor: u32,
    descriptor_handle: u64,
}

impl TextureEntry {
    /// Index of the texture in the shader-visible descriptor table.
    pub fn descriptor(&self) -> u32 {
        self.descriptor
    }
}

/// Owner of every material, mesh and texture the render items refer to.
pub struct SceneAssets {
    frame_count: u32,
    materials: Vec<Material>,
    meshes: Vec<Option<MeshGeometry>>,
    textures: Vec<Option<TextureEntry>>,
    descriptors: FreeListAllocator,
}

impl SceneAssets {
    pub fn new(frame_count: u32, descriptor_capacity: u32) -> Self {
        Self {
            frame_count,
            materials: Vec::new(),
            meshes: Vec::new(),
            textures: Vec::new(),
            descriptors: FreeListAllocator::new(descriptor_capacity),
        }
    }

    pub fn add_material(&mut self, desc: MaterialDesc) -> MaterialHandle {
        let handle = MaterialHandle(self.materials.len() as u32);
        self.materials.push(Material {
            desc,
            dirty: DirtyCounter::new(self.frame_count),
        });
        handle
    }

    pub fn material(&self, handle: MaterialHandle) -> &Material {
        &self.materials[handle.0 as usize]
    }

    /// Edits a material and schedules its constants for every frame slot.
    pub fn update_material(&mut self, handle: MaterialHandle, f: impl FnOnce(&mut MaterialDesc)) {
        let material = &mut self.materials[handle.0 as usize];
        f(&mut material.desc);
        material.dirty.reset(self.frame_count);
    }

    pub fn material_count(&self) -> u32 {
        self.materials.len() as u32
    }

    pub fn materials_mut(&mut self) -> impl Iterator<Item = (MaterialHandle, &mut Material)> {
        self.materials
            .iter_mut()
            .enumerate()
            .map(|(index, material)| (MaterialHandle(index as u32), material))
    }

    pub fn find_material(&self, name: &str) -> Option<MaterialHandle> {
        self.materials
            .iter()
            .position(|m| m.desc.name == name)
            .map(|index| MaterialHandle(index as u32))
    }

    pub fn add_mesh(&mut self, mesh: MeshGeometry) -> MeshHandle {
        if let Some(index) = self.meshes.iter().position(Option::is_none) {
            self.meshes[index] = Some(mesh);
            return MeshHandle(index as u32);
        }
        self.meshes.push(Some(mesh));
        MeshHandle(self.meshes.len() as u32 - 1)
    }

    /// # Panics
    ///
    /// If the mesh was removed.
    pub fn mesh(&self, handle: MeshHandle) -> &MeshGeometry {
        match self.meshes.get(handle.0 as usize).and_then(Option::as_ref) {
            Some(mesh) => mesh,
            None => panic!("mesh {} used after removal", handle.0),
        }
    }

    /// Takes a mesh out of the table. The caller releases its GPU buffers.
    pub fn remove_mesh(&mut self, handle: MeshHandle) -> Option<MeshGeometry> {
        self.meshes.get_mut(handle.0 as usize)?.take()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.iter().flatten().count()
    }

    pub fn add_texture(
        &mut self,
        name: &str,
        texture: TextureId,
        width: u32,
        height: u32,
    ) -> Result<TextureHandle, FreeListError> {
        let range = self.descriptors.allocate(1)?;
        let entry = TextureEntry {
            name: name.to_owned(),
            texture,
            width,
            height,
            descriptor: range.first,
            descriptor_handle: range.handle,
        };
        if let Some(index) = self.textures.iter().position(Option::is_none) {
            self.textures[index] = Some(entry);
            return Ok(TextureHandle(index as u32));
        }
        self.textures.push(Some(entry));
        Ok(TextureHandle(self.textures.len() as u32 - 1))
    }

    /// # Panics
    ///
    /// If the texture was removed.
    pub fn texture(&self, handle: TextureHandle) -> &TextureEntry {
        match self.textures.get(handle.0 as usize).and_then(Option::as_ref) {
            Some(texture) => texture,
            None => panic!("texture {} used after removal", handle.0),
        }
    }

    /// Takes a texture out of the table and frees its descriptor slot. The caller releases the
    /// GPU texture.
    pub fn remove_texture(&mut self, handle: TextureHandle) -> Option<TextureEntry> {
        let entry = self.textures.get_mut(handle.0 as usize)?.take()?;
        if let Err(err) = self.descriptors.free(entry.descriptor_handle) {
            log::error!("texture {} lost its descriptor: {}", entry.name, err);
        }
        Some(entry)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.iter().flatten().count()
    }

    /// Releases every GPU resource the table still owns.
    pub fn destroy_all(&mut self, gpu: &dyn Gpu) {
        for mesh in self.meshes.drain(..).flatten() {
            mesh.destroy(gpu);
        }
        for texture in self.textures.drain(..).flatten() {
            gpu.destroy_texture(texture.texture);
        }
        self.descriptors.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(name: &str) -> MeshGeometry {
        MeshGeometry {
            name: name.to_owned(),
            vertex_source: VertexSource::PerFrame,
            vertex_stride: 32,
            vertex_count: 0,
            index_buffer: BufferId(0),
            index_count: 0,
            submeshes: IndexMap::new(),
        }
    }

    #[test]
    fn removed_mesh_slot_is_reused() {
        let mut assets = SceneAssets::new(3, 8);
        let a = assets.add_mesh(mesh("a"));
        let b = assets.add_mesh(mesh("b"));
        assert_eq!(assets.remove_mesh(a).unwrap().name, "a");
        let c = assets.add_mesh(mesh("c"));
        assert_eq!(c, a);
        assert_eq!(assets.mesh(b).name, "b");
        assert_eq!(assets.mesh_count(), 2);
    }

    #[test]
    fn texture_descriptors_come_from_free_list() {
        let mut assets = SceneAssets::new(3, 2);
        let grass = assets.add_texture("grass", TextureId(1), 4, 4).unwrap();
        let height = assets.add_texture("height", TextureId(2), 4, 4).unwrap();
        assert!(assets.add_texture("rock", TextureId(3), 4, 4).is_err());

        assert_eq!(assets.texture(height).descriptor(), 1);
        assets.remove_texture(grass).unwrap();
        let rock = assets.add_texture("rock", TextureId(3), 4, 4).unwrap();
        assert_eq!(assets.texture(rock).descriptor(), 0);
    }

    #[test]
    fn material_updates_reset_dirty_counter() {
        let mut assets = SceneAssets::new(3, 1);
        let water = assets.add_material(MaterialDesc {
            name: "water".into(),
            ..Default::default()
        });
        assert_eq!(assets.find_material("water"), Some(water));
        assert_eq!(assets.find_material("lava"), None);

        for (_, material) in assets.materials_mut() {
            material.consume_dirty();
        }
        assert_eq!(assets.material(water).dirty().get(), 2);

        assets.update_material(water, |desc| desc.roughness = 0.0);
        assert_eq!(assets.material(water).dirty().get(), 3);
        assert_eq!(assets.material(water).desc().roughness, 0.0);
    }
}
