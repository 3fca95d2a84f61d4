use super::{
    create_solid_texture, create_terrain, default_lights, record_frame, regenerate_terrain,
    upload_packed_mesh, upload_per_frame_mesh, DrawRange, FrameResources, FrameResourcesDesc,
    FrameRing, MaterialConstants, MaterialDesc, MaterialHandle, ObjectConstants, PassConstants,
    PassInputs, RenderItem, RenderItemId, RenderItemKind, RenderItemRegistry, RenderLayer,
    RendererDesc, SceneAssets, TerrainConstants, TerrainState, WaterConstants,
};
use crate::gameplay::Camera;
use crate::geom::{create_box, create_sphere, load_text_model};
use crate::gpu::{CommandList, FenceValue, Gpu, GpuError};
use crate::terrain::{TerrainDesc, TerrainError};
use crate::util::{timed, FreeListError};
use crate::waves::Waves;
use anyhow::Context;
use glam::{Mat4, Vec2, Vec3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("terrain regeneration failed: {0}")]
    Terrain(#[from] TerrainError),
    #[error("out of scene slots: {0}")]
    Capacity(#[from] FreeListError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    Advanced,
}

struct WaterState {
    item: RenderItemId,
    material: MaterialHandle,
    tex_offset: Vec2,
}

/// Drives the terrain and water scene on top of a [`Gpu`].
///
/// Each frame is split in two: [`Renderer::advance_frame`] claims the next frame slot and writes
/// every CPU-side update into it, [`Renderer::submit_frame`] records the passes, submits them and
/// stamps the slot with a new fence value.
pub struct Renderer<G: Gpu> {
    gpu: G,
    desc: RendererDesc,
    frame_count: u32,
    ring: FrameRing<FrameResources>,
    registry: RenderItemRegistry,
    assets: SceneAssets,
    waves: Waves,
    terrain: TerrainState,
    water: WaterState,
    pass_constants: PassConstants,
    pending_terrain: Option<TerrainDesc>,
    frame_state: FrameState,
    total_time: f32,
    wireframe: bool,
}

impl<G: Gpu> Renderer<G> {
    pub fn new(gpu: G, desc: RendererDesc) -> anyhow::Result<Self> {
        anyhow::ensure!(desc.frame_count >= 1, "at least one frame slot is required");
        let frame_count = desc.frame_count as u32;
        log::info!(
            "creating renderer on {} with {} frames in flight",
            gpu.name(),
            frame_count
        );

        let mut assets = SceneAssets::new(frame_count, desc.descriptor_capacity);
        let mut registry = RenderItemRegistry::new(desc.max_render_items, frame_count);

        let grass_tex = create_solid_texture(&gpu, &mut assets, "grass", [90, 140, 60, 255])?;
        let water_tex = create_solid_texture(&gpu, &mut assets, "water", [40, 90, 160, 255])?;
        let stone_tex = create_solid_texture(&gpu, &mut assets, "stone", [150, 150, 150, 255])?;

        let grass = assets.add_material(MaterialDesc {
            name: "grass".into(),
            fresnel_r0: Vec3::splat(0.01),
            roughness: 0.125,
            diffuse_texture: Some(grass_tex),
            ..Default::default()
        });
        let water_material = assets.add_material(MaterialDesc {
            name: "water".into(),
            diffuse_albedo: glam::Vec4::new(1.0, 1.0, 1.0, 0.5),
            fresnel_r0: Vec3::splat(0.1),
            roughness: 0.0,
            diffuse_texture: Some(water_tex),
            ..Default::default()
        });
        let stone = assets.add_material(MaterialDesc {
            name: "stone".into(),
            fresnel_r0: Vec3::splat(0.05),
            roughness: 0.3,
            diffuse_texture: Some(stone_tex),
            ..Default::default()
        });
        let sky = assets.add_material(MaterialDesc {
            name: "sky".into(),
            fresnel_r0: Vec3::splat(0.1),
            roughness: 1.0,
            ..Default::default()
        });

        let terrain = create_terrain(
            &gpu,
            &mut assets,
            &mut registry,
            grass,
            desc.terrain.clone(),
            frame_count,
        )
        .context("failed to build the initial terrain")?;

        let waves = Waves::new(desc.waves.clone());
        let waves_mesh = upload_per_frame_mesh(&gpu, "waves", waves.vertex_count(), &waves.indices())?;
        let waves_index_count = waves_mesh.index_count;
        let waves_mesh = assets.add_mesh(waves_mesh);
        let water_item = registry.insert(RenderItem::new(
            RenderItemKind::Water,
            RenderLayer::Transparent,
            water_material,
            waves_mesh,
            DrawRange {
                index_count: waves_index_count,
                start_index: 0,
                base_vertex: 0,
            },
        ))?;

        let cube = create_box(8.0, 8.0, 8.0);
        let ball = create_sphere(4.0, 20, 20);
        let dome = create_sphere(0.5, 20, 20);
        let shapes = upload_packed_mesh(
            &gpu,
            "shapes",
            &[("box", &cube), ("sphere", &ball), ("sky", &dome)],
        )?;
        let submesh_range = |name: &str| {
            shapes.submesh(name).map(|s| DrawRange {
                index_count: s.index_count,
                start_index: s.start_index,
                base_vertex: s.base_vertex,
            })
        };
        let (box_range, sphere_range, sky_range) = match (
            submesh_range("box"),
            submesh_range("sphere"),
            submesh_range("sky"),
        ) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => anyhow::bail!("shape mesh is missing a submesh"),
        };
        let shapes = assets.add_mesh(shapes);

        registry.insert(
            RenderItem::new(RenderItemKind::Prop, RenderLayer::Opaque, stone, shapes, box_range)
                .with_world(Mat4::from_translation(Vec3::new(30.0, 12.0, -20.0))),
        )?;
        registry.insert(
            RenderItem::new(RenderItemKind::Prop, RenderLayer::Opaque, stone, shapes, sphere_range)
                .with_world(Mat4::from_translation(Vec3::new(-30.0, 14.0, 20.0))),
        )?;
        registry.insert(
            RenderItem::new(RenderItemKind::Sky, RenderLayer::Sky, sky, shapes, sky_range)
                .with_world(Mat4::from_scale(Vec3::splat(5000.0))),
        )?;

        if let Some(path) = &desc.skull_model {
            match load_text_model(path) {
                Ok(model) => {
                    let skull = assets.add_material(MaterialDesc {
                        name: "skull".into(),
                        diffuse_albedo: glam::Vec4::new(0.8, 0.8, 0.8, 1.0),
                        fresnel_r0: Vec3::splat(0.2),
                        roughness: 0.2,
                        ..Default::default()
                    });
                    let mesh = upload_packed_mesh(&gpu, "skull", &[("skull", &model)])?;
                    let draw = DrawRange {
                        index_count: mesh.index_count,
                        start_index: 0,
                        base_vertex: 0,
                    };
                    let mesh = assets.add_mesh(mesh);
                    registry.insert(
                        RenderItem::new(RenderItemKind::Prop, RenderLayer::Opaque, skull, mesh, draw)
                            .with_world(
                                Mat4::from_translation(Vec3::new(0.0, 30.0, 0.0))
                                    * Mat4::from_scale(Vec3::splat(0.5)),
                            ),
                    )?;
                }
                Err(err) => log::warn!("skipping model {}: {}", path.display(), err),
            }
        }

        let frame_desc = FrameResourcesDesc {
            pass_count: 1,
            object_count: desc.max_render_items,
            material_count: assets.material_count(),
            water_count: registry.layer(RenderLayer::Transparent).len().max(1) as u32,
            wave_vertex_count: waves.vertex_count(),
        };
        let slots = (0..desc.frame_count)
            .map(|slot| FrameResources::new(&gpu, slot, &frame_desc))
            .collect::<Result<Vec<_>, _>>()
            .context("failed to create frame resources")?;
        let ring = FrameRing::new(slots, desc.fence_timeout);

        log::info!(
            "scene ready: {} render items, {} materials, {} meshes, {} textures",
            registry.len(),
            assets.material_count(),
            assets.mesh_count(),
            assets.texture_count()
        );

        let wireframe = desc.wireframe;
        Ok(Self {
            gpu,
            desc,
            frame_count,
            ring,
            registry,
            assets,
            waves,
            terrain,
            water: WaterState {
                item: water_item,
                material: water_material,
                tex_offset: Vec2::ZERO,
            },
            pass_constants: PassConstants::default(),
            pending_terrain: None,
            frame_state: FrameState::Idle,
            total_time: 0.0,
            wireframe,
        })
    }

    /// Claims the next frame slot and writes this frame's CPU-side state into it.
    ///
    /// Blocks until the GPU has finished the previous use of the slot. A pending terrain
    /// regeneration runs first, before any slot is claimed; if it fails the old terrain stays,
    /// the error is returned and the next call lands on the same slot.
    ///
    /// # Panics
    ///
    /// If called again before [`Renderer::submit_frame`].
    pub fn advance_frame(&mut self, dt: f32, camera: &Camera) -> Result<(), RendererError> {
        assert_eq!(
            self.frame_state,
            FrameState::Idle,
            "advance_frame called twice without submit_frame"
        );

        // a failed rebuild returns before a slot is claimed, so the ring never skips one
        if let Some(desc) = self.pending_terrain.take() {
            timed("terrain regeneration", || self.regenerate(desc))?;
        }

        timed("slot wait", || self.ring.advance(&self.gpu))?;
        self.total_time += dt;

        let view = camera.view_matrix();
        let proj = camera.proj_matrix();

        timed("object constants", || self.update_object_constants());
        self.animate_materials(dt);
        self.update_material_constants();
        self.update_pass_constants(dt, camera, view, proj);
        self.update_water_constants(camera.position());

        self.update_terrain_constants();

        timed("waves", || {
            self.waves.update(dt);
            let vertices = self.waves.vertices();
            self.ring.current_mut().waves_vb.write_all(&vertices);
        });

        self.frame_state = FrameState::Advanced;
        Ok(())
    }

    /// Records and submits the frame prepared by [`Renderer::advance_frame`].
    ///
    /// # Panics
    ///
    /// If no frame was advanced.
    pub fn submit_frame(&mut self) -> Result<FenceValue, RendererError> {
        assert_eq!(
            self.frame_state,
            FrameState::Advanced,
            "submit_frame called without advance_frame"
        );
        self.frame_state = FrameState::Idle;

        timed("record and submit", || -> Result<(), GpuError> {
            let frame = self.ring.current();
            self.gpu.reset_command_allocator(frame.command_allocator)?;

            let mut list = CommandList::new(frame.command_allocator);
            record_frame(
                &PassInputs {
                    registry: &self.registry,
                    assets: &self.assets,
                    frame,
                    height_map: Some(self.terrain.height_map),
                    wireframe: self.wireframe,
                },
                &mut list,
            );
            self.gpu.submit(&list)?;
            self.gpu.present()
        })?;

        let fence = self.ring.retire(&self.gpu)?;
        log::trace!(
            "frame slot {} submitted with fence {}",
            self.ring.current_index(),
            fence
        );
        Ok(fence)
    }

    /// Schedules a terrain rebuild for the next [`Renderer::advance_frame`]. A later request
    /// replaces an earlier one that has not run yet.
    pub fn request_terrain_regeneration(&mut self, desc: TerrainDesc) {
        if self.pending_terrain.replace(desc).is_some() {
            log::debug!("replacing a pending terrain regeneration");
        }
    }

    pub fn is_terrain_regeneration_pending(&self) -> bool {
        self.pending_terrain.is_some()
    }

    pub fn set_water_transform(&mut self, translation: Vec3, scale: f32) {
        self.registry.set_world(
            self.water.item,
            Mat4::from_translation(translation) * Mat4::from_scale(Vec3::splat(scale)),
        );
    }

    pub fn set_wireframe(&mut self, wireframe: bool) {
        self.wireframe = wireframe;
    }

    pub fn wireframe(&self) -> bool {
        self.wireframe
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn desc(&self) -> &RendererDesc {
        &self.desc
    }

    pub fn registry(&self) -> &RenderItemRegistry {
        &self.registry
    }

    pub fn assets(&self) -> &SceneAssets {
        &self.assets
    }

    pub fn terrain_item(&self) -> RenderItemId {
        self.terrain.item
    }

    pub fn water_item(&self) -> RenderItemId {
        self.water.item
    }

    pub fn terrain_desc(&self) -> &TerrainDesc {
        &self.terrain.desc
    }

    pub fn terrain_constants(&self) -> TerrainConstants {
        self.terrain.constants
    }

    pub fn pass_constants(&self) -> &PassConstants {
        &self.pass_constants
    }

    pub fn frame_resources(&self) -> &FrameResources {
        self.ring.current()
    }

    pub fn current_frame_index(&self) -> usize {
        self.ring.current_index()
    }

    pub fn submission_count(&self) -> FenceValue {
        self.ring.submission_count()
    }

    fn update_object_constants(&mut self) {
        let frame = self.ring.current_mut();
        for (id, item) in self.registry.iter_mut() {
            if item.dirty().is_dirty() {
                frame.object_cb.write(
                    id.index(),
                    &ObjectConstants {
                        world: item.world(),
                        tex_transform: item.tex_transform(),
                    },
                );
                item.consume_dirty();
            }
        }
    }

    /// Scrolls the water texture.
    fn animate_materials(&mut self, dt: f32) {
        let mut offset = self.water.tex_offset + Vec2::new(0.1 * dt, 0.02 * dt);
        offset.x = offset.x.fract();
        offset.y = offset.y.fract();
        self.water.tex_offset = offset;
        self.assets.update_material(self.water.material, |material| {
            material.transform = Mat4::from_translation(offset.extend(0.0));
        });
    }

    fn update_material_constants(&mut self) {
        let frame = self.ring.current_mut();
        for (handle, material) in self.assets.materials_mut() {
            if material.dirty().is_dirty() {
                let desc = material.desc();
                frame.material_cb.write(
                    handle.index(),
                    &MaterialConstants {
                        diffuse_albedo: desc.diffuse_albedo,
                        fresnel_r0: desc.fresnel_r0,
                        roughness: desc.roughness,
                        mat_transform: desc.transform,
                    },
                );
                material.consume_dirty();
            }
        }
    }

    fn update_pass_constants(&mut self, dt: f32, camera: &Camera, view: Mat4, proj: Mat4) {
        let view_proj = proj * view;
        let [width, height] = self.desc.render_target_size;
        let size = Vec2::new(width as f32, height as f32);

        let mut constants = PassConstants {
            view,
            inv_view: view.inverse(),
            proj,
            inv_proj: proj.inverse(),
            view_proj,
            inv_view_proj: view_proj.inverse(),
            eye_pos_w: camera.position(),
            render_target_size: size,
            inv_render_target_size: Vec2::ONE / size.max(Vec2::ONE),
            near_z: camera.z_near(),
            far_z: camera.z_far(),
            total_time: self.total_time,
            delta_time: dt,
            ambient_light: self.desc.ambient_light,
            fog_color: self.desc.fog.color,
            fog_start: self.desc.fog.start,
            fog_range: self.desc.fog.range,
            ..Default::default()
        };
        let lights = default_lights();
        constants.lights[..lights.len()].copy_from_slice(&lights);

        self.ring.current_mut().pass_cb.write(0, &constants);
        self.pass_constants = constants;
    }

    fn update_water_constants(&mut self, camera_pos: Vec3) {
        let frame = self.ring.current_mut();
        let view_proj = self.pass_constants.view_proj;
        for (position, &id) in self
            .registry
            .layer(RenderLayer::Transparent)
            .iter()
            .enumerate()
        {
            frame.water_cb.write(
                position as u32,
                &WaterConstants {
                    world: self.registry.item(id).world(),
                    view_proj,
                    camera_pos,
                    time: self.total_time,
                    water_color: self.desc.water_color,
                    _pad0: 0.0,
                },
            );
        }
    }

    fn regenerate(&mut self, desc: TerrainDesc) -> Result<(), RendererError> {
        log::info!(
            "regenerating terrain: seed {}, {}x{}, {} octaves",
            desc.seed,
            desc.width,
            desc.height,
            desc.octaves
        );
        regenerate_terrain(
            &self.gpu,
            &self.ring,
            &mut self.assets,
            &mut self.registry,
            &mut self.terrain,
            desc,
            self.frame_count,
        )
        .map_err(|err| {
            log::error!("keeping the previous terrain: {}", err);
            err.into()
        })
    }

    fn update_terrain_constants(&mut self) {
        if self.terrain.dirty.is_dirty() {
            self.ring
                .current_mut()
                .terrain_cb
                .write(0, &self.terrain.constants);
            self.terrain.dirty.consume();
        }
    }
}

impl<G: Gpu> Drop for Renderer<G> {
    fn drop(&mut self) {
        if let Err(err) = self.ring.drain(&self.gpu) {
            // the gpu may still be reading them
            log::error!("failed to drain the gpu on shutdown, leaking resources: {}", err);
            return;
        }
        self.assets.destroy_all(&self.gpu);
        for frame in self.ring.iter_mut() {
            self.gpu.destroy_command_allocator(frame.command_allocator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Command, CompletionMode, ConstantSlot, FailPoint, HeadlessGpu, PassKind};
    use crate::waves::WavesDesc;

    fn small_desc() -> RendererDesc {
        RendererDesc {
            terrain: TerrainDesc {
                width: 16,
                height: 16,
                grid_rows: 8,
                grid_cols: 8,
                ..Default::default()
            },
            waves: WavesDesc {
                rows: 16,
                cols: 16,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn renderer(mode: CompletionMode) -> (HeadlessGpu, Renderer<HeadlessGpu>) {
        let gpu = HeadlessGpu::new(mode);
        let renderer = Renderer::new(gpu.clone(), small_desc()).unwrap();
        (gpu, renderer)
    }

    fn run_frame(renderer: &mut Renderer<HeadlessGpu>, camera: &Camera) {
        renderer.advance_frame(1.0 / 60.0, camera).unwrap();
        renderer.submit_frame().unwrap();
    }

    #[test]
    fn builds_the_scene() {
        let (_gpu, renderer) = renderer(CompletionMode::Immediate);
        let registry = renderer.registry();
        assert_eq!(registry.count_kind(RenderItemKind::Terrain), 1);
        assert_eq!(registry.count_kind(RenderItemKind::Water), 1);
        assert_eq!(registry.count_kind(RenderItemKind::Sky), 1);
        assert_eq!(registry.count_kind(RenderItemKind::Prop), 2);
        assert_eq!(registry.layer(RenderLayer::Sky).len(), 1);
        assert_eq!(registry.layer(RenderLayer::Transparent), &[renderer.water_item()]);
    }

    #[test]
    fn missing_model_is_skipped() {
        let gpu = HeadlessGpu::new(CompletionMode::Immediate);
        let desc = RendererDesc {
            skull_model: Some("/nonexistent/skull.txt".into()),
            ..small_desc()
        };
        let renderer = Renderer::new(gpu, desc).unwrap();
        assert_eq!(renderer.registry().count_kind(RenderItemKind::Prop), 2);
        assert!(renderer.assets().find_material("skull").is_none());
    }

    #[test]
    fn frames_never_touch_in_flight_slots() {
        let (gpu, mut renderer) = renderer(CompletionMode::OnDemand);
        let camera = Camera::default();
        for _ in 0..20 {
            run_frame(&mut renderer, &camera);
        }
        assert!(gpu.hazards().is_empty(), "{:?}", gpu.hazards());
        assert_eq!(gpu.submission_count(), 20);
        assert_eq!(gpu.present_count(), 20);
        assert_eq!(renderer.submission_count(), 20);
    }

    #[test]
    fn slots_rotate_round_robin() {
        let (_gpu, mut renderer) = renderer(CompletionMode::Immediate);
        let camera = Camera::default();
        let mut seen = Vec::new();
        for _ in 0..5 {
            renderer.advance_frame(0.016, &camera).unwrap();
            seen.push(renderer.current_frame_index());
            renderer.submit_frame().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn passes_are_recorded_in_fixed_order() {
        let (gpu, mut renderer) = renderer(CompletionMode::Immediate);
        let camera = Camera::default();
        run_frame(&mut renderer, &camera);
        let list = gpu.last_submission().unwrap();
        assert_eq!(
            list.passes(),
            vec![PassKind::Opaque, PassKind::Sky, PassKind::Transparent]
        );
        // terrain, box, sphere, sky, water
        assert_eq!(list.draw_count(), 5);

        renderer.set_wireframe(true);
        run_frame(&mut renderer, &camera);
        let list = gpu.last_submission().unwrap();
        assert_eq!(
            list.passes(),
            vec![PassKind::Wireframe, PassKind::Sky, PassKind::Transparent]
        );
    }

    #[test]
    fn water_draw_binds_dynamic_vertices_and_water_constants() {
        let (gpu, mut renderer) = renderer(CompletionMode::Immediate);
        run_frame(&mut renderer, &Camera::default());
        let waves_vb = renderer.frame_resources().waves_vb.buffer_id();
        let water_cb = renderer.frame_resources().water_cb.buffer_id();

        let list = gpu.last_submission().unwrap();
        let commands = list.commands();
        let transparent = commands
            .iter()
            .position(|c| *c == Command::BeginPass(PassKind::Transparent))
            .unwrap();
        let tail = &commands[transparent..];
        assert!(tail
            .iter()
            .any(|c| matches!(c, Command::BindVertexBuffer { buffer, .. } if *buffer == waves_vb)));
        assert!(tail.iter().any(|c| matches!(
            c,
            Command::BindConstants { slot: ConstantSlot::Water, buffer, offset: 0, .. } if *buffer == water_cb
        )));
    }

    #[test]
    fn dirty_items_are_written_once_per_slot() {
        let (_gpu, mut renderer) = renderer(CompletionMode::Immediate);
        let camera = Camera::default();
        for _ in 0..3 {
            run_frame(&mut renderer, &camera);
        }
        let water = renderer.water_item();
        assert_eq!(renderer.registry().item(water).dirty().get(), 0);

        renderer.set_water_transform(Vec3::new(0.0, -2.0, 0.0), 1.5);
        assert_eq!(renderer.registry().item(water).dirty().get(), 3);
        for expected in [2, 1, 0, 0] {
            run_frame(&mut renderer, &camera);
            assert_eq!(renderer.registry().item(water).dirty().get(), expected);
        }
    }

    #[test]
    fn object_constants_land_in_the_current_slot() {
        let (gpu, mut renderer) = renderer(CompletionMode::Immediate);
        renderer.set_water_transform(Vec3::new(1.0, 2.0, 3.0), 1.0);
        renderer.advance_frame(0.016, &Camera::default()).unwrap();

        let frame = renderer.frame_resources();
        let water = renderer.water_item();
        let bytes = gpu.buffer_contents(frame.object_cb.buffer_id()).unwrap();
        let offset = frame.object_cb.element_offset(water.index()) as usize;
        let record: ObjectConstants = bytemuck::pod_read_unaligned(
            &bytes[offset..offset + std::mem::size_of::<ObjectConstants>()],
        );
        assert_eq!(record.world.w_axis.truncate(), Vec3::new(1.0, 2.0, 3.0));
        renderer.submit_frame().unwrap();
    }

    #[test]
    fn repeated_regeneration_keeps_one_terrain() {
        let (gpu, mut renderer) = renderer(CompletionMode::OnDemand);
        let camera = Camera::default();
        run_frame(&mut renderer, &camera);
        let textures = gpu.live_texture_count();
        let buffers = gpu.live_buffer_count();

        for seed in 1..=3 {
            renderer.request_terrain_regeneration(TerrainDesc {
                seed,
                ..renderer.terrain_desc().clone()
            });
            assert!(renderer.is_terrain_regeneration_pending());
            run_frame(&mut renderer, &camera);

            assert!(!renderer.is_terrain_regeneration_pending());
            assert_eq!(renderer.terrain_desc().seed, seed);
            assert_eq!(renderer.registry().count_kind(RenderItemKind::Terrain), 1);
            let opaque = renderer.registry().layer(RenderLayer::Opaque);
            assert!(opaque.contains(&renderer.terrain_item()));
            assert_eq!(gpu.live_texture_count(), textures);
            assert_eq!(gpu.live_buffer_count(), buffers);
        }
        assert!(gpu.hazards().is_empty(), "{:?}", gpu.hazards());
    }

    #[test]
    fn regeneration_drains_every_slot_first() {
        let (gpu, mut renderer) = renderer(CompletionMode::OnDemand);
        let camera = Camera::default();
        for _ in 0..3 {
            run_frame(&mut renderer, &camera);
        }
        assert_eq!(gpu.completed_value().unwrap(), 0);

        renderer.request_terrain_regeneration(TerrainDesc {
            seed: 9,
            ..renderer.terrain_desc().clone()
        });
        renderer.advance_frame(0.016, &camera).unwrap();
        assert_eq!(gpu.completed_value().unwrap(), 3);

        // the new terrain item is written for this slot like any other dirty item
        let item = renderer.terrain_item();
        assert_eq!(renderer.registry().item(item).dirty().get(), 2);
        renderer.submit_frame().unwrap();
    }

    #[test]
    fn failed_regeneration_keeps_the_old_terrain() {
        let (gpu, mut renderer) = renderer(CompletionMode::OnDemand);
        let camera = Camera::default();
        run_frame(&mut renderer, &camera);

        let item = renderer.terrain_item();
        let seed = renderer.terrain_desc().seed;
        let textures = gpu.live_texture_count();
        let buffers = gpu.live_buffer_count();

        gpu.fail_next(FailPoint::Texture);
        renderer.request_terrain_regeneration(TerrainDesc {
            seed: seed + 1,
            ..renderer.terrain_desc().clone()
        });
        let err = renderer.advance_frame(0.016, &camera).unwrap_err();
        assert!(matches!(
            err,
            RendererError::Terrain(TerrainError::Gpu(GpuError::OutOfMemory(_)))
        ));

        assert_eq!(renderer.terrain_item(), item);
        assert_eq!(renderer.terrain_desc().seed, seed);
        assert!(!renderer.is_terrain_regeneration_pending());
        assert_eq!(gpu.live_texture_count(), textures);
        assert_eq!(gpu.live_buffer_count(), buffers);

        // the next frame proceeds normally
        run_frame(&mut renderer, &camera);
        assert!(gpu.hazards().is_empty());
    }

    #[test]
    fn failed_mesh_upload_releases_the_new_texture() {
        let (gpu, mut renderer) = renderer(CompletionMode::Immediate);
        let camera = Camera::default();
        run_frame(&mut renderer, &camera);
        let textures = gpu.live_texture_count();

        gpu.fail_next(FailPoint::DeviceBuffer);
        renderer.request_terrain_regeneration(renderer.terrain_desc().clone());
        assert!(renderer.advance_frame(0.016, &camera).is_err());
        assert_eq!(gpu.live_texture_count(), textures);
    }

    #[test]
    fn invalid_parameters_are_rejected_without_draining() {
        let (gpu, mut renderer) = renderer(CompletionMode::OnDemand);
        let camera = Camera::default();
        run_frame(&mut renderer, &camera);
        let item = renderer.terrain_item();

        renderer.request_terrain_regeneration(TerrainDesc {
            octaves: 0,
            ..renderer.terrain_desc().clone()
        });
        let err = renderer.advance_frame(0.016, &camera).unwrap_err();
        assert!(matches!(
            err,
            RendererError::Terrain(TerrainError::InvalidParameters(_))
        ));
        assert_eq!(renderer.terrain_item(), item);
        assert_eq!(gpu.completed_value().unwrap(), 0);
    }

    #[test]
    fn failed_regeneration_does_not_skip_a_slot() {
        let (_gpu, mut renderer) = renderer(CompletionMode::Immediate);
        let camera = Camera::default();
        let mut seen = Vec::new();

        renderer.advance_frame(0.016, &camera).unwrap();
        seen.push(renderer.current_frame_index());
        renderer.submit_frame().unwrap();

        renderer.request_terrain_regeneration(TerrainDesc {
            octaves: 0,
            ..renderer.terrain_desc().clone()
        });
        assert!(renderer.advance_frame(0.016, &camera).is_err());

        for _ in 0..3 {
            renderer.advance_frame(0.016, &camera).unwrap();
            seen.push(renderer.current_frame_index());
            renderer.submit_frame().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 0]);
        assert_eq!(renderer.submission_count(), 4);
    }

    #[test]
    fn regenerated_terrain_is_drawn_after_the_props() {
        let (_gpu, mut renderer) = renderer(CompletionMode::Immediate);
        let camera = Camera::default();
        let before = renderer.registry().layer(RenderLayer::Opaque).to_vec();
        assert_eq!(before[0], renderer.terrain_item());

        renderer.request_terrain_regeneration(TerrainDesc {
            seed: 5,
            ..renderer.terrain_desc().clone()
        });
        run_frame(&mut renderer, &camera);

        let old = before[0];
        let new = renderer.terrain_item();
        assert_ne!(new, old);
        assert_eq!(new.index(), old.index());
        let mut expected = before[1..].to_vec();
        expected.push(new);
        assert_eq!(renderer.registry().layer(RenderLayer::Opaque), expected.as_slice());
        assert!(renderer.registry().get(old).is_none());
    }

    #[test]
    #[should_panic(expected = "without submit_frame")]
    fn advancing_twice_panics() {
        let (_gpu, mut renderer) = renderer(CompletionMode::Immediate);
        let camera = Camera::default();
        renderer.advance_frame(0.016, &camera).unwrap();
        let _ = renderer.advance_frame(0.016, &camera);
    }

    #[test]
    fn drop_releases_every_resource() {
        let (gpu, mut renderer) = renderer(CompletionMode::OnDemand);
        run_frame(&mut renderer, &Camera::default());
        drop(renderer);
        assert_eq!(gpu.live_texture_count(), 0);
        assert_eq!(gpu.live_buffer_count(), 0);
    }
}
