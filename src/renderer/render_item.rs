use super::{MaterialHandle, MeshHandle};
use crate::util::{FreeListAllocator, FreeListError};
use glam::Mat4;

/// Counts how many frame slots still hold stale constants for an object.
///
/// Reset to the ring depth whenever the object changes and consumed once per frame that writes
/// the object's constants into its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyCounter(u32);

impl DirtyCounter {
    pub fn new(frame_count: u32) -> Self {
        Self(frame_count)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_dirty(&self) -> bool {
        self.0 > 0
    }

    pub fn reset(&mut self, frame_count: u32) {
        self.0 = frame_count;
    }

    /// Records that one more slot received the current data.
    pub fn consume(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }
}

/// Names one insertion into a [`RenderItemRegistry`].
///
/// The index is the item's slot in the object-constant array of every frame slot and is reused
/// after removal. The generation is unique per insertion, so an id kept past its removal never
/// resolves to the item that took its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderItemId {
    index: u32,
    generation: u64,
}

impl RenderItemId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderLayer {
    Opaque,
    Sky,
    Transparent,
}

impl RenderLayer {
    fn bucket(&self) -> usize {
        match self {
            RenderLayer::Opaque => 0,
            RenderLayer::Sky => 1,
            RenderLayer::Transparent => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderItemKind {
    Terrain,
    Water,
    Sky,
    Prop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawRange {
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
}

#[derive(Debug, Clone)]
pub struct RenderItem {
    pub kind: RenderItemKind,
    pub layer: RenderLayer,
    pub material: MaterialHandle,
    pub mesh: MeshHandle,
    pub draw: DrawRange,
    world: Mat4,
    tex_transform: Mat4,
    dirty: DirtyCounter,
}

impl RenderItem {
    pub fn new(
        kind: RenderItemKind,
        layer: RenderLayer,
        material: MaterialHandle,
        mesh: MeshHandle,
        draw: DrawRange,
    ) -> Self {
        Self {
            kind,
            layer,
            material,
            mesh,
            draw,
            world: Mat4::IDENTITY,
            tex_transform: Mat4::IDENTITY,
            dirty: DirtyCounter::new(0),
        }
    }

    pub fn with_world(mut self, world: Mat4) -> Self {
        self.world = world;
        self
    }

    pub fn with_tex_transform(mut self, tex_transform: Mat4) -> Self {
        self.tex_transform = tex_transform;
        self
    }

    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn tex_transform(&self) -> Mat4 {
        self.tex_transform
    }

    pub fn dirty(&self) -> DirtyCounter {
        self.dirty
    }

    pub fn consume_dirty(&mut self) {
        self.dirty.consume();
    }
}

/// Arena of drawable items bucketed by pass.
///
/// An item's id is its index into the object-constant arrays and stays valid until the item is
/// removed. Removal frees the index, and the next insertion takes the lowest free one. Within a
/// bucket, items are drawn in insertion order.
pub struct RenderItemRegistry {
    items: Vec<Option<(u64, RenderItem)>>,
    indices: FreeListAllocator,
    buckets: [Vec<RenderItemId>; 3],
    frame_count: u32,
}

impl RenderItemRegistry {
    pub fn new(capacity: u32, frame_count: u32) -> Self {
        Self {
            items: (0..capacity).map(|_| None).collect(),
            indices: FreeListAllocator::new(capacity),
            buckets: Default::default(),
            frame_count,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.indices.capacity()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&mut self, mut item: RenderItem) -> Result<RenderItemId, FreeListError> {
        let range = self.indices.allocate(1)?;
        let id = RenderItemId {
            index: range.first,
            generation: range.handle,
        };
        item.dirty.reset(self.frame_count);
        self.buckets[item.layer.bucket()].push(id);
        self.items[range.first as usize] = Some((range.handle, item));
        Ok(id)
    }

    pub fn remove(&mut self, id: RenderItemId) -> Option<RenderItem> {
        let slot = self.items.get_mut(id.index as usize)?;
        if !matches!(slot, Some((generation, _)) if *generation == id.generation) {
            return None;
        }
        let (handle, item) = slot.take()?;
        self.buckets[item.layer.bucket()].retain(|other| *other != id);
        if let Err(err) = self.indices.free(handle) {
            log::error!("render item {} had no index allocation: {}", id.index, err);
        }
        Some(item)
    }

    /// `None` once the item was removed, even if its index is in use again.
    pub fn get(&self, id: RenderItemId) -> Option<&RenderItem> {
        match self.items.get(id.index as usize)? {
            Some((generation, item)) if *generation == id.generation => Some(item),
            _ => None,
        }
    }

    fn get_mut(&mut self, id: RenderItemId) -> Option<&mut RenderItem> {
        match self.items.get_mut(id.index as usize)? {
            Some((generation, item)) if *generation == id.generation => Some(item),
            _ => None,
        }
    }

    /// # Panics
    ///
    /// If the item was removed.
    pub fn item(&self, id: RenderItemId) -> &RenderItem {
        match self.get(id) {
            Some(item) => item,
            None => panic!("render item {} used after removal", id.index),
        }
    }

    /// # Panics
    ///
    /// If the item was removed.
    pub fn item_mut(&mut self, id: RenderItemId) -> &mut RenderItem {
        match self.get_mut(id) {
            Some(item) => item,
            None => panic!("render item {} used after removal", id.index),
        }
    }

    pub fn set_world(&mut self, id: RenderItemId, world: Mat4) {
        let frame_count = self.frame_count;
        let item = self.item_mut(id);
        item.world = world;
        item.dirty.reset(frame_count);
    }

    pub fn set_tex_transform(&mut self, id: RenderItemId, tex_transform: Mat4) {
        let frame_count = self.frame_count;
        let item = self.item_mut(id);
        item.tex_transform = tex_transform;
        item.dirty.reset(frame_count);
    }

    /// Items of one pass in draw order.
    pub fn layer(&self, layer: RenderLayer) -> &[RenderItemId] {
        &self.buckets[layer.bucket()]
    }

    /// Every live item, in index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RenderItemId, &mut RenderItem)> {
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_mut().map(|(generation, item)| {
                    let id = RenderItemId {
                        index: index as u32,
                        generation: *generation,
                    };
                    (id, item)
                })
            })
    }

    pub fn count_kind(&self, kind: RenderItemKind) -> usize {
        self.items
            .iter()
            .flatten()
            .filter(|(_, item)| item.kind == kind)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: RenderItemKind, layer: RenderLayer) -> RenderItem {
        RenderItem::new(
            kind,
            layer,
            MaterialHandle::from_index(0),
            MeshHandle::from_index(0),
            DrawRange::default(),
        )
    }

    #[test]
    fn buckets_keep_insertion_order() {
        let mut registry = RenderItemRegistry::new(8, 3);
        let a = registry
            .insert(item(RenderItemKind::Prop, RenderLayer::Opaque))
            .unwrap();
        let water = registry
            .insert(item(RenderItemKind::Water, RenderLayer::Transparent))
            .unwrap();
        let b = registry
            .insert(item(RenderItemKind::Prop, RenderLayer::Opaque))
            .unwrap();
        let sky = registry
            .insert(item(RenderItemKind::Sky, RenderLayer::Sky))
            .unwrap();

        assert_eq!(registry.layer(RenderLayer::Opaque), &[a, b]);
        assert_eq!(registry.layer(RenderLayer::Sky), &[sky]);
        assert_eq!(registry.layer(RenderLayer::Transparent), &[water]);
        assert_eq!(
            (a.index(), water.index(), b.index(), sky.index()),
            (0, 1, 2, 3)
        );
    }

    #[test]
    fn removal_frees_the_lowest_index_for_reuse() {
        let mut registry = RenderItemRegistry::new(4, 3);
        let ids: Vec<_> = (0..3)
            .map(|_| {
                registry
                    .insert(item(RenderItemKind::Prop, RenderLayer::Opaque))
                    .unwrap()
            })
            .collect();

        registry.remove(ids[1]).unwrap();
        assert!(registry.get(ids[1]).is_none());
        assert!(registry.remove(ids[1]).is_none());

        let terrain = registry
            .insert(item(RenderItemKind::Terrain, RenderLayer::Opaque))
            .unwrap();
        assert_eq!(terrain.index(), 1);
        // reinsertion goes to the end of the bucket
        assert_eq!(registry.layer(RenderLayer::Opaque), &[ids[0], ids[2], terrain]);
    }

    #[test]
    fn full_registry_rejects_insert() {
        let mut registry = RenderItemRegistry::new(1, 3);
        registry
            .insert(item(RenderItemKind::Prop, RenderLayer::Opaque))
            .unwrap();
        assert!(registry
            .insert(item(RenderItemKind::Prop, RenderLayer::Opaque))
            .is_err());
    }

    #[test]
    fn dirty_counter_drains_exactly_once_per_slot() {
        let mut registry = RenderItemRegistry::new(2, 3);
        let id = registry
            .insert(item(RenderItemKind::Prop, RenderLayer::Opaque))
            .unwrap();
        assert_eq!(registry.item(id).dirty().get(), 3);

        for expected in [2, 1, 0, 0] {
            registry.item_mut(id).consume_dirty();
            assert_eq!(registry.item(id).dirty().get(), expected);
        }

        registry.set_world(id, Mat4::from_translation(glam::Vec3::X));
        assert_eq!(registry.item(id).dirty().get(), 3);
    }

    #[test]
    #[should_panic(expected = "used after removal")]
    fn using_removed_item_panics() {
        let mut registry = RenderItemRegistry::new(2, 3);
        let id = registry
            .insert(item(RenderItemKind::Prop, RenderLayer::Opaque))
            .unwrap();
        registry.remove(id);
        registry.set_world(id, Mat4::IDENTITY);
    }

    #[test]
    fn removed_id_does_not_resolve_to_the_reused_index() {
        let mut registry = RenderItemRegistry::new(2, 3);
        let old = registry
            .insert(item(RenderItemKind::Terrain, RenderLayer::Opaque))
            .unwrap();
        registry.remove(old).unwrap();
        let new = registry
            .insert(item(RenderItemKind::Prop, RenderLayer::Opaque))
            .unwrap();

        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
        assert!(registry.get(old).is_none());
        assert!(registry.remove(old).is_none());
        assert_eq!(registry.item(new).kind, RenderItemKind::Prop);
    }

    #[test]
    #[should_panic(expected = "used after removal")]
    fn stale_id_panics_after_its_index_is_reused() {
        let mut registry = RenderItemRegistry::new(2, 3);
        let old = registry
            .insert(item(RenderItemKind::Terrain, RenderLayer::Opaque))
            .unwrap();
        registry.remove(old);
        registry
            .insert(item(RenderItemKind::Prop, RenderLayer::Opaque))
            .unwrap();
        registry.item(old);
    }
}
