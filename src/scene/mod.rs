pub mod entity;
pub mod transform;

use crate::renderer::resources::mesh::Mesh;
use crate::scene::entity::{Entity, EntityId, IdAllocator};

/// Flat list of entities, drawn in insertion order
#[derive(Debug)]
pub struct Scene<M = Mesh> {
    ids: IdAllocator,
    entities: Vec<Entity<M>>,
}

impl<M> Default for Scene<M> {
    fn default() -> Self {
        Self::with_id_allocator(IdAllocator::new())
    }
}

impl<M> Scene<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_allocator(ids: IdAllocator) -> Self {
        Self {
            ids,
            entities: Vec::new(),
        }
    }

    pub fn spawn(&mut self) -> &mut Entity<M> {
        let entity = Entity::new(self.ids.allocate());
        self.entities.push(entity);
        let last = self.entities.len() - 1;
        &mut self.entities[last]
    }

    /// Removes the entity and returns it. Its mesh is freed once no other entity holds it.
    pub fn despawn(&mut self, id: EntityId) -> Option<Entity<M>> {
        let index = self.entities.iter().position(|e| e.id() == id)?;
        Some(self.entities.remove(index))
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity<M>> {
        self.entities.iter().find(|e| e.id() == id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity<M>> {
        self.entities.iter_mut().find(|e| e.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity<M>> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use glam::Vec3;
    use super::*;

    /// Stands in for GPU geometry and counts how many times it was freed
    struct CountedMesh<'a>(&'a AtomicUsize);

    impl Drop for CountedMesh<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut scene: Scene<()> = Scene::new();
        let a = scene.spawn().id();
        let b = scene.spawn().id();
        scene.despawn(a);
        let c = scene.spawn().id();
        assert!(a < b && b < c);
    }

    #[test]
    fn id_counter_is_injected() {
        let mut first: Scene<()> = Scene::with_id_allocator(IdAllocator::starting_at(100));
        let mut second: Scene<()> = Scene::new();
        assert_eq!(first.spawn().id(), 100);
        // Scenes don't share a hidden global counter
        assert_eq!(second.spawn().id(), 0);
        assert_eq!(first.spawn().id(), 101);
    }

    #[test]
    fn shared_mesh_outlives_one_owner() {
        let freed = AtomicUsize::new(0);
        let mesh = Arc::new(CountedMesh(&freed));

        let mut scene = Scene::new();
        let a = {
            let entity = scene.spawn();
            entity.mesh = Some(mesh.clone());
            entity.id()
        };
        let b = {
            let entity = scene.spawn();
            entity.mesh = Some(mesh.clone());
            entity.transform.translation = Vec3::new(1.5, 0.0, 3.5);
            entity.id()
        };
        drop(mesh);

        drop(scene.despawn(a));
        assert_eq!(freed.load(Ordering::SeqCst), 0);
        let remaining = scene.get(b).and_then(|e| e.mesh.as_ref());
        assert!(remaining.is_some_and(|m| Arc::strong_count(m) == 1));

        drop(scene.despawn(b));
        assert_eq!(freed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn despawning_unknown_id_is_a_no_op() {
        let mut scene: Scene<()> = Scene::new();
        scene.spawn();
        assert!(scene.despawn(42).is_none());
        assert_eq!(scene.len(), 1);
    }
}
