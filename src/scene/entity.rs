use std::sync::Arc;
use crate::renderer::resources::mesh::Mesh;
use crate::scene::transform::Transform;

pub type EntityId = u32;

/// Hands out entity ids. Ids increase monotonically and are never reused.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: EntityId,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues counting from `first`, e.g. after restoring a saved scene.
    pub fn starting_at(first: EntityId) -> Self {
        Self { next: first }
    }

    pub fn allocate(&mut self) -> EntityId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Something placed in the world, optionally drawn with a mesh it may share with other entities
#[derive(Debug)]
pub struct Entity<M = Mesh> {
    id: EntityId,
    pub transform: Transform,
    pub mesh: Option<Arc<M>>,
}

impl<M> Entity<M> {
    pub(crate) fn new(id: EntityId) -> Self {
        Self {
            id,
            transform: Transform::default(),
            mesh: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }
}
