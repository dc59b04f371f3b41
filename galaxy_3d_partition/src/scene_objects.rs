/// Scene objects: the boundary between the partition and the world.
///
/// The partition never owns world objects. It stores `ObjectHandle`s and asks
/// a `SceneObjects` collaborator for current bounds and precise ray hits.
/// A handle whose object was destroyed simply stops resolving, so stale cache
/// entries are detected instead of dereferenced.

use slotmap::{new_key_type, SlotMap};
use crate::bound::Bound;
use crate::ray::Ray;

// ===== SLOT MAP KEY =====

new_key_type! {
    /// Stable, generational handle to a world object.
    ///
    /// A handle stays valid until its own object is removed; reusing the slot
    /// bumps the generation, so old handles never alias new objects.
    pub struct ObjectHandle;
}

// ===== COLLABORATOR TRAIT =====

/// Services the partition consumes from the object model.
pub trait SceneObjects {
    /// Current world-space bound, or `None` if the handle no longer resolves.
    fn world_bound(&self, handle: ObjectHandle) -> Option<Bound>;

    /// Narrow-phase refinement of a broad ray hit.
    ///
    /// Returns the exact hit distance along the ray, or `None` on a miss.
    fn check_precise(&self, handle: ObjectHandle, ray: &Ray) -> Option<f32>;

    /// Objects that are hidden from picking return `false`.
    fn is_pickable(&self, _handle: ObjectHandle) -> bool {
        true
    }
}

// ===== BOUND TABLE =====

/// One object of a `BoundTable`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableEntry {
    /// World-space bound
    pub bound: Bound,
    /// Skipped by ray picking when set
    pub hidden: bool,
}

/// Minimal object model: each object is just its bound.
///
/// Its precise test is the exact box entry distance, which makes it suitable
/// for hosts without mesh-level picking and for tests.
#[derive(Debug, Default)]
pub struct BoundTable {
    entries: SlotMap<ObjectHandle, TableEntry>,
}

impl BoundTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a visible object and return its handle.
    pub fn insert(&mut self, bound: Bound) -> ObjectHandle {
        self.entries.insert(TableEntry { bound, hidden: false })
    }

    /// Destroy an object. Its handle stops resolving immediately.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<Bound> {
        self.entries.remove(handle).map(|entry| entry.bound)
    }

    /// Move an object. Returns `false` for a stale handle.
    pub fn set_bound(&mut self, handle: ObjectHandle, bound: Bound) -> bool {
        match self.entries.get_mut(handle) {
            Some(entry) => {
                entry.bound = bound;
                true
            }
            None => false,
        }
    }

    /// Hide or show an object for picking. Returns `false` for a stale handle.
    pub fn set_hidden(&mut self, handle: ObjectHandle, hidden: bool) -> bool {
        match self.entries.get_mut(handle) {
            Some(entry) => {
                entry.hidden = hidden;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&TableEntry> {
        self.entries.get(handle)
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every live handle, in slot order.
    pub fn handles(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.entries.keys()
    }

    /// Every live `(handle, bound)` pair, in slot order.
    pub fn items(&self) -> impl Iterator<Item = (ObjectHandle, Bound)> + '_ {
        self.entries.iter().map(|(handle, entry)| (handle, entry.bound))
    }
}

impl SceneObjects for BoundTable {
    fn world_bound(&self, handle: ObjectHandle) -> Option<Bound> {
        self.entries.get(handle).map(|entry| entry.bound)
    }

    fn check_precise(&self, handle: ObjectHandle, ray: &Ray) -> Option<f32> {
        let entry = self.entries.get(handle)?;
        entry.bound.ray_intersect_t(ray).map(|(t_min, _)| t_min)
    }

    fn is_pickable(&self, handle: ObjectHandle) -> bool {
        self.entries.get(handle).is_some_and(|entry| !entry.hidden)
    }
}

#[cfg(test)]
#[path = "scene_objects_tests.rs"]
mod tests;
