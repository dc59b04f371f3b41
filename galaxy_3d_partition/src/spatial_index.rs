/// Spatial acceleration structures for partition queries.
///
/// A SpatialIndex stores object handles by their world-space bound for
/// picking rays and frustum culling. Implementations: `Octree`, `Bvh`.
///
/// Ownership: the `PartitionManager` owns exactly one index. The index never
/// owns world objects; it keeps a last-known bound per handle so removal and
/// update work from the handle alone.

use std::cmp::Ordering;
use crate::bound::Bound;
use crate::debug_draw::{DebugDrawFlags, LineSink};
use crate::frustum::Frustum;
use crate::ray::Ray;
use crate::scene_objects::{ObjectHandle, SceneObjects};

/// Slack added to the best distance when deciding whether a node or member
/// may still hold a closer hit.
pub const RAY_QUERY_EPSILON: f32 = 1e-3;

/// Closest ray hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub handle: ObjectHandle,
    /// Distance along the ray, as reported by the precise test
    pub distance: f32,
}

/// Trait for spatial indexing of world objects.
///
/// Mutations on unknown handles are silent no-ops. Inserting a handle that is
/// already indexed moves it.
pub trait SpatialIndex: Send + Sync {
    /// Short structure name for logs and dumps
    fn name(&self) -> &'static str;

    /// Insert an object with its world-space bound.
    fn insert(&mut self, handle: ObjectHandle, bound: &Bound);

    /// Insert a batch of objects.
    fn bulk_insert(&mut self, items: Vec<(ObjectHandle, Bound)>);

    /// Remove an object, using `bound` to guide the search.
    /// Returns `false` if the handle was not indexed.
    fn remove_with_bound(&mut self, handle: ObjectHandle, bound: &Bound) -> bool;

    /// Remove an object by its cached bound.
    fn remove(&mut self, handle: ObjectHandle) -> bool {
        match self.cached_bound(handle) {
            Some(bound) => self.remove_with_bound(handle, &bound),
            None => false,
        }
    }

    /// Move an object from `old` to `new`.
    fn update_with_bounds(&mut self, handle: ObjectHandle, old: &Bound, new: &Bound) {
        self.remove_with_bound(handle, old);
        self.insert(handle, new);
    }

    /// Re-index an object from its current world bound.
    ///
    /// A handle the collaborator no longer resolves is removed. An unchanged
    /// bound is a no-op. An unknown handle is inserted.
    fn update(&mut self, handle: ObjectHandle, objects: &dyn SceneObjects) {
        let Some(new) = objects.world_bound(handle) else {
            self.remove(handle);
            return;
        };
        match self.cached_bound(handle) {
            Some(old) if old == new => {}
            Some(old) => self.update_with_bounds(handle, &old, &new),
            None => self.insert(handle, &new),
        }
    }

    /// Closest pickable object whose precise test hits the ray.
    fn query_ray_closest(&self, ray: &Ray, objects: &dyn SceneObjects) -> Option<RayHit>;

    /// Every object whose bound the ray hits, in no particular order.
    /// Results are appended to `results`.
    fn query_ray_all(&self, ray: &Ray, results: &mut Vec<ObjectHandle>);

    /// Every object whose bound the ray hits, with the ray's entry distance
    /// into that bound, nearest first. Bounds containing the origin report 0.
    fn query_ray_ordered(&self, ray: &Ray) -> Vec<(ObjectHandle, f32)>;

    /// Query all objects whose bound intersects the frustum.
    /// Results are appended to `results`.
    fn query_frustum(&self, frustum: &Frustum, results: &mut Vec<ObjectHandle>);

    /// Remove all objects from the index.
    fn clear(&mut self);

    /// Run any rebuild scheduled by earlier mutations.
    fn flush_rebuild(&mut self) {}

    /// Emit node and member boxes.
    fn debug_draw(&self, sink: &mut dyn LineSink, flags: DebugDrawFlags);

    /// Last bound the index was given for `handle`.
    fn cached_bound(&self, handle: ObjectHandle) -> Option<Bound>;

    fn contains(&self, handle: ObjectHandle) -> bool {
        self.cached_bound(handle).is_some()
    }

    fn total_node_count(&self) -> usize;

    fn total_member_count(&self) -> usize;

    /// Depth of the deepest node holding at least one member (root = 0).
    fn max_occupied_depth(&self) -> u32;

    /// Indented, human-readable tree listing.
    fn dump(&self) -> String;
}

// ===== RAY TRAVERSAL HELPERS =====

/// Total-ordered `f32` for heap keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct OrdF32(pub f32);

impl Eq for OrdF32 {}

impl PartialOrd for OrdF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Tests one member against the ray and keeps it if it beats `best`.
///
/// The broad box test runs first; the precise collaborator only sees members
/// whose box entry could improve on the current hit.
pub(crate) fn consider_member(
    handle: ObjectHandle,
    bound: &Bound,
    ray: &Ray,
    objects: &dyn SceneObjects,
    best: &mut Option<RayHit>,
) {
    let Some((t_enter, _)) = bound.ray_intersect_t(ray) else {
        return;
    };
    if let Some(hit) = best {
        if t_enter > hit.distance + RAY_QUERY_EPSILON {
            return;
        }
    }
    if !objects.is_pickable(handle) {
        return;
    }
    if let Some(distance) = objects.check_precise(handle, ray) {
        if best.map_or(true, |hit| distance < hit.distance) {
            *best = Some(RayHit { handle, distance });
        }
    }
}

/// Sorts ray candidates by entry distance. Equal distances keep their order.
pub(crate) fn sort_by_entry(candidates: &mut [(ObjectHandle, f32)]) {
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
}

/// `true` while a node entered at `t_enter` may still hold a closer hit.
pub(crate) fn worth_visiting(t_enter: f32, best: &Option<RayHit>) -> bool {
    best.map_or(true, |hit| t_enter <= hit.distance + RAY_QUERY_EPSILON)
}
