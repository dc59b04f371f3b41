/// PartitionManager: owns the active spatial index and feeds it.
///
/// The scene marks moved, spawned and destroyed objects dirty during its
/// tick. Once per frame `update` re-indexes at most `budget` of them, oldest
/// first, then lets the index run any rebuild it scheduled. Picking and
/// culling go through the manager's query pass-throughs.

use std::collections::VecDeque;
use rustc_hash::FxHashSet;
use crate::bound::Bound;
use crate::bvh::Bvh;
use crate::config::{IndexStrategy, PartitionConfig};
use crate::debug_draw::{DebugDrawFlags, LineSink};
use crate::error::Result;
use crate::frustum::Frustum;
use crate::octree::Octree;
use crate::ray::Ray;
use crate::scene_objects::{ObjectHandle, SceneObjects};
use crate::spatial_index::{RayHit, SpatialIndex};
use crate::{partition_debug, partition_info, partition_trace};

/// Snapshot of the manager's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionStats {
    pub strategy: IndexStrategy,
    pub node_count: usize,
    pub member_count: usize,
    pub max_occupied_depth: u32,
    pub pending: usize,
}

/// Spatial partition of a scene.
///
/// # Example
///
/// ```no_run
/// use galaxy_3d_partition::glam::Vec3;
/// use galaxy_3d_partition::galaxy3d::{PartitionConfig, PartitionManager};
/// use galaxy_3d_partition::galaxy3d::geometry::{Bound, Ray};
/// use galaxy_3d_partition::galaxy3d::spatial::BoundTable;
///
/// let mut objects = BoundTable::new();
/// let crate_box = objects.insert(Bound::from_center_extent(Vec3::new(0.0, 0.0, -10.0), Vec3::ONE));
///
/// let mut partition = PartitionManager::new(PartitionConfig::default())?;
/// partition.mark_dirty(crate_box);
/// partition.update(1.0 / 60.0, 256, &objects);
///
/// let hit = partition.ray_query_closest(&Ray::new(Vec3::ZERO, Vec3::NEG_Z), &objects);
/// # Ok::<(), galaxy_3d_partition::galaxy3d::Error>(())
/// ```
pub struct PartitionManager {
    config: PartitionConfig,
    index: Box<dyn SpatialIndex>,
    /// Pending handles, oldest first
    dirty_queue: VecDeque<ObjectHandle>,
    /// Handles currently in `dirty_queue`
    dirty_set: FxHashSet<ObjectHandle>,
}

impl PartitionManager {
    /// Create a manager running `config.strategy`.
    pub fn new(config: PartitionConfig) -> Result<Self> {
        config.validate()?;
        let index: Box<dyn SpatialIndex> = match config.strategy {
            IndexStrategy::Bvh => Box::new(Bvh::new(config.bvh)?),
            IndexStrategy::Octree => Box::new(Octree::new(config.octree)?),
        };
        partition_info!("galaxy3d::PartitionManager", "Partition ready ({})", index.name());

        Ok(Self {
            config,
            index,
            dirty_queue: VecDeque::new(),
            dirty_set: FxHashSet::default(),
        })
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub fn strategy(&self) -> IndexStrategy {
        self.config.strategy
    }

    /// The active index, for read-only inspection
    pub fn index(&self) -> &dyn SpatialIndex {
        self.index.as_ref()
    }

    // ===== REGISTRATION =====

    /// Index an object right away. Returns `false` if the handle does not resolve.
    pub fn register(&mut self, handle: ObjectHandle, objects: &dyn SceneObjects) -> bool {
        match objects.world_bound(handle) {
            Some(bound) => {
                self.index.insert(handle, &bound);
                true
            }
            None => false,
        }
    }

    /// Index many objects at once through the index's bulk path.
    ///
    /// Handles that do not resolve are skipped. Returns the number indexed.
    pub fn bulk_register(&mut self, handles: &[ObjectHandle], objects: &dyn SceneObjects) -> usize {
        let items: Vec<(ObjectHandle, Bound)> = handles
            .iter()
            .filter_map(|&handle| objects.world_bound(handle).map(|bound| (handle, bound)))
            .collect();
        let count = items.len();
        self.index.bulk_insert(items);
        partition_debug!("galaxy3d::PartitionManager",
            "Bulk registered {} of {} objects", count, handles.len());
        count
    }

    /// Drop an object from the index and from the dirty queue.
    pub fn unregister(&mut self, handle: ObjectHandle) -> bool {
        if self.dirty_set.remove(&handle) {
            self.dirty_queue.retain(|&queued| queued != handle);
        }
        self.index.remove(handle)
    }

    // ===== DIRTY TRACKING =====

    /// Queue an object for re-indexing. Returns `false` if it was already queued.
    pub fn mark_dirty(&mut self, handle: ObjectHandle) -> bool {
        if !self.dirty_set.insert(handle) {
            return false;
        }
        self.dirty_queue.push_back(handle);
        true
    }

    pub fn is_pending(&self, handle: ObjectHandle) -> bool {
        self.dirty_set.contains(&handle)
    }

    pub fn pending_count(&self) -> usize {
        self.dirty_set.len()
    }

    /// Re-index up to `budget` dirty objects, oldest first, then flush any
    /// scheduled rebuild. Returns the number of objects re-indexed.
    ///
    /// Objects that no longer resolve are removed from the index.
    pub fn update(&mut self, delta_seconds: f32, budget: usize, objects: &dyn SceneObjects) -> usize {
        let mut processed = 0;
        while processed < budget {
            let Some(handle) = self.dirty_queue.pop_front() else {
                break;
            };
            if !self.dirty_set.remove(&handle) {
                continue;
            }
            self.index.update(handle, objects);
            processed += 1;
        }

        self.index.flush_rebuild();

        if processed > 0 {
            partition_trace!("galaxy3d::PartitionManager",
                "Re-indexed {} objects (dt {:.4}s), {} still pending",
                processed, delta_seconds, self.dirty_set.len());
        }
        processed
    }

    /// `update` with the configured `frame_budget`.
    pub fn update_frame(&mut self, delta_seconds: f32, objects: &dyn SceneObjects) -> usize {
        self.update(delta_seconds, self.config.frame_budget, objects)
    }

    // ===== QUERIES =====

    /// Closest pickable object hit by the ray.
    pub fn ray_query_closest(&self, ray: &Ray, objects: &dyn SceneObjects) -> Option<RayHit> {
        self.index.query_ray_closest(ray, objects)
    }

    /// Every object whose bound the ray hits, in no particular order.
    pub fn ray_query_all(&self, ray: &Ray) -> Vec<ObjectHandle> {
        let mut results = Vec::new();
        self.index.query_ray_all(ray, &mut results);
        results
    }

    /// Every object whose bound the ray hits with its entry distance, nearest
    /// first. Used to pick through objects or to sort them along the ray.
    pub fn ray_query_ordered(&self, ray: &Ray) -> Vec<(ObjectHandle, f32)> {
        self.index.query_ray_ordered(ray)
    }

    /// Every object whose bound intersects the frustum.
    pub fn frustum_query(&self, frustum: &Frustum) -> Vec<ObjectHandle> {
        let mut results = Vec::new();
        self.index.query_frustum(frustum, &mut results);
        results
    }

    // ===== DIAGNOSTICS =====

    pub fn stats(&self) -> PartitionStats {
        PartitionStats {
            strategy: self.config.strategy,
            node_count: self.index.total_node_count(),
            member_count: self.index.total_member_count(),
            max_occupied_depth: self.index.max_occupied_depth(),
            pending: self.dirty_set.len(),
        }
    }

    pub fn dump(&self) -> String {
        format!("{} pending\n{}", self.dirty_set.len(), self.index.dump())
    }

    pub fn debug_draw(&self, sink: &mut dyn LineSink, flags: DebugDrawFlags) {
        self.index.debug_draw(sink, flags);
    }

    /// Empty the index and forget every pending object.
    pub fn clear(&mut self) {
        self.index.clear();
        self.dirty_queue.clear();
        self.dirty_set.clear();
    }
}

#[cfg(test)]
#[path = "partition_manager_tests.rs"]
mod tests;
