/// Partition configuration descriptors.
///
/// Plain structs with sensible defaults. Call `validate()` (or let the
/// constructors do it) before building a tree from hand-written values.

use glam::Vec3;
use crate::bound::Bound;
use crate::error::Result;
use crate::partition_err;

/// Deepest `max_depth` a tree accepts. Insert, remove and frustum queries
/// recurse once per level.
pub const MAX_TREE_DEPTH: u32 = 64;

/// Which spatial structure the `PartitionManager` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexStrategy {
    /// Dynamic bounding volume hierarchy
    #[default]
    Bvh,
    /// Loose octree over a fixed world bound
    Octree,
}

// ===== OCTREE =====

/// Octree construction parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeConfig {
    /// Root cell. Objects outside it stay at the root.
    pub world_bound: Bound,
    /// Deepest level a split may create (root = 0), at most `MAX_TREE_DEPTH`
    pub max_depth: u32,
    /// Member count a node tolerates before splitting
    pub max_members: usize,
    /// Child cell inflation, must be > 1
    pub loose_factor: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            world_bound: Bound::from_center_extent(Vec3::ZERO, Vec3::splat(1024.0)),
            max_depth: 8,
            max_members: 8,
            loose_factor: 1.5,
        }
    }
}

impl OctreeConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.world_bound.is_valid() {
            return Err(partition_err!("galaxy3d::OctreeConfig", InvalidBound,
                "world_bound is not finite: {:?}", self.world_bound));
        }
        if self.max_depth > MAX_TREE_DEPTH {
            return Err(partition_err!("galaxy3d::OctreeConfig", InvalidConfig,
                "max_depth must be <= {}, got {}", MAX_TREE_DEPTH, self.max_depth));
        }
        if self.max_members == 0 {
            return Err(partition_err!("galaxy3d::OctreeConfig", InvalidConfig,
                "max_members must be >= 1"));
        }
        // Without inflation objects on a cell border never fit a child
        if !self.loose_factor.is_finite() || self.loose_factor <= 1.0 {
            return Err(partition_err!("galaxy3d::OctreeConfig", InvalidConfig,
                "loose_factor must be > 1.0, got {}", self.loose_factor));
        }
        Ok(())
    }
}

// ===== BVH =====

/// BVH construction and rebuild parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhConfig {
    /// Deepest level a split or build may create (root = 0), at most `MAX_TREE_DEPTH`
    pub max_depth: u32,
    /// Leaf capacity
    pub max_members: usize,
    /// Below this many objects a bulk insert always rebuilds
    pub small_tree_threshold: usize,
    /// Batch size, as a fraction of the tree size, that triggers a rebuild
    pub rebuild_ratio: f32,
    /// Batch size that always triggers a rebuild on large trees
    pub rebuild_absolute: usize,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_members: 4,
            small_tree_threshold: 32,
            rebuild_ratio: 0.5,
            rebuild_absolute: 256,
        }
    }
}

impl BvhConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth > MAX_TREE_DEPTH {
            return Err(partition_err!("galaxy3d::BvhConfig", InvalidConfig,
                "max_depth must be <= {}, got {}", MAX_TREE_DEPTH, self.max_depth));
        }
        if self.max_members == 0 {
            return Err(partition_err!("galaxy3d::BvhConfig", InvalidConfig,
                "max_members must be >= 1"));
        }
        if !self.rebuild_ratio.is_finite() || self.rebuild_ratio <= 0.0 {
            return Err(partition_err!("galaxy3d::BvhConfig", InvalidConfig,
                "rebuild_ratio must be > 0, got {}", self.rebuild_ratio));
        }
        if self.rebuild_absolute == 0 {
            return Err(partition_err!("galaxy3d::BvhConfig", InvalidConfig,
                "rebuild_absolute must be >= 1"));
        }
        Ok(())
    }

    /// Batch size from which a bulk insert into a tree of `existing`
    /// objects rebuilds instead of inserting one by one.
    pub fn rebuild_threshold(&self, existing: usize) -> usize {
        let relative = (existing as f32 * self.rebuild_ratio).ceil() as usize;
        relative.min(self.rebuild_absolute).max(1)
    }

    /// `true` when a batch of `batch` objects into a tree holding `existing`
    /// should go through a full rebuild.
    pub fn should_rebuild(&self, existing: usize, batch: usize) -> bool {
        existing == 0
            || existing < self.small_tree_threshold
            || batch >= self.rebuild_threshold(existing)
    }
}

// ===== MANAGER =====

/// Top-level partition configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionConfig {
    pub strategy: IndexStrategy,
    pub octree: OctreeConfig,
    pub bvh: BvhConfig,
    /// Dirty entries drained per `update` call when the caller has no budget of its own
    pub frame_budget: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            strategy: IndexStrategy::default(),
            octree: OctreeConfig::default(),
            bvh: BvhConfig::default(),
            frame_budget: 256,
        }
    }
}

impl PartitionConfig {
    /// Default configuration running the given strategy
    pub fn with_strategy(strategy: IndexStrategy) -> Self {
        Self { strategy, ..Self::default() }
    }

    /// Validates the selected strategy's descriptor and the frame budget.
    pub fn validate(&self) -> Result<()> {
        match self.strategy {
            IndexStrategy::Bvh => self.bvh.validate()?,
            IndexStrategy::Octree => self.octree.validate()?,
        }
        if self.frame_budget == 0 {
            return Err(partition_err!("galaxy3d::PartitionConfig", InvalidConfig,
                "frame_budget must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
