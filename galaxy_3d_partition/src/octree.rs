/// Octree: loose octree spatial index.
///
/// Each object is stored in exactly one node: the deepest node whose loose
/// bound fully contains the object's bound. Objects that fit no child stay in
/// the parent, so internal nodes may carry members. Objects outside the world
/// bound stay at the root.
///
/// Nodes live in a flat array. A split appends 8 contiguous children, so a
/// node only needs the index of its first child. Children are created on
/// demand, when a node overflows `max_members`.

use std::collections::BinaryHeap;
use std::cmp::Reverse;
use std::fmt::Write;
use std::mem;
use rustc_hash::FxHashMap;
use crate::bound::Bound;
use crate::config::OctreeConfig;
use crate::debug_draw::{depth_color, DebugDrawFlags, LineSink, MEMBER_COLOR};
use crate::error::Result;
use crate::frustum::{Frustum, FrustumTest};
use crate::ray::Ray;
use crate::scene_objects::{ObjectHandle, SceneObjects};
use crate::spatial_index::{
    consider_member, sort_by_entry, worth_visiting, OrdF32, RayHit, SpatialIndex,
};
use crate::{partition_debug, partition_trace, partition_warn};

/// Index of the root node in the flat node array.
const ROOT: usize = 0;

/// `first_child` value of a node without children. The root is never a child.
const NO_CHILDREN: usize = 0;

/// A single node in the octree.
#[derive(Debug)]
struct OctreeNode {
    /// Tight cell from the even subdivision
    cell: Bound,
    /// Cell inflated by the loose factor (the root uses the world bound as is)
    bound: Bound,
    depth: u32,
    /// Index of the first of 8 contiguous children, or `NO_CHILDREN`
    first_child: usize,
    /// Objects stored at this node with their bound
    members: Vec<(ObjectHandle, Bound)>,
}

impl OctreeNode {
    fn new(cell: Bound, bound: Bound, depth: u32) -> Self {
        Self { cell, bound, depth, first_child: NO_CHILDREN, members: Vec::new() }
    }

    fn has_children(&self) -> bool {
        self.first_child != NO_CHILDREN
    }
}

/// Loose octree spatial index.
pub struct Octree {
    config: OctreeConfig,
    /// Flat array of all nodes, root first
    nodes: Vec<OctreeNode>,
    /// Last-known bound of every indexed object
    cache: FxHashMap<ObjectHandle, Bound>,
}

impl Octree {
    /// Create an empty octree over `config.world_bound`.
    pub fn new(config: OctreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            nodes: vec![Self::root_node(&config)],
            config,
            cache: FxHashMap::default(),
        })
    }

    fn root_node(config: &OctreeConfig) -> OctreeNode {
        OctreeNode::new(config.world_bound, config.world_bound, 0)
    }

    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    pub fn world_bound(&self) -> Bound {
        self.config.world_bound
    }

    /// Depth of the node currently holding `handle`.
    pub fn depth_of(&self, handle: ObjectHandle) -> Option<u32> {
        let bound = self.cache.get(&handle)?;
        self.locate(handle, bound).map(|(node_idx, _)| self.nodes[node_idx].depth)
    }

    // ===== CLASSIFICATION =====

    /// Child of `node_idx` that should hold `bound`, if any.
    ///
    /// The octant of the bound's center is tried first. If its loose bound
    /// does not contain the object, the 7 siblings are scanned.
    fn child_for(&self, node_idx: usize, bound: &Bound) -> Option<usize> {
        let node = &self.nodes[node_idx];
        if !node.has_children() {
            return None;
        }

        let center = node.cell.center();
        let point = bound.center();
        let octant = (point.x >= center.x) as usize
            | (((point.y >= center.y) as usize) << 1)
            | (((point.z >= center.z) as usize) << 2);

        let preferred = node.first_child + octant;
        if self.nodes[preferred].bound.contains(bound) {
            return Some(preferred);
        }

        (0..8)
            .filter(|&i| i != octant)
            .map(|i| node.first_child + i)
            .find(|&child| self.nodes[child].bound.contains(bound))
    }

    /// Node and member index currently holding `handle`.
    ///
    /// Follows the classification path of `bound` first and falls back to
    /// scanning every node when the object is not on that path.
    fn locate(&self, handle: ObjectHandle, bound: &Bound) -> Option<(usize, usize)> {
        let mut node_idx = ROOT;
        loop {
            if let Some(pos) = self.member_position(node_idx, handle) {
                return Some((node_idx, pos));
            }
            match self.child_for(node_idx, bound) {
                Some(child) => node_idx = child,
                None => break,
            }
        }

        partition_warn!("galaxy3d::Octree",
            "Object not found along its bound path, scanning {} nodes", self.nodes.len());
        (0..self.nodes.len())
            .find_map(|idx| self.member_position(idx, handle).map(|pos| (idx, pos)))
    }

    fn member_position(&self, node_idx: usize, handle: ObjectHandle) -> Option<usize> {
        self.nodes[node_idx].members.iter().position(|(h, _)| *h == handle)
    }

    // ===== PLACEMENT =====

    fn should_split(&self, node_idx: usize) -> bool {
        let node = &self.nodes[node_idx];
        !node.has_children()
            && node.members.len() > self.config.max_members
            && node.depth < self.config.max_depth
    }

    /// Append 8 loose children to a leaf.
    fn create_children(&mut self, node_idx: usize) {
        let first_child = self.nodes.len();
        let cell = self.nodes[node_idx].cell;
        let depth = self.nodes[node_idx].depth + 1;

        for octant in 0..8 {
            let child_cell = cell.octant(octant);
            let child_bound = child_cell.loosened(self.config.loose_factor);
            self.nodes.push(OctreeNode::new(child_cell, child_bound, depth));
        }
        self.nodes[node_idx].first_child = first_child;

        partition_trace!("galaxy3d::Octree", "Split node {} at depth {}", node_idx, depth - 1);
    }

    /// Place a single object, descending iteratively.
    fn insert_iterative(&mut self, handle: ObjectHandle, bound: Bound) {
        let mut node_idx = ROOT;
        while let Some(child) = self.child_for(node_idx, &bound) {
            node_idx = child;
        }

        self.nodes[node_idx].members.push((handle, bound));
        if self.should_split(node_idx) {
            self.split(node_idx);
        }
    }

    /// Create children for an overflowing leaf and push its members down.
    fn split(&mut self, node_idx: usize) {
        self.create_children(node_idx);
        let members = mem::take(&mut self.nodes[node_idx].members);
        self.distribute(node_idx, members);
    }

    /// Append a batch at `node_idx`, splitting once if it overflows.
    fn bulk_insert_at(&mut self, node_idx: usize, batch: Vec<(ObjectHandle, Bound)>) {
        if self.nodes[node_idx].has_children() {
            self.distribute(node_idx, batch);
            return;
        }

        self.nodes[node_idx].members.extend(batch);
        if self.should_split(node_idx) {
            self.split(node_idx);
        }
    }

    /// Group a batch by target child; objects that fit no child stay here.
    fn distribute(&mut self, node_idx: usize, batch: Vec<(ObjectHandle, Bound)>) {
        let first_child = self.nodes[node_idx].first_child;
        let mut groups: [Vec<(ObjectHandle, Bound)>; 8] = Default::default();

        for (handle, bound) in batch {
            match self.child_for(node_idx, &bound) {
                Some(child) => groups[child - first_child].push((handle, bound)),
                None => self.nodes[node_idx].members.push((handle, bound)),
            }
        }

        for (octant, group) in groups.into_iter().enumerate() {
            if !group.is_empty() {
                self.bulk_insert_at(first_child + octant, group);
            }
        }
    }

    // ===== QUERIES =====

    /// 3-way frustum classification per node:
    /// - `Outside` → skip the subtree
    /// - `Inside` → take every member of the subtree without testing
    /// - `Partial` → test members, classify children
    ///
    /// Root members may lie outside the world bound and are always tested,
    /// and root children are always classified.
    fn query_frustum_recursive(
        &self,
        node_idx: usize,
        frustum: &Frustum,
        classification: FrustumTest,
        results: &mut Vec<ObjectHandle>,
    ) {
        if classification == FrustumTest::Outside {
            return;
        }
        let node = &self.nodes[node_idx];

        for (handle, bound) in &node.members {
            let trusted = classification == FrustumTest::Inside && node_idx != ROOT;
            if trusted || bound.is_visible(frustum) {
                results.push(*handle);
            }
        }

        if node.has_children() {
            for child in node.first_child..node.first_child + 8 {
                // Loose children stay inside their parent's bound, except under the root
                let child_class = if classification == FrustumTest::Inside && node_idx != ROOT {
                    FrustumTest::Inside
                } else {
                    frustum.classify_bound(&self.nodes[child].bound)
                };
                self.query_frustum_recursive(child, frustum, child_class, results);
            }
        }
    }

    /// Calls `visit` with every member whose bound the ray hits and its
    /// entry distance. The root is always visited since its loose children
    /// reach past the world bound.
    fn for_each_ray_candidate(&self, ray: &Ray, mut visit: impl FnMut(ObjectHandle, f32)) {
        let mut stack = vec![ROOT];
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            for (handle, bound) in &node.members {
                if let Some((t_enter, _)) = bound.ray_intersect_t(ray) {
                    visit(*handle, t_enter);
                }
            }
            if node.has_children() {
                stack.extend(
                    (node.first_child..node.first_child + 8)
                        .filter(|&child| self.nodes[child].bound.ray_intersect_t(ray).is_some()),
                );
            }
        }
    }

    fn dump_recursive(&self, node_idx: usize, out: &mut String) {
        let node = &self.nodes[node_idx];
        let indent = "  ".repeat(node.depth as usize);
        let _ = writeln!(
            out,
            "{}[{}] depth={} bound=({:.2}, {:.2}, {:.2})..({:.2}, {:.2}, {:.2}) members={}",
            indent, node_idx, node.depth,
            node.bound.min.x, node.bound.min.y, node.bound.min.z,
            node.bound.max.x, node.bound.max.y, node.bound.max.z,
            node.members.len(),
        );
        if node.has_children() {
            for child in node.first_child..node.first_child + 8 {
                self.dump_recursive(child, out);
            }
        }
    }
}

// ===== SPATIAL INDEX TRAIT =====

impl SpatialIndex for Octree {
    fn name(&self) -> &'static str {
        "Octree"
    }

    fn insert(&mut self, handle: ObjectHandle, bound: &Bound) {
        if let Some(old) = self.cache.get(&handle).copied() {
            self.remove_with_bound(handle, &old);
        }
        self.cache.insert(handle, *bound);
        self.insert_iterative(handle, *bound);
    }

    fn bulk_insert(&mut self, items: Vec<(ObjectHandle, Bound)>) {
        if items.is_empty() {
            return;
        }

        // Last occurrence of a handle wins
        let mut latest: FxHashMap<ObjectHandle, Bound> = FxHashMap::default();
        let mut order = Vec::with_capacity(items.len());
        for (handle, bound) in items {
            if latest.insert(handle, bound).is_none() {
                order.push(handle);
            }
        }

        let mut batch = Vec::with_capacity(order.len());
        for handle in order {
            let bound = latest[&handle];
            if let Some(old) = self.cache.get(&handle).copied() {
                self.remove_with_bound(handle, &old);
            }
            self.cache.insert(handle, bound);
            batch.push((handle, bound));
        }

        partition_debug!("galaxy3d::Octree", "Bulk insert of {} objects", batch.len());
        self.bulk_insert_at(ROOT, batch);
    }

    fn remove_with_bound(&mut self, handle: ObjectHandle, bound: &Bound) -> bool {
        if !self.cache.contains_key(&handle) {
            return false;
        }
        self.cache.remove(&handle);

        match self.locate(handle, bound) {
            Some((node_idx, pos)) => {
                self.nodes[node_idx].members.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    fn query_ray_closest(&self, ray: &Ray, objects: &dyn SceneObjects) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;

        // Root members may sit outside the world bound
        for (handle, bound) in &self.nodes[ROOT].members {
            consider_member(*handle, bound, ray, objects, &mut best);
        }

        // Root children are loose and reach past the world bound, so the root
        // itself is never culled
        let mut heap = BinaryHeap::new();
        if self.nodes[ROOT].has_children() {
            heap.push(Reverse((OrdF32(0.0), ROOT)));
        }

        while let Some(Reverse((OrdF32(t_enter), node_idx))) = heap.pop() {
            if !worth_visiting(t_enter, &best) {
                break;
            }
            let node = &self.nodes[node_idx];

            if node_idx != ROOT {
                for (handle, bound) in &node.members {
                    consider_member(*handle, bound, ray, objects, &mut best);
                }
            }

            if node.has_children() {
                for child in node.first_child..node.first_child + 8 {
                    if let Some((t, _)) = self.nodes[child].bound.ray_intersect_t(ray) {
                        if worth_visiting(t, &best) {
                            heap.push(Reverse((OrdF32(t), child)));
                        }
                    }
                }
            }
        }

        best
    }

    fn query_ray_all(&self, ray: &Ray, results: &mut Vec<ObjectHandle>) {
        self.for_each_ray_candidate(ray, |handle, _| results.push(handle));
    }

    fn query_ray_ordered(&self, ray: &Ray) -> Vec<(ObjectHandle, f32)> {
        let mut candidates = Vec::new();
        self.for_each_ray_candidate(ray, |handle, t| candidates.push((handle, t)));
        sort_by_entry(&mut candidates);
        candidates
    }

    fn query_frustum(&self, frustum: &Frustum, results: &mut Vec<ObjectHandle>) {
        let root_class = frustum.classify_bound(&self.nodes[ROOT].bound);
        // Root members are tested individually whatever the root's class
        let root_class = match root_class {
            FrustumTest::Outside => FrustumTest::Partial,
            other => other,
        };
        self.query_frustum_recursive(ROOT, frustum, root_class, results);
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(Self::root_node(&self.config));
        self.cache.clear();
    }

    fn debug_draw(&self, sink: &mut dyn LineSink, flags: DebugDrawFlags) {
        for node in &self.nodes {
            let wanted = if node.has_children() {
                flags.contains(DebugDrawFlags::INTERNAL_NODES)
            } else {
                flags.contains(DebugDrawFlags::LEAF_NODES)
            };
            if wanted {
                sink.draw_box(&node.bound, depth_color(node.depth));
            }
            if flags.contains(DebugDrawFlags::MEMBERS) {
                for (_, bound) in &node.members {
                    sink.draw_box(bound, MEMBER_COLOR);
                }
            }
        }
    }

    fn cached_bound(&self, handle: ObjectHandle) -> Option<Bound> {
        self.cache.get(&handle).copied()
    }

    fn total_node_count(&self) -> usize {
        self.nodes.len()
    }

    fn total_member_count(&self) -> usize {
        self.nodes.iter().map(|node| node.members.len()).sum()
    }

    fn max_occupied_depth(&self) -> u32 {
        self.nodes
            .iter()
            .filter(|node| !node.members.is_empty())
            .map(|node| node.depth)
            .max()
            .unwrap_or(0)
    }

    fn dump(&self) -> String {
        let mut out = format!(
            "Octree: {} nodes, {} members\n",
            self.total_node_count(),
            self.total_member_count(),
        );
        self.dump_recursive(ROOT, &mut out);
        out
    }
}

#[cfg(test)]
#[path = "octree_tests.rs"]
mod tests;
