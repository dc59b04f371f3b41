/// Bvh: dynamic bounding volume hierarchy.
///
/// Binary tree of bounds. Members live in leaves only. Every node's bound is
/// the union of what it holds: its members for a leaf, its children for an
/// internal node.
///
/// Two ways to fill it:
/// - incremental `insert`: descend toward the child whose volume grows the
///   least, split overflowing leaves, refit on the way back up
/// - batch `build`: median split along the longest axis, top-down
///
/// `bulk_insert` picks between the two from the batch size relative to the
/// tree size. Incremental churn schedules a full rebuild that runs on the
/// next `flush_rebuild`.

use std::collections::BinaryHeap;
use std::cmp::Reverse;
use std::fmt::Write;
use std::mem;
use rustc_hash::FxHashMap;
use crate::bound::Bound;
use crate::config::BvhConfig;
use crate::debug_draw::{depth_color, DebugDrawFlags, LineSink, MEMBER_COLOR};
use crate::error::Result;
use crate::frustum::{Frustum, FrustumTest};
use crate::ray::Ray;
use crate::scene_objects::{ObjectHandle, SceneObjects};
use crate::spatial_index::{
    consider_member, sort_by_entry, worth_visiting, OrdF32, RayHit, SpatialIndex,
};
use crate::{partition_debug, partition_trace, partition_warn};

type Item = (ObjectHandle, Bound);

// ===== NODE =====

#[derive(Debug)]
struct BvhNode {
    bound: Bound,
    depth: u32,
    /// Objects of a leaf. Always empty on internal nodes.
    members: Vec<Item>,
    children: [Option<Box<BvhNode>>; 2],
}

impl BvhNode {
    fn leaf(members: Vec<Item>, depth: u32) -> Self {
        let mut node = Self {
            bound: Bound::default(),
            depth,
            members,
            children: [None, None],
        };
        node.refit();
        node
    }

    fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    fn is_empty(&self) -> bool {
        self.is_leaf() && self.members.is_empty()
    }

    /// Recompute the bound from members (leaf) or children (internal).
    /// An empty node gets the zero bound.
    fn refit(&mut self) {
        let bound = if self.is_leaf() {
            Bound::union_all(self.members.iter().map(|(_, b)| b))
        } else {
            Bound::union_all(self.children.iter().flatten().map(|child| &child.bound))
        };
        self.bound = bound.unwrap_or_default();
    }

    /// All nodes of the subtree, parents before children.
    fn descendants(&self) -> Vec<&BvhNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in node.children.iter().rev().flatten() {
                stack.push(child);
            }
        }
        out
    }
}

impl Drop for BvhNode {
    // Unlink the subtree iteratively so deep trees never recurse in drop
    fn drop(&mut self) {
        let mut stack: Vec<Box<BvhNode>> =
            self.children.iter_mut().filter_map(Option::take).collect();
        while let Some(mut node) = stack.pop() {
            stack.extend(node.children.iter_mut().filter_map(Option::take));
        }
    }
}

// ===== TREE =====

/// Dynamic BVH spatial index.
pub struct Bvh {
    config: BvhConfig,
    root: BvhNode,
    /// Last-known bound of every indexed object
    cache: FxHashMap<ObjectHandle, Bound>,
    /// Incremental mutations since the last build
    churn: usize,
    pending_rebuild: bool,
}

impl Bvh {
    /// Create an empty BVH.
    pub fn new(config: BvhConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::empty(config))
    }

    fn empty(config: BvhConfig) -> Self {
        Self {
            config,
            root: BvhNode::leaf(Vec::new(), 0),
            cache: FxHashMap::default(),
            churn: 0,
            pending_rebuild: false,
        }
    }

    /// Build a tree from scratch with top-down median splits.
    ///
    /// A handle listed twice keeps its last bound. An empty list gives a
    /// childless root with the zero bound.
    pub fn build(items: Vec<(ObjectHandle, Bound)>, config: BvhConfig) -> Bvh {
        let mut bvh = Self::empty(config);
        let items = dedup_last_wins(items);
        bvh.cache.extend(items.iter().copied());
        bvh.root = Self::build_recursive(items, 0, &bvh.config);
        bvh
    }

    fn build_recursive(mut items: Vec<Item>, depth: u32, config: &BvhConfig) -> BvhNode {
        if items.len() <= config.max_members || depth >= config.max_depth {
            return BvhNode::leaf(items, depth);
        }

        let bound = Bound::union_all(items.iter().map(|(_, b)| b)).unwrap_or_default();
        let axis = bound.longest_axis();
        let mid = items.len() / 2;
        items.select_nth_unstable_by(mid, |a, b| {
            a.1.center()[axis].total_cmp(&b.1.center()[axis])
        });
        let right = items.split_off(mid);

        let mut node = BvhNode {
            bound,
            depth,
            members: Vec::new(),
            children: [
                Some(Box::new(Self::build_recursive(items, depth + 1, config))),
                Some(Box::new(Self::build_recursive(right, depth + 1, config))),
            ],
        };
        node.refit();
        node
    }

    pub fn config(&self) -> &BvhConfig {
        &self.config
    }

    /// Bound of the whole tree (zero bound when empty)
    pub fn root_bound(&self) -> Bound {
        self.root.bound
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// `true` when churn has scheduled a rebuild that `flush_rebuild` has not run yet.
    pub fn is_rebuild_pending(&self) -> bool {
        self.pending_rebuild
    }

    /// Replace the whole tree by a fresh build of the cached bounds.
    pub fn rebuild(&mut self) {
        let items: Vec<Item> = self.cache.iter().map(|(h, b)| (*h, *b)).collect();
        let count = items.len();
        self.root = Self::build_recursive(items, 0, &self.config);
        self.churn = 0;
        self.pending_rebuild = false;
        partition_debug!("galaxy3d::Bvh", "Rebuilt tree over {} objects", count);
    }

    fn note_churn(&mut self) {
        self.churn += 1;
        if !self.pending_rebuild && self.churn >= self.config.rebuild_threshold(self.cache.len()) {
            self.pending_rebuild = true;
            partition_trace!("galaxy3d::Bvh", "Rebuild scheduled after {} mutations", self.churn);
        }
    }

    /// Take `handle` out of the tree and the cache without counting churn.
    fn detach(&mut self, handle: ObjectHandle, bound: &Bound) -> bool {
        if self.cache.remove(&handle).is_none() {
            return false;
        }

        let mut removed = Self::remove_recursive(&mut self.root, handle, Some(bound));
        if !removed {
            partition_warn!("galaxy3d::Bvh", "Object not found under its bound, searching the whole tree");
            removed = Self::remove_recursive(&mut self.root, handle, None);
        }
        removed
    }

    // ===== INCREMENTAL INSERT =====

    fn insert_recursive(node: &mut BvhNode, item: Item, config: &BvhConfig) {
        if node.is_leaf() {
            node.members.push(item);
            node.refit();
            if node.members.len() > config.max_members && node.depth < config.max_depth {
                Self::split(node, config);
            }
            return;
        }

        let depth = node.depth;
        if let Some(free) = node.children.iter().position(Option::is_none) {
            node.children[free] = Some(Box::new(BvhNode::leaf(vec![item], depth + 1)));
        } else {
            let growth = |child: &Option<Box<BvhNode>>| {
                child.as_ref().map_or(f32::MAX, |c| {
                    Bound::union(&c.bound, &item.1).volume() - c.bound.volume()
                })
            };
            let pick = if growth(&node.children[1]) < growth(&node.children[0]) { 1 } else { 0 };
            if let Some(child) = node.children[pick].as_mut() {
                Self::insert_recursive(child, item, config);
            }
        }
        node.refit();
    }

    /// Turn an overflowing leaf into an internal node with two leaves.
    ///
    /// Members are sorted by center along the longest axis of their centers
    /// and cut at the spatial midpoint, or in two even halves when every
    /// center falls on one side.
    fn split(node: &mut BvhNode, config: &BvhConfig) {
        if node.members.len() < 2 {
            node.refit();
            return;
        }

        let mut members = mem::take(&mut node.members);
        let centers = Bound::from_points(members.iter().map(|(_, b)| b.center()))
            .unwrap_or_default();
        let axis = centers.longest_axis();
        let midpoint = centers.center()[axis];

        members.sort_by(|a, b| a.1.center()[axis].total_cmp(&b.1.center()[axis]));
        let mut cut = members.partition_point(|(_, b)| b.center()[axis] < midpoint);
        if cut == 0 || cut == members.len() {
            cut = members.len() / 2;
        }
        let right = members.split_off(cut);

        let depth = node.depth + 1;
        let mut left = BvhNode::leaf(members, depth);
        let mut right = BvhNode::leaf(right, depth);
        for child in [&mut left, &mut right] {
            if child.members.len() > config.max_members && child.depth < config.max_depth {
                Self::split(child, config);
            }
        }

        node.children = [Some(Box::new(left)), Some(Box::new(right))];
        node.refit();
        partition_trace!("galaxy3d::Bvh", "Split leaf at depth {}", node.depth);
    }

    // ===== REMOVE =====

    /// Remove `handle` from the subtree. With `guide`, only children whose
    /// bound intersects it are searched.
    fn remove_recursive(node: &mut BvhNode, handle: ObjectHandle, guide: Option<&Bound>) -> bool {
        if node.is_leaf() {
            return match node.members.iter().position(|(h, _)| *h == handle) {
                Some(pos) => {
                    node.members.swap_remove(pos);
                    node.refit();
                    true
                }
                None => false,
            };
        }

        for i in 0..2 {
            let Some(child) = node.children[i].as_mut() else {
                continue;
            };
            if guide.is_some_and(|bound| !child.bound.intersects(bound)) {
                continue;
            }
            if Self::remove_recursive(child, handle, guide) {
                if child.is_empty() {
                    node.children[i] = None;
                }
                node.refit();
                return true;
            }
        }
        false
    }

    // ===== QUERIES =====

    fn query_frustum_recursive(
        node: &BvhNode,
        frustum: &Frustum,
        classification: FrustumTest,
        results: &mut Vec<ObjectHandle>,
    ) {
        match classification {
            FrustumTest::Outside => {}
            FrustumTest::Inside => {
                for n in node.descendants() {
                    results.extend(n.members.iter().map(|(h, _)| *h));
                }
            }
            FrustumTest::Partial => {
                for (handle, bound) in &node.members {
                    if bound.is_visible(frustum) {
                        results.push(*handle);
                    }
                }
                for child in node.children.iter().flatten() {
                    let child_class = frustum.classify_bound(&child.bound);
                    Self::query_frustum_recursive(child, frustum, child_class, results);
                }
            }
        }
    }

    /// Calls `visit` with every member whose bound the ray hits and its
    /// entry distance.
    fn for_each_ray_candidate(&self, ray: &Ray, mut visit: impl FnMut(ObjectHandle, f32)) {
        if self.cache.is_empty() || self.root.bound.ray_intersect_t(ray).is_none() {
            return;
        }
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            for (handle, bound) in &node.members {
                if let Some((t_enter, _)) = bound.ray_intersect_t(ray) {
                    visit(*handle, t_enter);
                }
            }
            stack.extend(
                node.children
                    .iter()
                    .flatten()
                    .filter(|child| child.bound.ray_intersect_t(ray).is_some())
                    .map(|child| &**child),
            );
        }
    }
}

/// Keep the last bound of each handle, in first-seen order.
fn dedup_last_wins(items: Vec<Item>) -> Vec<Item> {
    let mut index: FxHashMap<ObjectHandle, usize> = FxHashMap::default();
    let mut out: Vec<Item> = Vec::with_capacity(items.len());
    for (handle, bound) in items {
        match index.get(&handle) {
            Some(&i) => out[i].1 = bound,
            None => {
                index.insert(handle, out.len());
                out.push((handle, bound));
            }
        }
    }
    out
}

// ===== SPATIAL INDEX TRAIT =====

impl SpatialIndex for Bvh {
    fn name(&self) -> &'static str {
        "Bvh"
    }

    fn insert(&mut self, handle: ObjectHandle, bound: &Bound) {
        // A move counts as one mutation
        if let Some(old) = self.cache.get(&handle).copied() {
            self.detach(handle, &old);
        }
        self.cache.insert(handle, *bound);
        Self::insert_recursive(&mut self.root, (handle, *bound), &self.config);
        self.note_churn();
    }

    fn bulk_insert(&mut self, items: Vec<(ObjectHandle, Bound)>) {
        if items.is_empty() {
            return;
        }
        let batch = dedup_last_wins(items);
        let existing = self.cache.len();

        if self.config.should_rebuild(existing, batch.len()) {
            partition_debug!("galaxy3d::Bvh",
                "Bulk insert of {} into {} objects: full rebuild", batch.len(), existing);
            for (handle, bound) in batch {
                self.cache.insert(handle, bound);
            }
            self.rebuild();
        } else {
            partition_debug!("galaxy3d::Bvh",
                "Bulk insert of {} into {} objects: incremental", batch.len(), existing);
            for (handle, bound) in batch {
                self.insert(handle, &bound);
            }
        }
    }

    fn remove_with_bound(&mut self, handle: ObjectHandle, bound: &Bound) -> bool {
        let removed = self.detach(handle, bound);
        if removed {
            self.note_churn();
        }
        removed
    }

    fn update_with_bounds(&mut self, handle: ObjectHandle, old: &Bound, new: &Bound) {
        self.detach(handle, old);
        self.insert(handle, new);
    }

    fn query_ray_closest(&self, ray: &Ray, objects: &dyn SceneObjects) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        let Some((t_root, _)) = self.root.bound.ray_intersect_t(ray) else {
            return None;
        };

        let mut nodes: Vec<&BvhNode> = vec![&self.root];
        let mut heap = BinaryHeap::new();
        heap.push(Reverse((OrdF32(t_root), 0usize)));

        while let Some(Reverse((OrdF32(t_enter), idx))) = heap.pop() {
            if !worth_visiting(t_enter, &best) {
                break;
            }
            let node = nodes[idx];

            for (handle, bound) in &node.members {
                consider_member(*handle, bound, ray, objects, &mut best);
            }

            for child in node.children.iter().flatten() {
                if let Some((t, _)) = child.bound.ray_intersect_t(ray) {
                    if worth_visiting(t, &best) {
                        heap.push(Reverse((OrdF32(t), nodes.len())));
                        nodes.push(child);
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
        if self.cache.is_empty() {
            return;
        }
        let root_class = frustum.classify_bound(&self.root.bound);
        Self::query_frustum_recursive(&self.root, frustum, root_class, results);
    }

    fn clear(&mut self) {
        self.root = BvhNode::leaf(Vec::new(), 0);
        self.cache.clear();
        self.churn = 0;
        self.pending_rebuild = false;
    }

    fn flush_rebuild(&mut self) {
        if self.pending_rebuild {
            self.rebuild();
        }
    }

    fn debug_draw(&self, sink: &mut dyn LineSink, flags: DebugDrawFlags) {
        if self.cache.is_empty() {
            return;
        }
        for node in self.root.descendants() {
            let wanted = if node.is_leaf() {
                flags.contains(DebugDrawFlags::LEAF_NODES)
            } else {
                flags.contains(DebugDrawFlags::INTERNAL_NODES)
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
        self.root.descendants().len()
    }

    fn total_member_count(&self) -> usize {
        self.root.descendants().iter().map(|node| node.members.len()).sum()
    }

    fn max_occupied_depth(&self) -> u32 {
        self.root
            .descendants()
            .iter()
            .filter(|node| !node.members.is_empty())
            .map(|node| node.depth)
            .max()
            .unwrap_or(0)
    }

    fn dump(&self) -> String {
        let nodes = self.root.descendants();
        let members: usize = nodes.iter().map(|node| node.members.len()).sum();
        let mut out = format!("Bvh: {} nodes, {} members\n", nodes.len(), members);
        for node in nodes {
            let kind = if node.is_leaf() { "leaf" } else { "node" };
            let _ = writeln!(
                out,
                "{}{} depth={} bound=({:.2}, {:.2}, {:.2})..({:.2}, {:.2}, {:.2}) members={}",
                "  ".repeat(node.depth as usize), kind, node.depth,
                node.bound.min.x, node.bound.min.y, node.bound.min.z,
                node.bound.max.x, node.bound.max.y, node.bound.max.z,
                node.members.len(),
            );
        }
        out
    }
}

#[cfg(test)]
#[path = "bvh_tests.rs"]
mod tests;
