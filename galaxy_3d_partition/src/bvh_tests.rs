//! Unit tests for bvh.rs

use glam::{Mat4, Vec3};
use rand::prelude::*;
use crate::bound::Bound;
use crate::config::BvhConfig;
use crate::debug_draw::{DebugDrawFlags, LineBatch};
use crate::error::Error;
use crate::frustum::Frustum;
use crate::ray::Ray;
use crate::scene_objects::{BoundTable, ObjectHandle};
use crate::spatial_index::SpatialIndex;
use super::*;

// ============================================================================
// Helpers
// ============================================================================

fn cube(center: Vec3, half: f32) -> Bound {
    Bound::from_center_extent(center, Vec3::splat(half))
}

fn new_bvh() -> Bvh {
    Bvh::new(BvhConfig::default()).unwrap()
}

/// `side * side` unit cubes on a grid in XZ, one per column, at random heights.
fn grid_table(side: usize, seed: u64) -> BoundTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut table = BoundTable::new();
    for ix in 0..side {
        for iz in 0..side {
            let center = Vec3::new(ix as f32 * 4.0, rng.gen_range(-20.0..20.0), iz as f32 * 4.0);
            table.insert(cube(center, 0.5));
        }
    }
    table
}

fn items(table: &BoundTable) -> Vec<(ObjectHandle, Bound)> {
    table.items().collect()
}

fn insert_all(bvh: &mut Bvh, table: &BoundTable) {
    for (handle, bound) in table.items() {
        bvh.insert(handle, &bound);
    }
}

/// Straight down through the center of `bound`.
fn ray_down_onto(bound: &Bound) -> Ray {
    let c = bound.center();
    Ray::new(Vec3::new(c.x, 100.0, c.z), Vec3::new(0.0, -1.0, 0.0))
}

fn assert_bound_eq(actual: Bound, expected: Bound) {
    assert!(
        (actual.min - expected.min).abs().max_element() < 1e-4
            && (actual.max - expected.max).abs().max_element() < 1e-4,
        "bound {:?} != {:?}", actual, expected
    );
}

/// Leaf bound = union of members, internal bound = union of children.
fn assert_consistent(node: &BvhNode) {
    if node.is_leaf() {
        let expected = Bound::union_all(node.members.iter().map(|(_, b)| b)).unwrap_or_default();
        assert_bound_eq(node.bound, expected);
        return;
    }

    assert!(node.members.is_empty(), "internal node holds members");
    let expected = Bound::union_all(node.children.iter().flatten().map(|c| &c.bound));
    assert_bound_eq(node.bound, expected.unwrap_or_default());
    for child in node.children.iter().flatten() {
        assert_eq!(child.depth, node.depth + 1);
        assert!(!child.is_empty(), "empty child left in the tree");
        assert_consistent(child);
    }
}

fn assert_every_object_pickable(bvh: &Bvh, table: &BoundTable) {
    for (handle, bound) in table.items() {
        let hit = bvh.query_ray_closest(&ray_down_onto(&bound), table).unwrap();
        assert_eq!(hit.handle, handle);
        assert!((hit.distance - (100.0 - bound.max.y)).abs() < 1e-3);
    }
}

/// Camera at (0, 0, 60) looking down -Z.
fn forward_frustum() -> Frustum {
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 200.0);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 60.0), Vec3::ZERO, Vec3::Y);
    Frustum::from_view_projection(&(proj * view))
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_new_bvh_is_empty() {
    let bvh = new_bvh();
    assert!(bvh.is_empty());
    assert_eq!(bvh.total_node_count(), 1);
    assert_eq!(bvh.total_member_count(), 0);
    assert_eq!(bvh.root_bound(), Bound::default());
    assert_eq!(bvh.name(), "Bvh");
}

#[test]
fn test_new_rejects_invalid_config() {
    let config = BvhConfig { rebuild_ratio: 0.0, ..BvhConfig::default() };
    assert!(matches!(Bvh::new(config), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_build_empty() {
    let bvh = Bvh::build(vec![], BvhConfig::default());
    assert_eq!(bvh.total_member_count(), 0);
    assert_eq!(bvh.total_node_count(), 1);
    assert!(bvh.root.is_leaf());
    assert_eq!(bvh.root_bound(), Bound::default());
}

#[test]
fn test_build_median_split_shape() {
    let mut table = BoundTable::new();
    for i in 0..10 {
        table.insert(cube(Vec3::new(i as f32 * 3.0, 0.0, 0.0), 0.5));
    }

    let bvh = Bvh::build(items(&table), BvhConfig::default());

    // 10 → 5 + 5 → (2 + 3) + (2 + 3)
    assert_eq!(bvh.total_node_count(), 7);
    assert_eq!(bvh.total_member_count(), 10);
    assert_eq!(bvh.max_occupied_depth(), 2);
    assert_consistent(&bvh.root);

    let left = bvh.root.children[0].as_ref().unwrap();
    assert!(left.bound.max.x < 13.0, "left half holds the low x centers");
}

#[test]
fn test_build_with_coincident_centers_terminates() {
    let mut table = BoundTable::new();
    for _ in 0..50 {
        table.insert(cube(Vec3::ONE, 1.0));
    }
    let bvh = Bvh::build(items(&table), BvhConfig::default());

    assert_eq!(bvh.total_member_count(), 50);
    assert_consistent(&bvh.root);
}

#[test]
fn test_build_respects_max_depth() {
    let table = grid_table(8, 3);
    let config = BvhConfig { max_depth: 2, ..BvhConfig::default() };
    let bvh = Bvh::build(items(&table), config);

    assert_eq!(bvh.max_occupied_depth(), 2);
    assert_eq!(bvh.total_member_count(), 64);
}

#[test]
fn test_build_duplicate_handle_keeps_last_bound() {
    let mut table = BoundTable::new();
    let h = table.insert(cube(Vec3::ZERO, 1.0));
    let bvh = Bvh::build(
        vec![(h, cube(Vec3::ZERO, 1.0)), (h, cube(Vec3::splat(5.0), 1.0))],
        BvhConfig::default(),
    );

    assert_eq!(bvh.len(), 1);
    assert_eq!(bvh.total_member_count(), 1);
    assert_eq!(bvh.cached_bound(h), Some(cube(Vec3::splat(5.0), 1.0)));
}

// ============================================================================
// Incremental insert
// ============================================================================

#[test]
fn test_overflowing_leaf_splits_at_spatial_midpoint() {
    let mut table = BoundTable::new();
    for i in 0..5 {
        table.insert(cube(Vec3::new(i as f32 * 10.0, 0.0, 0.0), 0.5));
    }
    let mut bvh = new_bvh();
    insert_all(&mut bvh, &table);

    assert_eq!(bvh.total_node_count(), 3);
    let left = bvh.root.children[0].as_ref().unwrap();
    let right = bvh.root.children[1].as_ref().unwrap();
    assert_eq!(left.members.len(), 2);
    assert_eq!(right.members.len(), 3);
    assert_consistent(&bvh.root);
}

#[test]
fn test_split_of_coincident_members_falls_back_to_halves() {
    let mut table = BoundTable::new();
    for _ in 0..5 {
        table.insert(cube(Vec3::ZERO, 0.5));
    }
    let mut bvh = new_bvh();
    insert_all(&mut bvh, &table);

    let left = bvh.root.children[0].as_ref().unwrap();
    let right = bvh.root.children[1].as_ref().unwrap();
    assert_eq!(left.members.len(), 2);
    assert_eq!(right.members.len(), 3);
}

#[test]
fn test_split_of_single_member_only_refits() {
    let mut table = BoundTable::new();
    let h = table.insert(cube(Vec3::ONE, 0.5));
    let mut node = BvhNode::leaf(vec![(h, cube(Vec3::ONE, 0.5))], 0);
    node.bound = Bound::default();

    Bvh::split(&mut node, &BvhConfig::default());

    assert!(node.is_leaf());
    assert_eq!(node.bound, cube(Vec3::ONE, 0.5));
}

#[test]
fn test_insert_prefers_child_with_least_growth() {
    let mut table = BoundTable::new();
    for i in 0..5 {
        table.insert(cube(Vec3::new(i as f32 * 10.0, 0.0, 0.0), 0.5));
    }
    let mut bvh = new_bvh();
    insert_all(&mut bvh, &table);

    let h = table.insert(cube(Vec3::new(41.0, 0.0, 0.0), 0.5));
    bvh.insert(h, &cube(Vec3::new(41.0, 0.0, 0.0), 0.5));

    let right = bvh.root.children[1].as_ref().unwrap();
    assert!(right.descendants().iter().any(|n| n.members.iter().any(|(m, _)| *m == h)));
    assert_consistent(&bvh.root);
}

#[test]
fn test_incremental_tree_stays_consistent_and_pickable() {
    let table = grid_table(12, 7);
    let mut bvh = new_bvh();
    insert_all(&mut bvh, &table);

    assert_eq!(bvh.total_member_count(), 144);
    assert_consistent(&bvh.root);
    assert_every_object_pickable(&bvh, &table);
}

#[test]
fn test_reinsert_moves_object() {
    let table = grid_table(4, 11);
    let mut bvh = new_bvh();
    insert_all(&mut bvh, &table);

    let h = table.handles().next().unwrap();
    let moved = cube(Vec3::new(-50.0, 0.0, -50.0), 0.5);
    bvh.insert(h, &moved);

    assert_eq!(bvh.total_member_count(), 16);
    assert_eq!(bvh.cached_bound(h), Some(moved));
    assert_consistent(&bvh.root);
}

// ============================================================================
// Remove / update
// ============================================================================

#[test]
fn test_remove_makes_object_unreachable() {
    let table = grid_table(6, 5);
    let mut bvh = Bvh::build(items(&table), BvhConfig::default());

    let (h, bound) = table.items().nth(7).unwrap();
    assert!(bvh.remove_with_bound(h, &bound));

    assert_eq!(bvh.total_member_count(), 35);
    assert!(!bvh.contains(h));
    assert_consistent(&bvh.root);
    assert!(bvh.query_ray_closest(&ray_down_onto(&bound), &table).is_none());
}

#[test]
fn test_insert_then_remove_restores_member_count() {
    let table = grid_table(5, 9);
    let mut bvh = Bvh::build(items(&table), BvhConfig::default());

    let (h, bound) = table.items().next().unwrap();
    assert!(bvh.remove(h));
    bvh.insert(h, &bound);
    assert_eq!(bvh.total_member_count(), 25);
    assert!(bvh.remove_with_bound(h, &bound));
    assert_eq!(bvh.total_member_count(), 24);
}

#[test]
fn test_remove_everything_empties_tree() {
    let table = grid_table(5, 13);
    let mut bvh = Bvh::build(items(&table), BvhConfig::default());
    for handle in table.handles() {
        assert!(bvh.remove(handle));
    }

    assert_eq!(bvh.total_member_count(), 0);
    assert_eq!(bvh.total_node_count(), 1);
    assert_eq!(bvh.root_bound(), Bound::default());
}

#[test]
fn test_remove_with_wrong_bound_falls_back_to_full_search() {
    let table = grid_table(6, 17);
    let mut bvh = Bvh::build(items(&table), BvhConfig::default());

    let h = table.handles().next().unwrap();
    assert!(bvh.remove_with_bound(h, &cube(Vec3::splat(1000.0), 1.0)));
    assert_eq!(bvh.total_member_count(), 35);
    assert_consistent(&bvh.root);
}

#[test]
fn test_remove_unknown_handle_is_noop() {
    let mut table = BoundTable::new();
    let h = table.insert(cube(Vec3::ZERO, 1.0));
    let mut bvh = new_bvh();
    assert!(!bvh.remove(h));
    assert!(!bvh.remove_with_bound(h, &cube(Vec3::ZERO, 1.0)));
}

#[test]
fn test_update_pulls_bound_from_objects() {
    let mut table = grid_table(6, 19);
    let mut bvh = Bvh::build(items(&table), BvhConfig::default());

    let h = table.handles().next().unwrap();
    let moved = cube(Vec3::new(-40.0, 0.0, -40.0), 0.5);
    table.set_bound(h, moved);
    bvh.update(h, &table);

    assert_eq!(bvh.cached_bound(h), Some(moved));
    assert_consistent(&bvh.root);
    assert_every_object_pickable(&bvh, &table);
}

#[test]
fn test_update_of_destroyed_object_removes_it() {
    let mut table = grid_table(4, 23);
    let mut bvh = Bvh::build(items(&table), BvhConfig::default());

    let h = table.handles().next().unwrap();
    table.remove(h);
    bvh.update(h, &table);

    assert!(!bvh.contains(h));
    assert_eq!(bvh.total_member_count(), 15);
}

#[test]
fn test_update_with_unchanged_bound_is_noop() {
    let table = grid_table(4, 29);
    let mut bvh = Bvh::build(items(&table), BvhConfig::default());
    let before = bvh.dump();

    for handle in table.handles() {
        bvh.update(handle, &table);
    }
    assert_eq!(bvh.dump(), before);
    assert!(!bvh.is_rebuild_pending());
}

// ============================================================================
// Bulk insert / rebuild
// ============================================================================

#[test]
fn test_bulk_insert_into_empty_tree_matches_build() {
    let table = grid_table(7, 31);
    let mut bvh = new_bvh();
    bvh.bulk_insert(items(&table));

    let built = Bvh::build(items(&table), BvhConfig::default());
    assert_eq!(bvh.total_node_count(), built.total_node_count());
    assert_eq!(bvh.total_member_count(), 49);
}

#[test]
fn test_bulk_insert_above_threshold_matches_build_of_merged_set() {
    let table = grid_table(10, 37);
    let all = items(&table);
    let (existing, batch) = all.split_at(40);

    let mut bvh = Bvh::build(existing.to_vec(), BvhConfig::default());
    // 60 >= ceil(40 * 0.5)
    bvh.bulk_insert(batch.to_vec());

    let built = Bvh::build(all.clone(), BvhConfig::default());
    assert_eq!(bvh.total_node_count(), built.total_node_count());
    assert_eq!(bvh.total_member_count(), built.total_member_count());
    assert_consistent(&bvh.root);
    assert_every_object_pickable(&bvh, &table);
}

#[test]
fn test_bulk_insert_below_threshold_matches_sequential_inserts() {
    let table = grid_table(10, 41);
    let all = items(&table);
    let (existing, batch) = all.split_at(90);

    let mut bulk = Bvh::build(existing.to_vec(), BvhConfig::default());
    // 10 < ceil(90 * 0.5)
    bulk.bulk_insert(batch.to_vec());

    let mut sequential = Bvh::build(existing.to_vec(), BvhConfig::default());
    for (handle, bound) in batch {
        sequential.insert(*handle, bound);
    }

    assert_eq!(bulk.dump(), sequential.dump());
    assert_eq!(bulk.total_member_count(), 100);
}

#[test]
fn test_bulk_insert_rebuild_supersedes_existing_entries() {
    let table = grid_table(4, 43);
    let mut bvh = Bvh::build(items(&table), BvhConfig::default());

    let moved: Vec<_> = table
        .items()
        .map(|(h, b)| (h, Bound::new(b.min + Vec3::X * 100.0, b.max + Vec3::X * 100.0)))
        .collect();
    bvh.bulk_insert(moved.clone());

    assert_eq!(bvh.total_member_count(), 16);
    for (h, b) in moved {
        assert_eq!(bvh.cached_bound(h), Some(b));
    }
}

#[test]
fn test_churn_schedules_rebuild_until_flushed() {
    let table = grid_table(10, 47);
    let mut bvh = Bvh::build(items(&table), BvhConfig::default());

    let handles: Vec<_> = table.handles().collect();
    for handle in &handles[..10] {
        bvh.remove(*handle);
    }
    assert!(!bvh.is_rebuild_pending());

    for handle in &handles[10..50] {
        bvh.remove(*handle);
    }
    assert!(bvh.is_rebuild_pending());
    // Still query-correct before the flush
    assert_consistent(&bvh.root);

    bvh.flush_rebuild();
    assert!(!bvh.is_rebuild_pending());
    assert_eq!(bvh.total_member_count(), 50);
    assert_consistent(&bvh.root);

    let rebuilt = Bvh::build(bvh.cache.iter().map(|(h, b)| (*h, *b)).collect(), BvhConfig::default());
    assert_eq!(bvh.total_node_count(), rebuilt.total_node_count());
}

#[test]
fn test_move_counts_as_one_mutation() {
    let mut table = grid_table(10, 61);
    let mut bvh = Bvh::build(items(&table), BvhConfig::default());
    let handles: Vec<_> = table.handles().collect();

    // rebuild_threshold(100) = 50
    for (i, &handle) in handles[..49].iter().enumerate() {
        let old = table.get(handle).unwrap().bound;
        let moved = cube(Vec3::new(i as f32 * 4.0, 60.0, -30.0), 0.5);
        table.set_bound(handle, moved);
        if i % 2 == 0 {
            bvh.insert(handle, &moved);
        } else {
            bvh.update_with_bounds(handle, &old, &moved);
        }
    }
    assert_eq!(bvh.churn, 49);
    assert!(!bvh.is_rebuild_pending());

    let handle = handles[49];
    table.set_bound(handle, cube(Vec3::new(0.0, 80.0, 0.0), 0.5));
    bvh.update(handle, &table);
    assert_eq!(bvh.churn, 50);
    assert!(bvh.is_rebuild_pending());
    assert_eq!(bvh.total_member_count(), 100);
}

#[test]
fn test_flush_without_pending_rebuild_is_noop() {
    let table = grid_table(3, 53);
    let mut bvh = new_bvh();
    insert_all(&mut bvh, &table);
    let before = bvh.dump();

    bvh.churn = 0;
    bvh.pending_rebuild = false;
    bvh.flush_rebuild();
    assert_eq!(bvh.dump(), before);
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_ray_returns_closest_and_skips_hidden() {
    let mut table = BoundTable::new();
    let far = table.insert(cube(Vec3::new(0.0, 0.0, -30.0), 1.0));
    let near = table.insert(cube(Vec3::new(0.0, 0.0, -10.0), 1.0));
    for i in 0..10 {
        table.insert(cube(Vec3::new(20.0 + i as f32 * 3.0, 0.0, 0.0), 1.0));
    }
    let bvh = Bvh::build(items(&table), BvhConfig::default());

    let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
    let hit = bvh.query_ray_closest(&ray, &table).unwrap();
    assert_eq!(hit.handle, near);
    assert!((hit.distance - 9.0).abs() < 1e-4);

    table.set_hidden(near, true);
    assert_eq!(bvh.query_ray_closest(&ray, &table).map(|h| h.handle), Some(far));
}

#[test]
fn test_ray_all_lists_every_box_the_ray_enters() {
    let table = grid_table(8, 67);
    let bvh = Bvh::build(items(&table), BvhConfig::default());

    for (handle, bound) in table.items().take(8) {
        // Along +Z through the object, across its whole grid row
        let c = bound.center();
        let ray = Ray::new(Vec3::new(c.x, c.y, -10.0), Vec3::new(0.0, 0.0, 1.0));
        let mut results = Vec::new();
        bvh.query_ray_all(&ray, &mut results);

        let mut expected: Vec<_> = table
            .items()
            .filter(|(_, b)| b.ray_intersect_t(&ray).is_some())
            .map(|(h, _)| h)
            .collect();
        results.sort();
        expected.sort();
        assert!(expected.contains(&handle));
        assert_eq!(results, expected);

        let ordered = bvh.query_ray_ordered(&ray);
        assert_eq!(ordered.len(), expected.len());
        assert!(ordered.windows(2).all(|pair| pair[0].1 <= pair[1].1));
    }
}

#[test]
fn test_ray_all_on_empty_tree() {
    let bvh = new_bvh();
    let mut results = Vec::new();
    bvh.query_ray_all(&Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0)), &mut results);
    assert!(results.is_empty());
    assert!(bvh.query_ray_ordered(&Ray::new(Vec3::ZERO, Vec3::X)).is_empty());
}

#[test]
fn test_ray_on_empty_tree_misses() {
    let table = BoundTable::new();
    let bvh = new_bvh();
    let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
    assert!(bvh.query_ray_closest(&ray, &table).is_none());
}

#[test]
fn test_frustum_query_returns_visible_objects() {
    let mut table = BoundTable::new();
    let front = table.insert(cube(Vec3::ZERO, 1.0));
    let behind = table.insert(cube(Vec3::new(0.0, 0.0, 90.0), 1.0));
    let side = table.insert(cube(Vec3::new(90.0, 0.0, 0.0), 1.0));
    for i in 0..8 {
        table.insert(cube(Vec3::new(-5.0 + i as f32, 2.0, -10.0), 0.25));
    }
    let bvh = Bvh::build(items(&table), BvhConfig::default());

    let mut results = Vec::new();
    bvh.query_frustum(&forward_frustum(), &mut results);

    assert!(results.contains(&front));
    assert!(!results.contains(&behind));
    assert!(!results.contains(&side));
    assert_eq!(results.len(), 9);
}

#[test]
fn test_frustum_query_on_empty_tree() {
    let bvh = new_bvh();
    let mut results = Vec::new();
    bvh.query_frustum(&forward_frustum(), &mut results);
    assert!(results.is_empty());
}

// ============================================================================
// Housekeeping
// ============================================================================

#[test]
fn test_clear() {
    let table = grid_table(5, 59);
    let mut bvh = Bvh::build(items(&table), BvhConfig::default());
    bvh.clear();

    assert!(bvh.is_empty());
    assert_eq!(bvh.total_node_count(), 1);
    assert_eq!(bvh.root_bound(), Bound::default());
}

#[test]
fn test_debug_draw_flags() {
    let mut table = BoundTable::new();
    for i in 0..10 {
        table.insert(cube(Vec3::new(i as f32 * 3.0, 0.0, 0.0), 0.5));
    }
    let bvh = Bvh::build(items(&table), BvhConfig::default());

    let mut batch = LineBatch::new();
    bvh.debug_draw(&mut batch, DebugDrawFlags::LEAF_NODES);
    assert_eq!(batch.len(), 4 * 12);

    batch.clear();
    bvh.debug_draw(&mut batch, DebugDrawFlags::INTERNAL_NODES | DebugDrawFlags::MEMBERS);
    assert_eq!(batch.len(), (3 + 10) * 12);

    batch.clear();
    new_bvh().debug_draw(&mut batch, DebugDrawFlags::all());
    assert!(batch.is_empty());
}

#[test]
fn test_dump_lists_every_node() {
    let mut table = BoundTable::new();
    for i in 0..10 {
        table.insert(cube(Vec3::new(i as f32 * 3.0, 0.0, 0.0), 0.5));
    }
    let bvh = Bvh::build(items(&table), BvhConfig::default());

    let dump = bvh.dump();
    assert!(dump.starts_with("Bvh: 7 nodes, 10 members"));
    assert_eq!(dump.lines().count(), 8);
    assert_eq!(dump.lines().filter(|l| l.trim_start().starts_with("leaf")).count(), 4);
}
