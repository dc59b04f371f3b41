use glam::{Vec3, Vec4};
use crate::bound::Bound;
use super::*;

#[test]
fn test_default_flags_draw_nodes_only() {
    let flags = DebugDrawFlags::default();
    assert!(flags.contains(DebugDrawFlags::LEAF_NODES));
    assert!(flags.contains(DebugDrawFlags::INTERNAL_NODES));
    assert!(!flags.contains(DebugDrawFlags::MEMBERS));
}

#[test]
fn test_depth_color_cycles() {
    assert_eq!(depth_color(0), DEPTH_PALETTE[0]);
    assert_eq!(depth_color(3), DEPTH_PALETTE[3]);
    assert_eq!(depth_color(8), DEPTH_PALETTE[0]);
    assert_eq!(depth_color(13), DEPTH_PALETTE[5]);
}

#[test]
fn test_box_edges_are_axis_aligned_and_unit_length() {
    let bound = Bound::new(Vec3::ZERO, Vec3::ONE);
    let edges = box_edges(&bound);

    for (start, end) in edges {
        assert!(bound.contains_point(start));
        assert!(bound.contains_point(end));
        assert!(((end - start).length() - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_draw_box_records_twelve_lines() {
    let mut batch = LineBatch::new();
    let color = Vec4::new(1.0, 0.0, 0.0, 1.0);
    batch.draw_box(&Bound::new(Vec3::ZERO, Vec3::splat(2.0)), color);

    assert_eq!(batch.len(), 12);
    assert!(batch.lines().iter().all(|line| line.color == color.to_array()));
}

#[test]
fn test_as_bytes_matches_line_layout() {
    let mut batch = LineBatch::new();
    batch.draw_line(Vec3::ZERO, Vec3::X, Vec4::ONE);
    batch.draw_line(Vec3::ZERO, Vec3::Y, Vec4::ONE);

    assert_eq!(std::mem::size_of::<DebugLine>(), 40);
    assert_eq!(batch.as_bytes().len(), 80);

    batch.clear();
    assert!(batch.is_empty());
}
