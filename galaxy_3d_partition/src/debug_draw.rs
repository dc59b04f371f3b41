/// Debug visualization of partition trees.
///
/// Trees walk their nodes and hand boxes to a `LineSink`. The renderer side
/// either implements `LineSink` itself or drains a `LineBatch`, whose
/// `DebugLine` layout can be uploaded to a vertex buffer as-is.

use glam::{Vec3, Vec4};
use crate::bound::Bound;

bitflags::bitflags! {
    /// What `debug_draw` emits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DebugDrawFlags: u8 {
        /// Nodes without children
        const LEAF_NODES     = 0b0000_0001;
        /// Nodes with children
        const INTERNAL_NODES = 0b0000_0010;
        /// Cached bound of every member
        const MEMBERS        = 0b0000_0100;
    }
}

impl Default for DebugDrawFlags {
    fn default() -> Self {
        Self::LEAF_NODES | Self::INTERNAL_NODES
    }
}

/// Node colors, cycled by depth.
pub const DEPTH_PALETTE: [Vec4; 8] = [
    Vec4::new(0.0, 1.0, 0.0, 1.0), // green
    Vec4::new(0.2, 0.8, 1.0, 1.0), // sky blue
    Vec4::new(1.0, 0.6, 0.1, 1.0), // orange
    Vec4::new(1.0, 0.0, 0.0, 1.0), // red
    Vec4::new(0.6, 0.0, 1.0, 1.0), // purple
    Vec4::new(1.0, 1.0, 0.0, 1.0), // yellow
    Vec4::new(0.0, 0.5, 1.0, 1.0), // blue
    Vec4::new(1.0, 0.0, 1.0, 1.0), // pink
];

/// Color of member boxes.
pub const MEMBER_COLOR: Vec4 = Vec4::new(1.0, 1.0, 1.0, 1.0);

/// Palette entry for a node at `depth`.
pub fn depth_color(depth: u32) -> Vec4 {
    DEPTH_PALETTE[depth as usize % DEPTH_PALETTE.len()]
}

/// The 12 edges of a box, as corner pairs.
pub fn box_edges(bound: &Bound) -> [(Vec3, Vec3); 12] {
    let (lo, hi) = (bound.min, bound.max);
    let c = |i: usize| {
        Vec3::new(
            if i & 1 == 0 { lo.x } else { hi.x },
            if i & 2 == 0 { lo.y } else { hi.y },
            if i & 4 == 0 { lo.z } else { hi.z },
        )
    };
    [
        // along X
        (c(0), c(1)), (c(2), c(3)), (c(4), c(5)), (c(6), c(7)),
        // along Y
        (c(0), c(2)), (c(1), c(3)), (c(4), c(6)), (c(5), c(7)),
        // along Z
        (c(0), c(4)), (c(1), c(5)), (c(2), c(6)), (c(3), c(7)),
    ]
}

/// Line-drawing collaborator used by `debug_draw`.
pub trait LineSink {
    fn draw_line(&mut self, start: Vec3, end: Vec3, color: Vec4);

    /// Draw the 12 edges of `bound`.
    fn draw_box(&mut self, bound: &Bound, color: Vec4) {
        for (start, end) in box_edges(bound) {
            self.draw_line(start, end, color);
        }
    }
}

/// GPU-ready line segment
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DebugLine {
    pub start: [f32; 3],
    pub end: [f32; 3],
    pub color: [f32; 4],
}

/// `LineSink` that records every segment.
#[derive(Debug, Default)]
pub struct LineBatch {
    lines: Vec<DebugLine>,
}

impl LineBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[DebugLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Raw bytes of all recorded lines, for a direct buffer upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.lines)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl LineSink for LineBatch {
    fn draw_line(&mut self, start: Vec3, end: Vec3, color: Vec4) {
        self.lines.push(DebugLine {
            start: start.to_array(),
            end: end.to_array(),
            color: color.to_array(),
        });
    }
}

#[cfg(test)]
#[path = "debug_draw_tests.rs"]
mod tests;
