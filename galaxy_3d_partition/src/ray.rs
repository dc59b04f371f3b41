/// Ray: origin and direction for picking queries.
///
/// The direction is normalized on construction, so every `t` returned by the
/// partition (slab entry, precise hit distance) is a world-space distance
/// along the ray.

use glam::{Mat4, Vec2, Vec3};

/// A half-line starting at `origin`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point in world space
    pub origin: Vec3,
    /// Unit direction (zero if constructed from a zero vector)
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray. `direction` is normalized; a zero direction stays zero.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Ray from `from` toward `to`.
    pub fn between(from: Vec3, to: Vec3) -> Self {
        Self::new(from, to - from)
    }

    /// Point at distance `t` along the ray.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Unproject a picking ray from normalized device coordinates.
    ///
    /// `ndc` is in [-1, 1] on both axes (y up). Assumes a zero-to-one depth
    /// range, as produced by glam's `perspective_rh` / `orthographic_rh`.
    pub fn from_screen(ndc: Vec2, inverse_view_projection: &Mat4) -> Self {
        let near = inverse_view_projection.project_point3(Vec3::new(ndc.x, ndc.y, 0.0));
        let far = inverse_view_projection.project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
        Self::between(near, far)
    }
}

#[cfg(test)]
#[path = "ray_tests.rs"]
mod tests;
