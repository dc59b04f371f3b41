/// Bound: the axis-aligned box every partition structure reasons about.
///
/// Invariant: `min <= max` componentwise. The constructors enforce it; the
/// fields are public for cheap reads, and code in this crate never writes
/// them directly.

use glam::{Mat4, Vec3};
use crate::frustum::Frustum;
use crate::ray::Ray;

/// Direction components smaller than this are treated as parallel to a slab.
pub const RAY_PARALLEL_EPSILON: f32 = 1e-6;

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bound {
    /// Minimum corner (x, y, z)
    pub min: Vec3,
    /// Maximum corner (x, y, z)
    pub max: Vec3,
}

impl Bound {
    /// Box spanning two corners given in any order.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }

    /// Box from a center and half-size. Negative extents are mirrored.
    pub fn from_center_extent(center: Vec3, extent: Vec3) -> Self {
        let extent = extent.abs();
        Self { min: center - extent, max: center + extent }
    }

    /// Tightest box around a point set, `None` for an empty set.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self { min: first, max: first }, |acc, p| Self {
            min: acc.min.min(p),
            max: acc.max.max(p),
        }))
    }

    /// Componentwise min/max of two boxes.
    pub fn union(a: &Bound, b: &Bound) -> Bound {
        Bound { min: a.min.min(b.min), max: a.max.max(b.max) }
    }

    /// Union of every box in the sequence, `None` if it is empty.
    pub fn union_all<'a, I: IntoIterator<Item = &'a Bound>>(bounds: I) -> Option<Bound> {
        bounds.into_iter().fold(None, |acc, b| match acc {
            Some(acc) => Some(Bound::union(&acc, b)),
            None => Some(*b),
        })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half-size on each axis.
    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Full size on each axis, clamped to zero.
    pub fn size(&self) -> Vec3 {
        (self.max - self.min).max(Vec3::ZERO)
    }

    /// Volume with degenerate (negative after rounding) sides clamped to zero.
    pub fn volume(&self) -> f32 {
        let s = self.size();
        s.x * s.y * s.z
    }

    pub fn surface_area(&self) -> f32 {
        let s = self.size();
        2.0 * (s.x * s.y + s.y * s.z + s.z * s.x)
    }

    /// Index (0 = X, 1 = Y, 2 = Z) of the largest side. Ties favor the lower axis.
    pub fn longest_axis(&self) -> usize {
        let s = self.size();
        let mut axis = 0;
        if s.y > s.x {
            axis = 1;
        }
        if s.z > s[axis] {
            axis = 2;
        }
        axis
    }

    /// `true` when every corner is finite and `min <= max`.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.cmple(self.max).all()
    }

    /// `true` if `other` lies entirely within `self` (touching faces count).
    pub fn contains(&self, other: &Bound) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && self.max.cmpge(point).all()
    }

    /// `true` if the two boxes overlap or touch.
    pub fn intersects(&self, other: &Bound) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    pub fn intersects_ray(&self, ray: &Ray) -> bool {
        self.ray_intersect_t(ray).is_some()
    }

    /// Slab test. Returns `(t_min, t_max)` of the overlap with the ray, with
    /// `t_min` clamped to 0 when the origin is inside the box.
    ///
    /// Boxes entirely behind the origin miss. Near-zero direction components
    /// never divide: the ray hits that slab only if the origin lies within it.
    pub fn ray_intersect_t(&self, ray: &Ray) -> Option<(f32, f32)> {
        let mut t_min = f32::MIN;
        let mut t_max = f32::MAX;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            let lo = self.min[axis];
            let hi = self.max[axis];

            if dir.abs() < RAY_PARALLEL_EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / dir;
            let mut t1 = (lo - origin) * inv;
            let mut t2 = (hi - origin) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        if t_max < 0.0 {
            return None;
        }
        Some((t_min.max(0.0), t_max))
    }

    /// Box vs. frustum half-spaces (conservative, see `Frustum::intersects_bound`).
    pub fn is_visible(&self, frustum: &Frustum) -> bool {
        frustum.intersects_bound(self)
    }

    /// One of the 8 cells of an even subdivision about the center.
    ///
    /// Bit layout: bit0 = X, bit1 = Y, bit2 = Z (0 = low half, 1 = high half).
    pub fn octant(&self, index: usize) -> Bound {
        let c = self.center();
        Bound {
            min: Vec3::new(
                if index & 1 == 0 { self.min.x } else { c.x },
                if index & 2 == 0 { self.min.y } else { c.y },
                if index & 4 == 0 { self.min.z } else { c.z },
            ),
            max: Vec3::new(
                if index & 1 == 0 { c.x } else { self.max.x },
                if index & 2 == 0 { c.y } else { self.max.y },
                if index & 4 == 0 { c.z } else { self.max.z },
            ),
        }
    }

    /// Same center, extent scaled by `factor` (clamped to be non-negative).
    pub fn loosened(&self, factor: f32) -> Bound {
        Bound::from_center_extent(self.center(), self.extent() * factor.max(0.0))
    }

    /// Transform this box by a matrix, returning the enclosing world box.
    ///
    /// Arvo's method: projects each matrix axis onto the box extents for an
    /// exact result without transforming all 8 corners.
    pub fn transformed(&self, matrix: &Mat4) -> Bound {
        let translation = matrix.col(3).truncate();
        let mut min = translation;
        let mut max = translation;

        for i in 0..3 {
            let axis = matrix.col(i).truncate();
            let a = axis * self.min[i];
            let b = axis * self.max[i];
            min += a.min(b);
            max += a.max(b);
        }

        Bound { min, max }
    }
}

#[cfg(test)]
#[path = "bound_tests.rs"]
mod tests;
