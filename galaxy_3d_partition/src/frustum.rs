/// Frustum: six half-space planes for visibility queries.
///
/// Each plane is a Vec4 (A, B, C, D) with an inward-pointing unit normal
/// (A, B, C): a point P is on the visible side when `A*x + B*y + C*z + D >= 0`.
///
/// The renderer normally supplies the frustum; `from_view_projection()` is a
/// convenience for hosts that only have a camera matrix.

use glam::{Mat4, Vec3, Vec4};
use crate::bound::Bound;

/// Result of a 3-way frustum/bound classification.
///
/// Hierarchical queries use it to prune whole subtrees:
/// - `Outside` → skip the subtree
/// - `Inside` → take every member without further testing
/// - `Partial` → test members individually and recurse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumTest {
    /// Bound is entirely outside the frustum
    Outside,
    /// Bound is entirely inside the frustum
    Inside,
    /// Bound straddles at least one plane
    Partial,
}

/// Frustum plane indices
pub const PLANE_LEFT: usize = 0;
pub const PLANE_RIGHT: usize = 1;
pub const PLANE_BOTTOM: usize = 2;
pub const PLANE_TOP: usize = 3;
pub const PLANE_NEAR: usize = 4;
pub const PLANE_FAR: usize = 5;

/// Six clipping planes: left, right, bottom, top, near, far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Inward-facing planes, indexed by the `PLANE_*` constants
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Build from explicit planes. Normals are renormalized; a plane with a
    /// zero normal is kept as-is (it then accepts or rejects everything
    /// depending on the sign of D).
    pub fn from_planes(planes: [Vec4; 6]) -> Self {
        Self { planes: planes.map(normalize_plane) }
    }

    /// Extract the planes of a view-projection matrix (Gribb & Hartmann).
    ///
    /// Assumes a zero-to-one clip depth range (glam `*_rh` projections), so
    /// the near plane is row 2 alone rather than row 3 + row 2.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let r0 = vp.row(0);
        let r1 = vp.row(1);
        let r2 = vp.row(2);
        let r3 = vp.row(3);

        let mut planes = [Vec4::ZERO; 6];
        planes[PLANE_LEFT] = r3 + r0;
        planes[PLANE_RIGHT] = r3 - r0;
        planes[PLANE_BOTTOM] = r3 + r1;
        planes[PLANE_TOP] = r3 - r1;
        planes[PLANE_NEAR] = r2;
        planes[PLANE_FAR] = r3 - r2;

        Self::from_planes(planes)
    }

    /// Signed distance from a point to one plane (positive = visible side).
    pub fn signed_distance(&self, plane: usize, point: Vec3) -> f32 {
        let p = self.planes[plane];
        p.truncate().dot(point) + p.w
    }

    /// `true` if the point is on the visible side of all six planes.
    pub fn contains_point(&self, point: Vec3) -> bool {
        (0..6).all(|i| self.signed_distance(i, point) >= 0.0)
    }

    /// Conservative box test: `false` only when the box is fully behind some
    /// plane. May report boxes near frustum corners as visible.
    pub fn intersects_bound(&self, bound: &Bound) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            normal.dot(positive_vertex(normal, bound)) + plane.w >= 0.0
        })
    }

    /// Classify a box as outside, fully inside, or straddling.
    pub fn classify_bound(&self, bound: &Bound) -> FrustumTest {
        let mut straddles = false;

        for plane in &self.planes {
            let normal = plane.truncate();

            if normal.dot(positive_vertex(normal, bound)) + plane.w < 0.0 {
                return FrustumTest::Outside;
            }
            if normal.dot(negative_vertex(normal, bound)) + plane.w < 0.0 {
                straddles = true;
            }
        }

        if straddles { FrustumTest::Partial } else { FrustumTest::Inside }
    }
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let len = plane.truncate().length();
    if len > 0.0 { plane / len } else { plane }
}

/// Box corner furthest along `normal`.
fn positive_vertex(normal: Vec3, bound: &Bound) -> Vec3 {
    Vec3::select(normal.cmpge(Vec3::ZERO), bound.max, bound.min)
}

/// Box corner furthest against `normal`.
fn negative_vertex(normal: Vec3, bound: &Bound) -> Vec3 {
    Vec3::select(normal.cmpge(Vec3::ZERO), bound.min, bound.max)
}

#[cfg(test)]
#[path = "frustum_tests.rs"]
mod tests;
