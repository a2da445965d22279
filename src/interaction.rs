//! Surface interaction records.

use crate::handle::InstanceHandle;
use crate::util::{perpendicular, safe_normalize, Vec2, Vec3};

/// Orthonormal shading frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    s: Vec3,
    t: Vec3,
    n: Vec3,
}

impl Frame {
    /// Frame around `n`, with `s` taken from `tangent` made orthogonal to `n`.
    pub fn make(n: Vec3, tangent: Vec3) -> Self {
        let n = safe_normalize(n);
        let mut s = safe_normalize(tangent - n * n.dot(tangent));
        if s == Vec3::ZERO {
            s = perpendicular(n);
        }
        Self { s, t: n.cross(s), n }
    }

    pub fn s(&self) -> Vec3 {
        self.s
    }

    pub fn t(&self) -> Vec3 {
        self.t
    }

    pub fn n(&self) -> Vec3 {
        self.n
    }

    pub fn local_to_world(&self, v: Vec3) -> Vec3 {
        self.s * v.x + self.t * v.y + self.n * v.z
    }

    pub fn world_to_local(&self, v: Vec3) -> Vec3 {
        Vec3::new(self.s.dot(v), self.t.dot(v), self.n.dot(v))
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            s: Vec3::X,
            t: Vec3::Y,
            n: Vec3::Z,
        }
    }
}

/// Everything shading needs about a ray hit. A miss only carries `wo`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interaction {
    pub shape: InstanceHandle,
    pub inst: u32,
    pub prim: u32,
    /// World-space area of the hit triangle.
    pub area: f32,
    pub p: Vec3,
    pub wo: Vec3,
    /// Geometric normal, facing `wo` for two-sided shapes.
    pub ng: Vec3,
    pub uv: Vec2,
    pub shading: Frame,
    pub alpha: f32,
}

impl Interaction {
    /// Record of a ray that left the scene along `-wo`.
    pub fn miss(wo: Vec3) -> Self {
        Self {
            shape: InstanceHandle::default(),
            inst: u32::MAX,
            prim: u32::MAX,
            area: 0.0,
            p: Vec3::ZERO,
            wo,
            ng: Vec3::ZERO,
            uv: Vec2::ZERO,
            shading: Frame::default(),
            alpha: 0.0,
        }
    }

    pub fn valid(&self) -> bool {
        self.inst != u32::MAX
    }

    /// Whether `wo` is on the side the geometric normal points to.
    pub fn back_facing(&self) -> bool {
        self.ng.dot(self.wo) < 0.0
    }

    /// Point offset along the normal on the side of `w`.
    pub fn p_robust(&self, w: Vec3) -> Vec3 {
        let offset = self.ng * 1e-4 * self.p.abs().max_element().max(1.0);
        if self.ng.dot(w) >= 0.0 {
            self.p + offset
        } else {
            self.p - offset
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_orthonormal() {
        let f = Frame::make(Vec3::new(0.0, 0.0, 2.0), Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(f.n(), Vec3::Z);
        assert_eq!(f.s(), Vec3::X);
        assert_eq!(f.t(), Vec3::Y);
        let v = Vec3::new(0.3, -0.2, 0.9);
        assert!((f.local_to_world(f.world_to_local(v)) - v).length() < 1e-6);
    }

    #[test]
    fn test_frame_without_tangent() {
        let f = Frame::make(Vec3::X, Vec3::ZERO);
        assert!(f.s().dot(f.n()).abs() < 1e-6);
        assert!((f.t().length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_miss() {
        let it = Interaction::miss(Vec3::Y);
        assert!(!it.valid());
        assert_eq!(it.wo, Vec3::Y);
    }
}
