//! Math type re-exports and small geometric helpers.
//!
//! Vector and matrix types come from `glam`; this module adds the few
//! operations the pipeline repeats in several places.

pub use glam::{Mat3, Mat4, Quat, UVec3, Vec2, Vec3, Vec3A, Vec4};

/// Transform a point (w = 1) by an affine matrix.
#[inline]
pub fn transform_point(m: &Mat4, p: Vec3) -> Vec3 {
    m.transform_point3(p)
}

/// Matrix that maps object-space normals to world space.
///
/// Singular matrices (the zero-scaled transforms of virtual shapes) yield a
/// zero matrix instead of NaNs.
#[inline]
pub fn normal_matrix(m: &Mat4) -> Mat3 {
    let m3 = Mat3::from_mat4(*m);
    if m3.determinant().abs() <= f32::MIN_POSITIVE {
        return Mat3::ZERO;
    }
    m3.inverse().transpose()
}

/// Normalize, mapping zero-length vectors to zero instead of NaN.
#[inline]
pub fn safe_normalize(v: Vec3) -> Vec3 {
    v.normalize_or_zero()
}

/// Any unit vector perpendicular to `n`.
pub fn perpendicular(n: Vec3) -> Vec3 {
    let helper = if n.x.abs() > 0.9 { Vec3::Y } else { Vec3::X };
    safe_normalize(helper.cross(n))
}

/// Concentric map of `u` onto the unit disk.
pub fn sample_uniform_disk_concentric(u: Vec2) -> Vec2 {
    let o = u * 2.0 - Vec2::ONE;
    if o == Vec2::ZERO {
        return Vec2::ZERO;
    }
    let (r, theta) = if o.x.abs() > o.y.abs() {
        (o.x, std::f32::consts::FRAC_PI_4 * (o.y / o.x))
    } else {
        (o.y, std::f32::consts::FRAC_PI_2 - std::f32::consts::FRAC_PI_4 * (o.x / o.y))
    };
    Vec2::new(theta.cos(), theta.sin()) * r
}

/// Cosine-weighted direction around +z.
pub fn sample_cosine_hemisphere(u: Vec2) -> Vec3 {
    let d = sample_uniform_disk_concentric(u);
    Vec3::new(d.x, d.y, (1.0 - d.length_squared()).max(0.0).sqrt())
}

/// Density of [`sample_cosine_hemisphere`] for a direction with cosine
/// `cos_theta` to +z.
#[inline]
pub fn cosine_hemisphere_pdf(cos_theta: f32) -> f32 {
    cos_theta * std::f32::consts::FRAC_1_PI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_matrix_of_scale() {
        let m = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = normal_matrix(&m) * Vec3::new(1.0, 1.0, 0.0);
        assert!((n.x - 0.5).abs() < 1e-6);
        assert!((n.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normal_matrix_of_zero_scale() {
        let m = Mat4::from_mat3(Mat3::ZERO);
        assert_eq!(normal_matrix(&m), Mat3::ZERO);
    }

    #[test]
    fn test_cosine_hemisphere_is_unit_and_upper() {
        for i in 0..8 {
            for j in 0..8 {
                let u = Vec2::new(i as f32 / 8.0 + 0.01, j as f32 / 8.0 + 0.01);
                let w = sample_cosine_hemisphere(u);
                assert!(w.z >= 0.0);
                assert!((w.length() - 1.0).abs() < 1e-5);
            }
        }
        assert_eq!(sample_cosine_hemisphere(Vec2::splat(0.5)), Vec3::Z);
    }

    #[test]
    fn test_perpendicular() {
        for n in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 1.0, 1.0).normalize()] {
            let t = perpendicular(n);
            assert!(t.dot(n).abs() < 1e-6);
            assert!((t.length() - 1.0).abs() < 1e-6);
        }
    }
}
