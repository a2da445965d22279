//! Object-to-parent transforms and the hierarchy that composes them.
//!
//! - [`Transform`] - a matrix as a function of time
//! - [`MatrixTransform`] / [`SrtTransform`] - static transforms
//! - [`KeyframeTransform`] - keyframed scale/rotate/translate, dynamic
//! - [`TransformTree`] - scoped group stack, leaf registration and matrix
//!   evaluation with caching for static chains

mod tree;

pub use tree::{InstancedTransform, TransformNodeId, TransformScope, TransformTree};

use std::fmt;

use crate::util::{Mat4, Quat, Vec3};

/// Object-to-parent transform.
pub trait Transform: Send + Sync + fmt::Debug {
    /// Whether the matrix is the same at every time.
    fn is_static(&self) -> bool;

    /// Whether the matrix is the identity at every time.
    fn is_identity(&self) -> bool;

    /// Matrix at `time`.
    fn matrix(&self, time: f32) -> Mat4;
}

/// Fixed matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixTransform {
    pub matrix: Mat4,
}

impl MatrixTransform {
    pub fn new(matrix: Mat4) -> Self {
        Self { matrix }
    }
}

impl Transform for MatrixTransform {
    fn is_static(&self) -> bool {
        true
    }

    fn is_identity(&self) -> bool {
        self.matrix == Mat4::IDENTITY
    }

    fn matrix(&self, _time: f32) -> Mat4 {
        self.matrix
    }
}

/// Scale, then rotate, then translate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrtTransform {
    pub scale: Vec3,
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Default for SrtTransform {
    fn default() -> Self {
        Self {
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
        }
    }
}

impl SrtTransform {
    pub fn new(scale: Vec3, rotation: Quat, translation: Vec3) -> Self {
        Self {
            scale,
            rotation,
            translation,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Component-wise blend; rotation is slerped.
    pub fn interpolate(&self, other: &SrtTransform, t: f32) -> SrtTransform {
        SrtTransform {
            scale: self.scale.lerp(other.scale, t),
            rotation: self.rotation.slerp(other.rotation, t),
            translation: self.translation.lerp(other.translation, t),
        }
    }
}

impl Transform for SrtTransform {
    fn is_static(&self) -> bool {
        true
    }

    fn is_identity(&self) -> bool {
        *self == SrtTransform::default()
    }

    fn matrix(&self, _time: f32) -> Mat4 {
        self.to_matrix()
    }
}

/// SRT keyframes; times outside the keyed range clamp to the end keys.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeTransform {
    keys: Vec<(f32, SrtTransform)>,
}

impl KeyframeTransform {
    /// Keys may come in any order. An empty list behaves as the identity.
    pub fn new(mut keys: Vec<(f32, SrtTransform)>) -> Self {
        keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { keys }
    }

    pub fn keys(&self) -> &[(f32, SrtTransform)] {
        &self.keys
    }

    /// Interpolated SRT at `time`.
    pub fn sample(&self, time: f32) -> SrtTransform {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return SrtTransform::default(),
        };
        if time <= first.0 {
            return first.1;
        }
        if time >= last.0 {
            return last.1;
        }
        let upper = self.keys.partition_point(|(t, _)| *t <= time);
        let (t0, a) = &self.keys[upper - 1];
        let (t1, b) = &self.keys[upper];
        let span = t1 - t0;
        let t = if span > 0.0 { (time - t0) / span } else { 0.0 };
        a.interpolate(b, t)
    }
}

impl Transform for KeyframeTransform {
    fn is_static(&self) -> bool {
        self.keys.len() <= 1
    }

    fn is_identity(&self) -> bool {
        self.keys.iter().all(|(_, k)| k.is_identity())
    }

    fn matrix(&self, time: f32) -> Mat4 {
        self.sample(time).to_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_detection() {
        assert!(MatrixTransform::new(Mat4::IDENTITY).is_identity());
        assert!(SrtTransform::default().is_identity());
        assert!(!SrtTransform::from_translation(Vec3::X).is_identity());
        assert!(KeyframeTransform::new(vec![]).is_identity());
    }

    #[test]
    fn test_keyframes_interpolate_and_clamp() {
        let k = KeyframeTransform::new(vec![
            (1.0, SrtTransform::from_translation(Vec3::new(2.0, 0.0, 0.0))),
            (0.0, SrtTransform::default()),
        ]);
        assert!(!k.is_static());
        assert_eq!(k.sample(0.5).translation, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(k.sample(-3.0).translation, Vec3::ZERO);
        assert_eq!(k.sample(7.0).translation, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(k.matrix(1.0), Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_rotation_is_slerped() {
        let k = KeyframeTransform::new(vec![
            (0.0, SrtTransform::default()),
            (
                1.0,
                SrtTransform::new(Vec3::ONE, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2), Vec3::ZERO),
            ),
        ]);
        let p = k.matrix(0.5).transform_point3(Vec3::X);
        let expected = Vec3::new(1.0, 1.0, 0.0).normalize();
        assert!((p - expected).length() < 1e-5);
    }
}
