//! Pinhole camera.

use crate::accel::Ray;
use crate::device::CommandBuffer;
use crate::pipeline::Pipeline;
use crate::scene::Camera;
use crate::util::{safe_normalize, Result, Vec2, Vec3};

/// Perspective camera looking from `position` at `target`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Film width over height.
    pub aspect: f32,
    pub shutter: Vec2,
}

impl PinholeCamera {
    pub fn new(position: Vec3, target: Vec3, fov: f32) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            fov,
            aspect: 1.0,
            shutter: Vec2::ZERO,
        }
    }

    pub fn with_shutter(mut self, open: f32, close: f32) -> Self {
        self.shutter = Vec2::new(open, close);
        self
    }

    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }
}

impl Camera for PinholeCamera {
    fn shutter_span(&self) -> Vec2 {
        self.shutter
    }

    fn build(&self, _pipeline: &mut Pipeline, _command_buffer: &mut CommandBuffer) -> Result<()> {
        Ok(())
    }

    fn generate_ray(&self, uv: Vec2, _time: f32) -> Ray {
        let forward = safe_normalize(self.target - self.position);
        let right = safe_normalize(forward.cross(self.up));
        let up = right.cross(forward);
        let tan = (self.fov.to_radians() * 0.5).tan();
        let x = (2.0 * uv.x - 1.0) * tan * self.aspect;
        let y = (1.0 - 2.0 * uv.y) * tan;
        Ray::new(self.position, safe_normalize(forward + right * x + up * y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_ray_hits_target() {
        let camera = PinholeCamera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 45.0);
        let ray = camera.generate_ray(Vec2::splat(0.5), 0.0);
        assert!((ray.direction - -Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_top_left_points_up_left() {
        let camera = PinholeCamera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 90.0);
        let ray = camera.generate_ray(Vec2::ZERO, 0.0);
        assert!(ray.direction.x < 0.0);
        assert!(ray.direction.y > 0.0);
    }
}
