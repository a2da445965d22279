//! Ideal diffuse reflection.

use std::f32::consts::FRAC_1_PI;
use std::sync::Arc;

use crate::device::CommandBuffer;
use crate::handle::TextureHandle;
use crate::interaction::{Frame, Interaction};
use crate::pipeline::Pipeline;
use crate::scene::{Shape, Surface, SurfaceClosure, SurfaceEvaluation, SurfaceSample, Texture};
use crate::spectrum::SampledWavelengths;
use crate::util::{cosine_hemisphere_pdf, sample_cosine_hemisphere, Result, Vec2, Vec3, Vec4};

/// Lambertian surface with a textured albedo.
#[derive(Debug, Clone)]
pub struct LambertSurface {
    color: Arc<dyn Texture>,
}

impl LambertSurface {
    /// `color` should be a color texture.
    pub fn new(color: Arc<dyn Texture>) -> Self {
        Self { color }
    }
}

impl Surface for LambertSurface {
    fn impl_type(&self) -> &str {
        "lambert"
    }

    fn encode(
        &self,
        pipeline: &mut Pipeline,
        command_buffer: &mut CommandBuffer,
        _instance_id: u32,
        _shape: &Shape,
    ) -> Result<u32> {
        let color = pipeline.encode_texture(command_buffer, &self.color)?;
        pipeline.upload_arena_buffer(command_buffer, &[color])
    }

    fn decode(
        &self,
        pipeline: &Pipeline,
        it: &Interaction,
        swl: &SampledWavelengths,
        time: f32,
    ) -> Result<Box<dyn SurfaceClosure>> {
        let color = pipeline
            .buffer::<TextureHandle>(it.shape.surface_buffer_id())?
            .read(0)?;
        let albedo = pipeline.evaluate_color_texture(&color, it, swl, time)?.value;
        Ok(Box::new(LambertClosure::new(albedo, it)))
    }
}

/// Lambert BRDF in the shading frame of one interaction.
#[derive(Debug, Clone, Copy)]
pub struct LambertClosure {
    f: Vec4,
    frame: Frame,
    wo: Vec3,
    cos_wo: f32,
}

impl LambertClosure {
    pub fn new(albedo: Vec4, it: &Interaction) -> Self {
        Self {
            f: albedo * FRAC_1_PI,
            frame: it.shading,
            wo: it.wo,
            cos_wo: it.wo.dot(it.shading.n()),
        }
    }

    fn front_face(&self) -> bool {
        self.cos_wo > 0.0
    }
}

impl SurfaceClosure for LambertClosure {
    fn evaluate(&self, wi: Vec3) -> SurfaceEvaluation {
        let cos_wi = wi.dot(self.frame.n());
        let same_hemisphere = cos_wi * self.cos_wo > 0.0;
        if !same_hemisphere || !self.front_face() {
            return SurfaceEvaluation::default();
        }
        SurfaceEvaluation {
            f: self.f * cos_wi.abs(),
            pdf: cosine_hemisphere_pdf(cos_wi.abs()),
        }
    }

    fn sample(&self, u: Vec2) -> SurfaceSample {
        let mut local = sample_cosine_hemisphere(u);
        local.z *= self.cos_wo.signum();
        let wi = self.frame.local_to_world(local);
        SurfaceSample {
            wi,
            eval: self.evaluate(wi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facing(wo: Vec3) -> Interaction {
        let mut it = Interaction::miss(wo);
        it.inst = 0;
        it.ng = Vec3::Z;
        it.shading = Frame::make(Vec3::Z, Vec3::X);
        it
    }

    #[test]
    fn test_evaluate_cosine_weighted() {
        let closure = LambertClosure::new(Vec4::splat(0.5), &facing(Vec3::Z));
        let e = closure.evaluate(Vec3::Z);
        assert!((e.f.x - 0.5 * FRAC_1_PI).abs() < 1e-6);
        assert!((e.pdf - FRAC_1_PI).abs() < 1e-6);
        assert_eq!(closure.evaluate(-Vec3::Z), SurfaceEvaluation::default());
    }

    #[test]
    fn test_back_face_is_black() {
        let closure = LambertClosure::new(Vec4::ONE, &facing(-Vec3::Z));
        assert_eq!(closure.evaluate(-Vec3::Z), SurfaceEvaluation::default());
    }

    #[test]
    fn test_sample_stays_on_wo_side() {
        let closure = LambertClosure::new(Vec4::ONE, &facing(Vec3::new(0.0, 0.6, 0.8)));
        let s = closure.sample(Vec2::new(0.3, 0.7));
        assert!(s.wi.z > 0.0);
        assert!(s.eval.pdf > 0.0);
    }
}
