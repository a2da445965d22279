//! Area light with uniform emission over its shape.

use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

use crate::device::CommandBuffer;
use crate::handle::TextureHandle;
use crate::interaction::Interaction;
use crate::pipeline::Pipeline;
use crate::scene::{Light, LightClosure, LightEvaluation, Shape, Texture};
use crate::spectrum::SampledWavelengths;
use crate::util::{Result, Vec3};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DiffuseLightParams {
    emission: TextureHandle,
    scale: f32,
    two_sided: u32,
}

/// Emits `emission * scale` from the front side (or both sides).
#[derive(Debug, Clone)]
pub struct DiffuseLight {
    emission: Arc<dyn Texture>,
    scale: f32,
    two_sided: bool,
}

impl DiffuseLight {
    /// `emission` should be an illuminant texture.
    pub fn new(emission: Arc<dyn Texture>, scale: f32) -> Self {
        Self {
            emission,
            scale: scale.max(0.0),
            two_sided: false,
        }
    }

    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = two_sided;
        self
    }
}

impl Light for DiffuseLight {
    fn impl_type(&self) -> &str {
        "diffuse"
    }

    fn is_null(&self) -> bool {
        self.scale == 0.0 || self.emission.is_black()
    }

    fn encode(
        &self,
        pipeline: &mut Pipeline,
        command_buffer: &mut CommandBuffer,
        _instance_id: u32,
        _shape: &Shape,
    ) -> Result<u32> {
        let params = DiffuseLightParams {
            emission: pipeline.encode_texture(command_buffer, &self.emission)?,
            scale: self.scale,
            two_sided: self.two_sided as u32,
        };
        pipeline.upload_arena_buffer(command_buffer, &[params])
    }

    fn decode(&self, _pipeline: &Pipeline, swl: &SampledWavelengths, time: f32) -> Result<Box<dyn LightClosure>> {
        Ok(Box::new(DiffuseLightClosure { swl: *swl, time }))
    }
}

struct DiffuseLightClosure {
    swl: SampledWavelengths,
    time: f32,
}

impl LightClosure for DiffuseLightClosure {
    fn evaluate(&self, pipeline: &Pipeline, it_light: &Interaction, p_from: Vec3) -> Result<LightEvaluation> {
        let params = pipeline
            .buffer::<DiffuseLightParams>(it_light.shape.light_buffer_id())?
            .read(0)?;
        let to_from = p_from - it_light.p;
        let d2 = to_from.length_squared();
        let wo = to_from.normalize_or_zero();
        let cos_wo = it_light.ng.dot(wo);
        let front = cos_wo > 0.0 || (params.two_sided != 0 && cos_wo < 0.0);
        if !front || d2 == 0.0 || it_light.area <= 0.0 {
            return Ok(LightEvaluation::default());
        }
        let l = pipeline.evaluate_illuminant_texture(&params.emission, it_light, &self.swl, self.time)? * params.scale;
        let triangle_pdf = pipeline
            .buffer::<f32>(it_light.shape.pdf_buffer_id())?
            .read(it_light.prim as usize)?;
        let pdf_area = triangle_pdf / it_light.area;
        Ok(LightEvaluation {
            l,
            pdf: pdf_area * d2 / cos_wo.abs(),
        })
    }
}
