//! Environment with the same radiance from every direction.

use std::sync::Arc;

use crate::device::CommandBuffer;
use crate::handle::TextureHandle;
use crate::interaction::Interaction;
use crate::pipeline::Pipeline;
use crate::scene::{Environment, EnvironmentInstance, Texture};
use crate::spectrum::SampledWavelengths;
use crate::util::{Result, Vec3, Vec4};

/// Uniform environment driven by an illuminant texture.
#[derive(Debug)]
pub struct ConstantEnvironment {
    emission: Arc<dyn Texture>,
}

impl ConstantEnvironment {
    pub fn new(emission: Arc<dyn Texture>) -> Self {
        Self { emission }
    }
}

impl Environment for ConstantEnvironment {
    fn is_black(&self) -> bool {
        self.emission.is_black()
    }

    fn build(&self, pipeline: &mut Pipeline, command_buffer: &mut CommandBuffer) -> Result<Box<dyn EnvironmentInstance>> {
        let emission = pipeline.encode_texture(command_buffer, &self.emission)?;
        Ok(Box::new(ConstantEnvironmentInstance { emission }))
    }
}

/// Emission handle as encoded by one pipeline.
#[derive(Debug, Clone, Copy)]
struct ConstantEnvironmentInstance {
    emission: TextureHandle,
}

impl EnvironmentInstance for ConstantEnvironmentInstance {
    fn evaluate(&self, pipeline: &Pipeline, wi: Vec3, swl: &SampledWavelengths, time: f32) -> Result<Vec4> {
        pipeline.evaluate_illuminant_texture(&self.emission, &Interaction::miss(-wi), swl, time)
    }
}
