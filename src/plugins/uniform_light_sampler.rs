//! Uniform light selection.

use crate::device::CommandBuffer;
use crate::handle::{encode_light, LIGHT_TAG_BITS, LIGHT_TAG_MASK};
use crate::pipeline::Pipeline;
use crate::scene::{LightSampler, LightSamplerInstance, LightSelection};
use crate::util::{Error, Result};

/// Selects every light with probability `1 / n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformLightSampler;

impl LightSampler for UniformLightSampler {
    fn build(&self, pipeline: &mut Pipeline, command_buffer: &mut CommandBuffer) -> Result<Box<dyn LightSamplerInstance>> {
        let words = pipeline
            .lights()
            .iter()
            .map(|light| encode_light(light.instance_id, light.tag))
            .collect::<Result<Vec<u32>>>()?;
        if words.is_empty() {
            return Err(Error::other("uniform light sampler built without lights"));
        }
        let buffer_id = pipeline.upload_arena_buffer(command_buffer, &words)?;
        tracing::debug!(lights = words.len(), buffer_id, "uniform light sampler built");
        Ok(Box::new(UniformLightSamplerInstance {
            buffer_id,
            count: words.len() as u32,
        }))
    }
}

/// Light table of a built [`UniformLightSampler`]: one
/// `instance_id << 12 | tag` word per light.
#[derive(Debug, Clone, Copy)]
struct UniformLightSamplerInstance {
    buffer_id: u32,
    count: u32,
}

impl LightSamplerInstance for UniformLightSamplerInstance {
    fn select(&self, pipeline: &Pipeline, u: f32) -> Result<LightSelection> {
        let n = self.count as f32;
        let i = (u * n).clamp(0.0, n - 1.0) as usize;
        let word = pipeline.buffer::<u32>(self.buffer_id)?.read(i)?;
        Ok(LightSelection {
            instance_id: word >> LIGHT_TAG_BITS,
            tag: word & LIGHT_TAG_MASK,
        })
    }

    fn pmf(&self, _pipeline: &Pipeline, _instance_id: u32) -> f32 {
        1.0 / self.count as f32
    }
}
