//! Constant textures.
//!
//! Values are stored inline in the [`TextureHandle`], so evaluation never
//! touches a bindless slot except for the spectrum lookup of colors.

use crate::device::CommandBuffer;
use crate::handle::{TextureCategory, TextureHandle};
use crate::interaction::Interaction;
use crate::pipeline::Pipeline;
use crate::scene::Texture;
use crate::util::{Result, Vec3, Vec4};

/// Up to four plain values.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantGeneric {
    values: Vec<f32>,
}

impl ConstantGeneric {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    fn value(&self) -> Vec4 {
        let mut v = [0.0; 4];
        for (dst, src) in v.iter_mut().zip(&self.values) {
            *dst = *src;
        }
        Vec4::from_array(v)
    }
}

impl Texture for ConstantGeneric {
    fn impl_type(&self) -> &str {
        "constant_generic"
    }

    fn category(&self) -> TextureCategory {
        TextureCategory::Generic
    }

    fn is_black(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    fn encode(&self, _pipeline: &mut Pipeline, _command_buffer: &mut CommandBuffer, tag: u32) -> Result<TextureHandle> {
        if self.values.len() > 4 {
            tracing::warn!(count = self.values.len(), "constant texture keeps only the first 4 values");
        }
        let v = self.value();
        TextureHandle::encode_constant(tag, v.truncate(), v.w)
    }

    fn evaluate(&self, _pipeline: &Pipeline, _it: &Interaction, handle: &TextureHandle, _time: f32) -> Result<Vec4> {
        Ok(handle.v().extend(handle.alpha))
    }
}

/// Linear sRGB reflectance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantColor {
    color: Vec3,
}

impl ConstantColor {
    /// Channels are clamped to `[0, 1]`.
    pub fn new(color: Vec3) -> Self {
        Self {
            color: color.clamp(Vec3::ZERO, Vec3::ONE),
        }
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }
}

impl Texture for ConstantColor {
    fn impl_type(&self) -> &str {
        "constant_color"
    }

    fn category(&self) -> TextureCategory {
        TextureCategory::Color
    }

    fn is_black(&self) -> bool {
        self.color == Vec3::ZERO
    }

    fn encode(&self, _pipeline: &mut Pipeline, _command_buffer: &mut CommandBuffer, tag: u32) -> Result<TextureHandle> {
        TextureHandle::encode_constant(tag, self.color, 1.0)
    }

    fn evaluate(&self, pipeline: &Pipeline, _it: &Interaction, handle: &TextureHandle, _time: f32) -> Result<Vec4> {
        let spectrum = pipeline.srgb_albedo_spectrum(handle.v())?;
        Ok(spectrum.rsp.coefficients().extend(handle.alpha))
    }
}

/// Linear sRGB emission times a scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantIlluminant {
    color: Vec3,
    scale: f32,
}

impl ConstantIlluminant {
    pub fn new(color: Vec3, scale: f32) -> Self {
        Self {
            color: color.max(Vec3::ZERO),
            scale: scale.max(0.0),
        }
    }
}

impl Texture for ConstantIlluminant {
    fn impl_type(&self) -> &str {
        "constant_illuminant"
    }

    fn category(&self) -> TextureCategory {
        TextureCategory::Illuminant
    }

    fn is_black(&self) -> bool {
        self.scale == 0.0 || self.color == Vec3::ZERO
    }

    fn encode(&self, pipeline: &mut Pipeline, _command_buffer: &mut CommandBuffer, tag: u32) -> Result<TextureHandle> {
        let (rsp, scale) = pipeline.spectrum_table().encode_unbound(self.color * self.scale);
        TextureHandle::encode_constant(tag, rsp.coefficients(), scale)
    }

    fn evaluate(&self, _pipeline: &Pipeline, _it: &Interaction, handle: &TextureHandle, _time: f32) -> Result<Vec4> {
        Ok(handle.v().extend(handle.alpha))
    }
}
