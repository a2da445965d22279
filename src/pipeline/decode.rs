//! Tag dispatch back to implementations, texture encoding and evaluation,
//! and the resource helpers plugins use while encoding.

use bytemuck::Pod;
use std::sync::Arc;

use super::{identity, Pipeline};
use crate::device::{BufferView, CommandBuffer, TextureSampler};
use crate::handle::{TextureCategory, TextureHandle};
use crate::interaction::Interaction;
use crate::resource::{BindlessTexture2d, BindlessTexture3d};
use crate::scene::{LightClosure, SurfaceClosure, Texture};
use crate::spectrum::{
    RgbAlbedoSpectrum, RgbIlluminantSpectrum, RgbSigmoidPolynomial, RgbUnboundSpectrum, SampledWavelengths,
};
use crate::tag::TagTable;
use crate::util::{Result, Vec3, Vec4};

/// Albedo sampled from a color texture.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColorEvaluation {
    pub value: Vec4,
    /// Largest albedo over the visible range.
    pub max: f32,
}

impl Pipeline {
    /// Closure of the surface with `tag` at `it`.
    pub fn decode_material(
        &self,
        tag: u32,
        it: &Interaction,
        swl: &SampledWavelengths,
        time: f32,
    ) -> Result<Box<dyn SurfaceClosure>> {
        self.surfaces.get(tag)?.decode(self, it, swl, time)
    }

    /// Decode the surface with `tag` and hand its closure to `f`.
    pub fn dispatch_material<R: Default>(
        &self,
        tag: u32,
        it: &Interaction,
        swl: &SampledWavelengths,
        time: f32,
        f: impl FnOnce(&dyn SurfaceClosure) -> Result<R>,
    ) -> Result<R> {
        self.surfaces.dispatch(tag, |surface| {
            let closure = surface.decode(self, it, swl, time)?;
            f(closure.as_ref())
        })
    }

    /// Closure of the light with `tag`.
    pub fn decode_light(&self, tag: u32, swl: &SampledWavelengths, time: f32) -> Result<Box<dyn LightClosure>> {
        self.lights.get(tag)?.decode(self, swl, time)
    }

    /// Decode the light with `tag` and hand its closure to `f`.
    pub fn dispatch_light<R: Default>(
        &self,
        tag: u32,
        swl: &SampledWavelengths,
        time: f32,
        f: impl FnOnce(&dyn LightClosure) -> Result<R>,
    ) -> Result<R> {
        self.lights.dispatch(tag, |light| {
            let closure = light.decode(self, swl, time)?;
            f(closure.as_ref())
        })
    }

    fn texture_table(&self, category: TextureCategory) -> &TagTable<dyn Texture> {
        match category {
            TextureCategory::Generic => &self.generic_textures,
            TextureCategory::Color => &self.color_textures,
            TextureCategory::Illuminant => &self.illuminant_textures,
        }
    }

    fn texture_table_mut(&mut self, category: TextureCategory) -> &mut TagTable<dyn Texture> {
        match category {
            TextureCategory::Generic => &mut self.generic_textures,
            TextureCategory::Color => &mut self.color_textures,
            TextureCategory::Illuminant => &mut self.illuminant_textures,
        }
    }

    /// Registered implementations of `category`, in tag order.
    pub fn texture_interfaces(&self, category: TextureCategory) -> &[Arc<dyn Texture>] {
        self.texture_table(category).interfaces()
    }

    /// Tag table of `category`.
    pub fn texture_tags(&self, category: TextureCategory) -> &TagTable<dyn Texture> {
        self.texture_table(category)
    }

    /// Handle of `texture`, encoded once per object.
    pub fn encode_texture(&mut self, command_buffer: &mut CommandBuffer, texture: &Arc<dyn Texture>) -> Result<TextureHandle> {
        if let Some(handle) = self.encoded_textures.get(&identity(texture)) {
            return Ok(*handle);
        }
        let category = texture.category();
        let tag = self.texture_table_mut(category).assign(texture.impl_type(), texture)?;
        let handle = texture.encode(self, command_buffer, tag)?;
        self.encoded_textures.insert(identity(texture), handle);
        tracing::trace!(impl_type = texture.impl_type(), ?category, tag, "texture encoded");
        Ok(handle)
    }

    /// Raw value of the texture behind `handle`.
    fn dispatch_texture(&self, category: TextureCategory, handle: &TextureHandle, it: &Interaction, time: f32) -> Result<Option<Vec4>> {
        self.texture_table(category)
            .dispatch(handle.tag(), |texture| texture.evaluate(self, it, handle, time).map(Some))
    }

    /// Texture value with the post-processing of its category applied.
    pub fn evaluate_texture(
        &self,
        category: TextureCategory,
        handle: &TextureHandle,
        it: &Interaction,
        swl: &SampledWavelengths,
        time: f32,
    ) -> Result<Vec4> {
        match category {
            TextureCategory::Generic => self.evaluate_generic_texture(handle, it, time),
            TextureCategory::Color => Ok(self.evaluate_color_texture(handle, it, swl, time)?.value),
            TextureCategory::Illuminant => self.evaluate_illuminant_texture(handle, it, swl, time),
        }
    }

    /// Raw value of a generic texture.
    pub fn evaluate_generic_texture(&self, handle: &TextureHandle, it: &Interaction, time: f32) -> Result<Vec4> {
        Ok(self
            .dispatch_texture(TextureCategory::Generic, handle, it, time)?
            .unwrap_or(Vec4::ZERO))
    }

    /// Albedo of a color texture at the sampled wavelengths.
    ///
    /// An empty family yields zero; a tag without a case yields the albedo
    /// of zero coefficients.
    pub fn evaluate_color_texture(
        &self,
        handle: &TextureHandle,
        it: &Interaction,
        swl: &SampledWavelengths,
        time: f32,
    ) -> Result<ColorEvaluation> {
        if self.color_textures.is_empty() {
            return Ok(ColorEvaluation::default());
        }
        let v = self
            .dispatch_texture(TextureCategory::Color, handle, it, time)?
            .unwrap_or(Vec4::ZERO);
        let rsp = RgbSigmoidPolynomial::new(v.truncate());
        Ok(ColorEvaluation {
            value: RgbAlbedoSpectrum { rsp }.sample(swl),
            max: rsp.maximum(),
        })
    }

    /// Emission of an illuminant texture at the sampled wavelengths.
    pub fn evaluate_illuminant_texture(
        &self,
        handle: &TextureHandle,
        it: &Interaction,
        swl: &SampledWavelengths,
        time: f32,
    ) -> Result<Vec4> {
        if self.illuminant_textures.is_empty() {
            return Ok(Vec4::ZERO);
        }
        let v = self
            .dispatch_texture(TextureCategory::Illuminant, handle, it, time)?
            .unwrap_or(Vec4::ZERO);
        let spectrum = RgbIlluminantSpectrum {
            rsp: RgbSigmoidPolynomial::new(v.truncate()),
            scale: v.w,
        };
        Ok(spectrum.sample(swl))
    }

    /// Albedo spectrum of a linear sRGB color, looked up in the spectrum
    /// volume.
    pub fn srgb_albedo_spectrum(&self, rgb: Vec3) -> Result<RgbAlbedoSpectrum> {
        let rsp = self
            .rgb2spec
            .decode_albedo(&self.resources.bindless, self.rgb2spec_index, rgb)?;
        Ok(RgbAlbedoSpectrum { rsp })
    }

    pub fn srgb_unbound_spectrum(&self, rgb: Vec3) -> Result<RgbUnboundSpectrum> {
        let (rsp, scale) = self
            .rgb2spec
            .decode_unbound(&self.resources.bindless, self.rgb2spec_index, rgb)?;
        Ok(RgbUnboundSpectrum { rsp, scale })
    }

    pub fn srgb_illuminant_spectrum(&self, rgb: Vec3) -> Result<RgbIlluminantSpectrum> {
        let (rsp, scale) = self
            .rgb2spec
            .decode_unbound(&self.resources.bindless, self.rgb2spec_index, rgb)?;
        Ok(RgbIlluminantSpectrum { rsp, scale })
    }

    /// Allocate `count` elements from the general arena and register them
    /// as a bindless buffer.
    pub fn arena_buffer<T: Pod>(&mut self, count: usize) -> Result<(BufferView<T>, u32)> {
        self.resources.arena_buffer(count)
    }

    /// Upload `data` into a fresh arena buffer and return its bindless id.
    pub fn upload_arena_buffer<T: Pod>(&mut self, command_buffer: &mut CommandBuffer, data: &[T]) -> Result<u32> {
        let (view, id) = self.arena_buffer::<T>(data.len())?;
        command_buffer.push(view.copy_from(data));
        Ok(id)
    }

    /// Create a 2D texture from linear texels, upload it and register it
    /// with `sampler`.
    pub fn image_texture(
        &mut self,
        command_buffer: &mut CommandBuffer,
        width: u32,
        height: u32,
        texels: Vec<Vec4>,
        sampler: TextureSampler,
    ) -> Result<u32> {
        let image = self.resources.device.create_image(width, height);
        command_buffer.push(image.copy_from(texels));
        self.resources.bindless.emplace_texture(&image, sampler)
    }

    /// Kernel-side view of bindless buffer `id`.
    pub fn buffer<T: Pod>(&self, id: u32) -> Result<BufferView<T>> {
        self.resources.bindless.buffer(id)
    }

    pub fn tex2d(&self, id: u32) -> Result<BindlessTexture2d> {
        self.resources.bindless.tex2d(id)
    }

    pub fn tex3d(&self, id: u32) -> Result<BindlessTexture3d> {
        self.resources.bindless.tex3d(id)
    }
}
