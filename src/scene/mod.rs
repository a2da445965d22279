//! Scene description consumed by [`Pipeline::create`](crate::pipeline::Pipeline::create).
//!
//! The shape graph is read-only input. Everything polymorphic (surfaces,
//! lights, textures, cameras, environments, light samplers) enters through
//! the traits in this module; the pipeline only talks to them through tags
//! and handles.
//!
//! - [`Shape`] / [`MeshShape`] / [`GroupShape`] - the shape graph
//! - [`Surface`] / [`Light`] / [`Texture`] - tagged implementations
//! - [`Camera`] / [`Environment`] / [`LightSampler`] - scene-level services,
//!   the latter two building a per-pipeline instance

mod shape;

pub use shape::{AlphaImage, GroupShape, MeshShape, Shape};

use std::fmt;
use std::sync::Arc;

use crate::accel::Ray;
use crate::device::CommandBuffer;
use crate::handle::{TextureCategory, TextureHandle};
use crate::interaction::Interaction;
use crate::pipeline::Pipeline;
use crate::spectrum::SampledWavelengths;
use crate::util::{Result, Vec2, Vec3, Vec4};

/// BSDF value and solid-angle density for one direction pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SurfaceEvaluation {
    /// Spectral value at each sampled wavelength.
    pub f: Vec4,
    pub pdf: f32,
}

/// Sampled incident direction with its evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SurfaceSample {
    pub wi: Vec3,
    pub eval: SurfaceEvaluation,
}

/// A surface decoded at one interaction.
pub trait SurfaceClosure {
    /// Scattering from `wi` towards the interaction's `wo`.
    fn evaluate(&self, wi: Vec3) -> SurfaceEvaluation;

    /// Importance-sample an incident direction.
    fn sample(&self, u: Vec2) -> SurfaceSample;
}

/// Material implementation.
pub trait Surface: Send + Sync + fmt::Debug {
    /// Implementation type name; equal names share a tag.
    fn impl_type(&self) -> &str;

    /// A null surface is treated as absent.
    fn is_null(&self) -> bool {
        false
    }

    /// Upload parameters and return the bindless buffer id holding them.
    fn encode(
        &self,
        pipeline: &mut Pipeline,
        command_buffer: &mut CommandBuffer,
        instance_id: u32,
        shape: &Shape,
    ) -> Result<u32>;

    /// Closure for the surface at `it`.
    fn decode(
        &self,
        pipeline: &Pipeline,
        it: &Interaction,
        swl: &SampledWavelengths,
        time: f32,
    ) -> Result<Box<dyn SurfaceClosure>>;
}

/// Emitted radiance towards a point and its solid-angle density.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LightEvaluation {
    pub l: Vec4,
    pub pdf: f32,
}

/// A light decoded for one set of wavelengths.
pub trait LightClosure {
    /// Radiance leaving `it_light` towards `p_from`.
    fn evaluate(&self, pipeline: &Pipeline, it_light: &Interaction, p_from: Vec3) -> Result<LightEvaluation>;
}

/// Emitter implementation.
pub trait Light: Send + Sync + fmt::Debug {
    fn impl_type(&self) -> &str;

    fn is_null(&self) -> bool {
        false
    }

    /// Whether the light belongs on virtual (untraceable) shapes.
    fn is_virtual(&self) -> bool {
        false
    }

    fn encode(
        &self,
        pipeline: &mut Pipeline,
        command_buffer: &mut CommandBuffer,
        instance_id: u32,
        shape: &Shape,
    ) -> Result<u32>;

    fn decode(&self, pipeline: &Pipeline, swl: &SampledWavelengths, time: f32) -> Result<Box<dyn LightClosure>>;
}

/// Texture implementation.
///
/// `evaluate` returns the raw value for the texture's category: plain values
/// for generic textures, sigmoid coefficients for color textures and
/// coefficients plus scale for illuminant textures.
pub trait Texture: Send + Sync + fmt::Debug {
    fn impl_type(&self) -> &str;

    fn category(&self) -> TextureCategory;

    /// Whether the texture is zero everywhere.
    fn is_black(&self) -> bool;

    fn encode(&self, pipeline: &mut Pipeline, command_buffer: &mut CommandBuffer, tag: u32) -> Result<TextureHandle>;

    fn evaluate(&self, pipeline: &Pipeline, it: &Interaction, handle: &TextureHandle, time: f32) -> Result<Vec4>;
}

/// Ray generator with a shutter interval.
pub trait Camera: Send + Sync + fmt::Debug {
    /// Shutter open and close times.
    fn shutter_span(&self) -> Vec2;

    fn build(&self, pipeline: &mut Pipeline, command_buffer: &mut CommandBuffer) -> Result<()>;

    /// Ray through film position `uv` in `[0, 1]^2` at `time`.
    fn generate_ray(&self, uv: Vec2, time: f32) -> Ray;
}

/// Environment compiled into one pipeline.
pub trait EnvironmentInstance: Send + Sync + fmt::Debug {
    /// Radiance arriving along `-wi`.
    fn evaluate(&self, pipeline: &Pipeline, wi: Vec3, swl: &SampledWavelengths, time: f32) -> Result<Vec4>;
}

/// Radiance arriving from infinitely far away.
pub trait Environment: Send + Sync + fmt::Debug {
    fn is_black(&self) -> bool;

    fn build(&self, pipeline: &mut Pipeline, command_buffer: &mut CommandBuffer) -> Result<Box<dyn EnvironmentInstance>>;
}

/// Light chosen by a [`LightSamplerInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightSelection {
    pub instance_id: u32,
    pub tag: u32,
}

/// Built light sampler.
pub trait LightSamplerInstance: Send + Sync + fmt::Debug {
    fn select(&self, pipeline: &Pipeline, u: f32) -> Result<LightSelection>;

    /// Probability of selecting the light on instance `instance_id`.
    fn pmf(&self, pipeline: &Pipeline, instance_id: u32) -> f32;
}

/// Strategy for picking a light.
pub trait LightSampler: Send + Sync + fmt::Debug {
    fn build(&self, pipeline: &mut Pipeline, command_buffer: &mut CommandBuffer) -> Result<Box<dyn LightSamplerInstance>>;
}

/// Everything a pipeline is compiled from.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub shapes: Vec<Arc<Shape>>,
    pub cameras: Vec<Arc<dyn Camera>>,
    pub environment: Option<Arc<dyn Environment>>,
    /// Uniform selection when absent.
    pub light_sampler: Option<Arc<dyn LightSampler>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shape(mut self, shape: Arc<Shape>) -> Self {
        self.shapes.push(shape);
        self
    }

    pub fn with_camera(mut self, camera: Arc<dyn Camera>) -> Self {
        self.cameras.push(camera);
        self
    }

    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_light_sampler(mut self, sampler: Arc<dyn LightSampler>) -> Self {
        self.light_sampler = Some(sampler);
        self
    }
}
