//! # Lumen
//!
//! Scene compilation and bindless resource management for ray tracing
//! renderers.
//!
//! A hierarchical scene (meshes, groups, transforms, surfaces, lights,
//! textures) is compiled once per load into flat device buffers, a
//! two-level acceleration structure and a bindless table that kernels index
//! without knowing concrete types. Polymorphic implementations are reached
//! through dense tags and bounded switches instead of virtual calls.
//!
//! ## Modules
//!
//! - [`util`] - Errors, math re-exports, tracing setup
//! - [`config`] - Capacities and tuning knobs
//! - [`worker`] - Injected worker pool and async tasks
//! - [`device`] - Host-emulated device, buffers, textures, command streams
//! - [`resource`] - Arena allocator and bindless registry
//! - [`geometry`] - Mesh data, alias tables, deduplicating mesh cache
//! - [`accel`] - SAH BVH, mesh primitives, instance-level tracing
//! - [`transform`] - Transforms and the scoped transform tree
//! - [`tag`] - Tag tables and dispatch plans
//! - [`handle`] - Bit-packed instance and texture handles
//! - [`spectrum`] - Wavelength sampling and RGB uplift
//! - [`scene`] - Scene input model and collaborator traits
//! - [`interaction`] - Surface interaction records
//! - [`pipeline`] - Scene compilation, queries and decoding
//! - [`plugins`] - Reference surfaces, lights, textures and samplers
//!
//! ## Example
//!
//! ```ignore
//! use lumen::prelude::*;
//!
//! let device = Device::new();
//! let stream = device.create_stream();
//! let color: Arc<dyn Texture> = Arc::new(ConstantColor::new(Vec3::splat(0.8)));
//! let scene = Scene::new().with_shape(
//!     MeshShape::quad()
//!         .with_surface(Arc::new(LambertSurface::new(color)))
//!         .into_shape(),
//! );
//! let pipeline = Pipeline::create(&device, &stream, scene, WorkerPool::new(0)?, PipelineConfig::default())?;
//! let hit = pipeline.trace_closest(&Ray::new(Vec3::new(0.0, 0.0, 1.0), -Vec3::Z));
//! ```

pub mod util;
pub mod config;
pub mod worker;
pub mod device;
pub mod resource;
pub mod geometry;
pub mod accel;
pub mod transform;
pub mod tag;
pub mod handle;
pub mod spectrum;
pub mod scene;
pub mod interaction;
pub mod pipeline;
pub mod plugins;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use pipeline::Pipeline;
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::accel::{AccelBuildHint, Hit, Ray};
    pub use crate::config::PipelineConfig;
    pub use crate::device::{CommandBuffer, Device, Stream};
    pub use crate::geometry::{Triangle, VertexAttribute};
    pub use crate::handle::{InstanceHandle, ShapeProperties, TextureCategory, TextureHandle};
    pub use crate::interaction::Interaction;
    pub use crate::pipeline::Pipeline;
    pub use crate::plugins::*;
    pub use crate::scene::*;
    pub use crate::spectrum::SampledWavelengths;
    pub use crate::transform::{KeyframeTransform, MatrixTransform, SrtTransform, Transform};
    pub use crate::util::{Error, Mat4, Quat, Result, Vec2, Vec3, Vec4};
    pub use crate::worker::WorkerPool;
}
