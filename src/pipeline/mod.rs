//! Scene compilation.
//!
//! [`Pipeline::create`] turns a [`Scene`] into device resources once per
//! load: deduplicated meshes in shared arenas, one [`InstanceHandle`] per
//! mesh leaf, a transform tree, tag tables for every polymorphic family and
//! a committed bindless table. Afterwards the pipeline answers the queries
//! kernels make ([`query`](Pipeline::trace_closest)) and decodes tagged
//! implementations back into closures.
//!
//! Per frame only [`Pipeline::update_geometry`] touches the device, and only
//! when some instance has a time-varying transform.

mod decode;
mod geometry;
mod query;

pub use decode::ColorEvaluation;
pub use query::{SurfacePointAttributes, SurfacePointGeometry};

use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::accel::Accel;
use crate::config::PipelineConfig;
use crate::device::{Buffer, CommandBuffer, Device, Stream};
use crate::geometry::{MeshCache, MeshData};
use crate::handle::{InstanceHandle, TextureHandle};
use crate::plugins::UniformLightSampler;
use crate::resource::Resources;
use crate::scene::{EnvironmentInstance, Light, LightSampler, LightSamplerInstance, Scene, Surface, Texture};
use crate::spectrum::Rgb2SpectrumTable;
use crate::tag::{TagFamily, TagTable};
use crate::transform::{InstancedTransform, TransformTree};
use crate::util::{Mat3, Mat4, Result};
use crate::worker::WorkerPool;

/// Emitting instance recorded during traversal, in instance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightData {
    pub instance_id: u32,
    pub tag: u32,
}

/// Instance whose transform changes over time.
#[derive(Debug, Clone, Copy)]
struct DynamicInstance {
    transform: InstancedTransform,
    is_virtual: bool,
}

impl DynamicInstance {
    fn world(&self, tree: &TransformTree, time: f32) -> Result<Mat4> {
        let m = self.transform.matrix(tree, time)?;
        Ok(if self.is_virtual {
            m * Mat4::from_mat3(Mat3::ZERO)
        } else {
            m
        })
    }
}

/// Identity of an `Arc` allocation, used to memoize per scene object.
fn identity<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value) as *const () as usize
}

/// Compiled scene.
pub struct Pipeline {
    stream: Stream,
    workers: WorkerPool,
    config: PipelineConfig,
    scene: Scene,
    resources: Resources,
    mesh_cache: MeshCache,
    accel: Accel,
    transform_tree: TransformTree,
    instances: Vec<InstanceHandle>,
    instance_buffer: Option<Buffer<InstanceHandle>>,
    dynamic_instances: Vec<DynamicInstance>,
    surfaces: TagTable<dyn Surface>,
    lights: TagTable<dyn Light>,
    generic_textures: TagTable<dyn Texture>,
    color_textures: TagTable<dyn Texture>,
    illuminant_textures: TagTable<dyn Texture>,
    mesh_data: HashMap<usize, MeshData>,
    encoded_surfaces: HashMap<usize, u32>,
    encoded_lights: HashMap<usize, u32>,
    encoded_textures: HashMap<usize, TextureHandle>,
    light_data: Vec<LightData>,
    rgb2spec: Rgb2SpectrumTable,
    rgb2spec_index: u32,
    mean_time: f32,
    environment: Option<Box<dyn EnvironmentInstance>>,
    light_sampler: Option<Box<dyn LightSamplerInstance>>,
}

impl Pipeline {
    /// Compile `scene` on `device`, submitting through `stream`.
    ///
    /// Mesh uploads and builds are committed as they happen; the instance
    /// table, the acceleration structure build and the bindless table are
    /// committed together at the end.
    #[tracing::instrument(level = "info", skip_all, fields(shapes = scene.shapes.len()))]
    pub fn create(
        device: &Device,
        stream: &Stream,
        scene: Scene,
        workers: WorkerPool,
        config: PipelineConfig,
    ) -> Result<Self> {
        let mut pipeline = Self {
            stream: stream.clone(),
            workers,
            resources: Resources::new(device, &config),
            mesh_cache: MeshCache::new(config.mesh_hash_seed),
            accel: Accel::new(device, config.accel_hint),
            config,
            scene,
            transform_tree: TransformTree::new(),
            instances: Vec::new(),
            instance_buffer: None,
            dynamic_instances: Vec::new(),
            surfaces: TagTable::new(TagFamily::Surface),
            lights: TagTable::new(TagFamily::Light),
            generic_textures: TagTable::new(TagFamily::GenericTexture),
            color_textures: TagTable::new(TagFamily::ColorTexture),
            illuminant_textures: TagTable::new(TagFamily::IlluminantTexture),
            mesh_data: HashMap::new(),
            encoded_surfaces: HashMap::new(),
            encoded_lights: HashMap::new(),
            encoded_textures: HashMap::new(),
            light_data: Vec::new(),
            rgb2spec: Rgb2SpectrumTable::srgb(),
            rgb2spec_index: 0,
            mean_time: 0.0,
            environment: None,
            light_sampler: None,
        };
        let mut command_buffer = stream.command_buffer();
        let cb = &mut command_buffer;

        let (volume, upload) = pipeline.rgb2spec.create_volume(device);
        cb.push(upload);
        pipeline.rgb2spec_index = pipeline
            .resources
            .bindless
            .emplace_volume(&volume, Rgb2SpectrumTable::sampler())?;

        pipeline.build_cameras(cb)?;
        pipeline.build_geometry(cb)?;

        let instance_buffer = device.create_buffer::<InstanceHandle>(pipeline.instances.len());
        cb.push(instance_buffer.copy_from(&pipeline.instances));
        cb.push(pipeline.accel.build());
        pipeline.instance_buffer = Some(instance_buffer);

        if let Some(environment) = pipeline.scene.environment.clone() {
            if !environment.is_black() {
                pipeline.environment = Some(environment.build(&mut pipeline, cb)?);
            }
        }

        if pipeline.light_data.is_empty() {
            if pipeline.environment().is_none() {
                tracing::warn!("no lights or environment found in the scene");
            }
        } else {
            let sampler: Arc<dyn LightSampler> = match &pipeline.scene.light_sampler {
                Some(sampler) => sampler.clone(),
                None => Arc::new(UniformLightSampler),
            };
            pipeline.light_sampler = Some(sampler.build(&mut pipeline, cb)?);
        }

        cb.push(pipeline.resources.bindless.update());
        cb.commit()?;
        tracing::info!(
            instances = pipeline.instances.len(),
            meshes = pipeline.mesh_cache.builds(),
            dynamic = pipeline.dynamic_instances.len(),
            surfaces = pipeline.surfaces.len(),
            lights = pipeline.lights.len(),
            "pipeline created"
        );
        Ok(pipeline)
    }

    fn build_cameras(&mut self, cb: &mut CommandBuffer) -> Result<()> {
        let cameras = self.scene.cameras.clone();
        if cameras.is_empty() {
            tracing::warn!("no cameras in the scene, evaluating transforms at time 0");
            self.mean_time = 0.0;
            return Ok(());
        }
        let mut sum = 0.0f64;
        for camera in &cameras {
            camera.build(self, cb)?;
            let shutter = camera.shutter_span();
            sum += (shutter.x as f64 + shutter.y as f64) * 0.5;
        }
        self.mean_time = (sum / cameras.len() as f64) as f32;
        tracing::debug!(mean_time = self.mean_time, "cameras built");
        Ok(())
    }

    /// Re-evaluate time-varying transforms at `time` and update the
    /// acceleration structure.
    ///
    /// Returns `false` without touching the device when no instance is
    /// dynamic.
    pub fn update_geometry(&mut self, command_buffer: &mut CommandBuffer, time: f32) -> Result<bool> {
        if self.dynamic_instances.is_empty() {
            return Ok(false);
        }
        let tree = &self.transform_tree;
        let accel = &self.accel;
        let dynamic = &self.dynamic_instances;
        let apply = |d: &DynamicInstance| -> Result<()> {
            accel.set_transform(d.transform.instance_id, d.world(tree, time)?)
        };
        if dynamic.len() < self.config.dynamic_update_threshold {
            dynamic.iter().try_for_each(apply)?;
        } else {
            self.workers.install(|| dynamic.par_iter().try_for_each(apply))?;
        }
        tracing::trace!(count = dynamic.len(), time, "dynamic transforms updated");
        command_buffer.push(self.accel.update());
        command_buffer.commit()?;
        Ok(true)
    }

    /// New command buffer on the pipeline's stream.
    pub fn command_buffer(&self) -> CommandBuffer {
        self.stream.command_buffer()
    }

    pub fn device(&self) -> &Device {
        &self.resources.device
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn accel(&self) -> &Accel {
        &self.accel
    }

    pub fn mesh_cache(&self) -> &MeshCache {
        &self.mesh_cache
    }

    pub fn transform_tree(&self) -> &TransformTree {
        &self.transform_tree
    }

    /// Host copy of the instance table.
    pub fn instances(&self) -> &[InstanceHandle] {
        &self.instances
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Device copy of the instance table.
    pub fn instance_buffer(&self) -> Option<&Buffer<InstanceHandle>> {
        self.instance_buffer.as_ref()
    }

    pub fn has_dynamic_transforms(&self) -> bool {
        !self.dynamic_instances.is_empty()
    }

    pub fn dynamic_instance_count(&self) -> usize {
        self.dynamic_instances.len()
    }

    /// Emitting instances in traversal order.
    pub fn lights(&self) -> &[LightData] {
        &self.light_data
    }

    pub fn has_lighting(&self) -> bool {
        !self.light_data.is_empty() || self.environment().is_some()
    }

    /// Environment built for this pipeline, unless the scene has none or
    /// it is black.
    pub fn environment(&self) -> Option<&dyn EnvironmentInstance> {
        self.environment.as_deref()
    }

    pub fn light_sampler(&self) -> Option<&dyn LightSamplerInstance> {
        self.light_sampler.as_deref()
    }

    /// Average of the cameras' shutter midpoints.
    pub fn mean_time(&self) -> f32 {
        self.mean_time
    }

    pub fn surface_tags(&self) -> &TagTable<dyn Surface> {
        &self.surfaces
    }

    pub fn light_tags(&self) -> &TagTable<dyn Light> {
        &self.lights
    }

    pub fn spectrum_table(&self) -> &Rgb2SpectrumTable {
        &self.rgb2spec
    }

    /// Bindless slot of the spectrum lookup volume.
    pub fn rgb2spec_index(&self) -> u32 {
        self.rgb2spec_index
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("instances", &self.instances.len())
            .field("meshes", &self.mesh_cache.len())
            .field("dynamic", &self.dynamic_instances.len())
            .field("surfaces", &self.surfaces)
            .field("lights", &self.lights)
            .field("bindless", &self.resources.bindless)
            .finish()
    }
}
