//! Shared scene builders for integration tests.

#![allow(dead_code)]

use lumen::prelude::*;

pub struct Fixture {
    pub device: Device,
    pub stream: Stream,
    pub workers: WorkerPool,
}

impl Fixture {
    pub fn new() -> Self {
        let device = Device::new();
        let stream = device.create_stream();
        Self {
            device,
            stream,
            workers: WorkerPool::new(2).expect("worker pool"),
        }
    }

    pub fn create(&self, scene: Scene) -> Result<Pipeline> {
        self.create_with(scene, PipelineConfig::compact())
    }

    pub fn create_with(&self, scene: Scene, config: PipelineConfig) -> Result<Pipeline> {
        Pipeline::create(&self.device, &self.stream, scene, self.workers.clone(), config)
    }
}

pub fn gray() -> Arc<dyn Texture> {
    Arc::new(ConstantColor::new(Vec3::splat(0.5)))
}

pub fn lambert() -> Arc<dyn Surface> {
    Arc::new(LambertSurface::new(gray()))
}

pub fn emitter(scale: f32) -> Arc<dyn Light> {
    let emission: Arc<dyn Texture> = Arc::new(ConstantIlluminant::new(Vec3::ONE, 1.0));
    Arc::new(DiffuseLight::new(emission, scale))
}

pub fn translate(x: f32, y: f32, z: f32) -> Arc<dyn Transform> {
    Arc::new(MatrixTransform::new(Mat4::from_translation(Vec3::new(x, y, z))))
}

/// Moves from `from` at t = 0 to `from + (0, 1, 0)` at t = 1.
pub fn moving(from: Vec3) -> Arc<dyn Transform> {
    Arc::new(KeyframeTransform::new(vec![
        (0.0, SrtTransform::from_translation(from)),
        (1.0, SrtTransform::from_translation(from + Vec3::Y)),
    ]))
}

/// Ray straight down -z onto the point (x, y) of the z = 0 plane.
pub fn ray_down(x: f32, y: f32) -> Ray {
    Ray::new(Vec3::new(x, y, 5.0), -Vec3::Z)
}

/// Minimal second surface type, reflecting nothing.
#[derive(Debug)]
pub struct BlackSurface;

struct BlackClosure;

impl SurfaceClosure for BlackClosure {
    fn evaluate(&self, _wi: Vec3) -> SurfaceEvaluation {
        SurfaceEvaluation::default()
    }

    fn sample(&self, _u: Vec2) -> SurfaceSample {
        SurfaceSample::default()
    }
}

impl Surface for BlackSurface {
    fn impl_type(&self) -> &str {
        "black"
    }

    fn encode(&self, pipeline: &mut Pipeline, cb: &mut CommandBuffer, instance_id: u32, _shape: &Shape) -> Result<u32> {
        pipeline.upload_arena_buffer(cb, &[instance_id])
    }

    fn decode(
        &self,
        _pipeline: &Pipeline,
        _it: &Interaction,
        _swl: &SampledWavelengths,
        _time: f32,
    ) -> Result<Box<dyn SurfaceClosure>> {
        Ok(Box::new(BlackClosure))
    }
}
