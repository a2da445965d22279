//! Lumen CLI - builds synthetic scenes and reports pipeline statistics.

use anyhow::{bail, Context};
use lumen::prelude::*;
use lumen::util::init_tracing;
use std::env;
use std::time::Instant;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut filter = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => filter = "debug",
            "-vv" | "--trace" => filter = "trace",
            "-q" | "--quiet" => filter = "error",
            _ => filtered_args.push(arg),
        }
    }
    init_tracing(filter);
    #[cfg(feature = "chrome-trace")]
    let _chrome = lumen::util::init_chrome_tracing();

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        "demo" | "d" => DemoOptions::parse(&filtered_args[1..]).and_then(cmd_demo),
        "config" | "c" => cmd_config(filtered_args.get(1).copied()),
        "version" | "-V" | "--version" => {
            cmd_version();
            Ok(())
        }
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_help() {
    println!("lumen-cli - scene compilation pipeline driver");
    println!();
    println!("USAGE:");
    println!("    lumen-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    d, demo [--instances N] [--animated M] [--frames F]");
    println!("                                  Build an instanced scene, animate and trace it");
    println!("    c, config [path]              Print the effective pipeline config as JSON");
    println!("    version                       Show version and build date");
    println!("    h, help                       Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only show errors");
    println!();
    println!("ENVIRONMENT:");
    println!("    LUMEN_LOG        Log filter, overrides -v/-q (e.g. lumen=trace)");
    println!();
    println!("EXAMPLES:");
    println!("    lumen-cli demo --instances 1000 --animated 200 --frames 10");
    println!("    lumen-cli config pipeline.json");
}

fn cmd_version() {
    println!(
        "lumen-cli {} (built {} {})",
        env!("CARGO_PKG_VERSION"),
        env!("LUMEN_BUILD_DATE"),
        env!("LUMEN_BUILD_TIME")
    );
}

fn cmd_config(path: Option<&str>) -> anyhow::Result<()> {
    let config = match path {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => PipelineConfig::default(),
    };
    println!("{}", config.to_json()?);
    Ok(())
}

struct DemoOptions {
    instances: usize,
    animated: usize,
    frames: usize,
}

impl DemoOptions {
    fn parse(args: &[&str]) -> anyhow::Result<Self> {
        let mut options = Self {
            instances: 256,
            animated: 32,
            frames: 4,
        };
        let mut it = args.iter();
        while let Some(&flag) = it.next() {
            let slot = match flag {
                "--instances" | "-n" => &mut options.instances,
                "--animated" | "-a" => &mut options.animated,
                "--frames" | "-f" => &mut options.frames,
                other => bail!("unknown demo option '{other}'"),
            };
            let value = it.next().with_context(|| format!("missing value for {flag}"))?;
            *slot = value.parse().with_context(|| format!("invalid value '{value}' for {flag}"))?;
        }
        options.animated = options.animated.min(options.instances);
        Ok(options)
    }
}

/// Unit cube centered at the origin, one quad per face.
fn cube() -> MeshShape {
    let mut positions = Vec::new();
    let mut triangles = Vec::new();
    for axis in 0..3 {
        for sign in [-0.5f32, 0.5] {
            let base = positions.len() as u32;
            let mut n = Vec3::ZERO;
            n[axis] = sign;
            let u = Vec3::new(0.0, 0.0, 0.0).with_element((axis + 1) % 3, 0.5);
            let v = Vec3::new(0.0, 0.0, 0.0).with_element((axis + 2) % 3, 0.5);
            positions.extend([n - u - v, n + u - v, n + u + v, n - u + v]);
            if sign > 0.0 {
                triangles.extend([Triangle::new(base, base + 1, base + 2), Triangle::new(base, base + 2, base + 3)]);
            } else {
                triangles.extend([Triangle::new(base, base + 2, base + 1), Triangle::new(base, base + 3, base + 2)]);
            }
        }
    }
    MeshShape::from_triangles(positions, triangles)
}

trait WithElement {
    fn with_element(self, index: usize, value: f32) -> Self;
}

impl WithElement for Vec3 {
    fn with_element(mut self, index: usize, value: f32) -> Self {
        self[index] = value;
        self
    }
}

fn build_scene(options: &DemoOptions) -> Scene {
    let white: Arc<dyn Texture> = Arc::new(ConstantColor::new(Vec3::splat(0.8)));
    let lambert: Arc<dyn Surface> = Arc::new(LambertSurface::new(white));
    let cube = cube().into_shape();

    let side = (options.instances as f32).sqrt().ceil().max(1.0) as usize;
    let mut children = Vec::with_capacity(options.instances);
    for i in 0..options.instances {
        let offset = Vec3::new((i % side) as f32 * 2.0, 0.0, (i / side) as f32 * 2.0);
        let transform: Arc<dyn Transform> = if i < options.animated {
            Arc::new(KeyframeTransform::new(vec![
                (0.0, SrtTransform::from_translation(offset)),
                (1.0, SrtTransform::from_translation(offset + Vec3::Y)),
            ]))
        } else {
            Arc::new(MatrixTransform::new(Mat4::from_translation(offset)))
        };
        let leaf = GroupShape::new(vec![cube.clone()]).with_transform(transform);
        children.push(leaf.into_shape());
    }
    let objects = GroupShape::new(children).with_surface(lambert);

    let extent = side as f32 * 2.0;
    let emission: Arc<dyn Texture> = Arc::new(ConstantIlluminant::new(Vec3::ONE, 4.0));
    let light = MeshShape::quad()
        .with_light(Arc::new(DiffuseLight::new(emission, 1.0)))
        .with_transform(Arc::new(MatrixTransform::new(
            Mat4::from_translation(Vec3::new(extent * 0.5, 8.0, extent * 0.5))
                * Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2)
                * Mat4::from_scale(Vec3::splat(extent)),
        )));

    let camera = PinholeCamera::new(
        Vec3::new(extent * 0.5, extent, -extent * 0.5),
        Vec3::new(extent * 0.5, 0.0, extent * 0.5),
        50.0,
    )
    .with_shutter(0.0, 1.0);

    Scene::new()
        .with_shape(objects.into_shape())
        .with_shape(light.into_shape())
        .with_camera(Arc::new(camera))
}

fn cmd_demo(options: DemoOptions) -> anyhow::Result<()> {
    let device = Device::new();
    let stream = device.create_stream();
    let workers = WorkerPool::new(0)?;
    let scene = build_scene(&options);
    let camera = scene.cameras.first().cloned().context("demo scene has no camera")?;

    let start = Instant::now();
    let pipeline = Pipeline::create(&device, &stream, scene, workers, PipelineConfig::default());
    let mut pipeline = pipeline.context("building pipeline")?;
    let build_time = start.elapsed();

    println!("Scene:");
    println!("  Instances:        {}", pipeline.instance_count());
    println!("  Unique meshes:    {}", pipeline.mesh_cache().builds());
    println!("  Dynamic:          {}", pipeline.dynamic_instance_count());
    println!("  Surface tags:     {}", pipeline.surface_tags().len());
    println!("  Lights:           {}", pipeline.lights().len());
    println!("  Build time:       {:.2?}", build_time);

    const RESOLUTION: u32 = 64;
    let swl = SampledWavelengths::sample_visible(0.5);
    let mut cb = pipeline.command_buffer();
    for frame in 0..options.frames {
        let time = if options.frames > 1 {
            frame as f32 / (options.frames - 1) as f32
        } else {
            0.0
        };
        let start = Instant::now();
        let updated = pipeline.update_geometry(&mut cb, time)?;
        let update_time = start.elapsed();

        let start = Instant::now();
        let mut hits = 0usize;
        let mut lit = 0usize;
        for y in 0..RESOLUTION {
            for x in 0..RESOLUTION {
                let uv = Vec2::new((x as f32 + 0.5) / RESOLUTION as f32, (y as f32 + 0.5) / RESOLUTION as f32);
                let ray = camera.generate_ray(uv, time);
                let it = pipeline.intersect(&ray)?;
                if !it.valid() {
                    continue;
                }
                hits += 1;
                if it.shape.has_light() {
                    lit += 1;
                    continue;
                }
                if let Some(sampler) = pipeline.light_sampler() {
                    let selection = sampler.select(&pipeline, uv.x)?;
                    let closure = pipeline.decode_light(selection.tag, &swl, time)?;
                    let (light, to_world) = pipeline.instance(selection.instance_id)?;
                    let center = to_world.transform_point3(Vec3::ZERO);
                    let shadow = Ray::new(it.p_robust(center - it.p), center - it.p).with_range(0.0, 0.999);
                    if light.has_light() && !pipeline.trace_any(&shadow) {
                        let target = pipeline.intersect(&Ray::new(it.p_robust(center - it.p), center - it.p))?;
                        if target.valid() && closure.evaluate(&pipeline, &target, it.p)?.l.max_element() > 0.0 {
                            lit += 1;
                        }
                    }
                }
            }
        }
        println!(
            "Frame {frame}: t={time:.2} updated={updated} update={:.2?} trace={:.2?} hits={hits} lit={lit}",
            update_time,
            start.elapsed()
        );
    }

    let stats = device.stats();
    println!("Device:");
    println!("  Buffers created:  {}", stats.buffers_created);
    println!("  Bytes uploaded:   {}", stats.bytes_uploaded);
    println!("  Mesh builds:      {}", stats.mesh_builds);
    println!("  Accel builds:     {}", stats.accel_builds);
    println!("  Accel updates:    {}", stats.accel_updates);
    println!("  Commits:          {}", stats.commits);
    Ok(())
}
