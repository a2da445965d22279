//! Decoding instances back into closures, textures and lights.

mod common;

use common::*;
use lumen::prelude::*;

fn swl() -> SampledWavelengths {
    SampledWavelengths::sample_visible(0.5)
}

fn color_handle(p: &Pipeline, it: &Interaction) -> TextureHandle {
    p.buffer::<TextureHandle>(it.shape.surface_buffer_id())
        .unwrap()
        .read(0)
        .unwrap()
}

#[test]
fn test_interaction_at_hit() {
    let f = Fixture::new();
    let p = f
        .create(Scene::new().with_shape(MeshShape::quad().with_surface(lambert()).into_shape()))
        .unwrap();

    let it = p.intersect(&ray_down(0.1, -0.2)).unwrap();
    assert!(it.valid());
    assert_eq!(it.inst, 0);
    assert!((it.p - Vec3::new(0.1, -0.2, 0.0)).length() < 1e-5);
    assert!((it.uv - Vec2::new(0.6, 0.3)).length() < 1e-5);
    assert!((it.ng - Vec3::Z).length() < 1e-6);
    assert!((it.shading.n() - Vec3::Z).length() < 1e-5);
    assert_eq!(it.wo, Vec3::Z);
    assert!((it.area - 0.5).abs() < 1e-6);
    assert_eq!(it.alpha, 1.0);

    let miss = p.intersect(&ray_down(3.0, 3.0)).unwrap();
    assert!(!miss.valid());
    assert_eq!(miss.wo, Vec3::Z);
}

#[test]
fn test_two_sided_normals_face_the_viewer() {
    let f = Fixture::new();
    let scene = Scene::new()
        .with_shape(MeshShape::quad().with_two_sided(true).into_shape())
        .with_shape(MeshShape::quad().with_transform(translate(2.0, 0.0, 0.0)).into_shape());
    let p = f.create(scene).unwrap();

    let from_below = |x: f32| Ray::new(Vec3::new(x, -0.2, -5.0), Vec3::Z);
    let it = p.intersect(&from_below(0.1)).unwrap();
    assert!((it.ng + Vec3::Z).length() < 1e-6);
    assert!((it.shading.n() + Vec3::Z).length() < 1e-5);
    assert!(!it.back_facing());

    let it = p.intersect(&from_below(2.1)).unwrap();
    assert!((it.ng - Vec3::Z).length() < 1e-6);
    assert!(it.back_facing());
}

#[test]
fn test_gray_lambert_albedo() {
    let f = Fixture::new();
    let p = f
        .create(Scene::new().with_shape(MeshShape::quad().with_surface(lambert()).into_shape()))
        .unwrap();
    let it = p.intersect(&ray_down(0.1, -0.2)).unwrap();
    let swl = swl();

    let color = p.evaluate_color_texture(&color_handle(&p, &it), &it, &swl, 0.0).unwrap();
    for i in 0..4 {
        assert!((color.value[i] - 0.5).abs() < 0.03, "albedo {:?}", color.value);
    }
    assert!((color.max - 0.5).abs() < 0.03);

    let closure = p.decode_material(it.shape.surface_tag(), &it, &swl, 0.0).unwrap();
    let eval = closure.evaluate(Vec3::Z);
    assert!((eval.f.x - 0.5 / std::f32::consts::PI).abs() < 0.012);
    assert!((eval.pdf - 1.0 / std::f32::consts::PI).abs() < 1e-4);
    assert_eq!(closure.evaluate(-Vec3::Z).pdf, 0.0);

    let sample = closure.sample(Vec2::new(0.3, 0.7));
    assert!(sample.wi.z > 0.0);
    assert!(sample.eval.pdf > 0.0);
}

#[test]
fn test_material_dispatch_over_two_types() {
    let f = Fixture::new();
    let scene = Scene::new()
        .with_shape(MeshShape::quad().with_surface(lambert()).into_shape())
        .with_shape(
            MeshShape::quad()
                .with_surface(Arc::new(BlackSurface))
                .with_transform(translate(2.0, 0.0, 0.0))
                .into_shape(),
        );
    let p = f.create(scene).unwrap();
    let swl = swl();

    let lit = p.intersect(&ray_down(0.1, -0.2)).unwrap();
    let dark = p.intersect(&ray_down(2.1, -0.2)).unwrap();
    let reflect = |it: &Interaction| {
        p.dispatch_material(it.shape.surface_tag(), it, &swl, 0.0, |c| Ok(c.evaluate(Vec3::Z).f.x))
            .unwrap()
    };
    assert!(reflect(&lit) > 0.0);
    assert_eq!(reflect(&dark), 0.0);

    assert!(matches!(
        p.dispatch_material(5, &lit, &swl, 0.0, |c| Ok(c.evaluate(Vec3::Z).pdf)),
        Err(Error::UnreachableTag { tag: 5, .. })
    ));
    assert!(matches!(
        p.decode_material(5, &lit, &swl, 0.0),
        Err(Error::InvalidTag { tag: 5, count: 2, .. })
    ));
}

#[test]
fn test_color_passthrough_and_empty_families() {
    let f = Fixture::new();
    let image: Arc<dyn Texture> = Arc::new(ImageTexture::from_texels(
        &f.workers,
        1,
        1,
        vec![Vec4::new(0.25, 0.25, 0.25, 1.0)],
        2.0,
    ));
    let scene = Scene::new()
        .with_shape(MeshShape::quad().with_surface(lambert()).into_shape())
        .with_shape(
            MeshShape::quad()
                .with_surface(Arc::new(LambertSurface::new(image)))
                .with_transform(translate(2.0, 0.0, 0.0))
                .into_shape(),
        );
    let p = f.create(scene).unwrap();
    let swl = swl();
    assert_eq!(p.texture_interfaces(TextureCategory::Color).len(), 2);
    assert!(p.texture_interfaces(TextureCategory::Illuminant).is_empty());

    let it = p.intersect(&ray_down(2.1, -0.2)).unwrap();
    let textured = p.evaluate_color_texture(&color_handle(&p, &it), &it, &swl, 0.0).unwrap();
    for i in 0..4 {
        assert!((textured.value[i] - 0.0625).abs() < 0.01, "albedo {:?}", textured.value);
    }

    // unknown tag with two implementations falls through to zero coefficients
    let stray = TextureHandle::encode_constant(7, Vec3::ONE, 1.0).unwrap();
    let color = p.evaluate_color_texture(&stray, &it, &swl, 0.0).unwrap();
    assert_eq!(color.value, Vec4::splat(0.5));
    assert_eq!(color.max, 0.5);
    assert_eq!(
        p.evaluate_texture(TextureCategory::Color, &stray, &it, &swl, 0.0).unwrap(),
        color.value
    );

    assert_eq!(p.evaluate_illuminant_texture(&stray, &it, &swl, 0.0).unwrap(), Vec4::ZERO);
    assert_eq!(p.evaluate_generic_texture(&stray, &it, 0.0).unwrap(), Vec4::ZERO);
}

#[test]
fn test_generic_texture_encoded_once() {
    let f = Fixture::new();
    let mut p = f.create(Scene::new().with_shape(MeshShape::quad().into_shape())).unwrap();
    let texture: Arc<dyn Texture> = Arc::new(ConstantGeneric::new(vec![1.0, 2.0, 3.0, 4.0]));

    let mut cb = p.command_buffer();
    let handle = p.encode_texture(&mut cb, &texture).unwrap();
    assert_eq!(p.encode_texture(&mut cb, &texture).unwrap(), handle);
    assert_eq!(p.texture_tags(TextureCategory::Generic).lookups(), 1);
    assert_eq!(p.texture_interfaces(TextureCategory::Generic).len(), 1);

    let it = p.intersect(&ray_down(0.1, -0.2)).unwrap();
    let value = p
        .evaluate_texture(TextureCategory::Generic, &handle, &it, &swl(), 0.0)
        .unwrap();
    assert_eq!(value, Vec4::new(1.0, 2.0, 3.0, 4.0));
    assert!(TextureCategory::try_from(3).is_err());
}

#[test]
fn test_area_light_evaluation() {
    let f = Fixture::new();
    let p = f
        .create(Scene::new().with_shape(MeshShape::quad().with_light(emitter(1.0)).into_shape()))
        .unwrap();
    let swl = swl();
    assert_eq!(p.lights().len(), 1);
    assert!(p.has_lighting());

    let sampler = p.light_sampler().unwrap();
    let selection = sampler.select(&p, 0.7).unwrap();
    assert_eq!(selection.instance_id, 0);
    assert_eq!(selection.tag, 0);
    assert_eq!(sampler.pmf(&p, 0), 1.0);

    let it = p.intersect(&ray_down(0.1, -0.2)).unwrap();
    assert!(it.shape.has_light());
    let closure = p.decode_light(it.shape.light_tag(), &swl, 0.0).unwrap();

    let front = closure.evaluate(&p, &it, it.p + Vec3::Z * 2.0).unwrap();
    assert!((front.pdf - 4.0).abs() < 1e-3, "pdf {}", front.pdf);
    for i in 0..4 {
        assert!(front.l[i] > 0.0);
    }

    let back = closure.evaluate(&p, &it, it.p - Vec3::Z * 2.0).unwrap();
    assert_eq!(back.l, Vec4::ZERO);
    assert_eq!(back.pdf, 0.0);

    let via_dispatch = p
        .dispatch_light(it.shape.light_tag(), &swl, 0.0, |c| c.evaluate(&p, &it, it.p + Vec3::Z * 2.0))
        .unwrap();
    assert_eq!(via_dispatch, front);
}

#[test]
fn test_uniform_sampler_over_many_lights() {
    let f = Fixture::new();
    let light = emitter(2.0);
    let shapes: Vec<Arc<Shape>> = (0..4)
        .map(|i| {
            MeshShape::quad()
                .with_light(light.clone())
                .with_transform(translate(i as f32 * 2.0, 0.0, 0.0))
                .into_shape()
        })
        .collect();
    let p = f.create(Scene::new().with_shape(GroupShape::new(shapes).into_shape())).unwrap();

    assert_eq!(p.lights().len(), 4);
    // one light object: encoded once, shared by every instance
    assert_eq!(p.light_tags().lookups(), 1);
    let buffers: Vec<u32> = p.instances().iter().map(|h| h.light_buffer_id()).collect();
    assert!(buffers.windows(2).all(|w| w[0] == w[1]));

    let sampler = p.light_sampler().unwrap();
    let picked: Vec<u32> = [0.0, 0.3, 0.6, 0.99, 1.0]
        .iter()
        .map(|&u| sampler.select(&p, u).unwrap().instance_id)
        .collect();
    assert_eq!(picked, vec![0, 1, 2, 3, 3]);
    assert_eq!(sampler.pmf(&p, 2), 0.25);
}

#[test]
fn test_environment_only_lighting() {
    let f = Fixture::new();
    let sky: Arc<dyn Texture> = Arc::new(ConstantIlluminant::new(Vec3::ONE, 2.0));
    let scene = Scene::new()
        .with_shape(MeshShape::quad().with_surface(lambert()).into_shape())
        .with_environment(Arc::new(ConstantEnvironment::new(sky)));
    let p = f.create(scene).unwrap();

    assert!(p.has_lighting());
    assert!(p.light_sampler().is_none());
    let env = p.environment().unwrap();
    let radiance = env.evaluate(&p, Vec3::Y, &swl(), 0.0).unwrap();
    for i in 0..4 {
        assert!(radiance[i] > 0.0);
    }
    assert_eq!(p.texture_interfaces(TextureCategory::Illuminant).len(), 1);
}

/// Illuminant that claims the first tag of a pipeline and emits nothing.
#[derive(Debug)]
struct Glow;

impl Texture for Glow {
    fn impl_type(&self) -> &str {
        "glow"
    }

    fn category(&self) -> TextureCategory {
        TextureCategory::Illuminant
    }

    fn is_black(&self) -> bool {
        false
    }

    fn encode(&self, _pipeline: &mut Pipeline, _cb: &mut CommandBuffer, tag: u32) -> Result<TextureHandle> {
        TextureHandle::encode_constant(tag, Vec3::ZERO, 0.0)
    }

    fn evaluate(&self, _pipeline: &Pipeline, _it: &Interaction, _handle: &TextureHandle, _time: f32) -> Result<Vec4> {
        Ok(Vec4::ZERO)
    }
}

#[test]
fn test_shared_environment_builds_per_pipeline() {
    let f = Fixture::new();
    let sky: Arc<dyn Texture> = Arc::new(ConstantIlluminant::new(Vec3::ONE, 2.0));
    let environment: Arc<dyn Environment> = Arc::new(ConstantEnvironment::new(sky));

    let first = f
        .create(Scene::new().with_shape(MeshShape::quad().into_shape()).with_environment(environment.clone()))
        .unwrap();
    let glow: Arc<dyn Light> = Arc::new(DiffuseLight::new(Arc::new(Glow), 1.0));
    let second = f
        .create(
            Scene::new()
                .with_shape(MeshShape::quad().with_light(glow).into_shape())
                .with_environment(environment),
        )
        .unwrap();
    // the sky sits behind a different tag in each pipeline
    assert_eq!(first.texture_interfaces(TextureCategory::Illuminant).len(), 1);
    assert_eq!(second.texture_interfaces(TextureCategory::Illuminant).len(), 2);

    let a = first.environment().unwrap().evaluate(&first, Vec3::Y, &swl(), 0.0).unwrap();
    let b = second.environment().unwrap().evaluate(&second, Vec3::Y, &swl(), 0.0).unwrap();
    assert_eq!(a, b);
    for i in 0..4 {
        assert!(b[i] > 0.0);
    }
}

#[test]
fn test_black_environment_is_skipped() {
    let f = Fixture::new();
    let black: Arc<dyn Texture> = Arc::new(ConstantIlluminant::new(Vec3::ZERO, 1.0));
    let scene = Scene::new()
        .with_shape(MeshShape::quad().into_shape())
        .with_environment(Arc::new(ConstantEnvironment::new(black)));
    let p = f.create(scene).unwrap();
    assert!(p.environment().is_none());
    assert!(!p.has_lighting());
    assert!(p.texture_interfaces(TextureCategory::Illuminant).is_empty());
}
