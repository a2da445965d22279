//! Ray-tracing acceleration structure.
//!
//! Two levels: each [`Mesh`] owns a triangle BVH, and an [`Accel`] holds an
//! instance list with one transform per instance plus a BVH over the world
//! bounds of the visible instances. Both levels are built by commands, so
//! traces only see what the last executed build or update produced.

mod build;
mod bvh;
mod mesh;

pub use build::build_bvh;
pub use bvh::{Aabb, Bvh, BvhNode};
pub use mesh::{intersect_triangle, Mesh};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::device::{Command, CommandKind, Device};
use crate::util::{Error, Mat4, Result, Vec2, Vec3};

/// Trade-off between build speed and trace speed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelBuildHint {
    #[default]
    FastTrace,
    FastBuild,
}

/// Ray segment `origin + t * direction`, `t` in `[t_min, t_max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub t_min: f32,
    pub direction: Vec3,
    pub t_max: f32,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            t_min: 0.0,
            direction,
            t_max: f32::MAX,
        }
    }

    pub fn with_range(mut self, t_min: f32, t_max: f32) -> Self {
        self.t_min = t_min;
        self.t_max = t_max;
        self
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Closest-hit record. A miss has `inst == u32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub inst: u32,
    pub prim: u32,
    pub bary: Vec2,
    pub t: f32,
}

impl Hit {
    pub const fn miss() -> Self {
        Self {
            inst: u32::MAX,
            prim: u32::MAX,
            bary: Vec2::ZERO,
            t: f32::MAX,
        }
    }

    pub fn is_miss(&self) -> bool {
        self.inst == u32::MAX
    }
}

struct Instance {
    mesh: Mesh,
    transform: Mutex<Mat4>,
    visible: bool,
}

/// Committed instance level.
struct Tlas {
    to_world: Vec<Mat4>,
    /// Visible instances as `(instance, mesh, world-to-object)`.
    visible: Vec<(u32, Mesh, Mat4)>,
    bvh: Bvh,
}

/// Instance list plus the committed top-level hierarchy.
pub struct Accel {
    id: u64,
    hint: AccelBuildHint,
    instances: Vec<Arc<Instance>>,
    dirty: AtomicBool,
    committed: Arc<RwLock<Option<Tlas>>>,
}

impl Accel {
    pub fn new(device: &Device, hint: AccelBuildHint) -> Self {
        Self {
            id: device.next_id(),
            hint,
            instances: Vec::new(),
            dirty: AtomicBool::new(false),
            committed: Arc::new(RwLock::new(None)),
        }
    }

    /// Append an instance of `mesh`; invisible instances are never hit.
    pub fn emplace_back(&mut self, mesh: &Mesh, transform: Mat4, visible: bool) {
        self.instances.push(Arc::new(Instance {
            mesh: mesh.clone(),
            transform: Mutex::new(transform),
            visible,
        }));
        self.dirty.store(true, Ordering::Release);
    }

    /// Replace the host-side transform of instance `index`. Safe to call
    /// from several threads; takes effect with the next build or update.
    pub fn set_transform(&self, index: usize, transform: Mat4) -> Result<()> {
        let instance = self.instances.get(index).ok_or(Error::InvalidInstance {
            index,
            count: self.instances.len(),
        })?;
        *instance.transform.lock() = transform;
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Whether host-side changes are waiting for a build or update.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Full build. Fails at execution if a referenced mesh is not built.
    pub fn build(&self) -> Command {
        self.commit_command(CommandKind::AccelBuild {
            accel: self.id,
            instances: self.instances.len(),
        })
    }

    /// Refresh instance transforms.
    pub fn update(&self) -> Command {
        self.commit_command(CommandKind::AccelUpdate { accel: self.id })
    }

    fn commit_command(&self, kind: CommandKind) -> Command {
        self.dirty.store(false, Ordering::Release);
        let instances = self.instances.clone();
        let committed = self.committed.clone();
        let hint = self.hint;
        Command::new(kind, move || {
            let mut to_world = Vec::with_capacity(instances.len());
            let mut visible = Vec::new();
            let mut aabbs = Vec::new();
            for (index, instance) in instances.iter().enumerate() {
                if !instance.mesh.is_built() {
                    return Err(Error::MeshNotBuilt(instance.mesh.id()));
                }
                let m = *instance.transform.lock();
                to_world.push(m);
                if instance.visible && m.determinant() != 0.0 {
                    aabbs.push(instance.mesh.bounds().transformed(&m));
                    visible.push((index as u32, instance.mesh.clone(), m.inverse()));
                }
            }
            let bvh = build_bvh(&aabbs, hint);
            *committed.write() = Some(Tlas { to_world, visible, bvh });
            Ok(())
        })
    }

    /// Committed object-to-world matrix of instance `index`.
    pub fn instance_to_world(&self, index: usize) -> Result<Mat4> {
        let committed = self.committed.read();
        let count = committed.as_ref().map_or(0, |t| t.to_world.len());
        committed
            .as_ref()
            .and_then(|t| t.to_world.get(index).copied())
            .ok_or(Error::InvalidInstance { index, count })
    }

    fn trace(&self, ray: &Ray, any_hit: bool) -> Hit {
        let committed = self.committed.read();
        let Some(tlas) = committed.as_ref() else {
            return Hit::miss();
        };
        let mut best = Hit::miss();
        tlas.bvh.traverse(ray.origin, ray.direction, ray.t_min, ray.t_max, any_hit, |slot, t_max| {
            let (inst, mesh, to_object) = &tlas.visible[slot as usize];
            let origin = to_object.transform_point3(ray.origin);
            let direction = to_object.transform_vector3(ray.direction);
            let (prim, bary, t) = mesh.intersect(origin, direction, ray.t_min, t_max, any_hit)?;
            best = Hit {
                inst: *inst,
                prim,
                bary,
                t,
            };
            Some(t)
        });
        best
    }

    /// Nearest hit along the ray.
    pub fn trace_closest(&self, ray: &Ray) -> Hit {
        self.trace(ray, false)
    }

    /// Whether anything is hit along the ray.
    pub fn trace_any(&self, ray: &Ray) -> bool {
        !self.trace(ray, true).is_miss()
    }
}

impl fmt::Debug for Accel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accel")
            .field("id", &self.id)
            .field("instances", &self.instances.len())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Triangle;

    fn triangle_mesh(device: &Device) -> Mesh {
        let vertices = device.create_buffer::<Vec3>(3);
        vertices.copy_from(&[Vec3::ZERO, Vec3::X, Vec3::Y]).run().unwrap();
        let triangles = device.create_buffer::<Triangle>(1);
        triangles.copy_from(&[Triangle::new(0, 1, 2)]).run().unwrap();
        Mesh::new(device, vertices.view(), triangles.view(), AccelBuildHint::FastTrace)
    }

    #[test]
    fn test_build_requires_built_meshes() {
        let device = Device::new();
        let mesh = triangle_mesh(&device);
        let mut accel = Accel::new(&device, AccelBuildHint::FastTrace);
        accel.emplace_back(&mesh, Mat4::IDENTITY, true);
        let err = accel.build().run().unwrap_err();
        assert!(matches!(err, Error::MeshNotBuilt(id) if id == mesh.id()));
    }

    #[test]
    fn test_trace_instances() {
        let device = Device::new();
        let mesh = triangle_mesh(&device);
        mesh.build().run().unwrap();
        let mut accel = Accel::new(&device, AccelBuildHint::FastTrace);
        accel.emplace_back(&mesh, Mat4::IDENTITY, true);
        accel.emplace_back(&mesh, Mat4::from_translation(Vec3::new(5.0, 0.0, -1.0)), true);
        accel.emplace_back(&mesh, Mat4::from_translation(Vec3::new(5.0, 0.0, -2.0)), false);
        accel.build().run().unwrap();

        let ray = Ray::new(Vec3::new(0.2, 0.2, 1.0), -Vec3::Z);
        let hit = accel.trace_closest(&ray);
        assert_eq!(hit.inst, 0);
        assert!((hit.t - 1.0).abs() < 1e-6);
        assert!((hit.bary - Vec2::new(0.2, 0.2)).length() < 1e-6);

        // the invisible instance behind instance 1 is skipped
        let ray = Ray::new(Vec3::new(5.2, 0.2, 1.0), -Vec3::Z);
        assert_eq!(accel.trace_closest(&ray).inst, 1);
        assert!(accel.trace_any(&ray));
        assert!(!accel.trace_any(&Ray::new(Vec3::new(9.0, 9.0, 1.0), -Vec3::Z)));
    }

    #[test]
    fn test_update_moves_instances() {
        let device = Device::new();
        let mesh = triangle_mesh(&device);
        mesh.build().run().unwrap();
        let mut accel = Accel::new(&device, AccelBuildHint::FastBuild);
        accel.emplace_back(&mesh, Mat4::IDENTITY, true);
        accel.build().run().unwrap();

        let moved = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        accel.set_transform(0, moved).unwrap();
        assert!(accel.is_dirty());
        assert_eq!(accel.instance_to_world(0).unwrap(), Mat4::IDENTITY);
        let update = accel.update();
        assert!(!accel.is_dirty());
        update.run().unwrap();
        assert_eq!(accel.instance_to_world(0).unwrap(), moved);
        assert!(accel.trace_any(&Ray::new(Vec3::new(10.2, 0.2, 1.0), -Vec3::Z)));
        assert!(accel.set_transform(3, moved).is_err());
    }

    #[test]
    fn test_hint_serde() {
        assert_eq!(serde_json::to_string(&AccelBuildHint::FastBuild).unwrap(), "\"fast_build\"");
    }
}
