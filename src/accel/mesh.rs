//! Bottom-level primitive: one triangle mesh and its BVH.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use super::build::build_bvh;
use super::bvh::{Aabb, Bvh};
use super::AccelBuildHint;
use crate::device::{BufferView, Command, CommandKind, Device};
use crate::geometry::Triangle;
use crate::util::{Error, Result, Vec2, Vec3};

const EPSILON: f32 = 1e-9;

/// Möller-Trumbore. Returns `(b1, b2, t)` with the hit point at
/// `(1 - b1 - b2) * p0 + b1 * p1 + b2 * p2`.
#[inline]
pub fn intersect_triangle(
    origin: Vec3,
    direction: Vec3,
    [p0, p1, p2]: [Vec3; 3],
    t_min: f32,
    t_max: f32,
) -> Option<(f32, f32, f32)> {
    let edge1 = p1 - p0;
    let edge2 = p2 - p0;

    let h = direction.cross(edge2);
    let a = edge1.dot(h);
    if a > -EPSILON && a < EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - p0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    if t <= t_min || t >= t_max {
        return None;
    }
    Some((u, v, t))
}

/// Host copy of the geometry taken when the build executed.
struct BuiltMesh {
    /// Index of `positions[0]` in the vertex buffer.
    base: u32,
    positions: Vec<Vec3>,
    triangles: Vec<Triangle>,
    bvh: Bvh,
}

impl BuiltMesh {
    fn corners(&self, t: &Triangle) -> [Vec3; 3] {
        t.indices().map(|i| self.positions[(i - self.base) as usize])
    }
}

struct MeshInner {
    id: u64,
    vertices: BufferView<Vec3>,
    triangles: BufferView<Triangle>,
    hint: AccelBuildHint,
    built: RwLock<Option<BuiltMesh>>,
}

/// Triangle mesh primitive. Clones share the same primitive.
#[derive(Clone)]
pub struct Mesh {
    inner: Arc<MeshInner>,
}

/// Closest or first hit inside one mesh: `(triangle, barycentrics, t)`.
pub(crate) type MeshHit = (u32, Vec2, f32);

impl Mesh {
    /// Primitive over `vertices` indexed by `triangles`. Nothing is built
    /// until the command from [`Mesh::build`] executes.
    pub fn new(
        device: &Device,
        vertices: BufferView<Vec3>,
        triangles: BufferView<Triangle>,
        hint: AccelBuildHint,
    ) -> Self {
        Self {
            inner: Arc::new(MeshInner {
                id: device.next_id(),
                vertices,
                triangles,
                hint,
                built: RwLock::new(None),
            }),
        }
    }

    /// Device-unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn triangle_count(&self) -> usize {
        self.inner.triangles.len()
    }

    /// Whether a build command has executed.
    pub fn is_built(&self) -> bool {
        self.inner.built.read().is_some()
    }

    /// Build command. Reads vertex and index data at execution time.
    pub fn build(&self) -> Command {
        let inner = self.inner.clone();
        Command::new(
            CommandKind::MeshBuild {
                mesh: inner.id,
                triangles: inner.triangles.len(),
            },
            move || {
                let triangles = inner.triangles.to_vec();
                let (lo, hi) = triangles
                    .iter()
                    .flat_map(Triangle::indices)
                    .fold((u32::MAX, 0), |(lo, hi), i| (lo.min(i), hi.max(i)));
                if triangles.is_empty() {
                    return Err(Error::EmptyMesh {
                        positions: inner.vertices.len(),
                        triangles: 0,
                    });
                }
                let positions = (lo..=hi)
                    .map(|i| inner.vertices.read(i as usize))
                    .collect::<Result<Vec<_>>>()?;
                let mut built = BuiltMesh {
                    base: lo,
                    positions,
                    triangles,
                    bvh: Bvh::default(),
                };
                let aabbs: Vec<Aabb> = built
                    .triangles
                    .iter()
                    .map(|t| {
                        let mut b = Aabb::EMPTY;
                        for p in built.corners(t) {
                            b.grow_point(p);
                        }
                        b
                    })
                    .collect();
                built.bvh = build_bvh(&aabbs, inner.hint);
                *inner.built.write() = Some(built);
                Ok(())
            },
        )
    }

    /// Object-space bounds, empty before the build.
    pub fn bounds(&self) -> Aabb {
        self.inner
            .built
            .read()
            .as_ref()
            .map_or(Aabb::EMPTY, |b| b.bvh.bounds())
    }

    /// Trace an object-space ray against the mesh.
    pub(crate) fn intersect(
        &self,
        origin: Vec3,
        direction: Vec3,
        t_min: f32,
        t_max: f32,
        any_hit: bool,
    ) -> Option<MeshHit> {
        let guard = self.inner.built.read();
        let built = guard.as_ref()?;
        let mut best = None;
        built.bvh.traverse(origin, direction, t_min, t_max, any_hit, |prim, t_max| {
            let tri = &built.triangles[prim as usize];
            let (b1, b2, t) = intersect_triangle(origin, direction, built.corners(tri), t_min, t_max)?;
            best = Some((prim, Vec2::new(b1, b2), t));
            Some(t)
        });
        best
    }
}

impl fmt::Debug for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mesh")
            .field("id", &self.inner.id)
            .field("triangles", &self.inner.triangles.len())
            .field("built", &self.is_built())
            .finish()
    }
}
