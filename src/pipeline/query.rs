//! Kernel-side queries over the committed scene.

use super::Pipeline;
use crate::accel::{Hit, Ray};
use crate::geometry::{Triangle, VertexAttribute};
use crate::handle::InstanceHandle;
use crate::interaction::{Frame, Interaction};
use crate::util::{normal_matrix, safe_normalize, Error, Mat3, Mat4, Result, Vec2, Vec3};

/// World-space position, geometric normal and area at a surface point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePointGeometry {
    pub p: Vec3,
    pub ng: Vec3,
    pub area: f32,
}

/// Interpolated shading attributes at a surface point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePointAttributes {
    pub ns: Vec3,
    pub tangent: Vec3,
    pub uv: Vec2,
}

#[inline]
fn interpolate<T>(uvw: Vec3, a: T, b: T, c: T) -> T
where
    T: std::ops::Mul<f32, Output = T> + std::ops::Add<Output = T>,
{
    a * uvw.x + b * uvw.y + c * uvw.z
}

impl Pipeline {
    /// Instance record and committed object-to-world matrix.
    pub fn instance(&self, index: u32) -> Result<(InstanceHandle, Mat4)> {
        let handle = self.instances.get(index as usize).copied().ok_or(Error::InvalidInstance {
            index: index as usize,
            count: self.instances.len(),
        })?;
        Ok((handle, self.accel.instance_to_world(index as usize)?))
    }

    /// Rebased vertex indices of triangle `index`.
    pub fn triangle(&self, handle: &InstanceHandle, index: u32) -> Result<Triangle> {
        self.buffer::<Triangle>(handle.triangle_buffer_id())?.read(index as usize)
    }

    /// Position, normal and area of the point at barycentrics `uvw` of
    /// `triangle`, transformed by `m`.
    pub fn surface_point_geometry(
        &self,
        handle: &InstanceHandle,
        m: &Mat4,
        triangle: &Triangle,
        uvw: Vec3,
    ) -> Result<SurfacePointGeometry> {
        let positions = self.buffer::<Vec3>(handle.position_buffer_id())?;
        let [p0, p1, p2] = triangle.indices().map(|i| positions.read(i as usize));
        let [p0, p1, p2] = [p0?, p1?, p2?].map(|p| m.transform_point3(p));
        let c = (p1 - p0).cross(p2 - p0);
        Ok(SurfacePointGeometry {
            p: interpolate(uvw, p0, p1, p2),
            ng: safe_normalize(c),
            area: 0.5 * c.length(),
        })
    }

    /// Shading normal, tangent and uv at barycentrics `uvw` of `triangle`.
    pub fn surface_point_attributes(
        &self,
        handle: &InstanceHandle,
        normal_matrix: &Mat3,
        triangle: &Triangle,
        uvw: Vec3,
    ) -> Result<SurfacePointAttributes> {
        let attributes = self.buffer::<VertexAttribute>(handle.attribute_buffer_id())?;
        let [a0, a1, a2] = triangle.indices().map(|i| attributes.read(i as usize));
        let [a0, a1, a2] = [a0?, a1?, a2?];
        let ns = interpolate(uvw, a0.normal(), a1.normal(), a2.normal());
        let tangent = interpolate(uvw, a0.tangent(), a1.tangent(), a2.tangent());
        Ok(SurfacePointAttributes {
            ns: safe_normalize(*normal_matrix * ns),
            tangent: safe_normalize(*normal_matrix * tangent),
            uv: interpolate(uvw, a0.uv(), a1.uv(), a2.uv()),
        })
    }

    pub fn trace_closest(&self, ray: &Ray) -> Hit {
        self.accel.trace_closest(ray)
    }

    pub fn trace_any(&self, ray: &Ray) -> bool {
        self.accel.trace_any(ray)
    }

    /// Full interaction record for `hit` along `ray`.
    pub fn interaction(&self, ray: &Ray, hit: &Hit) -> Result<Interaction> {
        let wo = -safe_normalize(ray.direction);
        if hit.is_miss() {
            return Ok(Interaction::miss(wo));
        }
        let (handle, m) = self.instance(hit.inst)?;
        let triangle = self.triangle(&handle, hit.prim)?;
        let uvw = Vec3::new(1.0 - hit.bary.x - hit.bary.y, hit.bary.x, hit.bary.y);
        let geometry = self.surface_point_geometry(&handle, &m, &triangle, uvw)?;
        let attributes = self.surface_point_attributes(&handle, &normal_matrix(&m), &triangle, uvw)?;

        let mut ng = geometry.ng;
        let mut ns = if attributes.ns == Vec3::ZERO { ng } else { attributes.ns };
        if handle.two_sided() && ng.dot(wo) < 0.0 {
            ng = -ng;
            ns = -ns;
        }
        let alpha = if handle.has_constant_alpha() {
            handle.constant_alpha()
        } else {
            self.tex2d(handle.alpha_texture_id())?.sample(attributes.uv).x
        };
        Ok(Interaction {
            shape: handle,
            inst: hit.inst,
            prim: hit.prim,
            area: geometry.area,
            p: geometry.p,
            wo,
            ng,
            uv: attributes.uv,
            shading: Frame::make(ns, attributes.tangent),
            alpha,
        })
    }

    /// Trace `ray` and build the interaction for whatever it hits.
    pub fn intersect(&self, ray: &Ray) -> Result<Interaction> {
        self.interaction(ray, &self.trace_closest(ray))
    }
}
