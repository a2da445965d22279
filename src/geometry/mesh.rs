//! Vertex and index layouts shared by the cache, the accel and kernels.

use bytemuck::{Pod, Zeroable};

use crate::accel::Mesh;
use crate::util::{Vec2, Vec3};

/// Three vertex indices.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Triangle {
    pub i0: u32,
    pub i1: u32,
    pub i2: u32,
}

impl Triangle {
    pub const fn new(i0: u32, i1: u32, i2: u32) -> Self {
        Self { i0, i1, i2 }
    }

    /// Same triangle with every index shifted by `offset`.
    pub fn rebased(self, offset: u32) -> Self {
        Self::new(self.i0 + offset, self.i1 + offset, self.i2 + offset)
    }

    pub fn indices(&self) -> [u32; 3] {
        [self.i0, self.i1, self.i2]
    }
}

/// Per-vertex shading attributes (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct VertexAttribute {
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub uv: [f32; 2],
}

const _: () = assert!(std::mem::size_of::<VertexAttribute>() == 32);

impl VertexAttribute {
    pub fn new(normal: Vec3, tangent: Vec3, uv: Vec2) -> Self {
        Self {
            normal: normal.to_array(),
            tangent: tangent.to_array(),
            uv: uv.to_array(),
        }
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }

    pub fn tangent(&self) -> Vec3 {
        Vec3::from_array(self.tangent)
    }

    pub fn uv(&self) -> Vec2 {
        Vec2::from_array(self.uv)
    }
}

/// Cache key. Counts narrow the chance that a hash collision merges two
/// different meshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshKey {
    pub hash: u64,
    pub vertex_count: usize,
    pub triangle_count: usize,
}

/// Device-side geometry shared by every instance with the same content.
#[derive(Debug, Clone)]
pub struct MeshGeometry {
    pub mesh: Mesh,
    /// Bindless id of the position buffer; the other mesh buffers follow.
    pub buffer_id_base: u32,
}

/// Where an instance takes its alpha from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlphaSource {
    /// Bindless 2D texture id.
    Texture(u32),
    /// Constant value.
    Constant(f32),
}

/// Geometry plus per-shape flags, memoized per shape node.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub geometry: MeshGeometry,
    /// The shape's own flag; a group above it may still override.
    pub two_sided: bool,
    pub alpha: AlphaSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebase() {
        let t = Triangle::new(0, 1, 2).rebased(10);
        assert_eq!(t.indices(), [10, 11, 12]);
    }

    #[test]
    fn test_attribute_accessors() {
        let a = VertexAttribute::new(Vec3::Z, Vec3::X, Vec2::new(0.25, 0.75));
        assert_eq!(a.normal(), Vec3::Z);
        assert_eq!(a.tangent(), Vec3::X);
        assert_eq!(a.uv(), Vec2::new(0.25, 0.75));
    }
}
