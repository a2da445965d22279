//! Shape graph nodes.

use std::sync::Arc;

use super::{Light, Surface};
use crate::accel::AccelBuildHint;
use crate::geometry::{Triangle, VertexAttribute};
use crate::transform::Transform;
use crate::util::{perpendicular, safe_normalize, Vec2, Vec3};

/// Single-channel 8-bit alpha mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl AlphaImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self { width, height, pixels }
    }
}

/// Triangle mesh leaf.
#[derive(Debug, Clone)]
pub struct MeshShape {
    pub positions: Vec<Vec3>,
    pub attributes: Vec<VertexAttribute>,
    pub triangles: Vec<Triangle>,
    /// Takes precedence over `alpha`.
    pub alpha_image: Option<AlphaImage>,
    pub alpha: f32,
    pub two_sided: Option<bool>,
    /// Virtual shapes are registered but never hit by rays.
    pub is_virtual: bool,
    pub deformable: bool,
    pub surface: Option<Arc<dyn Surface>>,
    pub light: Option<Arc<dyn Light>>,
    pub transform: Option<Arc<dyn Transform>>,
    pub build_hint: AccelBuildHint,
}

impl MeshShape {
    pub fn new(positions: Vec<Vec3>, attributes: Vec<VertexAttribute>, triangles: Vec<Triangle>) -> Self {
        Self {
            positions,
            attributes,
            triangles,
            alpha_image: None,
            alpha: 1.0,
            two_sided: None,
            is_virtual: false,
            deformable: false,
            surface: None,
            light: None,
            transform: None,
            build_hint: AccelBuildHint::default(),
        }
    }

    /// Mesh with area-weighted vertex normals, an arbitrary tangent and
    /// zero uvs.
    pub fn from_triangles(positions: Vec<Vec3>, triangles: Vec<Triangle>) -> Self {
        let mut normals = vec![Vec3::ZERO; positions.len()];
        for t in &triangles {
            let [i0, i1, i2] = t.indices().map(|i| i as usize);
            let (Some(&p0), Some(&p1), Some(&p2)) = (positions.get(i0), positions.get(i1), positions.get(i2)) else {
                continue;
            };
            let n = (p1 - p0).cross(p2 - p0);
            for i in [i0, i1, i2] {
                normals[i] += n;
            }
        }
        let attributes = normals
            .into_iter()
            .map(|n| {
                let n = safe_normalize(n);
                VertexAttribute::new(n, perpendicular(n), Vec2::ZERO)
            })
            .collect();
        Self::new(positions, attributes, triangles)
    }

    /// Unit quad in the xy plane facing +z, with uvs spanning `[0, 1]^2`.
    pub fn quad() -> Self {
        let positions = vec![
            Vec3::new(-0.5, -0.5, 0.0),
            Vec3::new(0.5, -0.5, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
            Vec3::new(-0.5, 0.5, 0.0),
        ];
        let attributes = positions
            .iter()
            .map(|p| VertexAttribute::new(Vec3::Z, Vec3::X, Vec2::new(p.x + 0.5, p.y + 0.5)))
            .collect();
        Self::new(positions, attributes, vec![Triangle::new(0, 1, 2), Triangle::new(0, 2, 3)])
    }

    pub fn with_surface(mut self, surface: Arc<dyn Surface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_light(mut self, light: Arc<dyn Light>) -> Self {
        self.light = Some(light);
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = Some(two_sided);
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_alpha_image(mut self, image: AlphaImage) -> Self {
        self.alpha_image = Some(image);
        self
    }

    pub fn with_virtual(mut self, is_virtual: bool) -> Self {
        self.is_virtual = is_virtual;
        self
    }

    pub fn with_deformable(mut self, deformable: bool) -> Self {
        self.deformable = deformable;
        self
    }

    pub fn with_build_hint(mut self, hint: AccelBuildHint) -> Self {
        self.build_hint = hint;
        self
    }

    pub fn into_shape(self) -> Arc<Shape> {
        Arc::new(Shape::Mesh(self))
    }
}

/// Inner node. Its settings apply to descendants that leave them unset.
#[derive(Debug, Clone, Default)]
pub struct GroupShape {
    pub children: Vec<Arc<Shape>>,
    pub transform: Option<Arc<dyn Transform>>,
    pub two_sided: Option<bool>,
    pub surface: Option<Arc<dyn Surface>>,
    pub light: Option<Arc<dyn Light>>,
}

impl GroupShape {
    pub fn new(children: Vec<Arc<Shape>>) -> Self {
        Self {
            children,
            ..Self::default()
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = Some(two_sided);
        self
    }

    pub fn with_surface(mut self, surface: Arc<dyn Surface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_light(mut self, light: Arc<dyn Light>) -> Self {
        self.light = Some(light);
        self
    }

    pub fn into_shape(self) -> Arc<Shape> {
        Arc::new(Shape::Group(self))
    }
}

/// Node of the shape graph. Nodes are shared through `Arc`; the pipeline
/// memoizes per node identity, not per content.
#[derive(Debug, Clone)]
pub enum Shape {
    Mesh(MeshShape),
    Group(GroupShape),
}

impl Shape {
    pub fn transform(&self) -> Option<&Arc<dyn Transform>> {
        match self {
            Shape::Mesh(m) => m.transform.as_ref(),
            Shape::Group(g) => g.transform.as_ref(),
        }
    }

    pub fn surface(&self) -> Option<&Arc<dyn Surface>> {
        match self {
            Shape::Mesh(m) => m.surface.as_ref(),
            Shape::Group(g) => g.surface.as_ref(),
        }
    }

    pub fn light(&self) -> Option<&Arc<dyn Light>> {
        match self {
            Shape::Mesh(m) => m.light.as_ref(),
            Shape::Group(g) => g.light.as_ref(),
        }
    }

    pub fn two_sided(&self) -> Option<bool> {
        match self {
            Shape::Mesh(m) => m.two_sided,
            Shape::Group(g) => g.two_sided,
        }
    }

    pub fn is_mesh(&self) -> bool {
        matches!(self, Shape::Mesh(_))
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Shape::Mesh(m) if m.is_virtual)
    }

    /// Number of mesh leaves reachable from this node, counting shared
    /// nodes once per path.
    pub fn leaf_count(&self) -> usize {
        match self {
            Shape::Mesh(_) => 1,
            Shape::Group(g) => g.children.iter().map(|c| c.leaf_count()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_attributes() {
        let mesh = MeshShape::from_triangles(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![Triangle::new(0, 1, 2)]);
        assert_eq!(mesh.attributes.len(), 3);
        for a in &mesh.attributes {
            assert_eq!(a.normal(), Vec3::Z);
            assert!(a.tangent().dot(Vec3::Z).abs() < 1e-6);
        }
    }

    #[test]
    fn test_leaf_count_counts_paths() {
        let leaf = MeshShape::quad().into_shape();
        let inner = GroupShape::new(vec![leaf.clone(), leaf.clone()]).into_shape();
        let root = GroupShape::new(vec![inner.clone(), inner, leaf]).into_shape();
        assert_eq!(root.leaf_count(), 5);
        assert!(!root.is_mesh());
    }

    #[test]
    fn test_builder_defaults() {
        let mesh = MeshShape::quad().with_two_sided(true);
        assert_eq!(mesh.alpha, 1.0);
        assert_eq!(mesh.two_sided, Some(true));
        assert!(!mesh.is_virtual);
        assert_eq!(mesh.build_hint, AccelBuildHint::FastTrace);
        let shape = mesh.with_virtual(true).into_shape();
        assert!(shape.is_virtual());
        assert_eq!(shape.two_sided(), Some(true));
    }
}
