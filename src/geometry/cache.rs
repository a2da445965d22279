//! Content-addressed mesh deduplication.
//!
//! A mesh is identified by a chained hash over its raw position, attribute
//! and index bytes. The first time a key is seen the mesh is uploaded into
//! the shared arenas, its primitive is built, its area-sampling tables are
//! created, and five consecutive bindless buffers are registered. Every
//! later occurrence reuses that result without touching the device.

use spooky_hash::ContentHasher;
use std::collections::HashMap;

use super::alias::{create_alias_table, AliasEntry};
use super::mesh::{MeshGeometry, MeshKey, Triangle, VertexAttribute};
use crate::accel::{AccelBuildHint, Mesh};
use crate::device::{BufferView, CommandBuffer};
use crate::handle::InstanceHandle;
use crate::resource::Resources;
use crate::util::{Error, Result, Vec3};

/// Key of a mesh's content.
pub fn mesh_key(seed: u64, positions: &[Vec3], attributes: &[VertexAttribute], triangles: &[Triangle]) -> MeshKey {
    let hash = ContentHasher::new(seed)
        .chain(bytemuck::cast_slice(positions))
        .chain(bytemuck::cast_slice(attributes))
        .chain(bytemuck::cast_slice(triangles))
        .finish();
    MeshKey {
        hash,
        vertex_count: positions.len(),
        triangle_count: triangles.len(),
    }
}

/// Per-triangle area weights (twice the area).
pub fn triangle_weights(positions: &[Vec3], triangles: &[Triangle]) -> Vec<f32> {
    triangles
        .iter()
        .map(|t| {
            let [p0, p1, p2] = t.indices().map(|i| positions[i as usize]);
            (p1 - p0).cross(p2 - p0).length()
        })
        .collect()
}

/// Deduplicating mesh store.
#[derive(Debug)]
pub struct MeshCache {
    seed: u64,
    meshes: HashMap<MeshKey, MeshGeometry>,
    builds: usize,
}

impl MeshCache {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            meshes: HashMap::new(),
            builds: 0,
        }
    }

    /// Number of distinct meshes built so far.
    pub fn builds(&self) -> usize {
        self.builds
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Cached geometry for this content, building it on first sight.
    ///
    /// Commits `command_buffer` after the uploads, after the primitive build
    /// and after the sampling tables, so the mesh is fully built before any
    /// acceleration structure can reference it.
    #[tracing::instrument(level = "debug", skip_all, fields(vertices = positions.len(), triangles = triangles.len()))]
    pub fn get_or_build(
        &mut self,
        res: &mut Resources,
        command_buffer: &mut CommandBuffer,
        positions: &[Vec3],
        attributes: &[VertexAttribute],
        triangles: &[Triangle],
        hint: AccelBuildHint,
    ) -> Result<MeshGeometry> {
        if positions.is_empty() || triangles.is_empty() {
            return Err(Error::EmptyMesh {
                positions: positions.len(),
                triangles: triangles.len(),
            });
        }
        if positions.len() != attributes.len() {
            return Err(Error::AttributeCountMismatch {
                positions: positions.len(),
                attributes: attributes.len(),
            });
        }
        if let Some(index) = triangles
            .iter()
            .flat_map(Triangle::indices)
            .find(|&i| i as usize >= positions.len())
        {
            return Err(Error::BufferOutOfBounds {
                index: index as usize,
                len: positions.len(),
            });
        }

        let key = mesh_key(self.seed, positions, attributes, triangles);
        if let Some(geometry) = self.meshes.get(&key) {
            tracing::trace!(hash = key.hash, "mesh cache hit");
            return Ok(geometry.clone());
        }

        let position_view = res.position_arena.allocate::<Vec3>(positions.len())?;
        let attribute_view = res.attribute_arena.allocate::<VertexAttribute>(attributes.len())?;
        if position_view.offset() != attribute_view.offset() {
            return Err(Error::ArenaOffsetMismatch {
                positions: position_view.offset(),
                attributes: attribute_view.offset(),
            });
        }
        let offset = position_view.offset() as u32;
        let rebased: Vec<Triangle> = triangles.iter().map(|t| t.rebased(offset)).collect();
        let triangle_buffer = res.device.create_buffer::<Triangle>(rebased.len());
        command_buffer
            .push(position_view.copy_from(positions))
            .push(attribute_view.copy_from(attributes))
            .push(triangle_buffer.copy_from(&rebased));
        command_buffer.commit()?;

        let whole_positions = position_view.original();
        let mesh = Mesh::new(&res.device, whole_positions.clone(), triangle_buffer.view(), hint);
        command_buffer.push(mesh.build());
        command_buffer.commit()?;

        let (alias_table, pdf) = create_alias_table(&triangle_weights(positions, triangles));
        let alias_view = res.general_arena.allocate::<AliasEntry>(alias_table.len())?;
        let pdf_view = res.general_arena.allocate::<f32>(pdf.len())?;
        command_buffer
            .push(alias_view.copy_from(&alias_table))
            .push(pdf_view.copy_from(&pdf));
        command_buffer.commit()?;

        let buffer_id_base = register_consecutive(
            res,
            &whole_positions,
            &attribute_view.original(),
            &triangle_buffer.view(),
            &alias_view,
            &pdf_view,
        )?;

        let geometry = MeshGeometry { mesh, buffer_id_base };
        self.meshes.insert(key, geometry.clone());
        self.builds += 1;
        tracing::debug!(hash = key.hash, buffer_id_base, offset, "mesh built");
        Ok(geometry)
    }
}

/// Register the five mesh buffers, checking the ids are consecutive.
fn register_consecutive(
    res: &mut Resources,
    positions: &BufferView<Vec3>,
    attributes: &BufferView<VertexAttribute>,
    triangles: &BufferView<Triangle>,
    alias_table: &BufferView<AliasEntry>,
    pdf: &BufferView<f32>,
) -> Result<u32> {
    let base = res.bindless.emplace_buffer(positions)?;
    let ids = [
        res.bindless.emplace_buffer(attributes)?,
        res.bindless.emplace_buffer(triangles)?,
        res.bindless.emplace_buffer(alias_table)?,
        res.bindless.emplace_buffer(pdf)?,
    ];
    for (k, id) in ids.into_iter().enumerate() {
        let expected = base + InstanceHandle::ATTRIBUTE_BUFFER + k as u32;
        if id != expected {
            return Err(Error::BindlessIdNotConsecutive { expected, actual: id });
        }
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::device::Device;
    use crate::util::Vec2;

    fn quad() -> (Vec<Vec3>, Vec<VertexAttribute>, Vec<Triangle>) {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let attributes = positions
            .iter()
            .map(|p| VertexAttribute::new(Vec3::Z, Vec3::X, Vec2::new(p.x, p.y)))
            .collect();
        (positions, attributes, vec![Triangle::new(0, 1, 2), Triangle::new(0, 2, 3)])
    }

    fn setup() -> (Resources, CommandBuffer) {
        let device = Device::new();
        let res = Resources::new(&device, &PipelineConfig::compact());
        let cb = device.create_stream().command_buffer();
        (res, cb)
    }

    #[test]
    fn test_identical_content_builds_once() {
        let (mut res, mut cb) = setup();
        let mut cache = MeshCache::new(7);
        let (p, a, t) = quad();
        let first = cache.get_or_build(&mut res, &mut cb, &p, &a, &t, AccelBuildHint::FastTrace).unwrap();
        let uploads = res.device.stats().buffer_uploads;
        let second = cache.get_or_build(&mut res, &mut cb, &p, &a, &t, AccelBuildHint::FastTrace).unwrap();
        assert_eq!(first.buffer_id_base, second.buffer_id_base);
        assert_eq!(first.mesh.id(), second.mesh.id());
        assert_eq!(cache.builds(), 1);
        assert_eq!(res.device.stats().buffer_uploads, uploads);
        assert_eq!(res.device.stats().mesh_builds, 1);
    }

    #[test]
    fn test_second_mesh_is_rebased() {
        let (mut res, mut cb) = setup();
        let mut cache = MeshCache::new(7);
        let (p, a, t) = quad();
        let first = cache.get_or_build(&mut res, &mut cb, &p, &a, &t, AccelBuildHint::FastTrace).unwrap();
        let moved: Vec<Vec3> = p.iter().map(|v| *v + Vec3::Z).collect();
        let second = cache.get_or_build(&mut res, &mut cb, &moved, &a, &t, AccelBuildHint::FastTrace).unwrap();
        assert_eq!(cache.builds(), 2);
        assert_eq!(second.buffer_id_base, first.buffer_id_base + InstanceHandle::MESH_BUFFER_COUNT);

        res.bindless.update().run().unwrap();
        let triangles = res.bindless.buffer::<Triangle>(second.buffer_id_base + InstanceHandle::TRIANGLE_BUFFER).unwrap();
        assert_eq!(triangles.read(0).unwrap(), Triangle::new(4, 5, 6));
        let positions = res.bindless.buffer::<Vec3>(second.buffer_id_base).unwrap();
        assert_eq!(positions.read(6).unwrap(), Vec3::new(1.0, 1.0, 1.0));
        assert!(second.mesh.is_built());
    }

    #[test]
    fn test_pdf_buffer_matches_areas() {
        let (mut res, mut cb) = setup();
        let mut cache = MeshCache::new(0);
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)];
        let attributes = vec![VertexAttribute::default(); 5];
        let triangles = vec![Triangle::new(0, 1, 2), Triangle::new(0, 3, 4)];
        let g = cache
            .get_or_build(&mut res, &mut cb, &positions, &attributes, &triangles, AccelBuildHint::FastTrace)
            .unwrap();
        res.bindless.update().run().unwrap();
        let pdf = res.bindless.buffer::<f32>(g.buffer_id_base + InstanceHandle::PDF_BUFFER).unwrap();
        assert_eq!(pdf.to_vec(), vec![0.2, 0.8]);
    }

    #[test]
    fn test_rejects_bad_input() {
        let (mut res, mut cb) = setup();
        let mut cache = MeshCache::new(0);
        let (p, a, t) = quad();
        assert!(matches!(
            cache.get_or_build(&mut res, &mut cb, &[], &[], &t, AccelBuildHint::FastTrace),
            Err(Error::EmptyMesh { positions: 0, .. })
        ));
        assert!(matches!(
            cache.get_or_build(&mut res, &mut cb, &p, &a[..3], &t, AccelBuildHint::FastTrace),
            Err(Error::AttributeCountMismatch { positions: 4, attributes: 3 })
        ));
        assert!(matches!(
            cache.get_or_build(&mut res, &mut cb, &p, &a, &[Triangle::new(0, 1, 9)], AccelBuildHint::FastTrace),
            Err(Error::BufferOutOfBounds { index: 9, len: 4 })
        ));
        assert_eq!(cache.builds(), 0);
    }

    #[test]
    fn test_key_is_order_sensitive() {
        let (p, a, t) = quad();
        let reversed: Vec<_> = t.iter().rev().copied().collect();
        assert_ne!(mesh_key(0, &p, &a, &t), mesh_key(0, &p, &a, &reversed));
        assert_ne!(mesh_key(0, &p, &a, &t), mesh_key(1, &p, &a, &t));
    }
}
