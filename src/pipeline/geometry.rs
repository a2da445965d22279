//! Depth-first traversal of the shape graph.

use std::sync::Arc;

use super::{identity, DynamicInstance, LightData, Pipeline};
use crate::device::{CommandBuffer, TextureSampler};
use crate::geometry::{AlphaSource, MeshData};
use crate::handle::{
    encode_alpha_and_properties, encode_constant_alpha, encode_light, encode_surface, InstanceHandle,
    ShapeProperties, LIGHT_TAG_MASK,
};
use crate::scene::{Light, MeshShape, Shape, Surface};
use crate::transform::InstancedTransform;
use crate::util::{Error, Mat3, Mat4, Result};

/// Settings a group hands down to descendants that leave them unset.
#[derive(Debug, Clone, Default)]
struct Inherited {
    two_sided: Option<bool>,
    surface: Option<Arc<dyn Surface>>,
    light: Option<Arc<dyn Light>>,
}

impl Inherited {
    fn under(&self, shape: &Shape) -> Self {
        Self {
            two_sided: shape.two_sided().or(self.two_sided),
            surface: shape.surface().cloned().or_else(|| self.surface.clone()),
            light: shape.light().cloned().or_else(|| self.light.clone()),
        }
    }
}

impl Pipeline {
    pub(super) fn build_geometry(&mut self, cb: &mut CommandBuffer) -> Result<()> {
        let shapes = self.scene.shapes.clone();
        for shape in &shapes {
            self.process_shape(cb, shape, &Inherited::default())?;
        }
        tracing::debug!(
            instances = self.instances.len(),
            meshes = self.mesh_cache.builds(),
            transforms = self.transform_tree.len(),
            "geometry built"
        );
        Ok(())
    }

    fn process_shape(&mut self, cb: &mut CommandBuffer, shape: &Arc<Shape>, inherited: &Inherited) -> Result<()> {
        let resolved = inherited.under(shape);
        match &**shape {
            Shape::Group(group) => {
                let _scope = self.transform_tree.push(group.transform.as_ref());
                for child in &group.children {
                    self.process_shape(cb, child, &resolved)?;
                }
                Ok(())
            }
            Shape::Mesh(mesh) => self.process_mesh(cb, shape, mesh, &resolved),
        }
    }

    fn process_mesh(
        &mut self,
        cb: &mut CommandBuffer,
        shape: &Arc<Shape>,
        mesh: &MeshShape,
        resolved: &Inherited,
    ) -> Result<()> {
        if mesh.deformable {
            return Err(Error::unsupported("deformable meshes"));
        }
        let data = self.mesh_data(cb, shape, mesh)?;
        let instance_id = self.accel.len() as u32;

        let (node, is_static) = self.transform_tree.leaf(mesh.transform.as_ref());
        if let (Some(node), false) = (node, is_static) {
            self.dynamic_instances.push(DynamicInstance {
                transform: InstancedTransform {
                    node,
                    instance_id: instance_id as usize,
                },
                is_virtual: mesh.is_virtual,
            });
        }
        let world = self.transform_tree.matrix(node, self.mean_time)?;
        if mesh.is_virtual {
            self.accel
                .emplace_back(&data.geometry.mesh, world * Mat4::from_mat3(Mat3::ZERO), false);
        } else {
            self.accel.emplace_back(&data.geometry.mesh, world, true);
        }

        let mut properties = ShapeProperties::empty();
        // Sidedness resolves per path: a shared leaf may sit under groups that
        // disagree on it.
        properties.set(ShapeProperties::TWO_SIDED, resolved.two_sided.unwrap_or(data.two_sided));

        let mut surface_buffer_id_and_tag = 0;
        if let Some(surface) = resolved.surface.as_ref().filter(|s| !s.is_null()) {
            if mesh.is_virtual {
                tracing::warn!(surface = surface.impl_type(), "surface on a virtual shape is ignored");
            } else {
                surface_buffer_id_and_tag = self.encode_surface(cb, surface, instance_id, shape)?;
                properties |= ShapeProperties::HAS_SURFACE;
            }
        }

        let mut light_buffer_id_and_tag = 0;
        if let Some(light) = resolved.light.as_ref().filter(|l| !l.is_null()) {
            if light.is_virtual() != mesh.is_virtual {
                tracing::warn!(
                    light = light.impl_type(),
                    light_virtual = light.is_virtual(),
                    shape_virtual = mesh.is_virtual,
                    "light does not match the virtual-ness of its shape, dropped"
                );
            } else {
                light_buffer_id_and_tag = self.encode_light(cb, light, instance_id, shape)?;
                properties |= ShapeProperties::HAS_LIGHT;
                self.light_data.push(LightData {
                    instance_id,
                    tag: light_buffer_id_and_tag & LIGHT_TAG_MASK,
                });
            }
        }

        let alpha = match data.alpha {
            AlphaSource::Texture(id) => id,
            AlphaSource::Constant(alpha) => {
                properties |= ShapeProperties::CONSTANT_ALPHA;
                encode_constant_alpha(alpha)
            }
        };

        self.instances.push(InstanceHandle {
            buffer_id_base: data.geometry.buffer_id_base,
            surface_buffer_id_and_tag,
            light_buffer_id_and_tag,
            alpha_texture_id_and_properties: encode_alpha_and_properties(alpha, properties)?,
        });
        tracing::trace!(instance_id, ?properties, is_static, "instance added");
        Ok(())
    }

    /// Geometry, own sidedness and alpha of a shape, built on first sight.
    fn mesh_data(&mut self, cb: &mut CommandBuffer, shape: &Arc<Shape>, mesh: &MeshShape) -> Result<MeshData> {
        if let Some(data) = self.mesh_data.get(&identity(shape)) {
            return Ok(data.clone());
        }
        let geometry = self.mesh_cache.get_or_build(
            &mut self.resources,
            cb,
            &mesh.positions,
            &mesh.attributes,
            &mesh.triangles,
            mesh.build_hint,
        )?;
        let alpha = match &mesh.alpha_image {
            Some(image) => {
                let texture = self.resources.device.create_image(image.width, image.height);
                cb.push(texture.copy_from_r8(&image.pixels));
                let id = self
                    .resources
                    .bindless
                    .emplace_texture(&texture, TextureSampler::linear_point_zero())?;
                AlphaSource::Texture(id)
            }
            None => AlphaSource::Constant(mesh.alpha.clamp(0.0, 1.0)),
        };
        let data = MeshData {
            geometry,
            two_sided: mesh.two_sided.unwrap_or(false),
            alpha,
        };
        self.mesh_data.insert(identity(shape), data.clone());
        Ok(data)
    }

    /// Packed buffer id and tag of a surface, encoded once per object.
    fn encode_surface(
        &mut self,
        cb: &mut CommandBuffer,
        surface: &Arc<dyn Surface>,
        instance_id: u32,
        shape: &Shape,
    ) -> Result<u32> {
        if let Some(&packed) = self.encoded_surfaces.get(&identity(surface)) {
            return Ok(packed);
        }
        let tag = self.surfaces.assign(surface.impl_type(), surface)?;
        let buffer_id = surface.encode(self, cb, instance_id, shape)?;
        let packed = encode_surface(buffer_id, tag)?;
        self.encoded_surfaces.insert(identity(surface), packed);
        Ok(packed)
    }

    /// Packed buffer id and tag of a light, encoded once per object.
    fn encode_light(
        &mut self,
        cb: &mut CommandBuffer,
        light: &Arc<dyn Light>,
        instance_id: u32,
        shape: &Shape,
    ) -> Result<u32> {
        if let Some(&packed) = self.encoded_lights.get(&identity(light)) {
            return Ok(packed);
        }
        let tag = self.lights.assign(light.impl_type(), light)?;
        let buffer_id = light.encode(self, cb, instance_id, shape)?;
        let packed = encode_light(buffer_id, tag)?;
        self.encoded_lights.insert(identity(light), packed);
        Ok(packed)
    }
}
