//! Shared device resources: arenas and the bindless registry.

mod arena;
mod bindless;

pub use arena::BufferArena;
pub use bindless::{BindlessArray, BindlessTexture2d, BindlessTexture3d};

use bytemuck::Pod;
use std::mem::size_of;

use crate::config::PipelineConfig;
use crate::device::{BufferView, Device};
use crate::geometry::VertexAttribute;
use crate::util::{Result, Vec3};

/// Device, bindless table and the three arenas every scene load shares.
#[derive(Debug)]
pub struct Resources {
    pub device: Device,
    pub bindless: BindlessArray,
    /// Vertex positions of all meshes.
    pub position_arena: BufferArena,
    /// Vertex attributes, element-aligned with `position_arena`.
    pub attribute_arena: BufferArena,
    /// Alias tables, pdfs and plugin parameters.
    pub general_arena: BufferArena,
}

impl Resources {
    pub fn new(device: &Device, config: &PipelineConfig) -> Self {
        let vertices = config.vertex_arena_elements;
        Self {
            device: device.clone(),
            bindless: BindlessArray::new(config.bindless_capacity),
            position_arena: BufferArena::new(device, "positions", vertices * size_of::<Vec3>()),
            attribute_arena: BufferArena::new(device, "attributes", vertices * size_of::<VertexAttribute>()),
            general_arena: BufferArena::new(device, "general", config.general_arena_bytes),
        }
    }

    /// Allocate `count` elements from the general arena and register the
    /// view as a bindless buffer.
    pub fn arena_buffer<T: Pod>(&mut self, count: usize) -> Result<(BufferView<T>, u32)> {
        let view = self.general_arena.allocate::<T>(count)?;
        let id = self.bindless.emplace_buffer(&view)?;
        Ok((view, id))
    }
}
