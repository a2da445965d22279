//! Bindless resource registry.
//!
//! Three append-only slot lists (buffers, 2D textures, 3D textures), each
//! bounded by the same capacity. Registration happens on the host; kernels
//! only see the table as of the last executed [`BindlessArray::update`].

use bytemuck::Pod;
use glam::{Vec2, Vec3, Vec4};
use parking_lot::RwLock;
use std::mem::size_of;
use std::sync::Arc;

use crate::device::{BufferView, Command, CommandKind, Image, RawBuffer, TextureSampler, Volume};
use crate::util::{Error, Result};

#[derive(Clone)]
struct BufferSlot {
    raw: Arc<RawBuffer>,
    offset_bytes: usize,
    len_bytes: usize,
}

#[derive(Clone, Default)]
struct SlotTable {
    buffers: Vec<BufferSlot>,
    textures: Vec<(Image, TextureSampler)>,
    volumes: Vec<(Volume, TextureSampler)>,
}

/// Capacity-bounded table of buffer and texture bindings.
pub struct BindlessArray {
    capacity: usize,
    host: SlotTable,
    committed: Arc<RwLock<SlotTable>>,
    dirty: bool,
}

impl BindlessArray {
    /// Empty table with `capacity` slots per resource kind.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            host: SlotTable::default(),
            committed: Arc::new(RwLock::new(SlotTable::default())),
            dirty: false,
        }
    }

    fn check_capacity(&self, kind: &'static str, len: usize) -> Result<u32> {
        if len >= self.capacity {
            return Err(Error::BindlessCapacityExceeded {
                kind,
                capacity: self.capacity,
            });
        }
        Ok(len as u32)
    }

    /// Register a buffer view, returning its slot id.
    pub fn emplace_buffer<T: Pod>(&mut self, view: &BufferView<T>) -> Result<u32> {
        let id = self.check_capacity("buffer", self.host.buffers.len())?;
        self.host.buffers.push(BufferSlot {
            raw: view.raw().clone(),
            offset_bytes: view.offset_bytes(),
            len_bytes: view.len() * size_of::<T>(),
        });
        self.dirty = true;
        Ok(id)
    }

    /// Register a 2D texture with its sampler.
    pub fn emplace_texture(&mut self, image: &Image, sampler: TextureSampler) -> Result<u32> {
        let id = self.check_capacity("texture2d", self.host.textures.len())?;
        self.host.textures.push((image.clone(), sampler));
        self.dirty = true;
        Ok(id)
    }

    /// Register a 3D texture with its sampler.
    pub fn emplace_volume(&mut self, volume: &Volume, sampler: TextureSampler) -> Result<u32> {
        let id = self.check_capacity("texture3d", self.host.volumes.len())?;
        self.host.volumes.push((volume.clone(), sampler));
        self.dirty = true;
        Ok(id)
    }

    /// Whether registrations happened since the last update.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Registered slot counts `(buffers, textures, volumes)`.
    pub fn len(&self) -> (usize, usize, usize) {
        (
            self.host.buffers.len(),
            self.host.textures.len(),
            self.host.volumes.len(),
        )
    }

    /// True if nothing was registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0, 0)
    }

    /// Slots per resource kind.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Command publishing the host table to kernels.
    pub fn update(&mut self) -> Command {
        self.dirty = false;
        let snapshot = self.host.clone();
        let committed = self.committed.clone();
        Command::new(
            CommandKind::BindlessUpdate {
                buffers: snapshot.buffers.len(),
                textures: snapshot.textures.len(),
                volumes: snapshot.volumes.len(),
            },
            move || {
                *committed.write() = snapshot;
                Ok(())
            },
        )
    }

    /// Kernel-side typed view of buffer slot `id`.
    pub fn buffer<T: Pod>(&self, id: u32) -> Result<BufferView<T>> {
        let table = self.committed.read();
        let slot = table
            .buffers
            .get(id as usize)
            .ok_or(Error::InvalidBindlessSlot {
                kind: "buffer",
                id,
                count: table.buffers.len(),
            })?;
        let stride = size_of::<T>().max(1);
        Ok(BufferView::new(
            slot.raw.clone(),
            slot.offset_bytes / stride,
            slot.len_bytes / stride,
        ))
    }

    /// Kernel-side 2D texture slot `id`.
    pub fn tex2d(&self, id: u32) -> Result<BindlessTexture2d> {
        let table = self.committed.read();
        let (image, sampler) = table
            .textures
            .get(id as usize)
            .ok_or(Error::InvalidBindlessSlot {
                kind: "texture2d",
                id,
                count: table.textures.len(),
            })?;
        Ok(BindlessTexture2d {
            image: image.clone(),
            sampler: *sampler,
        })
    }

    /// Kernel-side 3D texture slot `id`.
    pub fn tex3d(&self, id: u32) -> Result<BindlessTexture3d> {
        let table = self.committed.read();
        let (volume, sampler) = table
            .volumes
            .get(id as usize)
            .ok_or(Error::InvalidBindlessSlot {
                kind: "texture3d",
                id,
                count: table.volumes.len(),
            })?;
        Ok(BindlessTexture3d {
            volume: volume.clone(),
            sampler: *sampler,
        })
    }
}

impl std::fmt::Debug for BindlessArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindlessArray")
            .field("capacity", &self.capacity)
            .field("slots", &self.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// 2D texture bound to its sampler.
#[derive(Debug, Clone)]
pub struct BindlessTexture2d {
    image: Image,
    sampler: TextureSampler,
}

impl BindlessTexture2d {
    /// Filtered lookup.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        self.image.sample(self.sampler, uv)
    }
}

/// 3D texture bound to its sampler.
#[derive(Debug, Clone)]
pub struct BindlessTexture3d {
    volume: Volume,
    sampler: TextureSampler,
}

impl BindlessTexture3d {
    /// Filtered lookup.
    pub fn sample(&self, uvw: Vec3) -> Vec4 {
        self.volume.sample(self.sampler, uvw)
    }
}
