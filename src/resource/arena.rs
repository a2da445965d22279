//! Bump allocator over a pre-sized device buffer.
//!
//! Many small meshes share one backing buffer per arena instead of owning a
//! buffer each. Allocations are never freed and views stay valid for the
//! arena's lifetime.

use bytemuck::Pod;
use std::mem::size_of;
use std::sync::Arc;

use crate::device::{BufferView, Device, RawBuffer};
use crate::util::{Error, Result};

/// Fixed-capacity bump allocator.
pub struct BufferArena {
    name: &'static str,
    buffer: Arc<RawBuffer>,
    capacity: usize,
    offset: usize,
}

impl BufferArena {
    /// Arena backed by a fresh `capacity_bytes` buffer.
    pub fn new(device: &Device, name: &'static str, capacity_bytes: usize) -> Self {
        Self {
            name,
            buffer: device.create_raw_buffer(capacity_bytes),
            capacity: capacity_bytes,
            offset: 0,
        }
    }

    /// Allocate `count` elements of `T`.
    ///
    /// The start is rounded up to a multiple of `size_of::<T>()`, so the
    /// view's element offset is exact and two arenas fed the same sequence of
    /// counts hand out equal element offsets.
    pub fn allocate<T: Pod>(&mut self, count: usize) -> Result<BufferView<T>> {
        let stride = size_of::<T>().max(1);
        let start = self.offset.div_ceil(stride) * stride;
        let size = count * stride;
        let end = start
            .checked_add(size)
            .filter(|&end| end <= self.capacity)
            .ok_or(Error::ArenaExhausted {
                arena: self.name,
                requested: size,
                available: self.capacity.saturating_sub(start),
            })?;
        self.offset = end;
        Ok(BufferView::new(self.buffer.clone(), start / stride, count))
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn used_bytes(&self) -> usize {
        self.offset
    }

    /// Total capacity in bytes.
    pub fn capacity_bytes(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for BufferArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferArena")
            .field("name", &self.name)
            .field("used", &self.offset)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_offsets_increase() {
        let device = Device::new();
        let mut arena = BufferArena::new(&device, "test", 1024);
        let a = arena.allocate::<u32>(3).unwrap();
        let b = arena.allocate::<u32>(5).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 3);
        assert_eq!(a.buffer_id(), b.buffer_id());
    }

    #[test]
    fn test_mixed_types_are_aligned() {
        let device = Device::new();
        let mut arena = BufferArena::new(&device, "test", 1024);
        let _ = arena.allocate::<u8>(3).unwrap();
        let v = arena.allocate::<Vec3>(2).unwrap();
        // 3 bytes rounded up to 12.
        assert_eq!(v.offset(), 1);
        assert_eq!(v.offset_bytes(), 12);
    }

    #[test]
    fn test_parallel_arenas_stay_in_lockstep() {
        let device = Device::new();
        let mut positions = BufferArena::new(&device, "positions", 100 * 12);
        let mut attributes = BufferArena::new(&device, "attributes", 100 * 32);
        for count in [3, 17, 4, 40] {
            let p = positions.allocate::<[f32; 3]>(count).unwrap();
            let a = attributes.allocate::<[f32; 8]>(count).unwrap();
            assert_eq!(p.offset(), a.offset());
        }
    }

    #[test]
    fn test_exhaustion() {
        let device = Device::new();
        let mut arena = BufferArena::new(&device, "tiny", 16);
        arena.allocate::<u32>(4).unwrap();
        let err = arena.allocate::<u32>(1).unwrap_err();
        assert!(matches!(
            err,
            Error::ArenaExhausted {
                arena: "tiny",
                requested: 4,
                available: 0
            }
        ));
    }
}
