//! Host-emulated device.
//!
//! Stands in for a GPU command-queue service with the same observable
//! contract: resources are created immediately, their contents change only
//! when queued commands execute at a commit point, and commands execute in
//! enqueue order. Kernel-side reads go straight to the backing memory.
//!
//! - [`Buffer`] / [`BufferView`] - typed linear memory
//! - [`Image`] / [`Volume`] / [`TextureSampler`] - filtered textures
//! - [`Stream`] / [`CommandBuffer`] / [`Command`] - ordered submission

mod buffer;
mod stream;
mod texture;

pub use buffer::{Buffer, BufferView};
pub use stream::{Command, CommandBuffer, CommandKind, Stream, StreamEvent};
pub use texture::{AddressMode, Filter, Image, TextureSampler, Volume};

pub(crate) use buffer::RawBuffer;

use bytemuck::Pod;
use std::fmt;
use std::mem::size_of;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Running totals of executed work.
#[derive(Default)]
pub(crate) struct StatsCounters {
    buffer_uploads: AtomicUsize,
    bytes_uploaded: AtomicUsize,
    texture_uploads: AtomicUsize,
    mesh_builds: AtomicUsize,
    accel_builds: AtomicUsize,
    accel_updates: AtomicUsize,
    bindless_updates: AtomicUsize,
    commits: AtomicUsize,
}

impl StatsCounters {
    pub(crate) fn count(&self, kind: CommandKind) {
        let counter = match kind {
            CommandKind::BufferUpload { bytes, .. } => {
                self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
                &self.buffer_uploads
            }
            CommandKind::TextureUpload { .. } => &self.texture_uploads,
            CommandKind::MeshBuild { .. } => &self.mesh_builds,
            CommandKind::AccelBuild { .. } => &self.accel_builds,
            CommandKind::AccelUpdate { .. } => &self.accel_updates,
            CommandKind::BindlessUpdate { .. } => &self.bindless_updates,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of executed device work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub buffers_created: usize,
    pub buffer_uploads: usize,
    pub bytes_uploaded: usize,
    pub texture_uploads: usize,
    pub mesh_builds: usize,
    pub accel_builds: usize,
    pub accel_updates: usize,
    pub bindless_updates: usize,
    pub commits: usize,
}

struct DeviceInner {
    next_id: AtomicU64,
    buffers_created: AtomicUsize,
    counters: StatsCounters,
}

/// Handle to the emulated device; clones share state.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

impl Device {
    /// Create a new device.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                next_id: AtomicU64::new(1),
                buffers_created: AtomicUsize::new(0),
                counters: StatsCounters::default(),
            }),
        }
    }

    /// Fresh device-unique resource id.
    pub(crate) fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn stats_counters(&self) -> &StatsCounters {
        &self.inner.counters
    }

    pub(crate) fn create_raw_buffer(&self, size_bytes: usize) -> Arc<RawBuffer> {
        self.inner.buffers_created.fetch_add(1, Ordering::Relaxed);
        RawBuffer::new(self.next_id(), size_bytes)
    }

    /// Zero-initialized buffer of `len` elements.
    pub fn create_buffer<T: Pod>(&self, len: usize) -> Buffer<T> {
        Buffer::from_raw(self.create_raw_buffer(len * size_of::<T>()), len)
    }

    /// Zero-initialized 2D texture.
    pub fn create_image(&self, width: u32, height: u32) -> Image {
        Image::new(self.next_id(), width, height)
    }

    /// Zero-initialized 3D texture.
    pub fn create_volume(&self, size: [u32; 3]) -> Volume {
        Volume::new(self.next_id(), size)
    }

    /// New command stream.
    pub fn create_stream(&self) -> Stream {
        Stream::new(self.clone())
    }

    /// Totals of work executed so far.
    pub fn stats(&self) -> DeviceStats {
        let c = &self.inner.counters;
        DeviceStats {
            buffers_created: self.inner.buffers_created.load(Ordering::Relaxed),
            buffer_uploads: c.buffer_uploads.load(Ordering::Relaxed),
            bytes_uploaded: c.bytes_uploaded.load(Ordering::Relaxed),
            texture_uploads: c.texture_uploads.load(Ordering::Relaxed),
            mesh_builds: c.mesh_builds.load(Ordering::Relaxed),
            accel_builds: c.accel_builds.load(Ordering::Relaxed),
            accel_updates: c.accel_updates.load(Ordering::Relaxed),
            bindless_updates: c.bindless_updates.load(Ordering::Relaxed),
            commits: c.commits.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device").field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let device = Device::new();
        let a = device.create_buffer::<f32>(4);
        let b = device.create_buffer::<f32>(4);
        assert_ne!(a.id(), b.id());
        assert_eq!(device.stats().buffers_created, 2);
    }

    #[test]
    fn test_clones_share_counters() {
        let device = Device::new();
        let other = device.clone();
        let buffer = other.create_buffer::<u8>(3);
        let mut cb = device.create_stream().command_buffer();
        cb.push(buffer.copy_from(&[1, 2, 3]));
        cb.commit().unwrap();
        assert_eq!(device.stats().bytes_uploaded, 3);
        assert_eq!(device.stats().commits, 1);
    }
}
