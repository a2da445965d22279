//! 2D images, 3D volumes and samplers.
//!
//! Texels are stored as `Vec4` regardless of the source pixel format; 8-bit
//! sources are normalized to `[0, 1]` on upload.

use glam::{Vec2, Vec3, Vec4};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use super::stream::{Command, CommandKind};
use crate::util::{Error, Result};

/// Texel filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Point,
    Linear,
}

/// Behaviour for coordinates outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Edge,
    Repeat,
    Zero,
}

/// Sampler state bound together with a texture in the bindless table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSampler {
    pub filter: Filter,
    pub address: AddressMode,
}

impl TextureSampler {
    /// Bilinear filtering, zero outside the texture.
    pub const fn linear_point_zero() -> Self {
        Self {
            filter: Filter::Linear,
            address: AddressMode::Zero,
        }
    }

    /// Bilinear filtering, clamped to the edge.
    pub const fn linear_point_edge() -> Self {
        Self {
            filter: Filter::Linear,
            address: AddressMode::Edge,
        }
    }

    /// Bilinear filtering, wrapping around.
    pub const fn linear_point_repeat() -> Self {
        Self {
            filter: Filter::Linear,
            address: AddressMode::Repeat,
        }
    }

    /// Nearest texel, clamped to the edge.
    pub const fn point_edge() -> Self {
        Self {
            filter: Filter::Point,
            address: AddressMode::Edge,
        }
    }
}

/// Storage shared by images and volumes.
pub(crate) struct TexelStorage {
    pub(crate) id: u64,
    pub(crate) size: [u32; 3],
    pub(crate) texels: RwLock<Vec<Vec4>>,
}

impl TexelStorage {
    fn new(id: u64, size: [u32; 3]) -> Arc<Self> {
        let count = size.iter().map(|&s| s as usize).product();
        Arc::new(Self {
            id,
            size,
            texels: RwLock::new(vec![Vec4::ZERO; count]),
        })
    }

    fn upload(self: &Arc<Self>, texels: Vec<Vec4>) -> Command {
        let storage = self.clone();
        Command::new(
            CommandKind::TextureUpload {
                texture: self.id,
                texels: texels.len(),
            },
            move || {
                let mut dst = storage.texels.write();
                if texels.len() != dst.len() {
                    return Err(Error::BufferOutOfBounds {
                        index: texels.len(),
                        len: dst.len(),
                    });
                }
                dst.copy_from_slice(&texels);
                Ok(())
            },
        )
    }

    /// Resolve an integer coordinate on one axis, `None` for zero-border misses.
    fn wrap(coord: i64, size: u32, address: AddressMode) -> Option<usize> {
        let n = size as i64;
        match address {
            AddressMode::Edge => Some(coord.clamp(0, n - 1) as usize),
            AddressMode::Repeat => Some(coord.rem_euclid(n) as usize),
            AddressMode::Zero => (0..n).contains(&coord).then_some(coord as usize),
        }
    }

    fn fetch(&self, texels: &[Vec4], xyz: [i64; 3], address: AddressMode) -> Vec4 {
        let x = Self::wrap(xyz[0], self.size[0], address);
        let y = Self::wrap(xyz[1], self.size[1], address);
        let z = Self::wrap(xyz[2], self.size[2], address);
        match (x, y, z) {
            (Some(x), Some(y), Some(z)) => {
                let [w, h, _] = self.size;
                texels[(z * h as usize + y) * w as usize + x]
            }
            _ => Vec4::ZERO,
        }
    }

    fn sample(&self, sampler: TextureSampler, uvw: Vec3) -> Vec4 {
        let texels = self.texels.read();
        let size = Vec3::new(self.size[0] as f32, self.size[1] as f32, self.size[2] as f32);
        let p = uvw * size;
        match sampler.filter {
            Filter::Point => {
                let c = p.floor();
                self.fetch(&texels, [c.x as i64, c.y as i64, c.z as i64], sampler.address)
            }
            Filter::Linear => {
                let q = p - Vec3::splat(0.5);
                let base = q.floor();
                let f = q - base;
                let [bx, by, bz] = [base.x as i64, base.y as i64, base.z as i64];
                let mut acc = Vec4::ZERO;
                for corner in 0..8 {
                    let (dx, dy, dz) = (corner & 1, (corner >> 1) & 1, (corner >> 2) & 1);
                    let wx = if dx == 1 { f.x } else { 1.0 - f.x };
                    let wy = if dy == 1 { f.y } else { 1.0 - f.y };
                    let wz = if dz == 1 { f.z } else { 1.0 - f.z };
                    let w = wx * wy * wz;
                    if w > 0.0 {
                        acc += w * self.fetch(&texels, [bx + dx, by + dy, bz + dz], sampler.address);
                    }
                }
                acc
            }
        }
    }
}

/// 2D texture of RGBA float texels.
#[derive(Clone)]
pub struct Image {
    pub(crate) storage: Arc<TexelStorage>,
}

impl Image {
    pub(crate) fn new(id: u64, width: u32, height: u32) -> Self {
        Self {
            storage: TexelStorage::new(id, [width.max(1), height.max(1), 1]),
        }
    }

    /// Device-unique id.
    pub fn id(&self) -> u64 {
        self.storage.id
    }

    /// `(width, height)` in texels.
    pub fn size(&self) -> (u32, u32) {
        (self.storage.size[0], self.storage.size[1])
    }

    /// Upload command for `width * height` texels in row-major order.
    pub fn copy_from(&self, texels: Vec<Vec4>) -> Command {
        self.storage.upload(texels)
    }

    /// Upload command for single-channel 8-bit pixels.
    pub fn copy_from_r8(&self, pixels: &[u8]) -> Command {
        let texels = pixels
            .iter()
            .map(|&v| Vec4::new(v as f32 / 255.0, 0.0, 0.0, 1.0))
            .collect();
        self.storage.upload(texels)
    }

    /// Upload command for interleaved RGBA 8-bit pixels.
    pub fn copy_from_rgba8(&self, pixels: &[u8]) -> Command {
        let texels = pixels
            .chunks_exact(4)
            .map(|p| Vec4::new(p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32) / 255.0)
            .collect();
        self.storage.upload(texels)
    }

    /// Filtered lookup at `uv`.
    pub fn sample(&self, sampler: TextureSampler, uv: Vec2) -> Vec4 {
        self.storage.sample(sampler, uv.extend(0.5))
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("id", &self.storage.id)
            .field("size", &self.size())
            .finish()
    }
}

/// 3D texture of RGBA float texels.
#[derive(Clone)]
pub struct Volume {
    pub(crate) storage: Arc<TexelStorage>,
}

impl Volume {
    pub(crate) fn new(id: u64, size: [u32; 3]) -> Self {
        Self {
            storage: TexelStorage::new(id, size.map(|s| s.max(1))),
        }
    }

    /// Device-unique id.
    pub fn id(&self) -> u64 {
        self.storage.id
    }

    /// `[width, height, depth]` in texels.
    pub fn size(&self) -> [u32; 3] {
        self.storage.size
    }

    /// Upload command; texels are x-fastest, then y, then z.
    pub fn copy_from(&self, texels: Vec<Vec4>) -> Command {
        self.storage.upload(texels)
    }

    /// Filtered lookup at `uvw`.
    pub fn sample(&self, sampler: TextureSampler, uvw: Vec3) -> Vec4 {
        self.storage.sample(sampler, uvw)
    }
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("id", &self.storage.id)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> Image {
        let image = Image::new(1, 2, 1);
        image
            .copy_from(vec![Vec4::splat(0.0), Vec4::splat(1.0)])
            .run()
            .unwrap();
        image
    }

    #[test]
    fn test_point_sampling() {
        let image = checker();
        let s = TextureSampler::point_edge();
        assert_eq!(image.sample(s, Vec2::new(0.25, 0.5)).x, 0.0);
        assert_eq!(image.sample(s, Vec2::new(0.75, 0.5)).x, 1.0);
    }

    #[test]
    fn test_linear_sampling_at_center() {
        let image = checker();
        let v = image.sample(TextureSampler::linear_point_edge(), Vec2::new(0.5, 0.5));
        assert!((v.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_address_outside() {
        let image = checker();
        let v = image.sample(TextureSampler::linear_point_zero(), Vec2::new(3.0, 3.0));
        assert_eq!(v, Vec4::ZERO);
    }

    #[test]
    fn test_r8_normalized() {
        let image = Image::new(1, 1, 1);
        image.copy_from_r8(&[255]).run().unwrap();
        let v = image.sample(TextureSampler::point_edge(), Vec2::splat(0.5));
        assert_eq!(v.x, 1.0);
    }

    #[test]
    fn test_upload_size_mismatch() {
        let image = Image::new(1, 2, 2);
        assert!(image.copy_from(vec![Vec4::ONE]).run().is_err());
    }
}
