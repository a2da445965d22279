//! Image texture with gamma decoding.
//!
//! Decoding runs on the worker pool as soon as the texture is created; the
//! first encode waits for it.

use std::path::{Path, PathBuf};

use crate::device::{CommandBuffer, TextureSampler};
use crate::handle::{TextureCategory, TextureHandle};
use crate::interaction::Interaction;
use crate::pipeline::Pipeline;
use crate::scene::Texture;
use crate::util::{Error, Result, Vec3, Vec4};
use crate::worker::{AsyncTask, WorkerPool};

/// Gamma used when none is given.
pub const DEFAULT_GAMMA: f32 = 2.2;

/// Decoded texels, row-major from the top-left corner.
#[derive(Debug, Clone, PartialEq)]
struct DecodedImage {
    width: u32,
    height: u32,
    texels: Vec<Vec4>,
}

fn decode(path: &Path) -> Result<DecodedImage> {
    let image = image::open(path)
        .map_err(|source| Error::Image {
            path: path.to_path_buf(),
            source,
        })?
        .into_rgba32f();
    let (width, height) = image.dimensions();
    let texels = image.pixels().map(|p| Vec4::from_array(p.0)).collect();
    tracing::debug!(path = %path.display(), width, height, "image decoded");
    Ok(DecodedImage { width, height, texels })
}

/// Color texture `pow(rgb, gamma)` sampled from an image.
pub struct ImageTexture {
    name: PathBuf,
    gamma: f32,
    sampler: TextureSampler,
    image: AsyncTask<Result<DecodedImage>>,
}

impl ImageTexture {
    /// Start decoding `path` on `workers`.
    pub fn load(workers: &WorkerPool, path: impl Into<PathBuf>, gamma: f32) -> Self {
        let path = path.into();
        let job_path = path.clone();
        Self {
            name: path,
            gamma: clamp_gamma(gamma),
            sampler: TextureSampler::linear_point_repeat(),
            image: workers.spawn_async(move || decode(&job_path)),
        }
    }

    /// Texture over texels already in memory, row-major from the top-left
    /// corner.
    pub fn from_texels(workers: &WorkerPool, width: u32, height: u32, texels: Vec<Vec4>, gamma: f32) -> Self {
        Self {
            name: PathBuf::from("<memory>"),
            gamma: clamp_gamma(gamma),
            sampler: TextureSampler::linear_point_repeat(),
            image: workers.spawn_async(move || Ok(DecodedImage { width, height, texels })),
        }
    }

    pub fn with_sampler(mut self, sampler: TextureSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    /// Whether decoding has been waited for.
    pub fn is_loaded(&self) -> bool {
        self.image.is_ready()
    }
}

fn clamp_gamma(gamma: f32) -> f32 {
    if gamma.is_nan() {
        DEFAULT_GAMMA
    } else {
        gamma.clamp(1e-4, 16.0)
    }
}

impl std::fmt::Debug for ImageTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageTexture")
            .field("name", &self.name)
            .field("gamma", &self.gamma)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl Texture for ImageTexture {
    fn impl_type(&self) -> &str {
        "image"
    }

    fn category(&self) -> TextureCategory {
        TextureCategory::Color
    }

    fn is_black(&self) -> bool {
        false
    }

    fn encode(&self, pipeline: &mut Pipeline, command_buffer: &mut CommandBuffer, tag: u32) -> Result<TextureHandle> {
        let image = match self.image.wait()? {
            Ok(image) => image,
            Err(err) => return Err(Error::other(format!("{}: {err}", self.name.display()))),
        };
        let id = pipeline.image_texture(command_buffer, image.width, image.height, image.texels.clone(), self.sampler)?;
        TextureHandle::encode_texture(tag, id, Vec3::new(self.gamma, 0.0, 0.0))
    }

    fn evaluate(&self, pipeline: &Pipeline, it: &Interaction, handle: &TextureHandle, _time: f32) -> Result<Vec4> {
        let texel = pipeline.tex2d(handle.texture_id())?.sample(it.uv);
        let rgb = texel.truncate().max(Vec3::ZERO).powf(handle.v().x);
        let spectrum = pipeline.srgb_albedo_spectrum(rgb)?;
        Ok(spectrum.rsp.coefficients().extend(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gamma_is_clamped() {
        assert_eq!(clamp_gamma(0.0), 1e-4);
        assert_eq!(clamp_gamma(100.0), 16.0);
        assert_eq!(clamp_gamma(f32::NAN), DEFAULT_GAMMA);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let workers = WorkerPool::new(1).unwrap();
        let texture = ImageTexture::load(&workers, "does/not/exist.png", 2.2);
        let err = texture.image.wait().unwrap().as_ref().unwrap_err();
        assert!(matches!(err, Error::Image { .. }));
        assert!(err.to_string().contains("exist.png"));
    }

    #[test]
    fn test_decodes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let img = image::RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        });
        img.save(&path).unwrap();
        let decoded = decode(&path).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 1));
        assert_eq!(decoded.texels[0], Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(decoded.texels[1], Vec4::new(0.0, 0.0, 1.0, 1.0));
    }
}
