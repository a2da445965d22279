//! Spectral helpers: wavelength samples, RGB-to-spectrum uplift and the
//! D65 illuminant.
//!
//! An RGB triple becomes a smooth reflectance spectrum
//! `s(c0 t^2 + c1 t + c2)`, where `s` is a sigmoid onto `(0, 1)` and `t` is
//! the wavelength normalized over the visible range. The coefficients pass
//! through three anchor wavelengths (one per channel), so the spectrum
//! reproduces the channel values exactly at the anchors. A grid of
//! coefficients lives in a 3D volume in the bindless table; kernels fetch
//! interpolated coefficients from it.

use glam::{Vec3, Vec4};

use crate::device::{Command, Device, TextureSampler, Volume};
use crate::resource::BindlessArray;
use crate::util::Result;

/// Shortest visible wavelength in nm.
pub const VISIBLE_MIN: f32 = 360.0;
/// Longest visible wavelength in nm.
pub const VISIBLE_MAX: f32 = 830.0;
/// Wavelengths carried by one spectral sample.
pub const SPECTRUM_SAMPLES: usize = 4;

/// Wavelengths in nm where the red, green and blue channels are matched.
pub const ANCHOR_WAVELENGTHS: [f32; 3] = [610.0, 545.0, 450.0];

const D65_TEMPERATURE: f32 = 6504.0;

/// Channel values are clamped away from 0 and 1, where the inverse sigmoid
/// diverges.
const CHANNEL_EPSILON: f32 = 1e-3;

/// Four stratified wavelengths with their sampling densities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledWavelengths {
    lambda: Vec4,
    pdf: Vec4,
}

impl SampledWavelengths {
    /// Stratified uniform samples over the visible range, offset by `u`.
    pub fn sample_visible(u: f32) -> Self {
        let range = VISIBLE_MAX - VISIBLE_MIN;
        let lambda = Vec4::from_array(std::array::from_fn(|i| {
            let ui = (u + i as f32 / SPECTRUM_SAMPLES as f32).fract();
            VISIBLE_MIN + ui * range
        }));
        Self {
            lambda,
            pdf: Vec4::splat(1.0 / range),
        }
    }

    /// Explicit wavelengths with uniform density.
    pub fn from_lambdas(lambda: Vec4) -> Self {
        Self {
            lambda,
            pdf: Vec4::splat(1.0 / (VISIBLE_MAX - VISIBLE_MIN)),
        }
    }

    pub fn lambda(&self, i: usize) -> f32 {
        self.lambda[i]
    }

    pub fn lambdas(&self) -> Vec4 {
        self.lambda
    }

    pub fn pdf(&self, i: usize) -> f32 {
        self.pdf[i]
    }

    pub fn dimension(&self) -> usize {
        SPECTRUM_SAMPLES
    }

    /// Evaluate `f` at every wavelength.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Vec4 {
        Vec4::from_array(self.lambda.to_array().map(f))
    }
}

impl Default for SampledWavelengths {
    fn default() -> Self {
        Self::sample_visible(0.0)
    }
}

/// Wavelength mapped to `[0, 1]` over the visible range.
#[inline]
pub fn normalized_wavelength(lambda: f32) -> f32 {
    (lambda - VISIBLE_MIN) / (VISIBLE_MAX - VISIBLE_MIN)
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    if x.is_infinite() {
        return if x > 0.0 { 1.0 } else { 0.0 };
    }
    0.5 + x / (2.0 * (1.0 + x * x).sqrt())
}

#[inline]
fn inverse_sigmoid(y: f32) -> f32 {
    let z = 2.0 * y.clamp(CHANNEL_EPSILON, 1.0 - CHANNEL_EPSILON) - 1.0;
    z / (1.0 - z * z).sqrt()
}

/// Sigmoid of a quadratic in normalized wavelength.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RgbSigmoidPolynomial {
    pub c0: f32,
    pub c1: f32,
    pub c2: f32,
}

impl RgbSigmoidPolynomial {
    pub fn new(c: Vec3) -> Self {
        Self {
            c0: c.x,
            c1: c.y,
            c2: c.z,
        }
    }

    pub fn coefficients(&self) -> Vec3 {
        Vec3::new(self.c0, self.c1, self.c2)
    }

    /// Value at `lambda` nm.
    pub fn eval(&self, lambda: f32) -> f32 {
        let t = normalized_wavelength(lambda);
        sigmoid((self.c0 * t + self.c1) * t + self.c2)
    }

    /// Largest value over the visible range.
    pub fn maximum(&self) -> f32 {
        let mut m = self.eval(VISIBLE_MIN).max(self.eval(VISIBLE_MAX));
        if self.c0 != 0.0 {
            let t = -self.c1 / (2.0 * self.c0);
            if (0.0..=1.0).contains(&t) {
                m = m.max(self.eval(VISIBLE_MIN + t * (VISIBLE_MAX - VISIBLE_MIN)));
            }
        }
        m
    }

    pub fn sample(&self, swl: &SampledWavelengths) -> Vec4 {
        swl.map(|l| self.eval(l))
    }
}

/// Blackbody emission at `lambda` nm for temperature `t` K.
pub fn blackbody(lambda: f32, t: f32) -> f32 {
    const C: f64 = 299_792_458.0;
    const H: f64 = 6.626_070_15e-34;
    const KB: f64 = 1.380_649e-23;
    if t <= 0.0 {
        return 0.0;
    }
    let l = lambda as f64 * 1e-9;
    let le = 2.0 * H * C * C / (l.powi(5) * ((H * C / (l * KB * t as f64)).exp() - 1.0));
    le as f32
}

/// D65 stand-in: a 6504 K blackbody normalized to 1 at its peak.
pub fn cie_illum_d65(lambda: f32) -> f32 {
    let peak = 2.897_772e-3 / D65_TEMPERATURE * 1e9;
    blackbody(lambda, D65_TEMPERATURE) / blackbody(peak, D65_TEMPERATURE)
}

/// Bounded reflectance spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RgbAlbedoSpectrum {
    pub rsp: RgbSigmoidPolynomial,
}

impl RgbAlbedoSpectrum {
    pub fn sample(&self, swl: &SampledWavelengths) -> Vec4 {
        self.rsp.sample(swl)
    }
}

/// Reflectance-shaped spectrum scaled past 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RgbUnboundSpectrum {
    pub rsp: RgbSigmoidPolynomial,
    pub scale: f32,
}

impl RgbUnboundSpectrum {
    pub fn sample(&self, swl: &SampledWavelengths) -> Vec4 {
        self.rsp.sample(swl) * self.scale
    }
}

/// Emission spectrum: an unbound spectrum times the D65 illuminant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RgbIlluminantSpectrum {
    pub rsp: RgbSigmoidPolynomial,
    pub scale: f32,
}

impl RgbIlluminantSpectrum {
    pub fn sample(&self, swl: &SampledWavelengths) -> Vec4 {
        swl.map(|l| self.rsp.eval(l) * self.scale * cie_illum_d65(l))
    }
}

/// Split `rgb` into a reflectance-range color and a scale, so that the
/// largest channel maps to one half.
fn split_scale(rgb: Vec3) -> (Vec3, f32) {
    let scale = 2.0 * rgb.max_element().max(0.0);
    if scale > 0.0 {
        (rgb.max(Vec3::ZERO) / scale, scale)
    } else {
        (Vec3::ZERO, 0.0)
    }
}

/// RGB grid of sigmoid coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb2SpectrumTable {
    resolution: u32,
}

impl Rgb2SpectrumTable {
    /// Grid points per channel.
    pub const RESOLUTION: u32 = 32;

    /// Table for linear sRGB input.
    pub const fn srgb() -> Self {
        Self {
            resolution: Self::RESOLUTION,
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Exact coefficients for a reflectance `rgb` in `[0, 1]`.
    pub fn encode(&self, rgb: Vec3) -> RgbSigmoidPolynomial {
        let [t0, t1, t2] = ANCHOR_WAVELENGTHS.map(normalized_wavelength);
        let [x0, x1, x2] = rgb.to_array().map(inverse_sigmoid);
        // Newton divided differences through (t_i, x_i).
        let f01 = (x1 - x0) / (t1 - t0);
        let f12 = (x2 - x1) / (t2 - t1);
        let f012 = (f12 - f01) / (t2 - t0);
        RgbSigmoidPolynomial {
            c0: f012,
            c1: f01 - f012 * (t0 + t1),
            c2: x0 - f01 * t0 + f012 * t0 * t1,
        }
    }

    /// Exact coefficients and scale for an unbounded `rgb`.
    pub fn encode_unbound(&self, rgb: Vec3) -> (RgbSigmoidPolynomial, f32) {
        let (normalized, scale) = split_scale(rgb);
        (self.encode(normalized), scale)
    }

    /// Texels in x = red, y = green, z = blue order.
    pub fn texels(&self) -> Vec<Vec4> {
        let n = self.resolution;
        let step = 1.0 / (n - 1) as f32;
        let mut texels = Vec::with_capacity((n * n * n) as usize);
        for b in 0..n {
            for g in 0..n {
                for r in 0..n {
                    let rgb = Vec3::new(r as f32, g as f32, b as f32) * step;
                    texels.push(self.encode(rgb).coefficients().extend(0.0));
                }
            }
        }
        texels
    }

    /// Volume holding the grid, plus its upload command.
    pub fn create_volume(&self, device: &Device) -> (Volume, Command) {
        let n = self.resolution;
        let volume = device.create_volume([n, n, n]);
        let upload = volume.copy_from(self.texels());
        (volume, upload)
    }

    /// Sampler the volume must be registered with.
    pub const fn sampler() -> TextureSampler {
        TextureSampler::linear_point_edge()
    }

    fn lookup(&self, bindless: &BindlessArray, index: u32, rgb: Vec3) -> Result<RgbSigmoidPolynomial> {
        let n = self.resolution as f32;
        // Grid point i sits at the centre of texel i.
        let uvw = (rgb.clamp(Vec3::ZERO, Vec3::ONE) * (n - 1.0) + 0.5) / n;
        let c = bindless.tex3d(index)?.sample(uvw);
        Ok(RgbSigmoidPolynomial::new(c.truncate()))
    }

    /// Reflectance coefficients from the volume at bindless slot `index`.
    pub fn decode_albedo(&self, bindless: &BindlessArray, index: u32, rgb: Vec3) -> Result<RgbSigmoidPolynomial> {
        self.lookup(bindless, index, rgb)
    }

    /// Coefficients and scale for an unbounded `rgb`.
    pub fn decode_unbound(&self, bindless: &BindlessArray, index: u32, rgb: Vec3) -> Result<(RgbSigmoidPolynomial, f32)> {
        let (normalized, scale) = split_scale(rgb);
        Ok((self.lookup(bindless, index, normalized)?, scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratified_wavelengths() {
        let swl = SampledWavelengths::sample_visible(0.1);
        for i in 0..swl.dimension() {
            let l = swl.lambda(i);
            assert!((VISIBLE_MIN..VISIBLE_MAX).contains(&l));
            assert!((swl.pdf(i) - 1.0 / 470.0).abs() < 1e-9);
        }
        assert!((swl.lambda(1) - swl.lambda(0) - 117.5).abs() < 1e-3);
    }

    #[test]
    fn test_gray_is_flat() {
        let rsp = Rgb2SpectrumTable::srgb().encode(Vec3::splat(0.5));
        for l in [380.0, 500.0, 700.0] {
            assert!((rsp.eval(l) - 0.5).abs() < 1e-6);
        }
        assert!((rsp.maximum() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_anchors_reproduce_channels() {
        let table = Rgb2SpectrumTable::srgb();
        let rgb = Vec3::new(0.8, 0.3, 0.1);
        let rsp = table.encode(rgb);
        for (lambda, value) in ANCHOR_WAVELENGTHS.iter().zip(rgb.to_array()) {
            assert!((rsp.eval(*lambda) - value).abs() < 1e-3, "{lambda}: {}", rsp.eval(*lambda));
        }
        assert!(rsp.maximum() >= 0.8 - 1e-3);
        assert!(rsp.maximum() < 1.0);
    }

    #[test]
    fn test_volume_decode_matches_encode_on_grid() {
        let device = Device::new();
        let table = Rgb2SpectrumTable::srgb();
        let (volume, upload) = table.create_volume(&device);
        upload.run().unwrap();
        let mut bindless = BindlessArray::new(4);
        let index = bindless.emplace_volume(&volume, Rgb2SpectrumTable::sampler()).unwrap();
        bindless.update().run().unwrap();

        let step = 1.0 / (Rgb2SpectrumTable::RESOLUTION - 1) as f32;
        let rgb = Vec3::new(3.0, 20.0, 31.0) * step;
        let decoded = table.decode_albedo(&bindless, index, rgb).unwrap();
        let exact = table.encode(rgb);
        assert!((decoded.coefficients() - exact.coefficients()).length() < 1e-3);

        let (_, scale) = table.decode_unbound(&bindless, index, Vec3::new(4.0, 1.0, 0.0)).unwrap();
        assert_eq!(scale, 8.0);
    }

    #[test]
    fn test_d65_peaks_at_one() {
        let peak = 2.897_772e-3 / D65_TEMPERATURE * 1e9;
        assert!((cie_illum_d65(peak) - 1.0).abs() < 1e-5);
        assert!(cie_illum_d65(400.0) < 1.0);
        assert!(cie_illum_d65(700.0) < 1.0);
    }

    #[test]
    fn test_illuminant_scales_with_d65() {
        let rsp = Rgb2SpectrumTable::srgb().encode(Vec3::splat(0.5));
        let swl = SampledWavelengths::from_lambdas(Vec4::new(400.0, 500.0, 600.0, 700.0));
        let s = RgbIlluminantSpectrum { rsp, scale: 2.0 }.sample(&swl);
        assert!((s.y - cie_illum_d65(500.0)).abs() < 1e-5);
        let u = RgbUnboundSpectrum { rsp, scale: 2.0 }.sample(&swl);
        assert!((u - Vec4::ONE).length() < 1e-5);
    }
}
