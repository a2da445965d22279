//! Bit-packed records shared with kernels.
//!
//! [`InstanceHandle`] is one 16-byte entry of the instance table and
//! [`TextureHandle`] is the encoded form of a texture. Packing goes through
//! named functions that reject values not fitting their field, and the field
//! widths are checked against each other at compile time.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use half::f16;

use crate::config::DEFAULT_BINDLESS_CAPACITY;
use crate::tag::TagFamily;
use crate::util::{Error, Result, Vec3};

/// Width of the surface tag field.
pub const SURFACE_TAG_BITS: u32 = 12;
/// Width of the light tag field.
pub const LIGHT_TAG_BITS: u32 = 12;
/// Width of the shape property flag field.
pub const PROPERTY_BITS: u32 = 8;
/// Width of the texture tag field.
pub const TEXTURE_TAG_BITS: u32 = 8;

pub const SURFACE_TAG_MASK: u32 = (1 << SURFACE_TAG_BITS) - 1;
pub const LIGHT_TAG_MASK: u32 = (1 << LIGHT_TAG_BITS) - 1;
pub const PROPERTY_MASK: u32 = (1 << PROPERTY_BITS) - 1;
pub const TEXTURE_TAG_MASK: u32 = (1 << TEXTURE_TAG_BITS) - 1;

bitflags! {
    /// Per-instance flags in the low bits of the alpha word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShapeProperties: u32 {
        const TWO_SIDED = 1 << 0;
        const HAS_SURFACE = 1 << 1;
        const HAS_LIGHT = 1 << 2;
        const CONSTANT_ALPHA = 1 << 3;
    }
}

const _: () = assert!(ShapeProperties::all().bits() <= PROPERTY_MASK);
// Half-float alpha must fit the alpha field.
const _: () = assert!(u16::BITS <= 32 - PROPERTY_BITS);
// Buffer ids stored next to a tag must cover the default bindless capacity.
const _: () = assert!(DEFAULT_BINDLESS_CAPACITY as u64 <= 1u64 << (32 - SURFACE_TAG_BITS));
const _: () = assert!(DEFAULT_BINDLESS_CAPACITY as u64 <= 1u64 << (32 - LIGHT_TAG_BITS));
const _: () = assert!(std::mem::size_of::<InstanceHandle>() == 16);

/// Shift `value` above a `low_bits` wide field, checking that it fits.
fn pack(field: &'static str, high: u32, low: u32, low_bits: u32) -> Result<u32> {
    let high_bits = 32 - low_bits;
    if high >= 1 << high_bits {
        return Err(Error::FieldOverflow {
            field,
            value: high,
            bits: high_bits,
        });
    }
    let low_mask = (1 << low_bits) - 1;
    if low > low_mask {
        return Err(Error::FieldOverflow {
            field,
            value: low,
            bits: low_bits,
        });
    }
    Ok(high << low_bits | low)
}

/// Pack a surface parameter buffer id with its tag.
pub fn encode_surface(buffer_id: u32, tag: u32) -> Result<u32> {
    check_tag(TagFamily::Surface, tag)?;
    pack("surface_buffer_id", buffer_id, tag, SURFACE_TAG_BITS)
}

/// Pack a light parameter buffer id with its tag.
pub fn encode_light(buffer_id: u32, tag: u32) -> Result<u32> {
    check_tag(TagFamily::Light, tag)?;
    pack("light_buffer_id", buffer_id, tag, LIGHT_TAG_BITS)
}

/// Pack the alpha field (texture id or half bits) with property flags.
pub fn encode_alpha_and_properties(alpha: u32, properties: ShapeProperties) -> Result<u32> {
    pack("alpha", alpha, properties.bits(), PROPERTY_BITS)
}

/// Bits of `alpha` as an IEEE half, for the alpha field.
pub fn encode_constant_alpha(alpha: f32) -> u32 {
    f16::from_f32(alpha).to_bits() as u32
}

fn check_tag(family: TagFamily, tag: u32) -> Result<()> {
    if tag > family.mask() {
        return Err(Error::TooManyTags {
            family,
            mask: family.mask(),
        });
    }
    Ok(())
}

/// One entry of the instance table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct InstanceHandle {
    pub buffer_id_base: u32,
    pub surface_buffer_id_and_tag: u32,
    pub light_buffer_id_and_tag: u32,
    pub alpha_texture_id_and_properties: u32,
}

impl InstanceHandle {
    /// Offset of the position buffer from `buffer_id_base`.
    pub const POSITION_BUFFER: u32 = 0;
    pub const ATTRIBUTE_BUFFER: u32 = 1;
    pub const TRIANGLE_BUFFER: u32 = 2;
    pub const ALIAS_TABLE_BUFFER: u32 = 3;
    pub const PDF_BUFFER: u32 = 4;
    /// Consecutive buffers each mesh registers.
    pub const MESH_BUFFER_COUNT: u32 = 5;

    pub fn position_buffer_id(&self) -> u32 {
        self.buffer_id_base + Self::POSITION_BUFFER
    }

    pub fn attribute_buffer_id(&self) -> u32 {
        self.buffer_id_base + Self::ATTRIBUTE_BUFFER
    }

    pub fn triangle_buffer_id(&self) -> u32 {
        self.buffer_id_base + Self::TRIANGLE_BUFFER
    }

    pub fn alias_table_buffer_id(&self) -> u32 {
        self.buffer_id_base + Self::ALIAS_TABLE_BUFFER
    }

    pub fn pdf_buffer_id(&self) -> u32 {
        self.buffer_id_base + Self::PDF_BUFFER
    }

    pub fn surface_tag(&self) -> u32 {
        self.surface_buffer_id_and_tag & SURFACE_TAG_MASK
    }

    pub fn surface_buffer_id(&self) -> u32 {
        self.surface_buffer_id_and_tag >> SURFACE_TAG_BITS
    }

    pub fn light_tag(&self) -> u32 {
        self.light_buffer_id_and_tag & LIGHT_TAG_MASK
    }

    pub fn light_buffer_id(&self) -> u32 {
        self.light_buffer_id_and_tag >> LIGHT_TAG_BITS
    }

    pub fn properties(&self) -> ShapeProperties {
        ShapeProperties::from_bits_truncate(self.alpha_texture_id_and_properties & PROPERTY_MASK)
    }

    pub fn two_sided(&self) -> bool {
        self.properties().contains(ShapeProperties::TWO_SIDED)
    }

    pub fn has_surface(&self) -> bool {
        self.properties().contains(ShapeProperties::HAS_SURFACE)
    }

    pub fn has_light(&self) -> bool {
        self.properties().contains(ShapeProperties::HAS_LIGHT)
    }

    pub fn has_constant_alpha(&self) -> bool {
        self.properties().contains(ShapeProperties::CONSTANT_ALPHA)
    }

    /// Bindless texture id of the alpha map. Meaningless with constant alpha.
    pub fn alpha_texture_id(&self) -> u32 {
        self.alpha_texture_id_and_properties >> PROPERTY_BITS
    }

    /// Baked alpha value. Meaningless without constant alpha.
    pub fn constant_alpha(&self) -> f32 {
        f16::from_bits((self.alpha_texture_id_and_properties >> PROPERTY_BITS) as u16).to_f32()
    }
}

/// Texture category, which selects the tag family and post-processing.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureCategory {
    Generic = 0,
    Color = 1,
    Illuminant = 2,
}

impl TextureCategory {
    /// Tag family of textures in this category.
    pub const fn family(self) -> TagFamily {
        match self {
            TextureCategory::Generic => TagFamily::GenericTexture,
            TextureCategory::Color => TagFamily::ColorTexture,
            TextureCategory::Illuminant => TagFamily::IlluminantTexture,
        }
    }
}

impl TryFrom<u32> for TextureCategory {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(TextureCategory::Generic),
            1 => Ok(TextureCategory::Color),
            2 => Ok(TextureCategory::Illuminant),
            other => Err(Error::InvalidTextureCategory(other)),
        }
    }
}

/// Encoded texture: implementation tag, optional texture id, and inline
/// values for constant textures.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct TextureHandle {
    pub id_and_tag: u32,
    pub v: [f32; 3],
    pub alpha: f32,
}

impl TextureHandle {
    /// Handle of a texture whose value is stored inline.
    pub fn encode_constant(tag: u32, v: Vec3, alpha: f32) -> Result<Self> {
        Ok(Self {
            id_and_tag: pack("texture_tag", 0, tag, TEXTURE_TAG_BITS)?,
            v: v.to_array(),
            alpha,
        })
    }

    /// Handle of a texture backed by bindless slot `texture_id`.
    pub fn encode_texture(tag: u32, texture_id: u32, v: Vec3) -> Result<Self> {
        Ok(Self {
            id_and_tag: pack("texture_id", texture_id, tag, TEXTURE_TAG_BITS)?,
            v: v.to_array(),
            alpha: 1.0,
        })
    }

    pub fn tag(&self) -> u32 {
        self.id_and_tag & TEXTURE_TAG_MASK
    }

    pub fn texture_id(&self) -> u32 {
        self.id_and_tag >> TEXTURE_TAG_BITS
    }

    pub fn v(&self) -> Vec3 {
        Vec3::from_array(self.v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_light_fields() {
        let h = InstanceHandle {
            buffer_id_base: 10,
            surface_buffer_id_and_tag: encode_surface(1234, 7).unwrap(),
            light_buffer_id_and_tag: encode_light(99, SURFACE_TAG_MASK).unwrap(),
            alpha_texture_id_and_properties: 0,
        };
        assert_eq!(h.surface_buffer_id(), 1234);
        assert_eq!(h.surface_tag(), 7);
        assert_eq!(h.light_buffer_id(), 99);
        assert_eq!(h.light_tag(), LIGHT_TAG_MASK);
        assert_eq!(h.pdf_buffer_id(), 14);
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert!(matches!(
            encode_surface(1 << 20, 0),
            Err(Error::FieldOverflow { bits: 20, .. })
        ));
        assert!(matches!(
            encode_light(0, LIGHT_TAG_MASK + 1),
            Err(Error::TooManyTags { family: TagFamily::Light, .. })
        ));
        assert!(encode_alpha_and_properties(1 << 24, ShapeProperties::empty()).is_err());
        assert!(TextureHandle::encode_texture(0, 1 << 24, Vec3::ZERO).is_err());
        assert!(TextureHandle::encode_constant(TEXTURE_TAG_MASK + 1, Vec3::ZERO, 1.0).is_err());
    }

    #[test]
    fn test_constant_alpha() {
        let props = ShapeProperties::CONSTANT_ALPHA | ShapeProperties::TWO_SIDED;
        let h = InstanceHandle {
            alpha_texture_id_and_properties: encode_alpha_and_properties(encode_constant_alpha(0.5), props)
                .unwrap(),
            ..Default::default()
        };
        assert!(h.has_constant_alpha());
        assert!(h.two_sided());
        assert!(!h.has_surface());
        assert_eq!(h.constant_alpha(), 0.5);
    }

    #[test]
    fn test_alpha_texture() {
        let h = InstanceHandle {
            alpha_texture_id_and_properties: encode_alpha_and_properties(42, ShapeProperties::HAS_LIGHT)
                .unwrap(),
            ..Default::default()
        };
        assert!(!h.has_constant_alpha());
        assert!(h.has_light());
        assert_eq!(h.alpha_texture_id(), 42);
    }

    #[test]
    fn test_texture_handle() {
        let h = TextureHandle::encode_texture(3, 77, Vec3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(h.tag(), 3);
        assert_eq!(h.texture_id(), 77);
        assert_eq!(h.v(), Vec3::new(1.0, 2.0, 3.0));
        let c = TextureHandle::encode_constant(1, Vec3::ONE, 0.25).unwrap();
        assert_eq!(c.tag(), 1);
        assert_eq!(c.texture_id(), 0);
        assert_eq!(c.alpha, 0.25);
    }

    #[test]
    fn test_texture_category() {
        assert_eq!(TextureCategory::try_from(1).unwrap(), TextureCategory::Color);
        assert!(matches!(
            TextureCategory::try_from(9),
            Err(Error::InvalidTextureCategory(9))
        ));
        assert_eq!(TextureCategory::Illuminant.family(), TagFamily::IlluminantTexture);
    }
}
