//! Reference implementations of the scene traits.
//!
//! - [`LambertSurface`] - ideal diffuse reflector
//! - [`DiffuseLight`] - area light with uniform emission
//! - [`ConstantGeneric`] / [`ConstantColor`] / [`ConstantIlluminant`] -
//!   constant textures of each category
//! - [`ImageTexture`] - gamma-decoded image, loaded on the worker pool
//! - [`UniformLightSampler`] - picks every light with equal probability
//! - [`PinholeCamera`] / [`ConstantEnvironment`]

mod constant;
mod diffuse_light;
mod environment;
mod image_texture;
mod lambert;
mod pinhole;
mod uniform_light_sampler;

pub use constant::{ConstantColor, ConstantGeneric, ConstantIlluminant};
pub use diffuse_light::DiffuseLight;
pub use environment::ConstantEnvironment;
pub use image_texture::ImageTexture;
pub use lambert::LambertSurface;
pub use pinhole::PinholeCamera;
pub use uniform_light_sampler::UniformLightSampler;
