//! Utility types shared by every module.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - Math type re-exports from glam
//! - [`init_tracing`] - Log subscriber setup for binaries and tests

mod error;
mod logging;
mod math;

pub use error::*;
pub use logging::*;
pub use math::*;
