//! Error types for scene compilation and device queries.
//!
//! Every variant is fatal for the scene load that produced it. Soft
//! inconsistencies are reported through `tracing::warn!` instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::tag::TagFamily;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Mesh with no vertices or no triangles
    #[error("Found mesh without vertices or triangles (positions: {positions}, triangles: {triangles})")]
    EmptyMesh { positions: usize, triangles: usize },

    /// Per-vertex attribute count differs from position count
    #[error("Sizes of positions ({positions}) and attributes ({attributes}) mismatch")]
    AttributeCountMismatch { positions: usize, attributes: usize },

    /// Arena has no room left for an allocation
    #[error("Arena '{arena}' exhausted: requested {requested} bytes, {available} available")]
    ArenaExhausted {
        arena: &'static str,
        requested: usize,
        available: usize,
    },

    /// Position and attribute arenas went out of lockstep
    #[error("Position and attribute buffer offsets mismatch ({positions} vs {attributes})")]
    ArenaOffsetMismatch { positions: usize, attributes: usize },

    /// Bindless table is full
    #[error("Bindless {kind} slots exhausted (capacity: {capacity})")]
    BindlessCapacityExceeded { kind: &'static str, capacity: usize },

    /// Mesh buffers did not receive consecutive bindless ids
    #[error("Bindless buffer id {actual} is not consecutive (expected {expected})")]
    BindlessIdNotConsecutive { expected: u32, actual: u32 },

    /// Slot id not registered or not yet committed
    #[error("Invalid bindless {kind} slot {id} (committed: {count})")]
    InvalidBindlessSlot {
        kind: &'static str,
        id: u32,
        count: usize,
    },

    /// Element read past the end of a buffer
    #[error("Buffer read out of bounds: index {index}, length {len}")]
    BufferOutOfBounds { index: usize, len: usize },

    /// Tag space of a polymorphic family is exhausted
    #[error("Too many {family} tags (mask: {mask:#x})")]
    TooManyTags { family: TagFamily, mask: u32 },

    /// Decode requested with a tag that was never assigned
    #[error("Invalid {family} tag: {tag} (registered: {count})")]
    InvalidTag {
        family: TagFamily,
        tag: u32,
        count: usize,
    },

    /// Dispatch reached the default case of a switch that has none
    #[error("Unreachable {family} dispatch for tag {tag}")]
    UnreachableTag { family: TagFamily, tag: u32 },

    /// Value does not fit its bit field
    #[error("Value {value} does not fit the {bits}-bit field '{field}'")]
    FieldOverflow {
        field: &'static str,
        value: u32,
        bits: u32,
    },

    /// Unknown texture category value
    #[error("Invalid texture category {0:#04x}")]
    InvalidTextureCategory(u32),

    /// Accel build referenced a mesh whose build command has not run
    #[error("Mesh #{0} used by acceleration structure before it was built")]
    MeshNotBuilt(u64),

    /// Transform stack discipline was violated
    #[error("Transform stack error: {0}")]
    TransformStack(String),

    /// Instance index out of range
    #[error("Instance index {index} out of bounds (count: {count})")]
    InvalidInstance { index: usize, count: usize },

    /// Feature not supported by the pipeline
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Worker pool could not be created
    #[error("Worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// Asynchronous task ended without producing a value
    #[error("Worker task disconnected before producing a result")]
    WorkerDisconnected,

    /// Image could not be decoded
    #[error("Image '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Configuration (de)serialization error
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an unsupported-feature error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::AttributeCountMismatch {
            positions: 4,
            attributes: 3,
        };
        assert!(e.to_string().contains("4"));
        assert!(e.to_string().contains("3"));

        let e = Error::TooManyTags {
            family: TagFamily::Surface,
            mask: 0xfff,
        };
        assert!(e.to_string().contains("surface"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
