//! Mesh layouts, area-sampling tables and the deduplicating mesh cache.

mod alias;
mod cache;
mod mesh;

pub use alias::{create_alias_table, sample_alias_table, AliasEntry};
pub use cache::{mesh_key, triangle_weights, MeshCache};
pub use mesh::{AlphaSource, MeshData, MeshGeometry, MeshKey, Triangle, VertexAttribute};
