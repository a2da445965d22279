//! Pipeline configuration.
//!
//! All capacities the pipeline allocates up front live here. Defaults match
//! a typical production scene; a JSON file may override any subset of them.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::accel::AccelBuildHint;
use crate::util::Result;

/// Default number of slots per bindless resource kind.
pub const DEFAULT_BINDLESS_CAPACITY: usize = 500_000;
/// Default element capacity of each vertex arena.
pub const DEFAULT_VERTEX_ARENA_ELEMENTS: usize = 1024 * 1024;
/// Default byte capacity of the general-purpose arena.
pub const DEFAULT_GENERAL_ARENA_BYTES: usize = 16 * 1024 * 1024;
/// Dynamic instance count from which updates fan out to the worker pool.
pub const DEFAULT_DYNAMIC_UPDATE_THRESHOLD: usize = 128;
/// Seed of the geometry content hash chain.
pub const DEFAULT_MESH_HASH_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Capacities and tuning knobs for [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Slots per bindless kind (buffers, 2D textures, 3D textures).
    pub bindless_capacity: usize,
    /// Vertices the position and attribute arenas can hold.
    pub vertex_arena_elements: usize,
    /// Bytes in the arena used for alias tables and plugin parameters.
    pub general_arena_bytes: usize,
    /// Below this many dynamic instances, updates run on the calling thread.
    pub dynamic_update_threshold: usize,
    /// Seed of the mesh content hash.
    pub mesh_hash_seed: u64,
    /// Build hint for the top-level acceleration structure.
    pub accel_hint: AccelBuildHint,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bindless_capacity: DEFAULT_BINDLESS_CAPACITY,
            vertex_arena_elements: DEFAULT_VERTEX_ARENA_ELEMENTS,
            general_arena_bytes: DEFAULT_GENERAL_ARENA_BYTES,
            dynamic_update_threshold: DEFAULT_DYNAMIC_UPDATE_THRESHOLD,
            mesh_hash_seed: DEFAULT_MESH_HASH_SEED,
            accel_hint: AccelBuildHint::FastTrace,
        }
    }
}

impl PipelineConfig {
    /// Parse from a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write as JSON to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }

    /// Small capacities for unit tests and tools.
    pub fn compact() -> Self {
        Self {
            bindless_capacity: 4096,
            vertex_arena_elements: 64 * 1024,
            general_arena_bytes: 1024 * 1024,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = PipelineConfig::from_json(r#"{ "dynamic_update_threshold": 4 }"#).unwrap();
        assert_eq!(cfg.dynamic_update_threshold, 4);
        assert_eq!(cfg.bindless_capacity, DEFAULT_BINDLESS_CAPACITY);
        assert_eq!(cfg.accel_hint, AccelBuildHint::FastTrace);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let cfg = PipelineConfig {
            accel_hint: AccelBuildHint::FastBuild,
            ..PipelineConfig::compact()
        };
        cfg.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            PipelineConfig::from_json("{ not json"),
            Err(crate::Error::Json(_))
        ));
    }
}
