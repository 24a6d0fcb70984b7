//! # Config Module
//!
//! Runtime tuning knobs for the simulation and meshing loops. Every field has a default, so a
//! config document only needs to name the values it changes.
//!
//! ```json
//! { "view_distance": 12, "mesh_workers": 4, "generation": "checkerboard" }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::engine_state::voxels::tasks::chunk_generation_task::GenerationMethod;
use crate::error::EngineResult;

/// Tuning parameters for an engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Radius in chunks around any player inside which chunks are ticked.
    pub simulation_distance: i32,
    /// Radius in chunks around the viewer inside which chunks are meshed and drawn.
    pub view_distance: i32,
    /// Number of background mesh builders. Zero builds meshes inline on the calling thread.
    pub mesh_workers: usize,
    /// Upper bound on mesh builds scheduled per frame.
    pub max_mesh_builds_per_frame: usize,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// How new chunks are filled.
    pub generation: GenerationMethod,
    /// Seed of the terrain noise.
    pub world_seed: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            simulation_distance: 4,
            view_distance: 8,
            mesh_workers: 2,
            max_mesh_builds_per_frame: 16,
            tick_rate: 20,
            generation: GenerationMethod::Perlin,
            world_seed: 0,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON config document.
    pub fn from_json_str(source: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&source)?;
        log::info!("Loaded engine config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Duration of a single simulation tick.
    pub fn tick_interval(&self) -> web_time::Duration {
        web_time::Duration::from_nanos(1_000_000_000 / self.tick_rate.max(1) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_document_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "view_distance": 3 }"#).unwrap();
        assert_eq!(config.view_distance, 3);
        assert_eq!(config.simulation_distance, EngineConfig::default().simulation_distance);
        assert_eq!(config.mesh_workers, 2);
        assert_eq!(config.generation, GenerationMethod::Perlin);
    }

    #[test]
    fn generation_method_is_named_in_lowercase() {
        let config =
            EngineConfig::from_json_str(r#"{ "generation": "empty", "world_seed": 9 }"#).unwrap();
        assert_eq!(config.generation, GenerationMethod::Empty);
        assert_eq!(config.world_seed, 9);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "mesh_workers": 0, "tick_rate": 10 }}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.mesh_workers, 0);
        assert_eq!(config.tick_interval(), web_time::Duration::from_millis(100));
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ view_distance: }"),
            Err(crate::error::EngineError::ConfigParse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            EngineConfig::load("/definitely/not/here.json"),
            Err(crate::error::EngineError::ConfigIo(_))
        ));
    }
}
