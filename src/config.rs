use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Engine-wide tunables. Every field has a default so partial JSON documents load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Columns a container is split into when deriving `unitW`.
    pub column_count: u32,
    /// Upper bound on follow-up actions processed for one dispatch.
    pub max_cascade: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            column_count: 64,
            max_cascade: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}
