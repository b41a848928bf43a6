//! Consistency engine configuration

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on repeated auto-fix passes before giving up on a fixed point
    pub max_autofix_passes: usize,
    /// Run the on-change repairs as part of every on-load pass
    pub on_change_after_load: bool,
    /// Scan tables on scoped threads; results are sorted either way
    pub parallel_scan: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_autofix_passes: 8,
            on_change_after_load: true,
            parallel_scan: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
