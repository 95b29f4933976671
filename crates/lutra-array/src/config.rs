//! Bespoke array configuration

use serde::{Deserialize, Serialize};

/// Sampling configuration for logging arrays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BespokeConfig {
    /// Wrap one in this many arrays per call site (default: 1, 0 disables)
    pub emit_sample_rate: u64,
    /// Test mode: ignore the sample rate (default: false)
    pub test_array_likes: bool,
    /// In test mode, only wrap on odd request ids (default: false)
    pub retranslate_all: bool,
}

impl Default for BespokeConfig {
    fn default() -> Self {
        Self {
            emit_sample_rate: 1,
            test_array_likes: false,
            retranslate_all: false,
        }
    }
}

impl BespokeConfig {
    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
