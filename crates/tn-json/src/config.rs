use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::CodecError;

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1_048_576;

/// What a reader does when the same position is written twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    LastWins,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    /// Write a level as `[[key, value], ...]` when one of its keys has no string form.
    pub complex_map_keys: bool,
    pub duplicates: DuplicatePolicy,
    pub pretty: bool,
    pub max_payload_bytes: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            complex_map_keys: false,
            duplicates: DuplicatePolicy::LastWins,
            pretty: false,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl CodecConfig {
    pub fn from_json_str(input: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    #[must_use]
    pub fn with_complex_map_keys(mut self, enabled: bool) -> Self {
        self.complex_map_keys = enabled;
        self
    }

    #[must_use]
    pub fn with_duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    #[must_use]
    pub fn with_pretty(mut self, enabled: bool) -> Self {
        self.pretty = enabled;
        self
    }

    #[must_use]
    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }
}
