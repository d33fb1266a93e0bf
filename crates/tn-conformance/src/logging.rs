use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::KeyMode;

/// One replayable record per conformance case, written as a JSON line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredCaseLog {
    pub suite: &'static str,
    pub fixture_id: &'static str,
    pub scenario_id: String,
    pub mode: &'static str,
    pub replay_command: String,
    pub outcome: &'static str,
    pub reason_code: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_fields: BTreeMap<String, Value>,
}

impl StructuredCaseLog {
    #[must_use]
    pub fn new(
        suite: &'static str,
        fixture_id: &'static str,
        case_name: &str,
        mode: KeyMode,
        replay_command: String,
        outcome: &'static str,
        reason_code: &'static str,
    ) -> Self {
        Self {
            suite,
            fixture_id,
            scenario_id: format!("{suite}/{}:{case_name}", mode_label(mode)),
            mode: mode_label(mode),
            replay_command,
            outcome,
            reason_code,
            extra_fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_extra_fields(mut self, extra_fields: BTreeMap<String, Value>) -> Self {
        self.extra_fields.extend(extra_fields);
        self
    }

    pub fn to_json_line(&self) -> Result<String, String> {
        serde_json::to_string(self)
            .map_err(|error| format!("failed to serialize case log {}: {error}", self.scenario_id))
    }

    pub fn emit(&self) {
        info!(
            scenario_id = %self.scenario_id,
            outcome = self.outcome,
            reason_code = self.reason_code,
            "conformance case"
        );
    }
}

#[must_use]
pub fn mode_label(mode: KeyMode) -> &'static str {
    match mode {
        KeyMode::Plain => "plain",
        KeyMode::Complex => "complex",
    }
}
