//! Graph Configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to load a [`GraphConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON or has a field of the wrong type.
    #[error("invalid graph configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tunables for a [`Graph`](crate::Graph).
///
/// Every field has a default, so a partial JSON document is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Prefix used by `render_address` for sheets without a registered name.
    pub sheet_label_prefix: String,

    /// Run a full cycle check on the first pass after `initialize`.
    pub cycle_check_on_initialize: bool,

    /// Drop cell nodes that are left without edges by a dependency reset.
    pub prune_isolated_cells: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            sheet_label_prefix: "Sheet".to_owned(),
            cycle_check_on_initialize: true,
            prune_isolated_cells: true,
        }
    }
}

impl GraphConfig {
    /// Load a configuration from a JSON object. Missing fields take their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = GraphConfig::from_json(r#"{ "prune_isolated_cells": false }"#).unwrap();
        assert!(!config.prune_isolated_cells);
        assert!(config.cycle_check_on_initialize);
        assert_eq!(config.sheet_label_prefix, "Sheet");
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = GraphConfig::from_json("{ nope").unwrap_err();
        assert!(err.to_string().starts_with("invalid graph configuration"));
    }
}
