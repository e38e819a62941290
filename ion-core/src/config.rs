//! Analysis Configuration
//!
//! Knobs for the liveness engine, loadable from JSON.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the local phase sizes each block's register sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SetSizing {
    /// Highest register id referenced in the block, plus one
    #[default]
    PerBlock,
    /// Highest register id referenced in the function, plus one
    FunctionWide,
}

/// Block visiting order inside one solver pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IterationOrder {
    /// Reverse of the reverse postorder: successors before predecessors
    #[default]
    Postorder,
    /// Last block first
    ReverseProgram,
    /// Source order
    Program,
}

impl std::str::FromStr for IterationOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "postorder" => Ok(Self::Postorder),
            "reverse-program" => Ok(Self::ReverseProgram),
            "program" => Ok(Self::Program),
            other => Err(format!(
                "unknown iteration order '{other}' (expected postorder, reverse-program or program)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Sizing policy for the local phase's sets
    pub sizing: SetSizing,
    /// Visiting order for the global phase
    pub order: IterationOrder,
}

impl AnalysisConfig {
    /// Load a configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AnalysisConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        log::debug!("loaded analysis config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn with_order(mut self, order: IterationOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_sizing(mut self, sizing: SetSizing) -> Self {
        self.sizing = sizing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AnalysisConfig = serde_json::from_str(r#"{ "order": "reverse-program" }"#).unwrap();
        assert_eq!(config.order, IterationOrder::ReverseProgram);
        assert_eq!(config.sizing, SetSizing::PerBlock);
    }

    #[test]
    fn test_order_from_str() {
        assert_eq!("program".parse::<IterationOrder>(), Ok(IterationOrder::Program));
        assert!("random".parse::<IterationOrder>().is_err());
    }

    #[test]
    fn test_load_missing_file_fails_with_context() {
        let err = AnalysisConfig::load(Path::new("/nonexistent/ion.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
