//! Pass configuration, loadable from TOML.
//!
//! ```toml
//! [validation]
//! auto_quote = true
//!
//! [evaluator]
//! max_depth = 256
//! ```
//!
//! Every key is optional; missing keys take their default value.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// Wrap lambda arguments in a quote when their parameter expects a tree.
    pub auto_quote: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { auto_quote: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluatorConfig {
    /// Deepest nesting of node evaluations before giving up.
    pub max_depth: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self { max_depth: 256 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReduceConfig {
    pub validation: ValidationConfig,
    pub evaluator: EvaluatorConfig,
}

impl ReduceConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Self::parse(source, "<string>")
    }

    /// Load a configuration from a TOML file.
    pub fn load_from_toml(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source, &path.display().to_string())
    }

    fn parse(source: &str, file: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse {
            source: e,
            file: file.to_string(),
        })
    }
}
