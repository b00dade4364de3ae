//! Configuration types for the rule dispatcher.

use serde::{Deserialize, Serialize};

/// Main configuration for the rule dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Configuration version
    pub version: String,
    /// Global settings
    pub settings: Settings,
    /// Categories to preload when validating
    pub categories: Vec<String>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: Settings::default(),
            categories: vec![],
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Root directory of the rule repository (one sub-directory per category)
    pub repository_root: String,
    /// Glob pattern a file name must match to be loaded as a rule file
    pub file_pattern: String,
    /// Descend into sub-categories (nested directories)
    pub include_subcategories: bool,
    /// Header element holding the request name
    pub request_node: String,
    /// Attribute on `request_node` holding the request name
    pub request_attribute: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repository_root: "./repository".to_string(),
            file_pattern: "*.xml".to_string(),
            include_subcategories: false,
            request_node: "Request".to_string(),
            request_attribute: "value".to_string(),
        }
    }
}
