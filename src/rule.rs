//! Parsed rule definitions.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Output properties selected by a matching rule.
pub type OutputProperties = BTreeMap<String, String>;

/// Which inbound document a rule's XPath is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOn {
    Header,
    #[default]
    Body,
}

impl FromStr for ApplyOn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "header" => Ok(ApplyOn::Header),
            "body" => Ok(ApplyOn::Body),
            other => Err(format!("expected 'header' or 'body', got '{other}'")),
        }
    }
}

impl fmt::Display for ApplyOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyOn::Header => f.write_str("header"),
            ApplyOn::Body => f.write_str("body"),
        }
    }
}

/// A single conditional rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleConfig {
    name: String,
    apply_on: ApplyOn,
    xpath: String,
    outputs: OutputProperties,
}

impl RuleConfig {
    pub fn new(
        name: impl Into<String>,
        apply_on: ApplyOn,
        xpath: impl Into<String>,
        outputs: OutputProperties,
    ) -> Self {
        Self {
            name: name.into(),
            apply_on,
            xpath: xpath.into(),
            outputs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply_on(&self) -> ApplyOn {
        self.apply_on
    }

    /// XPath boolean condition.
    pub fn xpath(&self) -> &str {
        &self.xpath
    }

    pub fn outputs(&self) -> &OutputProperties {
        &self.outputs
    }
}

/// All rules for one request type, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestConfig {
    name: String,
    source: String,
    rules: Vec<RuleConfig>,
}

impl RequestConfig {
    /// The request name is lower-cased for lookup.
    pub fn new(name: &str, source: impl Into<String>, rules: Vec<RuleConfig>) -> Self {
        Self {
            name: name.to_lowercase(),
            source: source.into(),
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the rules were parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn rules(&self) -> &[RuleConfig] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
