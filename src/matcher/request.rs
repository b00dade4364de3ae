//! Request name extraction from the message header.

use super::{MatcherError, XPathCondition};
use crate::config::Settings;
use crate::document::XmlDocument;

/// Reads the request name from a header such as
/// `<header><Request value="lsr_order"/></header>`.
#[derive(Debug, Clone)]
pub struct RequestNameMatcher {
    node: String,
    attribute: String,
    lookup: XPathCondition,
}

impl RequestNameMatcher {
    /// Build from the configured node and attribute names.
    pub fn compile(settings: &Settings) -> Result<Self, MatcherError> {
        let node = settings.request_node.trim();
        let attribute = settings.request_attribute.trim();
        let lookup = XPathCondition::compile(&format!("string(/*/{node}/@{attribute})"))?;

        Ok(Self {
            node: node.to_string(),
            attribute: attribute.to_string(),
            lookup,
        })
    }

    /// The request name, or `None` when the attribute is absent or empty.
    pub fn extract(&self, header: &XmlDocument) -> Result<Option<String>, MatcherError> {
        let value = self.lookup.evaluate_string(header)?;
        let value = value.trim();

        if value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(value.to_string()))
        }
    }

    /// Human-readable location of the request name, e.g. `Request@value`.
    pub fn location(&self) -> String {
        format!("{}@{}", self.node, self.attribute)
    }
}
