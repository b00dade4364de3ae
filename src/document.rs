//! Parsed inbound XML documents.

use std::fmt;
use std::str::FromStr;
use sxd_document::dom::{ChildOfRoot, Document};
use sxd_document::{parser, Package};

/// A parsed header or body document.
///
/// Documents are not thread-safe; parse them on the thread that evaluates
/// them.
pub struct XmlDocument {
    package: Package,
}

impl XmlDocument {
    /// Parse an XML string.
    pub fn parse(xml: &str) -> Result<Self, DocumentError> {
        if xml.trim().is_empty() {
            return Err(DocumentError::Empty);
        }

        let package = parser::parse(xml).map_err(|e| DocumentError::Malformed(format!("{e:?}")))?;
        Ok(Self { package })
    }

    /// Borrow the DOM for XPath evaluation.
    pub fn as_document(&self) -> Document<'_> {
        self.package.as_document()
    }

    /// Local name of the document element.
    pub fn root_name(&self) -> Option<String> {
        self.as_document()
            .root()
            .children()
            .into_iter()
            .find_map(|child| match child {
                ChildOfRoot::Element(e) => Some(e.name().local_part().to_string()),
                _ => None,
            })
    }
}

impl FromStr for XmlDocument {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlDocument")
            .field("root", &self.root_name())
            .finish()
    }
}

/// Errors raised while parsing inbound XML.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Empty XML document")]
    Empty,

    #[error("Malformed XML document: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let doc = XmlDocument::parse(r#"<header><Request value="lsr_order"/></header>"#).unwrap();
        assert_eq!(doc.root_name().as_deref(), Some("header"));
    }

    #[test]
    fn test_parse_with_declaration() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- inbound order -->
<lsr_order><PON>123</PON></lsr_order>"#;
        let doc: XmlDocument = xml.parse().unwrap();
        assert_eq!(doc.root_name().as_deref(), Some("lsr_order"));
    }

    #[test]
    fn test_malformed_document() {
        let err = XmlDocument::parse("<header><Request></header>").unwrap_err();
        assert!(matches!(err, DocumentError::Malformed(_)));
    }

    #[test]
    fn test_empty_document() {
        assert!(matches!(XmlDocument::parse("  "), Err(DocumentError::Empty)));
    }
}
