//! Evaluation context for a single inbound message.

use crate::document::XmlDocument;
use crate::rule::ApplyOn;

/// The header/body pair a rule list is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Category the request is evaluated in
    pub category: &'a str,
    /// Request name read from the header
    pub request_name: &'a str,
    /// Parsed header document
    pub header: &'a XmlDocument,
    /// Parsed body document
    pub body: &'a XmlDocument,
}

impl<'a> EvaluationContext<'a> {
    /// Create a new evaluation context.
    pub fn new(
        category: &'a str,
        request_name: &'a str,
        header: &'a XmlDocument,
        body: &'a XmlDocument,
    ) -> Self {
        Self {
            category,
            request_name,
            header,
            body,
        }
    }

    /// The document a rule with the given target is evaluated against.
    pub fn document(&self, apply_on: ApplyOn) -> &'a XmlDocument {
        match apply_on {
            ApplyOn::Header => self.header,
            ApplyOn::Body => self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_selection() {
        let header = XmlDocument::parse(r#"<header><Request value="r"/></header>"#).unwrap();
        let body = XmlDocument::parse("<order/>").unwrap();
        let ctx = EvaluationContext::new("routing", "r", &header, &body);

        assert_eq!(
            ctx.document(ApplyOn::Header).root_name().as_deref(),
            Some("header")
        );
        assert_eq!(
            ctx.document(ApplyOn::Body).root_name().as_deref(),
            Some("order")
        );
    }
}
