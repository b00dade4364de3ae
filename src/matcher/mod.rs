//! Rule condition matchers.

mod request;
mod xpath;

pub use request::RequestNameMatcher;
pub use xpath::{invalidate_compiled, XPathCondition};

use crate::context::EvaluationContext;
use crate::rule::RuleConfig;

/// Trait for checking a condition against an inbound message.
pub trait Matcher {
    /// Check if this matcher matches the given context.
    fn matches(&self, ctx: &EvaluationContext<'_>) -> Result<bool, MatcherError>;

    /// Get the matcher name for debugging.
    fn name(&self) -> &str;
}

/// A rule matches when its XPath holds on the document its apply-on flag
/// selects.
impl Matcher for RuleConfig {
    fn matches(&self, ctx: &EvaluationContext<'_>) -> Result<bool, MatcherError> {
        XPathCondition::compile(self.xpath())?.evaluate_boolean(ctx.document(self.apply_on()))
    }

    fn name(&self) -> &str {
        RuleConfig::name(self)
    }
}

/// Errors that can occur while compiling or evaluating conditions.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("Empty XPath expression")]
    EmptyExpression,

    #[error("Invalid XPath expression '{expression}': {message}")]
    Compile { expression: String, message: String },

    #[error("Failed to evaluate XPath expression '{expression}': {message}")]
    Evaluate { expression: String, message: String },
}
