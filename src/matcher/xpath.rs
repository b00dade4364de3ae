//! XPath condition evaluation.

use super::MatcherError;
use crate::document::XmlDocument;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use sxd_xpath::{Context, Factory, XPath};

/// Bumped by [`invalidate_compiled`]; a thread whose cache is older drops it.
static GENERATION: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Compiled expressions keyed by source text. `XPath` is not `Send`, so
    /// every thread compiles its own copy.
    static COMPILED: RefCell<CompiledCache> = RefCell::new(CompiledCache::default());
}

#[derive(Default)]
struct CompiledCache {
    generation: u64,
    expressions: HashMap<String, Rc<XPath>>,
}

/// Discard every thread's compiled expressions. Each thread clears its copy
/// on its next lookup.
pub fn invalidate_compiled() {
    GENERATION.fetch_add(1, Ordering::SeqCst);
}

/// An XPath expression evaluated against a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathCondition {
    expression: String,
}

impl XPathCondition {
    /// Compile the expression, failing if it is not valid XPath 1.0.
    pub fn compile(expression: &str) -> Result<Self, MatcherError> {
        let expression = expression.trim();
        compiled(expression)?;
        Ok(Self {
            expression: expression.to_string(),
        })
    }

    /// Source text of the expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Evaluate and coerce to a boolean using XPath `boolean()` semantics.
    pub fn evaluate_boolean(&self, doc: &XmlDocument) -> Result<bool, MatcherError> {
        let xpath = compiled(&self.expression)?;
        let document = doc.as_document();
        let context = Context::new();

        xpath
            .evaluate(&context, document.root())
            .map(|value| value.boolean())
            .map_err(|e| MatcherError::Evaluate {
                expression: self.expression.clone(),
                message: e.to_string(),
            })
    }

    /// Evaluate and coerce to a string using XPath `string()` semantics.
    pub fn evaluate_string(&self, doc: &XmlDocument) -> Result<String, MatcherError> {
        let xpath = compiled(&self.expression)?;
        let document = doc.as_document();
        let context = Context::new();

        xpath
            .evaluate(&context, document.root())
            .map(|value| value.string())
            .map_err(|e| MatcherError::Evaluate {
                expression: self.expression.clone(),
                message: e.to_string(),
            })
    }
}

/// Fetch the thread's compiled copy of an expression, compiling on a miss.
fn compiled(expression: &str) -> Result<Rc<XPath>, MatcherError> {
    if expression.is_empty() {
        return Err(MatcherError::EmptyExpression);
    }

    let generation = GENERATION.load(Ordering::SeqCst);

    COMPILED.with(|cache| {
        let mut cache = cache.borrow_mut();
        if cache.generation != generation {
            cache.expressions.clear();
            cache.generation = generation;
        }

        if let Some(xpath) = cache.expressions.get(expression) {
            return Ok(Rc::clone(xpath));
        }

        let xpath = match Factory::new().build(expression) {
            Ok(Some(xpath)) => Rc::new(xpath),
            Ok(None) => return Err(MatcherError::EmptyExpression),
            Err(e) => {
                return Err(MatcherError::Compile {
                    expression: expression.to_string(),
                    message: e.to_string(),
                })
            }
        };

        cache
            .expressions
            .insert(expression.to_string(), Rc::clone(&xpath));
        Ok(xpath)
    })
}
