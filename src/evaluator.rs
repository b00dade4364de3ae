//! Rule evaluation and the per-category evaluator registry.

use crate::cache::{CacheRegistrar, CachingObject};
use crate::config::Settings;
use crate::container::{ConfigContainer, LoadError};
use crate::context::EvaluationContext;
use crate::document::{DocumentError, XmlDocument};
use crate::loader::ConfigFilesLoader;
use crate::matcher::{Matcher, MatcherError, RequestNameMatcher};
use crate::repository::RepositoryStore;
use crate::rule::OutputProperties;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{debug, info};

/// The rule that matched an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleMatch {
    /// Request name read from the header (lower-cased)
    pub request: String,
    /// Name of the first rule whose condition held
    pub rule: String,
    /// Output properties of that rule
    pub outputs: OutputProperties,
}

/// Evaluates inbound messages against the rules of one category.
pub struct RuleEvaluator {
    category: String,
    container: Arc<ConfigContainer>,
    request_matcher: RequestNameMatcher,
}

impl RuleEvaluator {
    pub fn new(
        category: impl Into<String>,
        loader: ConfigFilesLoader,
        request_matcher: RequestNameMatcher,
    ) -> Self {
        let category = category.into();
        let container = Arc::new(ConfigContainer::new(category, loader));
        Self::with_container(container, request_matcher)
    }

    /// Create an evaluator over an existing container.
    pub fn with_container(
        container: Arc<ConfigContainer>,
        request_matcher: RequestNameMatcher,
    ) -> Self {
        Self {
            category: container.category().to_string(),
            container,
            request_matcher,
        }
    }

    /// The process-wide evaluator for `category`.
    pub fn instance(category: &str) -> Result<Arc<Self>, RuleError> {
        EvaluatorRegistry::global()
            .map(|registry| registry.evaluator(category))
            .ok_or(RuleError::NotInitialized)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn container(&self) -> &Arc<ConfigContainer> {
        &self.container
    }

    /// Parse and evaluate a header/body pair.
    pub fn evaluate_str(
        &self,
        header: &str,
        body: &str,
    ) -> Result<Option<OutputProperties>, RuleError> {
        let header = XmlDocument::parse(header)?;
        let body = XmlDocument::parse(body)?;
        self.evaluate(&header, &body)
    }

    /// Output properties of the first matching rule, or `None` when no rule
    /// matches or the request is not configured.
    pub fn evaluate(
        &self,
        header: &XmlDocument,
        body: &XmlDocument,
    ) -> Result<Option<OutputProperties>, RuleError> {
        Ok(self
            .evaluate_with_trace(header, body)?
            .map(|matched| matched.outputs))
    }

    /// Like [`evaluate`](Self::evaluate), also reporting which rule matched.
    pub fn evaluate_with_trace(
        &self,
        header: &XmlDocument,
        body: &XmlDocument,
    ) -> Result<Option<RuleMatch>, RuleError> {
        let request_name = self.request_matcher.extract(header)?.ok_or_else(|| {
            RuleError::MissingRequestName {
                category: self.category.clone(),
                location: self.request_matcher.location(),
            }
        })?;

        let Some(config) = self.container.get(&request_name)? else {
            debug!(category = %self.category, request = %request_name, "Request not configured");
            return Ok(None);
        };

        let ctx = EvaluationContext::new(&self.category, config.name(), header, body);

        for rule in config.rules() {
            let matched = rule.matches(&ctx)?;
            debug!(
                category = %self.category,
                request = %config.name(),
                rule = %rule.name(),
                apply_on = %rule.apply_on(),
                matched,
                "Checked rule"
            );

            if matched {
                return Ok(Some(RuleMatch {
                    request: config.name().to_string(),
                    rule: rule.name().to_string(),
                    outputs: rule.outputs().clone(),
                }));
            }
        }

        debug!(category = %self.category, request = %config.name(), "No rule matched");
        Ok(None)
    }
}

impl std::fmt::Debug for RuleEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEvaluator")
            .field("category", &self.category)
            .field("container", &self.container)
            .finish()
    }
}

static GLOBAL_REGISTRY: OnceLock<Arc<EvaluatorRegistry>> = OnceLock::new();

/// Owns one [`RuleEvaluator`] per category.
///
/// Evaluators are created on first use and kept until the registry is
/// flushed. Each category has one [`ConfigContainer`] for the life of the
/// registry; evaluators created before and after a flush share it, so a
/// flushed category is reloaded once. Registries built with a registrar hook
/// themselves and every container they create into it.
pub struct EvaluatorRegistry {
    loader: ConfigFilesLoader,
    request_matcher: RequestNameMatcher,
    registrar: Option<Arc<CacheRegistrar>>,
    evaluators: RwLock<HashMap<String, Arc<RuleEvaluator>>>,
    containers: RwLock<HashMap<String, Arc<ConfigContainer>>>,
}

impl EvaluatorRegistry {
    /// Create a registry that is not connected to any flush registrar.
    pub fn new(store: Arc<dyn RepositoryStore>, settings: &Settings) -> Result<Self, RuleError> {
        Ok(Self {
            loader: ConfigFilesLoader::new(store),
            request_matcher: RequestNameMatcher::compile(settings)?,
            registrar: None,
            evaluators: RwLock::new(HashMap::new()),
            containers: RwLock::new(HashMap::new()),
        })
    }

    /// Create a registry and register it with `registrar`.
    pub fn registered(
        store: Arc<dyn RepositoryStore>,
        settings: &Settings,
        registrar: Arc<CacheRegistrar>,
    ) -> Result<Arc<Self>, RuleError> {
        let mut registry = Self::new(store, settings)?;
        registry.registrar = Some(Arc::clone(&registrar));

        let registry = Arc::new(registry);
        registrar.register(Arc::clone(&registry) as Arc<dyn CachingObject>);
        Ok(registry)
    }

    /// Install the process-wide registry. Returns `false` if one was
    /// already installed.
    pub fn init_global(registry: Arc<Self>) -> bool {
        GLOBAL_REGISTRY.set(registry).is_ok()
    }

    /// The process-wide registry, if installed.
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL_REGISTRY.get().cloned()
    }

    /// The evaluator for `category`, created on first use.
    pub fn evaluator(&self, category: &str) -> Arc<RuleEvaluator> {
        {
            let evaluators = self.evaluators.read().unwrap_or_else(|e| e.into_inner());
            if let Some(evaluator) = evaluators.get(category) {
                return Arc::clone(evaluator);
            }
        }

        let mut evaluators = self.evaluators.write().unwrap_or_else(|e| e.into_inner());
        if let Some(evaluator) = evaluators.get(category) {
            return Arc::clone(evaluator);
        }

        let evaluator = Arc::new(RuleEvaluator::with_container(
            self.container(category),
            self.request_matcher.clone(),
        ));

        info!(category = %category, "Created rule evaluator");
        evaluators.insert(category.to_string(), Arc::clone(&evaluator));
        evaluator
    }

    /// The container for `category`, created and registered on first use.
    fn container(&self, category: &str) -> Arc<ConfigContainer> {
        let mut containers = self.containers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(container) = containers.get(category) {
            return Arc::clone(container);
        }

        let container = Arc::new(ConfigContainer::new(category, self.loader.clone()));
        if let Some(registrar) = &self.registrar {
            container.register(registrar);
        }
        containers.insert(category.to_string(), Arc::clone(&container));
        container
    }

    /// Evaluate XML strings in `category`.
    pub fn evaluate_str(
        &self,
        category: &str,
        header: &str,
        body: &str,
    ) -> Result<Option<OutputProperties>, RuleError> {
        self.evaluator(category).evaluate_str(header, body)
    }

    /// Categories with a live evaluator, sorted.
    pub fn categories(&self) -> Vec<String> {
        let evaluators = self.evaluators.read().unwrap_or_else(|e| e.into_inner());
        let mut categories: Vec<String> = evaluators.keys().cloned().collect();
        categories.sort();
        categories
    }
}

impl CachingObject for EvaluatorRegistry {
    fn flush_cache(&self) {
        let dropped = {
            let mut evaluators = self.evaluators.write().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *evaluators)
        };

        // Containers outlive the evaluators, so callers still holding an
        // evaluator and the next evaluator created share one reload.
        let containers: Vec<Arc<ConfigContainer>> = {
            let containers = self.containers.read().unwrap_or_else(|e| e.into_inner());
            containers.values().cloned().collect()
        };
        for container in &containers {
            container.flush_cache();
        }

        info!(evaluators = dropped.len(), "Flushed rule evaluators");
    }

    fn cache_name(&self) -> String {
        "rule-evaluators".to_string()
    }
}

/// Rule evaluation errors. Each is fatal for the request being evaluated.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Header has no request name at {location} (category {category})")]
    MissingRequestName { category: String, location: String },

    #[error("Failed to load rule configuration: {0}")]
    Load(#[from] LoadError),

    #[error("Invalid document: {0}")]
    Document(#[from] DocumentError),

    #[error("Condition error: {0}")]
    Matcher(#[from] MatcherError),

    #[error("No global evaluator registry installed")]
    NotInitialized,
}
