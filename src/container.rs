//! Lazily populated cache of request configurations for one category.

use crate::cache::{CacheRegistrar, CachingObject};
use crate::loader::ConfigFilesLoader;
use crate::matcher;
use crate::parser::{ConfigParser, ParseError};
use crate::repository::RepositoryError;
use crate::rule::RequestConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

type ConfigMap = HashMap<String, Arc<RequestConfig>>;

/// Request name (lower-cased) to [`RequestConfig`] for a single category.
///
/// The map is built on first access and dropped wholesale by
/// [`CachingObject::flush_cache`]; the next access rebuilds it once.
pub struct ConfigContainer {
    category: String,
    loader: ConfigFilesLoader,
    configs: RwLock<Option<Arc<ConfigMap>>>,
    load_count: AtomicUsize,
}

impl ConfigContainer {
    pub fn new(category: impl Into<String>, loader: ConfigFilesLoader) -> Self {
        Self {
            category: category.into(),
            loader,
            configs: RwLock::new(None),
            load_count: AtomicUsize::new(0),
        }
    }

    /// Register this container for global flushes.
    pub fn register(self: &Arc<Self>, registrar: &CacheRegistrar) {
        registrar.register(Arc::clone(self) as Arc<dyn CachingObject>);
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Look up the rules for a request, loading the category if needed.
    pub fn get(&self, request_name: &str) -> Result<Option<Arc<RequestConfig>>, LoadError> {
        let configs = self.configs()?;
        Ok(configs.get(&request_name.to_lowercase()).cloned())
    }

    /// All configured request names, sorted.
    pub fn request_names(&self) -> Result<Vec<String>, LoadError> {
        let configs = self.configs()?;
        let mut names: Vec<String> = configs.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Whether the category is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.configs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// How many times the category has been loaded.
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    fn configs(&self) -> Result<Arc<ConfigMap>, LoadError> {
        {
            let configs = self.configs.read().unwrap_or_else(|e| e.into_inner());
            if let Some(map) = configs.as_ref() {
                return Ok(Arc::clone(map));
            }
        }

        let mut configs = self.configs.write().unwrap_or_else(|e| e.into_inner());
        // Another thread may have loaded while we waited for the write lock.
        if let Some(map) = configs.as_ref() {
            return Ok(Arc::clone(map));
        }

        let map = Arc::new(self.load()?);
        *configs = Some(Arc::clone(&map));
        Ok(map)
    }

    fn load(&self) -> Result<ConfigMap, LoadError> {
        let files = self.loader.load(&self.category)?;
        let mut map = ConfigMap::new();

        for file in &files {
            let config = ConfigParser::parse(file)?;
            if let Some(previous) = map.get(config.name()) {
                warn!(
                    category = %self.category,
                    request = %config.name(),
                    previous = %previous.source(),
                    file = %config.source(),
                    "Overwriting configuration for request"
                );
            }
            map.insert(config.name().to_string(), Arc::new(config));
        }

        let count = self.load_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            category = %self.category,
            files = files.len(),
            requests = map.len(),
            load = count,
            "Loaded rule configuration"
        );

        Ok(map)
    }
}

impl CachingObject for ConfigContainer {
    fn flush_cache(&self) {
        let mut configs = self.configs.write().unwrap_or_else(|e| e.into_inner());
        if configs.take().is_some() {
            info!(category = %self.category, "Flushed rule configuration");
        }
        matcher::invalidate_compiled();
    }

    fn cache_name(&self) -> String {
        format!("rule-config:{}", self.category)
    }
}

impl std::fmt::Debug for ConfigContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigContainer")
            .field("category", &self.category)
            .field("loaded", &self.is_loaded())
            .field("load_count", &self.load_count())
            .finish()
    }
}

/// Errors raised while loading a category.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}
