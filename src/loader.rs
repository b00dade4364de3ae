//! Loading of rule-definition files for a category.

use crate::repository::{MetaData, RepositoryError, RepositoryStore};
use std::sync::Arc;
use tracing::{debug, trace};

/// Reads every rule-definition file of a category from a repository store.
#[derive(Clone)]
pub struct ConfigFilesLoader {
    store: Arc<dyn RepositoryStore>,
}

impl ConfigFilesLoader {
    pub fn new(store: Arc<dyn RepositoryStore>) -> Self {
        Self { store }
    }

    /// Load all files of `category`, in store order.
    pub fn load(&self, category: &str) -> Result<Vec<MetaData>, RepositoryError> {
        let files = self.store.list_metadata(category)?;

        for file in &files {
            trace!(
                category = %category,
                file = %file.name,
                bytes = file.content.len(),
                "Read rule file"
            );
        }

        debug!(
            category = %category,
            files = files.len(),
            store = %self.store.describe(),
            "Loaded rule files"
        );

        Ok(files)
    }

    pub fn store(&self) -> &Arc<dyn RepositoryStore> {
        &self.store
    }
}

impl std::fmt::Debug for ConfigFilesLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigFilesLoader")
            .field("store", &self.store.describe())
            .finish()
    }
}
