//! Repository stores holding rule-definition files by category.
//!
//! A category is a named group of metadata files. The file-system store maps
//! a category to a directory under the repository root; nested directories
//! are sub-categories.

use crate::config::Settings;
use glob::Pattern as GlobPattern;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use tracing::trace;

/// A single metadata file in a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaData {
    /// File name relative to the category (`/`-separated for sub-categories)
    pub name: String,
    /// File contents
    pub content: String,
}

impl MetaData {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Source of rule-definition files.
pub trait RepositoryStore: Send + Sync {
    /// All metadata files in a category, sorted by name.
    fn list_metadata(&self, category: &str) -> Result<Vec<MetaData>, RepositoryError>;

    /// Description for log output.
    fn describe(&self) -> String;
}

/// Store backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FileRepository {
    root: PathBuf,
    pattern: GlobPattern,
    include_subcategories: bool,
}

impl FileRepository {
    /// Create a store rooted at `root`, loading files whose name matches `pattern`.
    pub fn new(
        root: impl Into<PathBuf>,
        pattern: &str,
        include_subcategories: bool,
    ) -> Result<Self, RepositoryError> {
        Ok(Self {
            root: root.into(),
            pattern: GlobPattern::new(pattern)?,
            include_subcategories,
        })
    }

    /// Create a store from the global settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, RepositoryError> {
        Self::new(
            &settings.repository_root,
            &settings.file_pattern,
            settings.include_subcategories,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collect(
        &self,
        dir: &Path,
        prefix: &str,
        out: &mut Vec<MetaData>,
    ) -> Result<(), RepositoryError> {
        let mut entries = fs::read_dir(dir)
            .map_err(|e| RepositoryError::io(dir, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::io(dir, e))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().to_string();
            let name = if prefix.is_empty() {
                file_name.clone()
            } else {
                format!("{prefix}/{file_name}")
            };

            if path.is_dir() {
                if self.include_subcategories {
                    self.collect(&path, &name, out)?;
                }
                continue;
            }

            if !self.pattern.matches(&file_name) {
                trace!(file = %name, "Skipping file not matching pattern");
                continue;
            }

            let content = fs::read_to_string(&path).map_err(|e| RepositoryError::io(&path, e))?;
            out.push(MetaData::new(name, content));
        }

        Ok(())
    }
}

impl RepositoryStore for FileRepository {
    fn list_metadata(&self, category: &str) -> Result<Vec<MetaData>, RepositoryError> {
        validate_category(category)?;

        let dir = self.root.join(category);
        if !dir.is_dir() {
            return Err(RepositoryError::NotFound(category.to_string()));
        }

        let mut files = Vec::new();
        self.collect(&dir, "", &mut files)?;
        Ok(files)
    }

    fn describe(&self) -> String {
        format!("file repository at {}", self.root.display())
    }
}

/// Store held in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    categories: RwLock<HashMap<String, Vec<MetaData>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file in a category, creating the category if needed.
    pub fn insert(&self, category: &str, name: &str, content: &str) {
        let mut categories = self.categories.write().unwrap_or_else(|e| e.into_inner());
        let files = categories.entry(category.to_string()).or_default();
        files.retain(|f| f.name != name);
        files.push(MetaData::new(name, content));
        files.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Remove a file. Returns whether it existed.
    pub fn remove(&self, category: &str, name: &str) -> bool {
        let mut categories = self.categories.write().unwrap_or_else(|e| e.into_inner());
        match categories.get_mut(category) {
            Some(files) => {
                let before = files.len();
                files.retain(|f| f.name != name);
                files.len() != before
            }
            None => false,
        }
    }
}

impl RepositoryStore for MemoryRepository {
    fn list_metadata(&self, category: &str) -> Result<Vec<MetaData>, RepositoryError> {
        let categories = self.categories.read().unwrap_or_else(|e| e.into_inner());
        categories
            .get(category)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(category.to_string()))
    }

    fn describe(&self) -> String {
        "memory repository".to_string()
    }
}

/// Categories are relative paths that must stay inside the repository root.
fn validate_category(category: &str) -> Result<(), RepositoryError> {
    let path = Path::new(category);
    let valid = !category.trim().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

    if valid {
        Ok(())
    } else {
        Err(RepositoryError::InvalidCategory(category.to_string()))
    }
}

/// Errors raised by repository stores.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Category not found in repository: {0}")]
    NotFound(String),

    #[error("Invalid category name: {0}")]
    InvalidCategory(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl RepositoryError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_repository_sorted() {
        let repo = MemoryRepository::new();
        repo.insert("routing", "b.xml", "<b/>");
        repo.insert("routing", "a.xml", "<a/>");
        repo.insert("routing", "b.xml", "<b2/>");

        let files = repo.list_metadata("routing").unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.xml", "b.xml"]);
        assert_eq!(files[1].content, "<b2/>");

        assert!(repo.remove("routing", "a.xml"));
        assert!(!repo.remove("routing", "a.xml"));
        assert!(matches!(
            repo.list_metadata("missing"),
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_file_repository_pattern_and_subcategories() {
        let dir = tempfile::tempdir().unwrap();
        let category = dir.path().join("routing");
        fs::create_dir_all(category.join("nested")).unwrap();
        fs::write(category.join("b.xml"), "<b/>").unwrap();
        fs::write(category.join("a.xml"), "<a/>").unwrap();
        fs::write(category.join("notes.txt"), "ignored").unwrap();
        fs::write(category.join("nested").join("c.xml"), "<c/>").unwrap();

        let flat = FileRepository::new(dir.path(), "*.xml", false).unwrap();
        let names: Vec<_> = flat
            .list_metadata("routing")
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a.xml", "b.xml"]);

        let deep = FileRepository::new(dir.path(), "*.xml", true).unwrap();
        let names: Vec<_> = deep
            .list_metadata("routing")
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a.xml", "b.xml", "nested/c.xml"]);
    }

    #[test]
    fn test_file_repository_missing_category() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(dir.path(), "*.xml", false).unwrap();
        assert!(matches!(
            repo.list_metadata("routing"),
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_category_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(dir.path(), "*.xml", false).unwrap();
        assert!(matches!(
            repo.list_metadata("../etc"),
            Err(RepositoryError::InvalidCategory(_))
        ));
        assert!(matches!(
            repo.list_metadata("/etc"),
            Err(RepositoryError::InvalidCategory(_))
        ));
        assert!(matches!(
            repo.list_metadata(""),
            Err(RepositoryError::InvalidCategory(_))
        ));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            FileRepository::new("/tmp", "[", false),
            Err(RepositoryError::Pattern(_))
        ));
    }
}
