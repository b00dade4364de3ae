//! Integration tests for the rule dispatcher.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use xrule_dispatch::{
    cache, CacheRegistrar, CachingObject, EvaluatorConfig, EvaluatorRegistry, FileRepository,
    MemoryRepository, MetaData, RepositoryError, RepositoryStore, RuleError, RuleEvaluator,
    Settings,
};

const LSR_RULES: &str = r#"<?xml version="1.0"?>
<request name="lsr_order">
  <rule name="ameritech" applyOn="header">
    <xpath>/header/Supplier/@value = 'Ameritech'</xpath>
    <output>
      <Gateway value="ameritech-gw"/>
      <Queue>lsr.ameritech</Queue>
    </output>
  </rule>
  <rule name="bulk" applyOn="body">
    <xpath>count(/lsr_order/Line) &gt; 2</xpath>
    <output>
      <Gateway value="bulk-gw"/>
    </output>
  </rule>
</request>
"#;

fn header(request: &str, supplier: &str) -> String {
    format!(r#"<header><Request value="{request}"/><Supplier value="{supplier}"/></header>"#)
}

fn body(lines: usize) -> String {
    format!("<lsr_order>{}</lsr_order>", "<Line/>".repeat(lines))
}

fn write_rules(root: &Path, category: &str, file: &str, content: &str) {
    let dir = root.join(category);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file), content).unwrap();
}

/// Counts how often a category is listed.
struct CountingStore {
    inner: MemoryRepository,
    loads: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        let inner = MemoryRepository::new();
        inner.insert("routing", "lsr.xml", LSR_RULES);
        Self {
            inner,
            loads: AtomicUsize::new(0),
        }
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl RepositoryStore for CountingStore {
    fn list_metadata(&self, category: &str) -> Result<Vec<MetaData>, RepositoryError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        // Widen the window for racing first accesses.
        std::thread::sleep(std::time::Duration::from_millis(20));
        self.inner.list_metadata(category)
    }

    fn describe(&self) -> String {
        "counting repository".to_string()
    }
}

// =============================================================================
// Configuration Parsing Tests
// =============================================================================

#[test]
fn test_parse_minimal_config() {
    let config: EvaluatorConfig = serde_yaml::from_str("version: \"1\"\n").unwrap();
    assert_eq!(config.version, "1");
    assert_eq!(config.settings, Settings::default());
}

#[test]
fn test_parse_json_config() {
    let json_str = r#"{
        "settings": {
            "repository_root": "/srv/rules",
            "file_pattern": "*.rules.xml",
            "request_node": "RequestType"
        },
        "categories": ["routing"]
    }"#;
    let config: EvaluatorConfig = serde_json::from_str(json_str).unwrap();
    assert_eq!(config.settings.repository_root, "/srv/rules");
    assert_eq!(config.settings.file_pattern, "*.rules.xml");
    assert_eq!(config.settings.request_node, "RequestType");
    assert_eq!(config.settings.request_attribute, "value");
    assert_eq!(config.categories, vec!["routing"]);
}

// =============================================================================
// File Repository Evaluation Tests
// =============================================================================

#[test]
fn test_evaluate_from_file_repository() {
    let dir = tempfile::tempdir().unwrap();
    write_rules(dir.path(), "routing", "lsr_order.xml", LSR_RULES);
    write_rules(dir.path(), "routing", "README.txt", "not a rule file");

    let settings = Settings {
        repository_root: dir.path().to_string_lossy().to_string(),
        ..Default::default()
    };
    let store = Arc::new(FileRepository::from_settings(&settings).unwrap());
    let registry = EvaluatorRegistry::new(store, &settings).unwrap();

    let outputs = registry
        .evaluate_str("routing", &header("lsr_order", "Ameritech"), &body(0))
        .unwrap()
        .unwrap();
    assert_eq!(outputs["Gateway"], "ameritech-gw");
    assert_eq!(outputs["Queue"], "lsr.ameritech");

    let outputs = registry
        .evaluate_str("routing", &header("lsr_order", "Qwest"), &body(3))
        .unwrap()
        .unwrap();
    assert_eq!(outputs["Gateway"], "bulk-gw");
    assert!(!outputs.contains_key("Queue"));
}

#[test]
fn test_no_rule_matches() {
    let repo = Arc::new(MemoryRepository::new());
    repo.insert("routing", "lsr.xml", LSR_RULES);
    let registry = EvaluatorRegistry::new(repo, &Settings::default()).unwrap();

    let result = registry
        .evaluate_str("routing", &header("lsr_order", "Qwest"), &body(1))
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn test_request_name_is_case_insensitive() {
    let repo = Arc::new(MemoryRepository::new());
    repo.insert("routing", "lsr.xml", LSR_RULES);
    let registry = EvaluatorRegistry::new(repo, &Settings::default()).unwrap();

    let outputs = registry
        .evaluate_str("routing", &header("LSR_Order", "Ameritech"), &body(0))
        .unwrap()
        .unwrap();
    assert_eq!(outputs["Gateway"], "ameritech-gw");
}

#[test]
fn test_missing_request_attribute() {
    let repo = Arc::new(MemoryRepository::new());
    repo.insert("routing", "lsr.xml", LSR_RULES);
    let registry = EvaluatorRegistry::new(repo, &Settings::default()).unwrap();

    let err = registry
        .evaluate_str("routing", "<header><Request/></header>", &body(0))
        .unwrap_err();
    assert!(matches!(err, RuleError::MissingRequestName { .. }));
    assert!(err.to_string().contains("Request@value"));
}

#[test]
fn test_unknown_category_fails() {
    let repo = Arc::new(MemoryRepository::new());
    let registry = EvaluatorRegistry::new(repo, &Settings::default()).unwrap();

    let err = registry
        .evaluate_str("billing", &header("lsr_order", "Qwest"), &body(0))
        .unwrap_err();
    assert!(matches!(err, RuleError::Load(_)));
}

#[test]
fn test_custom_request_location() {
    let repo = Arc::new(MemoryRepository::new());
    repo.insert("routing", "lsr.xml", LSR_RULES);
    let settings = Settings {
        request_node: "Type".to_string(),
        request_attribute: "name".to_string(),
        ..Default::default()
    };
    let registry = EvaluatorRegistry::new(repo, &settings).unwrap();

    let header = r#"<header><Type name="lsr_order"/><Supplier value="Ameritech"/></header>"#;
    let outputs = registry
        .evaluate_str("routing", header, &body(0))
        .unwrap()
        .unwrap();
    assert_eq!(outputs["Gateway"], "ameritech-gw");
}

// =============================================================================
// Caching Tests
// =============================================================================

#[test]
fn test_concurrent_first_access_loads_once() {
    let store = Arc::new(CountingStore::new());
    let registry = EvaluatorRegistry::new(store.clone(), &Settings::default()).unwrap();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let outputs = registry
                    .evaluate_str("routing", &header("lsr_order", "Ameritech"), &body(0))
                    .unwrap()
                    .unwrap();
                assert_eq!(outputs["Gateway"], "ameritech-gw");
            });
        }
    });

    assert_eq!(store.loads(), 1);
    assert_eq!(registry.evaluator("routing").container().load_count(), 1);
}

#[test]
fn test_flush_reloads_exactly_once() {
    let store = Arc::new(CountingStore::new());
    let registrar = Arc::new(CacheRegistrar::new());
    let registry =
        EvaluatorRegistry::registered(store.clone(), &Settings::default(), registrar.clone())
            .unwrap();

    let evaluator = registry.evaluator("routing");
    evaluator
        .evaluate_str(&header("lsr_order", "Qwest"), &body(0))
        .unwrap();
    assert_eq!(store.loads(), 1);

    // Registry plus the routing container
    assert_eq!(registrar.flush_all(), 2);
    assert!(!evaluator.container().is_loaded());

    for _ in 0..3 {
        registry
            .evaluate_str("routing", &header("lsr_order", "Qwest"), &body(0))
            .unwrap();
    }
    // The evaluator held from before the flush shares the reloaded rules.
    evaluator
        .evaluate_str(&header("lsr_order", "Qwest"), &body(0))
        .unwrap();
    assert!(evaluator.container().is_loaded());
    assert_eq!(store.loads(), 2);
}

#[test]
fn test_flush_picks_up_changed_rules() {
    let repo = Arc::new(MemoryRepository::new());
    repo.insert("routing", "lsr.xml", LSR_RULES);
    let registrar = Arc::new(CacheRegistrar::new());
    let registry =
        EvaluatorRegistry::registered(repo.clone(), &Settings::default(), registrar.clone())
            .unwrap();

    let before = registry
        .evaluate_str("routing", &header("lsr_order", "Ameritech"), &body(0))
        .unwrap();
    assert!(before.is_some());

    repo.insert(
        "routing",
        "lsr.xml",
        r#"<request name="lsr_order">
  <rule name="all" applyOn="header">
    <xpath>true()</xpath>
    <output><Gateway value="central-gw"/></output>
  </rule>
</request>"#,
    );

    // Cached until flushed
    let cached = registry
        .evaluate_str("routing", &header("lsr_order", "Ameritech"), &body(0))
        .unwrap()
        .unwrap();
    assert_eq!(cached["Gateway"], "ameritech-gw");

    registry.flush_cache();
    let reloaded = registry
        .evaluate_str("routing", &header("lsr_order", "Ameritech"), &body(0))
        .unwrap()
        .unwrap();
    assert_eq!(reloaded["Gateway"], "central-gw");
}

// =============================================================================
// Global Registry Tests
// =============================================================================

#[test]
fn test_global_instance_and_flush() {
    let repo = Arc::new(MemoryRepository::new());
    repo.insert("routing", "lsr.xml", LSR_RULES);
    let registry =
        EvaluatorRegistry::registered(repo, &Settings::default(), cache::registrar()).unwrap();
    assert!(EvaluatorRegistry::init_global(registry.clone()));
    assert!(!EvaluatorRegistry::init_global(registry.clone()));

    let a = RuleEvaluator::instance("routing").unwrap();
    let b = RuleEvaluator::instance("routing").unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    a.evaluate_str(&header("lsr_order", "Ameritech"), &body(0))
        .unwrap();
    assert!(a.container().is_loaded());

    assert!(cache::registrar().flush_all() >= 2);
    assert!(!a.container().is_loaded());

    let c = RuleEvaluator::instance("routing").unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
}
