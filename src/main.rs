//! xrule-dispatch CLI entry point.
//!
//! Evaluates header/body pairs against a rule repository, either once from
//! files or as a line-delimited JSON service on stdin/stdout.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use xrule_dispatch::{
    cache, DispatchService, EvaluatorConfig, EvaluatorRegistry, FileRepository, XmlDocument,
};

#[derive(Parser, Debug)]
#[command(name = "xrule-dispatch")]
#[command(
    author,
    version,
    about = "Configuration-driven XPath rule dispatch"
)]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rule repository root (overrides the configuration file)
    #[arg(short, long, env = "XRULE_REPOSITORY")]
    repository: Option<PathBuf>,

    /// Category to evaluate in
    #[arg(long)]
    category: Option<String>,

    /// Header XML file
    #[arg(long, requires = "category")]
    header: Option<PathBuf>,

    /// Body XML file
    #[arg(long, requires = "header")]
    body: Option<PathBuf>,

    /// Report which rule matched along with its outputs
    #[arg(long)]
    explain: bool,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit.
    #[arg(long)]
    example_config: bool,

    /// Print an example rule file and exit.
    #[arg(long)]
    example_rules: bool,

    /// Load every configured category and exit.
    #[arg(long)]
    validate: bool,
}

const EXAMPLE_CONFIG: &str = r#"# xrule-dispatch configuration example
version: "1"

settings:
  # Root of the rule repository; each category is a sub-directory
  repository_root: "/etc/xrule/repository"
  # Only files matching this pattern are loaded
  file_pattern: "*.xml"
  # Load files from nested directories of a category
  include_subcategories: false
  # Header location of the request name: <header><Request value="..."/></header>
  request_node: "Request"
  request_attribute: "value"

# Categories checked by --validate
categories:
  - routing
"#;

const EXAMPLE_RULES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- repository/routing/lsr_order.xml -->
<request name="lsr_order">
  <!-- Rules are checked in order; the first true condition wins -->
  <rule name="ameritech" applyOn="header">
    <xpath>/header/Supplier/@value = 'Ameritech'</xpath>
    <output>
      <Gateway value="ameritech-gw"/>
      <Queue>lsr.ameritech</Queue>
    </output>
  </rule>
  <rule name="bulk" applyOn="body">
    <xpath>count(/lsr_order/Line) &gt; 10</xpath>
    <output>
      <Gateway value="bulk-gw"/>
    </output>
  </rule>
</request>
"#;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries results.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if args.example_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    if args.example_rules {
        print!("{EXAMPLE_RULES}");
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => EvaluatorConfig::default(),
    };

    if let Some(repository) = &args.repository {
        config.settings.repository_root = repository.to_string_lossy().to_string();
    }

    let store = Arc::new(
        FileRepository::from_settings(&config.settings).context("Invalid repository settings")?,
    );
    let registry = EvaluatorRegistry::registered(store, &config.settings, cache::registrar())
        .context("Invalid request name settings")?;
    EvaluatorRegistry::init_global(Arc::clone(&registry));

    info!(
        repository = %config.settings.repository_root,
        pattern = %config.settings.file_pattern,
        "Rule repository configured"
    );

    if args.validate {
        return validate(&registry, &config);
    }

    if let (Some(category), Some(header)) = (&args.category, &args.header) {
        return evaluate_once(&registry, category, header, args.body.as_deref(), args.explain);
    }

    serve(registry).await
}

fn load_config(path: &Path) -> Result<EvaluatorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    Ok(config)
}

fn validate(registry: &EvaluatorRegistry, config: &EvaluatorConfig) -> Result<()> {
    if config.categories.is_empty() {
        warn!("No categories configured; nothing to validate");
        return Ok(());
    }

    let mut failures = 0;
    for category in &config.categories {
        let evaluator = registry.evaluator(category);
        match evaluator.container().request_names() {
            Ok(names) => info!(category = %category, requests = ?names, "Category is valid"),
            Err(e) => {
                failures += 1;
                warn!(category = %category, error = %e, "Category is invalid");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} categories failed to load", config.categories.len());
    }

    info!("Configuration is valid");
    Ok(())
}

fn evaluate_once(
    registry: &EvaluatorRegistry,
    category: &str,
    header: &Path,
    body: Option<&Path>,
    explain: bool,
) -> Result<()> {
    let header = read_document(header)?;
    // A rule set that only inspects the header can be evaluated without a body.
    let body = match body {
        Some(path) => read_document(path)?,
        None => XmlDocument::parse("<body/>")?,
    };

    let evaluator = registry.evaluator(category);
    let output = if explain {
        serde_json::to_string_pretty(&evaluator.evaluate_with_trace(&header, &body)?)?
    } else {
        serde_json::to_string_pretty(&evaluator.evaluate(&header, &body)?)?
    };

    println!("{output}");
    Ok(())
}

fn read_document(path: &Path) -> Result<XmlDocument> {
    let xml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    XmlDocument::parse(&xml).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn serve(registry: Arc<EvaluatorRegistry>) -> Result<()> {
    #[cfg(unix)]
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to install SIGHUP handler; cache flush disabled");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            let flushed = cache::registrar().flush_all();
            info!(flushed, "SIGHUP received, caches flushed");
        }
    });

    let service = Arc::new(DispatchService::new(registry));
    info!("Dispatch service reading requests from stdin");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    service
        .run(stdin, tokio::io::stdout())
        .await
        .context("Dispatch service failed")?;

    Ok(())
}
