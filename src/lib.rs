//! Configuration-driven XPath rule dispatch.
//!
//! Rule definitions are XML files grouped by category in a repository. Each
//! file describes one request type as an ordered list of rules; each rule has
//! an XPath condition evaluated against the message header or body, and a set
//! of output properties. The first rule whose condition holds selects the
//! output.
//!
//! - Categories are loaded lazily and cached until flushed
//! - One evaluator per category, shared process-wide
//! - Global flush through [`cache::registrar`]
//!
//! ## Rule File Example
//!
//! ```xml
//! <request name="lsr_order">
//!   <rule name="ameritech" applyOn="header">
//!     <xpath>/header/Supplier/@value = 'Ameritech'</xpath>
//!     <output>
//!       <Gateway value="ameritech-gw"/>
//!     </output>
//!   </rule>
//! </request>
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use xrule_dispatch::{EvaluatorRegistry, FileRepository, Settings};
//!
//! let settings = Settings::default();
//! let store = Arc::new(FileRepository::from_settings(&settings)?);
//! let registry = EvaluatorRegistry::new(store, &settings)?;
//!
//! let header = r#"<header><Request value="lsr_order"/><Supplier value="Ameritech"/></header>"#;
//! let outputs = registry.evaluate_str("routing", header, "<lsr_order/>")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod config;
pub mod container;
pub mod context;
pub mod document;
pub mod evaluator;
pub mod loader;
pub mod matcher;
pub mod parser;
pub mod repository;
pub mod rule;
pub mod service;

pub use cache::{CacheRegistrar, CachingObject};
pub use config::{EvaluatorConfig, Settings};
pub use container::{ConfigContainer, LoadError};
pub use document::{DocumentError, XmlDocument};
pub use evaluator::{EvaluatorRegistry, RuleError, RuleEvaluator, RuleMatch};
pub use loader::ConfigFilesLoader;
pub use parser::{ConfigParser, ParseError};
pub use repository::{FileRepository, MemoryRepository, MetaData, RepositoryError, RepositoryStore};
pub use rule::{ApplyOn, OutputProperties, RequestConfig, RuleConfig};
pub use service::DispatchService;
