//! Line-delimited JSON dispatch service.
//!
//! Each input line is a request object; each output line is the answer:
//!
//! ```text
//! {"id":"1","category":"routing","header":"<header>…</header>","body":"<lsr_order/>"}
//! {"id":"1","matched":true,"request":"lsr_order","rule":"ameritech","outputs":{"Gateway":"gw"}}
//! ```

use crate::document::XmlDocument;
use crate::evaluator::{EvaluatorRegistry, RuleError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// A single evaluation request.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchRequest {
    /// Echoed back in the response
    #[serde(default)]
    pub id: Option<String>,
    pub category: String,
    pub header: String,
    pub body: String,
}

/// The answer to a [`DispatchRequest`].
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DispatchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResponse {
    fn error(id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Counters reported when the service stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub requests: u64,
    pub matched: u64,
    pub errors: u64,
}

/// Serves evaluation requests against an [`EvaluatorRegistry`].
pub struct DispatchService {
    registry: Arc<EvaluatorRegistry>,
    requests_total: AtomicU64,
    requests_matched: AtomicU64,
    request_errors: AtomicU64,
}

impl DispatchService {
    pub fn new(registry: Arc<EvaluatorRegistry>) -> Self {
        Self {
            registry,
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            request_errors: AtomicU64::new(0),
        }
    }

    /// Evaluate one request.
    pub fn dispatch(&self, request: &DispatchRequest) -> DispatchResponse {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        match self.evaluate(request) {
            Ok(response) => {
                if response.matched {
                    self.requests_matched.fetch_add(1, Ordering::Relaxed);
                }
                response
            }
            Err(e) => {
                self.request_errors.fetch_add(1, Ordering::Relaxed);
                warn!(category = %request.category, error = %e, "Evaluation failed");
                DispatchResponse::error(request.id.clone(), e.to_string())
            }
        }
    }

    fn evaluate(&self, request: &DispatchRequest) -> Result<DispatchResponse, RuleError> {
        let header = XmlDocument::parse(&request.header)?;
        let body = XmlDocument::parse(&request.body)?;
        let evaluator = self.registry.evaluator(&request.category);

        let response = match evaluator.evaluate_with_trace(&header, &body)? {
            Some(matched) => DispatchResponse {
                id: request.id.clone(),
                matched: true,
                request: Some(matched.request),
                rule: Some(matched.rule),
                outputs: Some(matched.outputs),
                error: None,
            },
            None => DispatchResponse {
                id: request.id.clone(),
                ..Default::default()
            },
        };

        Ok(response)
    }

    /// Handle one raw input line.
    pub fn handle_line(&self, line: &str) -> DispatchResponse {
        match serde_json::from_str::<DispatchRequest>(line) {
            Ok(request) => self.dispatch(&request),
            Err(e) => {
                self.requests_total.fetch_add(1, Ordering::Relaxed);
                self.request_errors.fetch_add(1, Ordering::Relaxed);
                DispatchResponse::error(None, format!("Invalid request: {e}"))
            }
        }
    }

    /// Serve requests until the reader is exhausted.
    ///
    /// Evaluation runs on the blocking pool: a first access to a category
    /// reads the repository synchronously.
    pub async fn run<R, W>(
        self: &Arc<Self>,
        reader: R,
        mut writer: W,
    ) -> std::io::Result<DispatchStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let service = Arc::clone(self);
            let response = tokio::task::spawn_blocking(move || service.handle_line(&line))
                .await
                .map_err(std::io::Error::other)?;
            debug!(matched = response.matched, error = ?response.error, "Dispatched request");

            let mut encoded = serde_json::to_string(&response)?;
            encoded.push('\n');
            writer.write_all(encoded.as_bytes()).await?;
            writer.flush().await?;
        }

        let stats = self.stats();
        info!(
            requests = stats.requests,
            matched = stats.matched,
            errors = stats.errors,
            "Dispatch service stopped"
        );
        Ok(stats)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            requests: self.requests_total.load(Ordering::Relaxed),
            matched: self.requests_matched.load(Ordering::Relaxed),
            errors: self.request_errors.load(Ordering::Relaxed),
        }
    }
}
