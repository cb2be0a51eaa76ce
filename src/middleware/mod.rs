//! Request middleware: timed logging outside, error counting inside.
//!
//! The dispatcher runs every tool call and resource read through both
//! wrappers. Order is a contract: the logging layer stays outermost so its
//! timing brackets include the error path. Neither wrapper swallows; both
//! observe and re-raise.

use crate::config::LoggingConfig;
use crate::utils::error::{Result, ScoutError};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Whether a request came in as a tool call or a resource read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Tool,
    Resource,
}

/// What the middlewares know about one in-flight request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub kind: RequestKind,
    /// Tool name or resource URI.
    pub name: String,
    /// Compact argument rendering for log records.
    pub summary: String,
}

impl RequestContext {
    pub fn tool(name: &str, arguments: &serde_json::Value) -> Self {
        let mut summary = arguments.to_string();
        if summary.len() > 200 {
            let mut cut = 200;
            while !summary.is_char_boundary(cut) {
                cut -= 1;
            }
            summary.truncate(cut);
            summary.push_str("...");
        }
        Self {
            kind: RequestKind::Tool,
            name: name.to_string(),
            summary,
        }
    }

    pub fn resource(uri: &str) -> Self {
        Self {
            kind: RequestKind::Resource,
            name: uri.to_string(),
            summary: String::new(),
        }
    }

    /// Stat key: `tool:<name>` or `resource:<uri>`.
    pub fn key(&self) -> String {
        match self.kind {
            RequestKind::Tool => format!("tool:{}", self.name),
            RequestKind::Resource => format!("resource:{}", self.name),
        }
    }
}

/// A result the logging layer can summarize in its end record.
pub trait Describe {
    fn describe(&self) -> String;
}

impl Describe for String {
    fn describe(&self) -> String {
        format!("{} chars", self.len())
    }
}

#[derive(Debug, Default, Clone)]
struct Timing {
    count: u64,
    total_ms: f64,
    min_ms: f64,
    max_ms: f64,
}

/// Per-operation timing snapshot.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimingStats {
    pub count: u64,
    pub total_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
}

/// Brackets every dispatch with start/end records and wall-time accounting.
/// End records go to WARN when the request ran past the slow threshold.
pub struct LoggingMiddleware {
    slow_threshold: Duration,
    log_payloads: bool,
    timings: DashMap<String, Timing>,
}

impl LoggingMiddleware {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            slow_threshold: Duration::from_millis(config.slow_threshold_ms),
            log_payloads: config.payloads,
            timings: DashMap::new(),
        }
    }

    pub async fn call<T, F, Fut>(&self, ctx: &RequestContext, next: F) -> Result<T>
    where
        T: Describe,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match ctx.kind {
            RequestKind::Tool => info!(">>> TOOL: {}({})", ctx.name, ctx.summary),
            RequestKind::Resource => info!(">>> RESOURCE: {}", ctx.name),
        }

        let start = Instant::now();
        let result = next().await;
        let elapsed = start.elapsed();
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.record(ctx.key(), ms);

        match &result {
            Ok(value) => {
                let summary = value.describe();
                if self.log_payloads {
                    debug!("payload {} -> {:?}", ctx.name, summary);
                }
                if self.is_slow(elapsed) {
                    warn!("<<< SLOW {} -> {} [{:.0}ms]", ctx.name, summary, ms);
                } else {
                    info!("<<< {} -> {} [{:.0}ms]", ctx.name, summary, ms);
                }
            }
            Err(e) => {
                error!("!!! {} -> {}: {} [{:.0}ms]", ctx.name, e.kind(), e, ms);
            }
        }

        result
    }

    /// A request is slow only when it runs strictly past the threshold;
    /// landing exactly on it does not warn.
    fn is_slow(&self, elapsed: Duration) -> bool {
        elapsed > self.slow_threshold
    }

    fn record(&self, key: String, ms: f64) {
        let mut entry = self.timings.entry(key).or_default();
        entry.count += 1;
        entry.total_ms += ms;
        entry.min_ms = if entry.count == 1 {
            ms
        } else {
            entry.min_ms.min(ms)
        };
        entry.max_ms = entry.max_ms.max(ms);
    }

    pub fn get_stats(&self) -> HashMap<String, TimingStats> {
        self.timings
            .iter()
            .map(|entry| {
                let t = entry.value();
                (
                    entry.key().clone(),
                    TimingStats {
                        count: t.count,
                        total_ms: t.total_ms,
                        min_ms: t.min_ms,
                        max_ms: t.max_ms,
                        avg_ms: if t.count == 0 {
                            0.0
                        } else {
                            t.total_ms / t.count as f64
                        },
                    },
                )
            })
            .collect()
    }

    pub fn reset_stats(&self) {
        self.timings.clear();
    }
}

type ErrorCallback = Box<dyn Fn(&ScoutError) + Send + Sync>;

/// Counts raised errors by kind, then re-raises.
pub struct ErrorMiddleware {
    counters: DashMap<String, u64>,
    include_traceback: bool,
    callback: Option<ErrorCallback>,
}

impl ErrorMiddleware {
    pub fn new(include_traceback: bool) -> Self {
        Self {
            counters: DashMap::new(),
            include_traceback,
            callback: None,
        }
    }

    /// Install a hook invoked for every observed error.
    pub fn with_callback(mut self, callback: ErrorCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub async fn call<T, F, Fut>(&self, ctx: &RequestContext, next: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = next().await;
        if let Err(e) = &result {
            *self.counters.entry(e.kind().to_string()).or_insert(0) += 1;
            if self.include_traceback {
                error!("{} raised {}: {}", ctx.name, e.kind(), error_chain(e));
            }
            if let Some(callback) = &self.callback {
                callback(e);
            }
        }
        result
    }

    pub fn get_stats(&self) -> HashMap<String, u64> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn reset_stats(&self) {
        self.counters.clear();
    }
}

/// Render the full cause chain of an error for traceback-style records.
fn error_chain(err: &ScoutError) -> String {
    let mut out = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        out.push_str(" <- ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
