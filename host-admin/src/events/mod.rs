//! Operational telemetry events
//!
//! Every emission is fire-and-forget: methods return nothing and a sink that
//! fails to write drops the record. Ordering is only preserved within one
//! method's call stream, and only if the sink itself preserves it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared_types::LogLevel;

use crate::config::EventSinkKind;

pub mod console;
pub mod metrics;
pub mod tracing_sink;

pub use console::ConsoleEventEmitter;
pub use metrics::MetricsAggregator;
pub use tracing_sink::TracingEventEmitter;

/// Trace-level event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionTraceEvent {
    pub level: LogLevel,
    pub subscription_id: String,
    pub app_name: String,
    pub function_name: Option<String>,
    pub event_name: String,
    pub source: String,
    pub summary: String,
    pub details: String,
    pub exception_type: Option<String>,
    pub exception_message: Option<String>,
    pub function_invocation_id: Option<String>,
    pub host_instance_id: Option<String>,
    pub activity_id: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl FunctionTraceEvent {
    pub fn new(level: LogLevel, source: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
            summary: summary.into(),
            timestamp: Utc::now(),
            ..Default::default()
        }
    }
}

/// Min/avg/max/count of one measurement over an aggregation window.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionMetricEvent {
    pub subscription_id: String,
    pub app_name: String,
    pub function_name: Option<String>,
    pub event_name: String,
    pub average: i64,
    pub minimum: i64,
    pub maximum: i64,
    pub count: u64,
    pub timestamp: DateTime<Utc>,
}

/// Per-function rolled-up execution counters over an aggregation window.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExecutionAggregateEvent {
    pub site_name: String,
    pub function_name: String,
    pub execution_time_ms: u64,
    pub started_count: u64,
    pub completed_count: u64,
    pub failed_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    Started,
    Finished,
}

impl ExecutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStage::Started => "Started",
            ExecutionStage::Finished => "Finished",
        }
    }
}

/// Timing and outcome of a single invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExecutionEvent {
    pub execution_id: String,
    pub site_name: String,
    pub concurrency: usize,
    pub function_name: String,
    pub invocation_id: String,
    pub stage: ExecutionStage,
    pub execution_time_ms: u64,
    pub success: bool,
}

/// Sink for structured operational events.
pub trait EventEmitter: Send + Sync {
    fn log_function_trace_event(&self, event: &FunctionTraceEvent);

    fn log_function_metric_event(&self, event: &FunctionMetricEvent);

    fn log_function_execution_aggregate_event(&self, event: &FunctionExecutionAggregateEvent);

    fn log_function_execution_event(&self, event: &FunctionExecutionEvent);
}

/// Build the sink selected at startup.
pub fn build_event_emitter(kind: EventSinkKind) -> Arc<dyn EventEmitter> {
    match kind {
        EventSinkKind::Console => Arc::new(ConsoleEventEmitter::stdout()),
        EventSinkKind::Tracing => Arc::new(TracingEventEmitter),
    }
}
