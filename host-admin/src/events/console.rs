//! Baseline sink: one human-readable line per event on a text stream.
//!
//! Lines are tagged `SYSTEM` (trace, execution) or `METRICS` (metric,
//! aggregate) followed by the event kind and comma-separated fields.

use std::collections::BTreeMap;
use std::io::{Stdout, Write};

use parking_lot::Mutex;

use super::{
    EventEmitter, FunctionExecutionAggregateEvent, FunctionExecutionEvent, FunctionMetricEvent,
    FunctionTraceEvent,
};

const SYSTEM_CATEGORY: &str = "SYSTEM";
const METRICS_CATEGORY: &str = "METRICS";

pub struct ConsoleEventEmitter<W: Write + Send = Stdout> {
    out: Mutex<W>,
}

impl ConsoleEventEmitter<Stdout> {
    pub fn stdout() -> Self {
        Self::with_writer(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleEventEmitter<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn write_line(&self, category: &str, kind: &str, fields: &str) {
        let mut out = self.out.lock();
        // Write failures are dropped; emission never fails the caller.
        let _ = writeln!(out, "{category} {kind} {fields}");
        let _ = out.flush();
    }
}

/// Keep a value on one line and inside its quotes.
fn normalize(value: &str) -> String {
    value
        .replace('"', "'")
        .replace("\r\n", " ")
        .replace(['\r', '\n'], " ")
}

/// `k=v;k=v`, in key order.
fn properties(props: &BTreeMap<String, String>) -> String {
    props
        .iter()
        .map(|(k, v)| format!("{}={}", normalize(k), normalize(v)))
        .collect::<Vec<_>>()
        .join(";")
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

impl<W: Write + Send> EventEmitter for ConsoleEventEmitter<W> {
    fn log_function_trace_event(&self, e: &FunctionTraceEvent) {
        let fields = format!(
            "{},{},{},{},{},{},\"{}\",\"{}\",{},\"{}\",{},{},{},{},\"{}\"",
            e.level,
            e.subscription_id,
            e.app_name,
            opt(&e.function_name),
            e.event_name,
            e.source,
            normalize(&e.summary),
            normalize(&e.details),
            opt(&e.exception_type),
            normalize(opt(&e.exception_message)),
            opt(&e.function_invocation_id),
            opt(&e.host_instance_id),
            opt(&e.activity_id),
            e.timestamp.to_rfc3339(),
            properties(&e.properties),
        );
        self.write_line(SYSTEM_CATEGORY, "trace", &fields);
    }

    fn log_function_metric_event(&self, e: &FunctionMetricEvent) {
        let fields = format!(
            "{},{},{},{},{},{},{},{},{}",
            e.subscription_id,
            e.app_name,
            opt(&e.function_name),
            e.event_name,
            e.average,
            e.minimum,
            e.maximum,
            e.count,
            e.timestamp.to_rfc3339(),
        );
        self.write_line(METRICS_CATEGORY, "metric", &fields);
    }

    fn log_function_execution_aggregate_event(&self, e: &FunctionExecutionAggregateEvent) {
        let fields = format!(
            "{},{},{},{},{},{}",
            e.site_name,
            e.function_name,
            e.execution_time_ms,
            e.started_count,
            e.completed_count,
            e.failed_count,
        );
        self.write_line(METRICS_CATEGORY, "aggregate", &fields);
    }

    fn log_function_execution_event(&self, e: &FunctionExecutionEvent) {
        let fields = format!(
            "{},{},{},{},{},{},{},{}",
            e.execution_id,
            e.site_name,
            e.concurrency,
            e.function_name,
            e.invocation_id,
            e.stage.as_str(),
            e.execution_time_ms,
            e.success,
        );
        self.write_line(SYSTEM_CATEGORY, "execution", &fields);
    }
}
