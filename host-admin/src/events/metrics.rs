//! Windowed aggregation of latency samples and execution counters.
//!
//! Hot paths only touch a map entry; `flush` drains everything and hands the
//! aggregates to the event sink.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use super::{EventEmitter, FunctionExecutionAggregateEvent, FunctionMetricEvent};
use crate::assignment::AssignmentState;

#[derive(Debug, Clone, Copy)]
struct MetricWindow {
    minimum: i64,
    maximum: i64,
    total: i64,
    count: u64,
}

impl MetricWindow {
    fn new(value: i64) -> Self {
        Self {
            minimum: value,
            maximum: value,
            total: value,
            count: 1,
        }
    }

    fn add(&mut self, value: i64) {
        self.minimum = self.minimum.min(value);
        self.maximum = self.maximum.max(value);
        self.total = self.total.saturating_add(value);
        self.count += 1;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ExecutionWindow {
    execution_time_ms: u64,
    started: u64,
    completed: u64,
    failed: u64,
}

/// Identity stamped on every emitted event.
#[derive(Debug, Clone, Default)]
pub struct SiteIdentity {
    pub subscription_id: String,
    pub site_name: String,
    /// Shared with the assignment controller.
    pub assignment: AssignmentState,
}

impl SiteIdentity {
    pub fn new(subscription_id: impl Into<String>, site_name: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            site_name: site_name.into(),
            assignment: AssignmentState::new(),
        }
    }

    /// The assigned app once there is one, otherwise the site name.
    pub fn app_name(&self) -> &str {
        self.assignment
            .assigned_app()
            .unwrap_or(&self.site_name)
    }
}

pub struct MetricsAggregator {
    identity: SiteIdentity,
    metrics: DashMap<String, MetricWindow>,
    executions: DashMap<String, ExecutionWindow>,
}

impl MetricsAggregator {
    pub fn new(identity: SiteIdentity) -> Arc<Self> {
        Arc::new(Self {
            identity,
            metrics: DashMap::new(),
            executions: DashMap::new(),
        })
    }

    /// Record one sample of `event_name`.
    pub fn record(&self, event_name: &str, value: i64) {
        self.metrics
            .entry(event_name.to_string())
            .and_modify(|w| w.add(value))
            .or_insert_with(|| MetricWindow::new(value));
    }

    pub fn execution_started(&self, function_name: &str) {
        self.executions
            .entry(function_name.to_string())
            .or_default()
            .started += 1;
    }

    pub fn execution_finished(&self, function_name: &str, elapsed: Duration, success: bool) {
        let mut window = self.executions.entry(function_name.to_string()).or_default();
        window.execution_time_ms = window
            .execution_time_ms
            .saturating_add(elapsed.as_millis() as u64);
        if success {
            window.completed += 1;
        } else {
            window.failed += 1;
        }
    }

    /// Drain the current window into `emitter`.
    pub fn flush(&self, emitter: &dyn EventEmitter) {
        let names: Vec<String> = self.metrics.iter().map(|e| e.key().clone()).collect();
        for name in names {
            let Some((event_name, w)) = self.metrics.remove(&name) else {
                continue;
            };
            emitter.log_function_metric_event(&FunctionMetricEvent {
                subscription_id: self.identity.subscription_id.clone(),
                app_name: self.identity.app_name().to_string(),
                function_name: None,
                event_name,
                average: w.total / w.count.max(1) as i64,
                minimum: w.minimum,
                maximum: w.maximum,
                count: w.count,
                timestamp: Utc::now(),
            });
        }

        let functions: Vec<String> = self.executions.iter().map(|e| e.key().clone()).collect();
        for name in functions {
            let Some((function_name, w)) = self.executions.remove(&name) else {
                continue;
            };
            emitter.log_function_execution_aggregate_event(&FunctionExecutionAggregateEvent {
                site_name: self.identity.site_name.clone(),
                function_name,
                execution_time_ms: w.execution_time_ms,
                started_count: w.started,
                completed_count: w.completed,
                failed_count: w.failed,
            });
        }
    }

    /// Background task: flush every `period`.
    pub async fn run_flush_loop(self: Arc<Self>, emitter: Arc<dyn EventEmitter>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick is immediate; skip it
        loop {
            interval.tick().await;
            debug!("flushing metric aggregates");
            self.flush(emitter.as_ref());
        }
    }
}
