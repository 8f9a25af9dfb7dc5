//! Structured sink: forwards every event into the `tracing` pipeline under the
//! `host_admin::events` target, one field per attribute.

use shared_types::LogLevel;
use tracing::{event, Level};

use super::{
    EventEmitter, FunctionExecutionAggregateEvent, FunctionExecutionEvent, FunctionMetricEvent,
    FunctionTraceEvent,
};

pub struct TracingEventEmitter;

macro_rules! trace_event_at {
    ($level:expr, $e:expr) => {
        event!(
            target: "host_admin::events",
            $level,
            category = "SYSTEM",
            subscription_id = %$e.subscription_id,
            app_name = %$e.app_name,
            function_name = $e.function_name.as_deref(),
            event_name = %$e.event_name,
            source = %$e.source,
            details = %$e.details,
            exception_type = $e.exception_type.as_deref(),
            exception_message = $e.exception_message.as_deref(),
            function_invocation_id = $e.function_invocation_id.as_deref(),
            host_instance_id = $e.host_instance_id.as_deref(),
            activity_id = $e.activity_id.as_deref(),
            properties = ?$e.properties,
            "{}",
            $e.summary
        )
    };
}

impl EventEmitter for TracingEventEmitter {
    fn log_function_trace_event(&self, e: &FunctionTraceEvent) {
        match e.level {
            LogLevel::Off => {}
            LogLevel::Error => trace_event_at!(Level::ERROR, e),
            LogLevel::Warning => trace_event_at!(Level::WARN, e),
            LogLevel::Info => trace_event_at!(Level::INFO, e),
            LogLevel::Verbose => trace_event_at!(Level::DEBUG, e),
        }
    }

    fn log_function_metric_event(&self, e: &FunctionMetricEvent) {
        event!(
            target: "host_admin::events",
            Level::INFO,
            category = "METRICS",
            subscription_id = %e.subscription_id,
            app_name = %e.app_name,
            function_name = e.function_name.as_deref(),
            event_name = %e.event_name,
            average = e.average,
            minimum = e.minimum,
            maximum = e.maximum,
            count = e.count,
            "metric"
        );
    }

    fn log_function_execution_aggregate_event(&self, e: &FunctionExecutionAggregateEvent) {
        event!(
            target: "host_admin::events",
            Level::INFO,
            category = "METRICS",
            site_name = %e.site_name,
            function_name = %e.function_name,
            execution_time_ms = e.execution_time_ms,
            started_count = e.started_count,
            completed_count = e.completed_count,
            failed_count = e.failed_count,
            "execution aggregate"
        );
    }

    fn log_function_execution_event(&self, e: &FunctionExecutionEvent) {
        event!(
            target: "host_admin::events",
            Level::INFO,
            category = "SYSTEM",
            execution_id = %e.execution_id,
            site_name = %e.site_name,
            concurrency = e.concurrency,
            function_name = %e.function_name,
            invocation_id = %e.invocation_id,
            stage = e.stage.as_str(),
            execution_time_ms = e.execution_time_ms,
            success = e.success,
            "execution"
        );
    }
}
