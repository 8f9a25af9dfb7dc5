use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared_types::{
    AssignmentContext, HostLogEntry, HostStatus, FUNCTION_NAME_PROPERTY, LOG_ENTRIES_EXPECTED,
};
use tracing::info;

use crate::error::AdminError;
use crate::events::FunctionTraceEvent;
use crate::status::HOST_VERSION;
use crate::AppState;

pub const NODE_DEFAULT_VERSION: &str = "8.5.0";

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "checkLoad")]
    pub check_load: Option<String>,
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some(v) if v == "1" || v.eq_ignore_ascii_case("true"))
}

/// GET /admin/host/status[?checkLoad=1]
pub async fn get_host_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Json<HostStatus> {
    let check_load = is_truthy(query.check_load.as_deref());
    Json(state.status.get_status(check_load).await)
}

/// POST /admin/host/ping
pub async fn ping() -> StatusCode {
    StatusCode::OK
}

/// POST /admin/host/log with an array of log entries
pub async fn post_host_log(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, AdminError> {
    let entries: Option<Vec<HostLogEntry>> = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AdminError::BadRequest(format!("{LOG_ENTRIES_EXPECTED} {e}")))?
    };
    let entries = entries.ok_or_else(|| AdminError::BadRequest(LOG_ENTRIES_EXPECTED.to_string()))?;

    let host_instance_id = state.host.instance().map(|i| i.id.clone());
    for entry in entries {
        let mut event = FunctionTraceEvent::new(
            entry.level,
            entry.source.unwrap_or_default(),
            entry.message,
        );
        event.event_name = "HostLog".to_string();
        event.subscription_id = state.identity.subscription_id.clone();
        event.app_name = state.app_name().to_string();
        event.host_instance_id = host_instance_id.clone();
        if let Some(function_name) = entry.function_name {
            event
                .properties
                .insert(FUNCTION_NAME_PROPERTY.to_string(), function_name.clone());
            event.function_name = Some(function_name);
        }
        state.emitter.log_function_trace_event(&event);
    }

    Ok(StatusCode::OK)
}

/// POST /admin/host/debug
pub async fn launch_debugger(State(state): State<Arc<AppState>>) -> Result<StatusCode, AdminError> {
    if !state.self_hosted {
        return Err(AdminError::NotImplemented(
            "Debugger launch is only available when self hosted".to_string(),
        ));
    }
    if state.debugger.is_attached() {
        return Err(AdminError::Conflict(
            "A debugger is already attached".to_string(),
        ));
    }
    state.debugger.launch()?;
    Ok(StatusCode::OK)
}

/// POST /admin/assign
pub async fn assign(
    State(state): State<Arc<AppState>>,
    Json(context): Json<AssignmentContext>,
) -> Result<StatusCode, AdminError> {
    info!(app_name = %context.app_name, "assignment requested");
    state.assignment.assign(&context).await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /admin/info
pub async fn get_instance_info() -> Json<BTreeMap<&'static str, &'static str>> {
    Json(BTreeMap::from([
        ("FUNCTIONS_EXTENSION_VERSION", HOST_VERSION),
        ("WEBSITE_NODE_DEFAULT_VERSION", NODE_DEFAULT_VERSION),
    ]))
}
