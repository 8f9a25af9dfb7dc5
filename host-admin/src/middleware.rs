use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use url::form_urlencoded;

use crate::auth::{FUNCTIONS_KEY_HEADER, FUNCTIONS_KEY_QUERY};
use crate::AppState;

/// Middleware: resolve the caller's host key into a `Principal` extension.
/// Requests without a recognised key get an anonymous principal.
pub async fn resolve_principal(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let presented = req
        .headers()
        .get(FUNCTIONS_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query_key(req.uri().query()));

    let principal = state.keys.resolve(presented.as_deref());
    debug!(level = ?principal.level, "caller resolved");
    req.extensions_mut().insert(principal);

    next.run(req).await
}

/// Form-decoded `code` parameter. Keys are base64-style, so clients send
/// them percent-encoded.
fn query_key(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k.eq_ignore_ascii_case(FUNCTIONS_KEY_QUERY))
        .map(|(_, v)| v.into_owned())
}

/// Middleware: tell the live host an admin client is active before every
/// admin action runs.
pub async fn notify_debug(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    if let Some(instance) = state.host.instance() {
        instance.notify_debug();
    }
    next.run(req).await
}

/// Middleware: feed per-route latency into the metrics aggregator.
pub async fn record_request_metrics(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let event_name = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| format!("{} {}", req.method(), path.as_str()));
    let started = Instant::now();

    let response = next.run(req).await;

    if let Some(event_name) = event_name {
        state
            .metrics
            .record(&event_name, started.elapsed().as_millis() as i64);
    }
    response
}
