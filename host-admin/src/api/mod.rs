//! HTTP routes for the admin control plane and extension webhooks.

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{middleware, AppState};

pub mod admin;
pub mod webhooks;

/// Build the full admin surface.
pub fn router(state: Arc<AppState>) -> Router {
    // Every admin action notifies the live host first.
    let admin_routes = Router::new()
        .route("/admin/host/status", get(admin::get_host_status))
        .route("/admin/host/ping", post(admin::ping))
        .route("/admin/host/log", post(admin::post_host_log))
        .route("/admin/host/debug", post(admin::launch_debugger))
        .route("/admin/assign", post(admin::assign))
        .route("/admin/info", get(admin::get_instance_info))
        .route_layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::notify_debug,
        ));

    let webhook_routes = Router::new()
        .route(
            "/runtime/webhooks/{name}",
            get(webhooks::invoke_webhook).post(webhooks::invoke_webhook),
        )
        .route(
            "/runtime/webhooks/{name}/{*extra}",
            get(webhooks::invoke_webhook).post(webhooks::invoke_webhook),
        );

    Router::new()
        .merge(admin_routes)
        .merge(webhook_routes)
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::record_request_metrics,
        ))
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::resolve_principal,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
