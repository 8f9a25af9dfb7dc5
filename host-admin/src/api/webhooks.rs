use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Request, State},
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;

use crate::auth::Principal;
use crate::AppState;

/// GET|POST /runtime/webhooks/{name}/{*extra}
pub async fn invoke_webhook(
    State(state): State<Arc<AppState>>,
    Path(params): Path<HashMap<String, String>>,
    req: Request,
) -> Response {
    let name = params.get("name").cloned().unwrap_or_default();
    let principal = req
        .extensions()
        .get::<Principal>()
        .cloned()
        .unwrap_or_else(Principal::anonymous);

    // Dropped with this future when the caller disconnects.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match state
        .webhooks
        .dispatch(&name, &principal, req, cancel)
        .await
    {
        Ok(response) => response.map(Body::from),
        Err(e) => e.into_response(),
    }
}
