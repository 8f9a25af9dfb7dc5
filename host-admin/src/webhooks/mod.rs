//! Extension webhooks: `/runtime/webhooks/{name}/{*extra}`.
//!
//! Dispatch resolves the handler, authorizes the caller against the
//! extension's system key, buffers the request into the handler's shape and
//! returns whatever the handler answers. There is no admission control; any
//! number of invocations may be in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{uri::PathAndQuery, Request, Response, Uri};
use bytes::Bytes;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::auth::{
    AuthPolicy, AuthorizationResult, AuthorizationService, Principal, FUNCTIONS_KEY_HEADER,
    FUNCTIONS_KEY_QUERY,
};
use crate::error::AdminError;
use crate::events::{EventEmitter, ExecutionStage, FunctionExecutionEvent, MetricsAggregator};

pub mod forward;

pub use forward::ForwardingWebHookHandler;

pub const WEBHOOK_ROUTE_PREFIX: &str = "/runtime/webhooks";

/// An extension endpoint reachable through the webhook route.
#[async_trait]
pub trait WebHookHandler: Send + Sync {
    /// Handle one buffered request. `cancel` fires when the caller goes away.
    async fn handle(
        &self,
        request: Request<Bytes>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Response<Bytes>>;
}

/// Name → handler lookup; names are case-insensitive.
#[derive(Default, Clone)]
pub struct WebHookRegistry {
    handlers: HashMap<String, Arc<dyn WebHookHandler>>,
}

impl WebHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn WebHookHandler>) {
        self.handlers.insert(name.to_lowercase(), handler);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn WebHookHandler>> {
        self.handlers.get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// System key name guarding the webhook of extension `name`.
pub fn key_name(name: &str) -> String {
    format!("{}_extension", name.to_lowercase())
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct WebHookDispatcher {
    registry: WebHookRegistry,
    auth: Arc<dyn AuthorizationService>,
    emitter: Arc<dyn EventEmitter>,
    metrics: Arc<MetricsAggregator>,
    site_name: String,
    in_flight: AtomicUsize,
}

impl WebHookDispatcher {
    pub fn new(
        registry: WebHookRegistry,
        auth: Arc<dyn AuthorizationService>,
        emitter: Arc<dyn EventEmitter>,
        metrics: Arc<MetricsAggregator>,
        site_name: String,
    ) -> Self {
        Self {
            registry,
            auth,
            emitter,
            metrics,
            site_name,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Invocations currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn dispatch(
        &self,
        name: &str,
        principal: &Principal,
        request: Request<Body>,
        cancel: CancellationToken,
    ) -> Result<Response<Bytes>, AdminError> {
        let handler = self
            .registry
            .resolve(name)
            .ok_or_else(|| AdminError::NotFound(format!("No webhook registered for '{name}'")))?;

        let key = key_name(name);
        if let AuthorizationResult::Failure(reason) =
            self.auth.authorize(principal, &key, AuthPolicy::SystemOrAdmin)
        {
            warn!(webhook = name, "webhook authorization failed: {reason}");
            return Err(AdminError::Unauthorized(reason));
        }

        let request = into_handler_request(request).await?;

        let function_name = format!("webhook:{}", name.to_lowercase());
        let invocation_id = uuid::Uuid::new_v4().to_string();
        let concurrency = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.metrics.execution_started(&function_name);
        self.emitter
            .log_function_execution_event(&FunctionExecutionEvent {
                execution_id: invocation_id.clone(),
                site_name: self.site_name.clone(),
                concurrency,
                function_name: function_name.clone(),
                invocation_id: invocation_id.clone(),
                stage: ExecutionStage::Started,
                execution_time_ms: 0,
                success: false,
            });
        debug!(webhook = name, %invocation_id, concurrency, "invoking webhook handler");

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(anyhow!("webhook '{name}' cancelled by caller")),
            result = handler.handle(request, cancel.clone()) => result,
        };
        let elapsed = started.elapsed();

        self.metrics
            .execution_finished(&function_name, elapsed, result.is_ok());
        self.emitter
            .log_function_execution_event(&FunctionExecutionEvent {
                execution_id: invocation_id.clone(),
                site_name: self.site_name.clone(),
                concurrency,
                function_name,
                invocation_id,
                stage: ExecutionStage::Finished,
                execution_time_ms: elapsed.as_millis() as u64,
                success: result.is_ok(),
            });

        result.map_err(AdminError::Fatal)
    }
}

/// Buffer the body and drop the host key the caller authenticated with.
async fn into_handler_request(request: Request<Body>) -> Result<Request<Bytes>, AdminError> {
    let (mut parts, body) = request.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| AdminError::BadRequest(format!("invalid request body: {e}")))?
        .to_bytes();

    parts.headers.remove(FUNCTIONS_KEY_HEADER);
    if let Some(uri) = strip_key_query(&parts.uri) {
        parts.uri = uri;
    }

    Ok(Request::from_parts(parts, body))
}

/// The URI without the `code` parameter, or `None` when there is nothing
/// to strip. Remaining parameters are re-encoded.
fn strip_key_query(uri: &Uri) -> Option<Uri> {
    let query = uri.query()?;
    let pairs: Vec<_> = form_urlencoded::parse(query.as_bytes()).collect();
    let is_key = |k: &str| k.eq_ignore_ascii_case(FUNCTIONS_KEY_QUERY);
    if !pairs.iter().any(|(k, _)| is_key(&**k)) {
        return None;
    }

    let mut kept = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs.iter().filter(|(k, _)| !is_key(&**k)) {
        kept.append_pair(k, v);
    }
    let kept = kept.finish();
    let path_and_query = if kept.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{kept}", uri.path())
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}
