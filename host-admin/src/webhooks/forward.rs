use anyhow::{anyhow, Context};
use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, Request, Response};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{WebHookHandler, WEBHOOK_ROUTE_PREFIX};

/// Relays webhook requests to an extension listening elsewhere, e.g. inside
/// the function host.
#[derive(Debug, Clone)]
pub struct ForwardingWebHookHandler {
    name: String,
    upstream_base_url: String,
    client: reqwest::Client,
}

impl ForwardingWebHookHandler {
    pub fn new(name: &str, upstream_base_url: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            upstream_base_url: upstream_base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Upstream URL for a request path under `/runtime/webhooks/{name}`.
    fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        let prefix = format!("{WEBHOOK_ROUTE_PREFIX}/");
        let extra = path
            .strip_prefix(&prefix)
            .and_then(|rest| {
                let (name, tail) = rest.split_once('/').unwrap_or((rest, ""));
                name.eq_ignore_ascii_case(&self.name).then_some(tail)
            })
            .unwrap_or_default();

        let mut url = self.upstream_base_url.clone();
        if !extra.is_empty() {
            url.push('/');
            url.push_str(extra);
        }
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        url
    }
}

#[async_trait]
impl WebHookHandler for ForwardingWebHookHandler {
    async fn handle(
        &self,
        request: Request<Bytes>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Response<Bytes>> {
        let (parts, body) = request.into_parts();
        let upstream_url = self.upstream_url(parts.uri.path(), parts.uri.query());
        debug!(webhook = %self.name, %upstream_url, "forwarding webhook request");

        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
            .unwrap_or(reqwest::Method::POST);
        let mut upstream_req = self.client.request(method, &upstream_url).body(body);
        upstream_req = copy_request_headers(upstream_req, &parts.headers);

        let upstream_res = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(anyhow!("webhook '{}' forwarding cancelled", self.name));
            }
            res = upstream_req.send() => res.map_err(|e| {
                error!(webhook = %self.name, %upstream_url, error = %e, "webhook upstream request failed");
                e
            }).context("webhook upstream request failed")?,
        };

        let status = upstream_res.status();
        let headers = upstream_res.headers().clone();
        let bytes = upstream_res
            .bytes()
            .await
            .context("invalid webhook upstream response")?;

        let mut response = Response::new(bytes);
        *response.status_mut() = status;
        copy_response_headers(response.headers_mut(), &headers);
        Ok(response)
    }
}

fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    name == header::CONNECTION
        || name.as_str().eq_ignore_ascii_case("proxy-connection")
        || name.as_str().eq_ignore_ascii_case("keep-alive")
        || name == header::TE
        || name == header::TRAILER
        || name == header::TRANSFER_ENCODING
        || name == header::UPGRADE
}

fn copy_request_headers(
    mut request: reqwest::RequestBuilder,
    headers: &HeaderMap,
) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        if name == header::HOST || name == header::CONTENT_LENGTH || is_hop_by_hop(name) {
            continue;
        }
        request = request.header(name, value);
    }
    request
}

fn copy_response_headers(dest: &mut HeaderMap, src: &HeaderMap) {
    for (name, value) in src {
        if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
            continue;
        }
        if let Ok(header_value) = HeaderValue::from_bytes(value.as_bytes()) {
            dest.append(name, header_value);
        }
    }
}
