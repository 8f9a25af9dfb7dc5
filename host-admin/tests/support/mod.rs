//! Fakes and app builder shared by the admin API integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Barrier, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use host_admin::api;
use host_admin::assignment::{AssignmentController, PackageInstaller};
use host_admin::auth::{
    AuthPolicy, AuthorizationResult, AuthorizationService, HostKeys, KeyAuthorizationService,
    Principal,
};
use host_admin::debugger::Debugger;
use host_admin::events::metrics::SiteIdentity;
use host_admin::events::{
    EventEmitter, FunctionExecutionAggregateEvent, FunctionExecutionEvent, FunctionMetricEvent,
    FunctionTraceEvent, MetricsAggregator,
};
use host_admin::host::{HostInstance, HostLifecycleManager, HostState};
use host_admin::settings::EnvironmentConfigStore;
use host_admin::status::StatusReporter;
use host_admin::webhooks::{WebHookDispatcher, WebHookHandler, WebHookRegistry};
use host_admin::AppState;

/// Contains characters that must be percent-encoded in a query string.
pub const MASTER_KEY: &str = "master/secret==";
pub const SYSTEM_KEY_NAME: &str = "eventgrid_extension";
pub const SYSTEM_KEY: &str = "eventgrid-secret";
pub const SITE_NAME: &str = "test-site";
pub const HOST_ID: &str = "test-host";

/// Ordered record of side effects across the fakes.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

// ============================================================================
// Host
// ============================================================================

pub struct FakeHost {
    journal: Journal,
    pub state: Mutex<HostState>,
    pub instance: Mutex<Option<Arc<HostInstance>>>,
    pub last_error: Mutex<Option<Arc<anyhow::Error>>>,
    pub high_load: AtomicBool,
    pub load_checks: AtomicUsize,
    pub restarts: AtomicUsize,
    /// Signalled after each completed restart.
    pub restarted: Notify,
    /// When set, restarts block until a permit is added.
    pub restart_gate: Option<Arc<Semaphore>>,
}

impl FakeHost {
    fn new(journal: Journal, restart_gate: Option<Arc<Semaphore>>) -> Self {
        Self {
            journal,
            state: Mutex::new(HostState::Running),
            instance: Mutex::new(Some(Arc::new(HostInstance::new(Some(4242))))),
            last_error: Mutex::new(None),
            high_load: AtomicBool::new(false),
            load_checks: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
            restarted: Notify::new(),
            restart_gate,
        }
    }

    pub fn fail_with(&self, error: anyhow::Error) {
        *self.state.lock() = HostState::Error;
        *self.last_error.lock() = Some(Arc::new(error));
    }
}

#[async_trait]
impl HostLifecycleManager for FakeHost {
    fn state(&self) -> HostState {
        *self.state.lock()
    }

    fn instance(&self) -> Option<Arc<HostInstance>> {
        self.instance.lock().clone()
    }

    fn last_error(&self) -> Option<Arc<anyhow::Error>> {
        self.last_error.lock().clone()
    }

    async fn is_under_high_load(&self) -> bool {
        self.load_checks.fetch_add(1, Ordering::SeqCst);
        self.high_load.load(Ordering::SeqCst)
    }

    async fn restart_host(&self) {
        self.journal.push("restart");
        if let Some(gate) = &self.restart_gate {
            let _permit = gate.acquire().await;
        }
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.restarted.notify_one();
    }
}

// ============================================================================
// Package installer and settings
// ============================================================================

/// Writes each "downloaded" package as a real file under `download_dir`.
pub struct FakeInstaller {
    journal: Journal,
    download_dir: PathBuf,
    fail_download: bool,
    fail_extract: bool,
    pub downloads: AtomicUsize,
    pub extracts: AtomicUsize,
    pub archives: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl PackageInstaller for FakeInstaller {
    async fn download(&self, url: &str) -> anyhow::Result<PathBuf> {
        let n = self.downloads.fetch_add(1, Ordering::SeqCst);
        self.journal.push(format!("download {url}"));
        // Widen the window concurrent assignments race through.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        if self.fail_download {
            bail!("connection refused");
        }
        let archive = self.download_dir.join(format!("package-{n}.zip"));
        tokio::fs::write(&archive, b"PK").await?;
        self.archives.lock().push(archive.clone());
        Ok(archive)
    }

    async fn extract(&self, archive: &Path, destination: &Path) -> anyhow::Result<()> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        self.journal
            .push(format!("extract {}", destination.display()));
        if !archive.exists() {
            bail!("archive {} is missing", archive.display());
        }
        if self.fail_extract {
            bail!("corrupt archive");
        }
        Ok(())
    }
}

impl FakeInstaller {
    /// Downloaded archives still on disk.
    pub fn remaining_archives(&self) -> Vec<PathBuf> {
        self.archives
            .lock()
            .iter()
            .filter(|p| p.exists())
            .cloned()
            .collect()
    }
}

pub struct RecordingSettings {
    journal: Journal,
    reject_key: Option<String>,
    pub applied: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl EnvironmentConfigStore for RecordingSettings {
    async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.journal.push(format!("setting {key}={value}"));
        if self.reject_key.as_deref() == Some(key) {
            bail!("setting {key} rejected");
        }
        self.applied.lock().push((key.to_string(), value.to_string()));
        Ok(())
    }
}

// ============================================================================
// Telemetry and auth
// ============================================================================

#[derive(Default)]
pub struct RecordingEmitter {
    pub traces: Mutex<Vec<FunctionTraceEvent>>,
    pub metrics: Mutex<Vec<FunctionMetricEvent>>,
    pub aggregates: Mutex<Vec<FunctionExecutionAggregateEvent>>,
    pub executions: Mutex<Vec<FunctionExecutionEvent>>,
}

impl RecordingEmitter {
    pub fn traces_named(&self, event_name: &str) -> Vec<FunctionTraceEvent> {
        self.traces
            .lock()
            .iter()
            .filter(|e| e.event_name == event_name)
            .cloned()
            .collect()
    }
}

impl EventEmitter for RecordingEmitter {
    fn log_function_trace_event(&self, event: &FunctionTraceEvent) {
        self.traces.lock().push(event.clone());
    }

    fn log_function_metric_event(&self, event: &FunctionMetricEvent) {
        self.metrics.lock().push(event.clone());
    }

    fn log_function_execution_aggregate_event(&self, event: &FunctionExecutionAggregateEvent) {
        self.aggregates.lock().push(event.clone());
    }

    fn log_function_execution_event(&self, event: &FunctionExecutionEvent) {
        self.executions.lock().push(event.clone());
    }
}

/// Key authorization that counts how often it is consulted.
#[derive(Default)]
pub struct CountingAuth {
    inner: KeyAuthorizationService,
    pub calls: AtomicUsize,
}

impl AuthorizationService for CountingAuth {
    fn authorize(
        &self,
        principal: &Principal,
        resource_key: &str,
        policy: AuthPolicy,
    ) -> AuthorizationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.authorize(principal, resource_key, policy)
    }
}

#[derive(Default)]
pub struct FakeDebugger {
    pub attached: bool,
    pub launches: AtomicUsize,
}

impl Debugger for FakeDebugger {
    fn is_attached(&self) -> bool {
        self.attached
    }

    fn launch(&self) -> anyhow::Result<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Webhook handlers
// ============================================================================

/// Replies 418 describing what it received.
#[derive(Default)]
pub struct EchoHandler {
    pub calls: AtomicUsize,
    pub saw_key_header: AtomicBool,
    pub last_uri: Mutex<Option<String>>,
}

#[async_trait]
impl WebHookHandler for EchoHandler {
    async fn handle(
        &self,
        request: Request<Bytes>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Response<Bytes>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.headers().contains_key("x-functions-key") {
            self.saw_key_header.store(true, Ordering::SeqCst);
        }
        *self.last_uri.lock() = Some(request.uri().to_string());

        let body = format!(
            "{} {} {}",
            request.method(),
            request.uri().path(),
            String::from_utf8_lossy(request.body())
        );
        Ok(Response::builder()
            .status(StatusCode::IM_A_TEAPOT)
            .header("x-handled-by", "echo")
            .body(Bytes::from(body))?)
    }
}

/// Every invocation waits for `parties` invocations to be in flight.
pub struct BarrierHandler(pub Arc<Barrier>);

#[async_trait]
impl WebHookHandler for BarrierHandler {
    async fn handle(
        &self,
        _request: Request<Bytes>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Response<Bytes>> {
        self.0.wait().await;
        Ok(Response::new(Bytes::from_static(b"ok")))
    }
}

/// Never finishes on its own.
pub struct PendingHandler;

#[async_trait]
impl WebHookHandler for PendingHandler {
    async fn handle(
        &self,
        _request: Request<Bytes>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Response<Bytes>> {
        std::future::pending().await
    }
}

// ============================================================================
// App builder
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub host: Arc<FakeHost>,
    pub installer: Arc<FakeInstaller>,
    pub settings: Arc<RecordingSettings>,
    pub emitter: Arc<RecordingEmitter>,
    pub auth: Arc<CountingAuth>,
    pub debugger: Arc<FakeDebugger>,
    pub journal: Journal,
    pub script_root: tempfile::TempDir,
    pub download_dir: tempfile::TempDir,
}

#[derive(Default)]
pub struct TestAppBuilder {
    self_hosted: bool,
    debugger_attached: bool,
    fail_download: bool,
    fail_extract: bool,
    reject_setting: Option<String>,
    restart_gate: Option<Arc<Semaphore>>,
    webhooks: Vec<(String, Arc<dyn WebHookHandler>)>,
}

impl TestAppBuilder {
    pub fn self_hosted(mut self, value: bool) -> Self {
        self.self_hosted = value;
        self
    }

    pub fn debugger_attached(mut self, value: bool) -> Self {
        self.debugger_attached = value;
        self
    }

    pub fn fail_download(mut self) -> Self {
        self.fail_download = true;
        self
    }

    pub fn fail_extract(mut self) -> Self {
        self.fail_extract = true;
        self
    }

    pub fn reject_setting(mut self, key: &str) -> Self {
        self.reject_setting = Some(key.to_string());
        self
    }

    pub fn restart_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.restart_gate = Some(gate);
        self
    }

    pub fn webhook(mut self, name: &str, handler: Arc<dyn WebHookHandler>) -> Self {
        self.webhooks.push((name.to_string(), handler));
        self
    }

    pub fn build(self) -> TestApp {
        let journal = Journal::default();
        let script_root = tempfile::tempdir().expect("failed to create temp dir");
        let download_dir = tempfile::tempdir().expect("failed to create temp dir");
        let identity = SiteIdentity::new("sub-1", SITE_NAME);

        let host = Arc::new(FakeHost::new(journal.clone(), self.restart_gate));
        let installer = Arc::new(FakeInstaller {
            journal: journal.clone(),
            download_dir: download_dir.path().to_path_buf(),
            fail_download: self.fail_download,
            fail_extract: self.fail_extract,
            downloads: AtomicUsize::new(0),
            extracts: AtomicUsize::new(0),
            archives: Mutex::new(Vec::new()),
        });
        let settings = Arc::new(RecordingSettings {
            journal: journal.clone(),
            reject_key: self.reject_setting,
            applied: Mutex::new(Vec::new()),
        });
        let emitter = Arc::new(RecordingEmitter::default());
        let auth = Arc::new(CountingAuth::default());
        let debugger = Arc::new(FakeDebugger {
            attached: self.debugger_attached,
            launches: AtomicUsize::new(0),
        });
        let metrics = MetricsAggregator::new(identity.clone());

        let mut registry = WebHookRegistry::new();
        for (name, handler) in self.webhooks {
            registry.register(&name, handler);
        }

        let state = Arc::new(AppState {
            host: host.clone(),
            assignment: AssignmentController::new(
                host.clone(),
                installer.clone(),
                settings.clone(),
                script_root.path().to_path_buf(),
                identity.assignment.clone(),
            ),
            status: StatusReporter::new(
                host.clone(),
                emitter.clone(),
                HOST_ID.to_string(),
                identity.clone(),
            ),
            webhooks: WebHookDispatcher::new(
                registry,
                auth.clone(),
                emitter.clone(),
                Arc::clone(&metrics),
                SITE_NAME.to_string(),
            ),
            emitter: emitter.clone(),
            metrics,
            debugger: debugger.clone(),
            keys: HostKeys::new(
                Some(MASTER_KEY.to_string()),
                vec![(SYSTEM_KEY_NAME.to_string(), SYSTEM_KEY.to_string())],
            ),
            identity,
            self_hosted: self.self_hosted,
        });

        TestApp {
            router: api::router(Arc::clone(&state)),
            state,
            host,
            installer,
            settings,
            emitter,
            auth,
            debugger,
            journal,
            script_root,
            download_dir,
        }
    }
}

pub fn test_app() -> TestAppBuilder {
    TestAppBuilder::default()
}

// ============================================================================
// Request helpers
// ============================================================================

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let response = app.clone().oneshot(req).await.expect("request failed");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("failed to read body")
        .to_bytes();
    (status, body)
}

pub async fn json_response(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, req).await;
    let value: Value = serde_json::from_slice(&body).expect("invalid json");
    (status, value)
}

pub async fn text_response(app: &Router, req: Request<Body>) -> (StatusCode, String) {
    let (status, body) = send(app, req).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}
