use std::sync::Arc;

use crate::assignment::AssignmentController;
use crate::auth::HostKeys;
use crate::debugger::Debugger;
use crate::events::{metrics::SiteIdentity, EventEmitter, MetricsAggregator};
use crate::host::HostLifecycleManager;
use crate::status::StatusReporter;
use crate::webhooks::WebHookDispatcher;

pub struct AppState {
    pub host: Arc<dyn HostLifecycleManager>,
    pub assignment: AssignmentController,
    pub status: StatusReporter,
    pub webhooks: WebHookDispatcher,
    pub emitter: Arc<dyn EventEmitter>,
    pub metrics: Arc<MetricsAggregator>,
    pub debugger: Arc<dyn Debugger>,
    pub keys: HostKeys,
    pub identity: SiteIdentity,
    /// Running outside the managed platform; gates debugger launch.
    pub self_hosted: bool,
}

impl AppState {
    /// App name for telemetry: the assigned app once there is one.
    pub fn app_name(&self) -> &str {
        self.identity.app_name()
    }
}
