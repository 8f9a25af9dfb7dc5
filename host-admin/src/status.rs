use std::sync::Arc;

use shared_types::{HostStatus, LoadStatus, LogLevel};

use crate::events::{metrics::SiteIdentity, EventEmitter, FunctionTraceEvent};
use crate::host::HostLifecycleManager;

pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version_details() -> String {
    format!(
        "{HOST_VERSION} ({}/{})",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Builds host health snapshots for polling clients.
pub struct StatusReporter {
    host: Arc<dyn HostLifecycleManager>,
    emitter: Arc<dyn EventEmitter>,
    host_id: String,
    identity: SiteIdentity,
}

impl StatusReporter {
    pub fn new(
        host: Arc<dyn HostLifecycleManager>,
        emitter: Arc<dyn EventEmitter>,
        host_id: String,
        identity: SiteIdentity,
    ) -> Self {
        Self {
            host,
            emitter,
            host_id,
            identity,
        }
    }

    /// Fresh snapshot. The load check only runs when `check_load` is set;
    /// otherwise `load` is absent.
    pub async fn get_status(&self, check_load: bool) -> HostStatus {
        let errors = self.host.last_error().map(|e| vec![format!("{e:#}")]);
        let load = if check_load {
            Some(LoadStatus {
                is_high: self.host.is_under_high_load().await,
            })
        } else {
            None
        };

        let status = HostStatus {
            state: self.host.state().to_string(),
            version: HOST_VERSION.to_string(),
            version_details: version_details(),
            id: self.host_id.clone(),
            errors,
            load,
        };

        let mut event = FunctionTraceEvent::new(
            LogLevel::Info,
            "StatusReporter",
            serde_json::to_string(&status).unwrap_or_default(),
        );
        event.event_name = "HostStatus".to_string();
        event.subscription_id = self.identity.subscription_id.clone();
        event.app_name = self.identity.app_name().to_string();
        event.host_instance_id = self.host.instance().map(|i| i.id.clone());
        self.emitter.log_function_trace_event(&event);

        status
    }
}
