//! Function host lifecycle: the state, instance, and restart seam the admin
//! surface drives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

pub mod load;
pub mod process;

pub use process::ProcessHostManager;

/// Debug mode stays on this long after the last debug notification.
pub const DEBUG_MODE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Default,
    Starting,
    Initialized,
    Running,
    Error,
    Stopping,
    Stopped,
    Offline,
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HostState::Default => "Default",
            HostState::Starting => "Starting",
            HostState::Initialized => "Initialized",
            HostState::Running => "Running",
            HostState::Error => "Error",
            HostState::Stopping => "Stopping",
            HostState::Stopped => "Stopped",
            HostState::Offline => "Offline",
        };
        f.write_str(s)
    }
}

/// One running generation of the function host.
#[derive(Debug)]
pub struct HostInstance {
    pub id: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    last_debug_notify: Mutex<Option<DateTime<Utc>>>,
}

impl HostInstance {
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            pid,
            started_at: Utc::now(),
            last_debug_notify: Mutex::new(None),
        }
    }

    /// Record that an admin client touched the host.
    pub fn notify_debug(&self) {
        let now = Utc::now();
        *self.last_debug_notify.lock() = Some(now);
        debug!(instance_id = %self.id, "debug notification recorded");
    }

    pub fn last_debug_notify(&self) -> Option<DateTime<Utc>> {
        *self.last_debug_notify.lock()
    }

    pub fn in_debug_mode(&self) -> bool {
        match self.last_debug_notify() {
            Some(at) => (Utc::now() - at)
                .to_std()
                .map(|elapsed| elapsed < DEBUG_MODE_TIMEOUT)
                .unwrap_or(true),
            None => false,
        }
    }
}

/// Owner of the function host's running state.
#[async_trait]
pub trait HostLifecycleManager: Send + Sync {
    fn state(&self) -> HostState;

    /// The live host instance, if one is running.
    fn instance(&self) -> Option<Arc<HostInstance>>;

    /// Most recent fatal error, if the host is unhealthy.
    fn last_error(&self) -> Option<Arc<anyhow::Error>>;

    /// On-demand pressure check; may be slow.
    async fn is_under_high_load(&self) -> bool;

    /// Stop the current host and start a new one. Failures are recorded in
    /// `last_error` and never returned.
    async fn restart_host(&self);
}
