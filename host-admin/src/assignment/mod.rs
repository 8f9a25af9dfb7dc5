//! Single-assignment guard and the configure → fetch → install → restart
//! pipeline.
//!
//! The commit of the assigned app name is the only synchronized step. It
//! happens before the package URL is validated and before any I/O, so a
//! failed or rejected pipeline still leaves the process assigned. Nothing is
//! rolled back; a retry observes `Conflict`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use shared_types::AssignmentContext;
use tracing::{info, warn};

use crate::error::AdminError;
use crate::host::HostLifecycleManager;
use crate::settings::EnvironmentConfigStore;

pub mod package;

pub use package::HttpPackageInstaller;

pub const ALREADY_ASSIGNED: &str = "Instance already assigned";
pub const MISSING_PACKAGE_URL: &str = "Invalid zip url specified";

/// Black-box package fetch and unpack.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Download the package to a temporary file and return its path.
    async fn download(&self, url: &str) -> anyhow::Result<PathBuf>;

    /// Unpack `archive` over `destination`, overwriting existing files.
    async fn extract(&self, archive: &Path, destination: &Path) -> anyhow::Result<()>;
}

/// Process-scoped, write-once record of the app this process serves.
/// Clones share one slot.
#[derive(Debug, Clone, Default)]
pub struct AssignmentState {
    assigned_app: Arc<OnceLock<String>>,
}

impl AssignmentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assigned_app(&self) -> Option<&str> {
        self.assigned_app.get().map(String::as_str)
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_app.get().is_some()
    }

    /// Atomically claim the slot. Exactly one caller ever gets `true`.
    pub fn try_commit(&self, app_name: &str) -> bool {
        self.assigned_app.set(app_name.to_string()).is_ok()
    }
}

pub struct AssignmentController {
    state: AssignmentState,
    host: Arc<dyn HostLifecycleManager>,
    installer: Arc<dyn PackageInstaller>,
    settings: Arc<dyn EnvironmentConfigStore>,
    script_root: PathBuf,
}

impl AssignmentController {
    pub fn new(
        host: Arc<dyn HostLifecycleManager>,
        installer: Arc<dyn PackageInstaller>,
        settings: Arc<dyn EnvironmentConfigStore>,
        script_root: PathBuf,
        state: AssignmentState,
    ) -> Self {
        Self {
            state,
            host,
            installer,
            settings,
            script_root,
        }
    }

    pub fn assigned_app(&self) -> Option<&str> {
        self.state.assigned_app()
    }

    /// Bind this process to `context`'s app and restart the host into it.
    ///
    /// Returns once the restart has been triggered, not when the new host
    /// is healthy.
    pub async fn assign(&self, context: &AssignmentContext) -> Result<(), AdminError> {
        if self.state.is_assigned() {
            return Err(AdminError::Conflict(ALREADY_ASSIGNED.to_string()));
        }
        if !self.state.try_commit(&context.app_name) {
            return Err(AdminError::Conflict(ALREADY_ASSIGNED.to_string()));
        }
        info!(app_name = %context.app_name, "instance assigned");

        let zip_url = context.zip_url();
        if zip_url.is_empty() {
            warn!(app_name = %context.app_name, "assignment has no package url");
            return Err(AdminError::BadRequest(MISSING_PACKAGE_URL.to_string()));
        }

        let archive = self.installer.download(zip_url).await?;
        info!(archive = %archive.display(), "package downloaded");

        let installed = self.install(context, &archive).await;
        if let Err(e) = tokio::fs::remove_file(&archive).await {
            warn!(archive = %archive.display(), "failed to remove downloaded package: {e}");
        }
        installed?;

        let host = Arc::clone(&self.host);
        tokio::spawn(async move {
            host.restart_host().await;
        });
        info!(app_name = %context.app_name, "host restart triggered");

        Ok(())
    }

    async fn install(&self, context: &AssignmentContext, archive: &Path) -> anyhow::Result<()> {
        for (key, value) in context.app_settings.iter() {
            self.settings.set_setting(key, value).await?;
        }
        info!(count = context.app_settings.len(), "app settings applied");

        self.installer.extract(archive, &self.script_root).await?;
        info!(script_root = %self.script_root.display(), "package extracted");
        Ok(())
    }
}
