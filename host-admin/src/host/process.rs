use std::{
    path::PathBuf,
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::{
    net::TcpStream,
    process::{Child, Command},
    sync::Mutex,
    time::sleep,
};
use tracing::{error, info, warn};

use super::{load, HostInstance, HostLifecycleManager, HostState};
use crate::settings::SettingsManager;

const EXIT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ProcessHostOptions {
    pub binary: String,
    pub args: Vec<String>,
    pub port: u16,
    pub startup_timeout: Duration,
    pub high_load_threshold: f64,
    pub working_dir: PathBuf,
}

/// Supervises the function host as a child process.
pub struct ProcessHostManager {
    options: ProcessHostOptions,
    settings: Arc<SettingsManager>,
    /// Held for the whole stop/spawn/readiness cycle so restarts never overlap.
    child: Mutex<Option<Child>>,
    state: RwLock<HostState>,
    instance: RwLock<Option<Arc<HostInstance>>>,
    last_error: RwLock<Option<Arc<anyhow::Error>>>,
}

impl ProcessHostManager {
    pub fn new(options: ProcessHostOptions, settings: Arc<SettingsManager>) -> Arc<Self> {
        Arc::new(Self {
            options,
            settings,
            child: Mutex::new(None),
            state: RwLock::new(HostState::Default),
            instance: RwLock::new(None),
            last_error: RwLock::new(None),
        })
    }

    /// Start the host for the first time.
    pub async fn start(&self) {
        self.cycle().await;
    }

    /// Stop the host without starting a new one.
    pub async fn stop(&self) {
        let mut child = self.child.lock().await;
        if let Some(mut running) = child.take() {
            self.set_state(HostState::Stopping);
            running.kill().await.ok();
            info!("function host stopped");
        }
        *self.instance.write() = None;
        self.set_state(HostState::Stopped);
    }

    fn set_state(&self, state: HostState) {
        *self.state.write() = state;
    }

    async fn cycle(&self) {
        let mut child = self.child.lock().await;

        if let Some(mut running) = child.take() {
            self.set_state(HostState::Stopping);
            info!(pid = ?running.id(), "stopping function host");
            running.kill().await.ok();
        }
        *self.instance.write() = None;
        self.set_state(HostState::Starting);

        match self.spawn_process().await {
            Ok(spawned) => {
                let instance = Arc::new(HostInstance::new(spawned.id()));
                info!(
                    instance_id = %instance.id,
                    pid = ?instance.pid,
                    port = self.options.port,
                    "function host running"
                );
                *child = Some(spawned);
                *self.instance.write() = Some(instance);
                *self.last_error.write() = None;
                self.set_state(HostState::Running);
            }
            Err(e) => {
                error!("function host failed to start: {e:#}");
                *self.last_error.write() = Some(Arc::new(e));
                self.set_state(HostState::Error);
            }
        }
    }

    async fn spawn_process(&self) -> anyhow::Result<Child> {
        let port = self.options.port;

        // Brief wait for the port to become available after a prior process exits.
        sleep(Duration::from_millis(200)).await;

        let mut command = Command::new(&self.options.binary);
        command
            .args(&self.options.args)
            .env("PORT", port.to_string())
            .envs(self.settings.snapshot())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if self.options.working_dir.is_dir() {
            command.current_dir(&self.options.working_dir);
        }

        let mut child = command.spawn().with_context(|| {
            format!("failed to spawn function host '{}'", self.options.binary)
        })?;

        // TCP readiness check: poll until the host accepts connections or deadline.
        let deadline = tokio::time::Instant::now() + self.options.startup_timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(anyhow!("function host exited during startup: {status}"));
            }
            if tokio::time::Instant::now() >= deadline {
                child.kill().await.ok();
                return Err(anyhow!(
                    "function host did not accept connections on port {port} within {:?}",
                    self.options.startup_timeout
                ));
            }
            match TcpStream::connect(format!("127.0.0.1:{port}")).await {
                Ok(_) => {
                    info!(port, "function host port is ready");
                    break;
                }
                Err(_) => sleep(Duration::from_millis(100)).await,
            }
        }

        Ok(child)
    }

    /// Background task: mark the host failed if its process exits on its own.
    pub async fn run_exit_watchdog(self: Arc<Self>) {
        loop {
            sleep(EXIT_POLL_INTERVAL).await;
            self.check_exited().await;
        }
    }

    /// Reap a host process that is no longer running. Returns true when the
    /// host was moved to `Error`.
    pub async fn check_exited(&self) -> bool {
        let mut child = self.child.lock().await;
        let exited = match child.as_mut().map(Child::try_wait) {
            Some(Ok(Some(status))) => Some(anyhow!("function host exited unexpectedly: {status}")),
            Some(Err(e)) => Some(anyhow!("function host status unavailable: {e}")),
            Some(Ok(None)) | None => None,
        };
        let Some(e) = exited else {
            return false;
        };
        warn!("{e}");
        *child = None;
        *self.instance.write() = None;
        *self.last_error.write() = Some(Arc::new(e));
        self.set_state(HostState::Error);
        true
    }
}

#[async_trait]
impl HostLifecycleManager for ProcessHostManager {
    fn state(&self) -> HostState {
        *self.state.read()
    }

    fn instance(&self) -> Option<Arc<HostInstance>> {
        self.instance.read().clone()
    }

    fn last_error(&self) -> Option<Arc<anyhow::Error>> {
        self.last_error.read().clone()
    }

    async fn is_under_high_load(&self) -> bool {
        load::is_under_high_load(self.options.high_load_threshold).await
    }

    async fn restart_host(&self) {
        info!("restarting function host");
        self.cycle().await;
    }
}
