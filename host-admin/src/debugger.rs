use anyhow::{anyhow, Context};
use tracing::{info, warn};

pub trait Debugger: Send + Sync {
    fn is_attached(&self) -> bool;

    /// Start a debugger against this process. Returns once it is spawned.
    fn launch(&self) -> anyhow::Result<()>;
}

/// Uses the tracer recorded by the kernel and an operator-supplied command.
#[derive(Debug, Clone)]
pub struct ProcessDebugger {
    /// e.g. `gdb -p {pid}`
    command: Option<String>,
}

impl ProcessDebugger {
    pub fn new(command: Option<String>) -> Self {
        Self { command }
    }
}

impl Debugger for ProcessDebugger {
    fn is_attached(&self) -> bool {
        match std::fs::read_to_string("/proc/self/status") {
            Ok(status) => tracer_pid(&status).is_some_and(|pid| pid != 0),
            Err(_) => false,
        }
    }

    fn launch(&self) -> anyhow::Result<()> {
        let template = self
            .command
            .as_deref()
            .ok_or_else(|| anyhow!("no debugger command configured"))?;
        let pid = std::process::id().to_string();
        let rendered = template.replace("{pid}", &pid);
        let mut parts = rendered.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("debugger command is empty"))?;

        let mut child = tokio::process::Command::new(program)
            .args(parts)
            .spawn()
            .with_context(|| format!("failed to launch debugger '{program}'"))?;
        info!(command = %rendered, "debugger launched");

        tokio::spawn(async move {
            if let Err(e) = child.wait().await {
                warn!("debugger process wait failed: {e}");
            }
        });
        Ok(())
    }
}

fn tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|v| v.trim().parse().ok())
}
