use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSinkKind {
    /// Single-line records on stdout.
    Console,
    /// Structured `tracing` events.
    Tracing,
}

impl EventSinkKind {
    fn from_env(value: &str) -> anyhow::Result<Self> {
        match value {
            "console" => Ok(Self::Console),
            "tracing" => Ok(Self::Tracing),
            other => Err(anyhow::anyhow!(
                "Invalid FUNCTIONS_EVENT_SINK '{other}'. Expected 'console' or 'tracing'"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the admin surface listens on
    pub port: u16,
    /// Path to the function host binary
    pub host_binary: String,
    /// Arguments passed to the function host binary
    pub host_args: Vec<String>,
    /// Port handed to the function host child
    pub host_port: u16,
    /// How long a starting host may take to accept connections
    pub host_startup_timeout: Duration,
    /// Application directory packages are extracted into
    pub script_root: PathBuf,
    /// Whether this process runs outside the managed platform
    pub self_hosted: bool,
    /// Debugger launch command; `{pid}` is replaced with our process id
    pub debugger_command: Option<String>,
    /// Admin-level key
    pub master_key: Option<String>,
    /// Named system keys, e.g. `eventgrid_extension`
    pub system_keys: Vec<(String, String)>,
    /// Forwarding webhook extensions: name → upstream URL
    pub webhook_extensions: Vec<(String, String)>,
    /// Telemetry backend for operational events
    pub event_sink: EventSinkKind,
    /// Aggregation window for metric and execution aggregates
    pub metrics_flush_interval: Duration,
    /// Load average per core at or above which the host reports high load
    pub high_load_threshold: f64,
    /// Host id reported by the status endpoint
    pub host_id: String,
    /// App name used in telemetry until an assignment arrives
    pub site_name: String,
    /// Subscription id used in telemetry
    pub subscription_id: String,
    /// Emit JSON diagnostic logs instead of text
    pub json_logs: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let site_name = env_str("WEBSITE_SITE_NAME", "localhost");
        let host_id = std::env::var("FUNCTIONS_HOST_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| derive_host_id(&site_name));

        Ok(Self {
            port: env_parse("HOST_ADMIN_PORT", 8181)?,
            host_binary: env_str("FUNCTION_HOST_BINARY", "func-host"),
            host_args: env_str("FUNCTION_HOST_ARGS", "")
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            host_port: env_parse("FUNCTION_HOST_PORT", 8080)?,
            host_startup_timeout: Duration::from_secs(env_parse(
                "FUNCTION_HOST_STARTUP_TIMEOUT_SECS",
                30,
            )?),
            script_root: PathBuf::from(env_str("FUNCTIONS_SCRIPT_ROOT", "/home/site/wwwroot")),
            self_hosted: env_parse("FUNCTIONS_SELF_HOSTED", false)?,
            debugger_command: std::env::var("FUNCTIONS_DEBUGGER_COMMAND")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            master_key: std::env::var("FUNCTIONS_MASTER_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
            system_keys: env_pairs("FUNCTIONS_SYSTEM_KEYS")?,
            webhook_extensions: env_pairs("FUNCTIONS_WEBHOOK_EXTENSIONS")?,
            event_sink: EventSinkKind::from_env(&env_str("FUNCTIONS_EVENT_SINK", "console"))?,
            metrics_flush_interval: Duration::from_secs(env_parse(
                "FUNCTIONS_METRICS_FLUSH_SECS",
                30,
            )?),
            high_load_threshold: env_parse("FUNCTIONS_HIGH_LOAD_THRESHOLD", 0.80)?,
            host_id,
            site_name,
            subscription_id: subscription_from_owner(
                &std::env::var("WEBSITE_OWNER_NAME").unwrap_or_default(),
            ),
            json_logs: env_str("HOST_ADMIN_LOG_FORMAT", "text") == "json",
        })
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_pairs(key: &str) -> anyhow::Result<Vec<(String, String)>> {
    match std::env::var(key) {
        Ok(raw) => parse_pairs(&raw).map_err(|e| anyhow::anyhow!("Invalid {key}: {e}")),
        Err(_) => Ok(Vec::new()),
    }
}

/// Parse `name=value,name=value`. Values may contain `=`.
fn parse_pairs(raw: &str) -> Result<Vec<(String, String)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| match item.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(format!("expected name=value, got '{item}'")),
        })
        .collect()
}

/// `WEBSITE_OWNER_NAME` looks like `<subscription>+<resource group>-<region>webspace`.
fn subscription_from_owner(owner: &str) -> String {
    owner.split('+').next().unwrap_or_default().trim().to_string()
}

fn derive_host_id(site_name: &str) -> String {
    site_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .take(32)
        .collect()
}
