use tracing::warn;

const LOADAVG_PATH: &str = "/proc/loadavg";

/// True when the 1-minute load average per core is at or above `threshold`.
/// An unreadable load average counts as not high.
pub async fn is_under_high_load(threshold: f64) -> bool {
    let raw = match tokio::fs::read_to_string(LOADAVG_PATH).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = LOADAVG_PATH, "load average unavailable: {e}");
            return false;
        }
    };
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match parse_load_per_core(&raw, cores) {
        Some(load) => load >= threshold,
        None => {
            warn!(raw = %raw.trim(), "unparseable load average");
            false
        }
    }
}

fn parse_load_per_core(raw: &str, cores: usize) -> Option<f64> {
    let one_minute: f64 = raw.split_whitespace().next()?.parse().ok()?;
    Some(one_minute / cores.max(1) as f64)
}
