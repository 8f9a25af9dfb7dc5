//! Dynamic process settings.
//!
//! `SettingsManager` keeps the in-memory copy of every setting applied at
//! runtime and mirrors each write into the OS environment, so both newly
//! spawned host processes and code reading `std::env` observe it.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

/// Process-wide configuration writes.
#[async_trait]
pub trait EnvironmentConfigStore: Send + Sync {
    async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct SettingsManager {
    settings: DashMap<String, String>,
}

impl SettingsManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.settings.get(key).map(|v| v.value().clone())
    }

    /// Settings applied so far, sorted by key.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.settings
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    fn apply(&self, key: &str, value: &str) -> anyhow::Result<()> {
        validate(key, value).with_context(|| format!("cannot apply setting '{key}'"))?;
        std::env::set_var(key, value);
        self.settings.insert(key.to_string(), value.to_string());
        debug!(key, "setting applied");
        Ok(())
    }
}

fn validate(key: &str, value: &str) -> anyhow::Result<()> {
    if key.is_empty() {
        bail!("setting name is empty");
    }
    if key.contains('=') || key.contains('\0') {
        bail!("setting name contains '=' or NUL");
    }
    if value.contains('\0') {
        bail!("setting value contains NUL");
    }
    Ok(())
}

#[async_trait]
impl EnvironmentConfigStore for SettingsManager {
    async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.apply(key, value)
    }
}
