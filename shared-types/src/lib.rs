//! Shared wire types for the admin control plane
//!
//! These types are used by both:
//! - the `host-admin` service (native Rust)
//! - placement clients and admin tooling that call it
//!
//! Serializable with serde for JSON over HTTP

use std::fmt;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Well-known names
// ============================================================================

/// App setting holding the package URL of an assignment.
pub const ZIP_URL_SETTING: &str = "WEBSITE_USE_ZIP";

/// Fallback app setting for the package URL.
pub const RUN_FROM_PACKAGE_SETTING: &str = "WEBSITE_RUN_FROM_PACKAGE";

/// Property key a log entry's function name is stored under.
pub const FUNCTION_NAME_PROPERTY: &str = "FunctionName";

/// Error message for a missing log entry collection.
pub const LOG_ENTRIES_EXPECTED: &str = "An array of log entry objects is expected.";

// ============================================================================
// Assignment
// ============================================================================

/// App settings in the order the placement system sent them.
///
/// Serialized as a plain JSON object. Duplicate keys keep their first
/// position and take the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppSettings(Vec<(String, String)>);

impl AppSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AppSettings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = AppSettings::new();
        for (k, v) in iter {
            settings.insert(k, v);
        }
        settings
    }
}

impl Serialize for AppSettings {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AppSettings {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct AppSettingsVisitor;

        impl<'de> Visitor<'de> for AppSettingsVisitor {
            type Value = AppSettings;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of string settings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut settings = AppSettings::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    settings.insert(key, value);
                }
                Ok(settings)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(AppSettings::new())
            }
        }

        d.deserialize_any(AppSettingsVisitor)
    }
}

/// Placement request binding this host process to one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentContext {
    pub app_name: String,
    #[serde(default)]
    pub app_settings: AppSettings,
}

impl AssignmentContext {
    /// Package URL, derived from the app settings. Empty when absent.
    pub fn zip_url(&self) -> &str {
        self.app_settings
            .get(ZIP_URL_SETTING)
            .or_else(|| self.app_settings.get(RUN_FROM_PACKAGE_SETTING))
            .unwrap_or_default()
    }
}

// ============================================================================
// Host status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatus {
    pub is_high: bool,
}

/// Point-in-time snapshot of host health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
    pub state: String,
    pub version: String,
    pub version_details: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadStatus>,
}

// ============================================================================
// Host logs
// ============================================================================

/// Trace level of a log entry. Accepts names (any case) or the numeric
/// values 0 (`Off`) through 4 (`Verbose`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Off,
    Error,
    Warning,
    #[default]
    Info,
    Verbose,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "Off",
            LogLevel::Error => "Error",
            LogLevel::Warning => "Warning",
            LogLevel::Info => "Info",
            LogLevel::Verbose => "Verbose",
        }
    }

    fn from_index(value: u64) -> Option<Self> {
        match value {
            0 => Some(LogLevel::Off),
            1 => Some(LogLevel::Error),
            2 => Some(LogLevel::Warning),
            3 => Some(LogLevel::Info),
            4 => Some(LogLevel::Verbose),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "info" | "information" => Ok(LogLevel::Info),
            "verbose" | "debug" | "trace" => Ok(LogLevel::Verbose),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct LogLevelVisitor;

        impl Visitor<'_> for LogLevelVisitor {
            type Value = LogLevel;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a log level name or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                LogLevel::from_index(v)
                    .ok_or_else(|| E::custom(format!("log level {v} out of range")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .ok()
                    .and_then(LogLevel::from_index)
                    .ok_or_else(|| E::custom(format!("log level {v} out of range")))
            }
        }

        d.deserialize_any(LogLevelVisitor)
    }
}

/// Log line submitted by an external component through the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostLogEntry {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
}
