//! Key-based caller identity and policy evaluation.

use std::collections::HashMap;

/// Header carrying a host key.
pub const FUNCTIONS_KEY_HEADER: &str = "x-functions-key";
/// Query parameter carrying a host key.
pub const FUNCTIONS_KEY_QUERY: &str = "code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthLevel {
    Anonymous,
    System,
    Admin,
}

/// Identity of the caller, resolved from the key it presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub level: AuthLevel,
    /// Name of the system key that matched, if any.
    pub key_name: Option<String>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            level: AuthLevel::Anonymous,
            key_name: None,
        }
    }

    pub fn admin() -> Self {
        Self {
            level: AuthLevel::Admin,
            key_name: None,
        }
    }

    pub fn system(key_name: impl Into<String>) -> Self {
        Self {
            level: AuthLevel::System,
            key_name: Some(key_name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    SystemOrAdmin,
}

impl AuthPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            AuthPolicy::SystemOrAdmin => "AuthLevelSystemOrAdmin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResult {
    Success,
    Failure(String),
}

impl AuthorizationResult {
    pub fn succeeded(&self) -> bool {
        matches!(self, AuthorizationResult::Success)
    }
}

pub trait AuthorizationService: Send + Sync {
    fn authorize(
        &self,
        principal: &Principal,
        resource_key: &str,
        policy: AuthPolicy,
    ) -> AuthorizationResult;
}

/// Evaluates policies purely from the principal's level and key name.
#[derive(Debug, Default)]
pub struct KeyAuthorizationService;

impl AuthorizationService for KeyAuthorizationService {
    fn authorize(
        &self,
        principal: &Principal,
        resource_key: &str,
        policy: AuthPolicy,
    ) -> AuthorizationResult {
        match policy {
            AuthPolicy::SystemOrAdmin => match principal.level {
                AuthLevel::Admin => AuthorizationResult::Success,
                AuthLevel::System if principal.key_name.as_deref() == Some(resource_key) => {
                    AuthorizationResult::Success
                }
                _ => AuthorizationResult::Failure(format!(
                    "caller does not satisfy {} for '{resource_key}'",
                    policy.name()
                )),
            },
        }
    }
}

/// Master and system keys known to this host.
#[derive(Debug, Clone, Default)]
pub struct HostKeys {
    master_key: Option<String>,
    system_keys: HashMap<String, String>,
}

impl HostKeys {
    pub fn new(master_key: Option<String>, system_keys: Vec<(String, String)>) -> Self {
        Self {
            master_key,
            system_keys: system_keys.into_iter().collect(),
        }
    }

    /// Map a presented key to the principal it identifies.
    pub fn resolve(&self, presented: Option<&str>) -> Principal {
        let Some(key) = presented.filter(|k| !k.is_empty()) else {
            return Principal::anonymous();
        };
        if self.master_key.as_deref() == Some(key) {
            return Principal::admin();
        }
        self.system_keys
            .iter()
            .find(|(_, value)| value.as_str() == key)
            .map(|(name, _)| Principal::system(name.clone()))
            .unwrap_or_else(Principal::anonymous)
    }
}
