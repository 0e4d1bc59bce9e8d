//! Credential lookup for hosted backends.
//!
//! Secrets are resolved when a request is made, never at startup, so a
//! missing key only fails the backend that needs it.

#[cfg(test)]
use std::collections::HashMap;

pub trait SecretStore: Send + Sync {
    /// Look up a secret by name. Blank values count as absent.
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads secrets from the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Fixed in-memory secrets
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct StaticSecretStore {
    values: HashMap<String, String>,
}

#[cfg(test)]
impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
impl SecretStore for StaticSecretStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values
            .get(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}
