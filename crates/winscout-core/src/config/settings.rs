use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::defaults::DEFAULT_WORKER_TIMEOUT_MS;
use crate::config::types::WinscoutConfig;

/// Read-only settings for one refresh cycle.
///
/// Built fresh for every `refresh` call; anything derived from settings
/// (such as the worker timeout) is read from here at call time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsSnapshot {
    disabled_providers: BTreeSet<String>,
    worker_timeout: Duration,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            disabled_providers: BTreeSet::new(),
            worker_timeout: Duration::from_millis(DEFAULT_WORKER_TIMEOUT_MS),
        }
    }
}

impl SettingsSnapshot {
    pub fn new(disabled: impl IntoIterator<Item = impl Into<String>>, worker_timeout: Duration) -> Self {
        Self {
            disabled_providers: disabled.into_iter().map(Into::into).collect(),
            worker_timeout,
        }
    }

    pub fn from_config(config: &WinscoutConfig) -> Self {
        Self::new(config.providers.disabled.iter().cloned(), config.worker_timeout())
    }

    /// Add more disabled provider names (e.g. from CLI flags).
    pub fn with_disabled(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.disabled_providers
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    pub fn is_enabled(&self, provider: &str) -> bool {
        !self.disabled_providers.contains(provider)
    }

    pub fn disabled_providers(&self) -> impl Iterator<Item = &str> {
        self.disabled_providers.iter().map(String::as_str)
    }

    pub fn worker_timeout(&self) -> Duration {
        self.worker_timeout
    }
}
