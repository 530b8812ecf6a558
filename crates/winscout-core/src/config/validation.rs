use std::collections::HashSet;

use crate::config::defaults::MAX_WORKER_TIMEOUT_MS;
use crate::config::types::WinscoutConfig;
use crate::errors::ConfigError;

/// Validate a loaded configuration.
pub fn validate_config(config: &WinscoutConfig) -> Result<(), ConfigError> {
    if let Some(timeout_ms) = config.worker.timeout_ms
        && (timeout_ms == 0 || timeout_ms > MAX_WORKER_TIMEOUT_MS)
    {
        return Err(ConfigError::InvalidWorkerTimeout {
            timeout_ms,
            max_ms: MAX_WORKER_TIMEOUT_MS,
        });
    }

    if let Some(interval_ms) = config.refresh.interval_ms
        && interval_ms == 0
    {
        return Err(ConfigError::InvalidRefreshInterval { interval_ms });
    }

    if let Some(executable) = &config.worker.executable
        && executable.trim().is_empty()
    {
        return Err(ConfigError::InvalidConfiguration {
            message: "worker.executable must not be empty".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for plugin in &config.worker.plugins {
        let name = plugin.name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidConfiguration {
                message: "worker plugin names must not be empty".to_string(),
            });
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(ConfigError::InvalidConfiguration {
                message: format!("duplicate worker plugin '{}'", name),
            });
        }
    }

    Ok(())
}
