//! Configuration type definitions for winscout.
//!
//! These types are serialized/deserialized from TOML config files.
//!
//! # Example Configuration
//!
//! ```toml
//! [providers]
//! disabled = ["processes"]
//!
//! [worker]
//! executable = "winscout-worker"
//! timeout_ms = 5000
//!
//! [[worker.plugins]]
//! name = "process-tree"
//! processes = ["explorer", "teams"]
//!
//! [processes]
//! include = ["firefox", "code"]
//!
//! [refresh]
//! interval_ms = 2000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;

/// Main configuration loaded from TOML config files.
///
/// Loaded from `~/.winscout/config.toml` then `./.winscout/config.toml`;
/// project values override user values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WinscoutConfig {
    /// Provider enablement
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Out-of-process worker settings and the plugins it hosts
    #[serde(default)]
    pub worker: WorkerSettings,

    /// Settings of the in-process `processes` provider
    #[serde(default)]
    pub processes: ProcessesConfig,

    /// Refresh cadence for `watch`
    #[serde(default)]
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    /// Provider names that are never enumerated.
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerSettings {
    /// Worker executable; a bare name is resolved on `PATH`.
    /// Default: `winscout-worker`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,

    /// Extra arguments passed to the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Hard wall-clock limit for one worker scan.
    /// Default: 5000 ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Plugins hosted by the worker.
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

/// One plugin hosted by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,

    /// Process names whose windows this plugin owns.
    #[serde(default)]
    pub processes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProcessesConfig {
    /// Process names to list. Empty or missing lists every process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RefreshConfig {
    /// Interval between refresh cycles in `watch`.
    /// Default: 2000 ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

impl WinscoutConfig {
    pub fn worker_executable(&self) -> &str {
        self.worker
            .executable
            .as_deref()
            .unwrap_or(defaults::DEFAULT_WORKER_EXECUTABLE)
    }

    pub fn worker_args(&self) -> &[String] {
        self.worker.args.as_deref().unwrap_or(&[])
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(
            self.worker
                .timeout_ms
                .unwrap_or(defaults::DEFAULT_WORKER_TIMEOUT_MS),
        )
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(
            self.refresh
                .interval_ms
                .unwrap_or(defaults::DEFAULT_REFRESH_INTERVAL_MS),
        )
    }

    pub fn process_includes(&self) -> &[String] {
        self.processes.include.as_deref().unwrap_or(&[])
    }
}
