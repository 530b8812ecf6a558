//! Built-in fallback values for configuration.

pub const DEFAULT_WORKER_EXECUTABLE: &str = "winscout-worker";
pub const DEFAULT_WORKER_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 2_000;

/// Upper bound for `worker.timeout_ms`.
pub const MAX_WORKER_TIMEOUT_MS: u64 = 600_000;

/// Directory under the home and project roots holding `config.toml`.
pub const CONFIG_DIR_NAME: &str = ".winscout";
pub const CONFIG_FILE_NAME: &str = "config.toml";
