use std::error::Error;

/// Base trait for all application errors
pub trait WinscoutError: Error + Send + Sync + 'static {
    /// Error code for programmatic handling
    fn error_code(&self) -> &'static str;

    /// Whether this error should be logged as an error or warning
    fn is_user_error(&self) -> bool {
        false
    }
}

/// Common result type for the application
pub type WinscoutResult<T> = Result<T, Box<dyn WinscoutError>>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse config file: {message}")]
    ConfigParseError { message: String },

    #[error("Invalid worker timeout {timeout_ms}ms: must be between 1 and {max_ms}")]
    InvalidWorkerTimeout { timeout_ms: u64, max_ms: u64 },

    #[error("Invalid refresh interval {interval_ms}ms: must be greater than zero")]
    InvalidRefreshInterval { interval_ms: u64 },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("IO error reading config: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl WinscoutError for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::ConfigParseError { .. } => "CONFIG_PARSE_ERROR",
            ConfigError::InvalidWorkerTimeout { .. } => "INVALID_WORKER_TIMEOUT",
            ConfigError::InvalidRefreshInterval { .. } => "INVALID_REFRESH_INTERVAL",
            ConfigError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            ConfigError::IoError { .. } => "CONFIG_IO_ERROR",
        }
    }

    fn is_user_error(&self) -> bool {
        !matches!(self, ConfigError::IoError { .. })
    }
}
