//! # Configuration System
//!
//! Hierarchical TOML configuration for winscout.
//!
//! ## Configuration Hierarchy
//!
//! Configuration is loaded in the following order (later sources override earlier ones):
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.winscout/config.toml` (global user preferences)
//! 3. **Project config** - `./.winscout/config.toml` (project-specific overrides)
//! 4. **CLI arguments** - Command-line flags (highest priority)
//!
//! The engine never reads configuration directly: callers turn the loaded
//! config into a [`SettingsSnapshot`] and pass it to every refresh.
//!
//! ## Loading Configuration
//!
//! ```rust,no_run
//! use winscout_core::config::{SettingsSnapshot, WinscoutConfig};
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WinscoutConfig::load_hierarchy()?;
//!     let settings = SettingsSnapshot::from_config(&config);
//!     assert!(settings.worker_timeout().as_millis() > 0);
//!     Ok(())
//! }
//! ```

pub mod defaults;
pub mod loading;
pub mod settings;
pub mod types;
pub mod validation;

pub use settings::SettingsSnapshot;
pub use types::{
    PluginConfig, ProcessesConfig, ProvidersConfig, RefreshConfig, WinscoutConfig, WorkerSettings,
};
pub use validation::validate_config;

impl WinscoutConfig {
    /// Load configuration from the hierarchy of config files.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy() -> Result<Self, crate::errors::ConfigError> {
        loading::load_hierarchy()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), crate::errors::ConfigError> {
        validation::validate_config(self)
    }
}
