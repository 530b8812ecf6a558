//! Configuration loading and merging logic.
//!
//! Configuration is loaded in the following order (later sources override earlier ones):
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.winscout/config.toml`
//! 3. **Project config** - `./.winscout/config.toml`
//! 4. **CLI arguments** - Command-line flags (applied by the caller)

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::defaults::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::config::types::{
    ProcessesConfig, ProvidersConfig, RefreshConfig, WinscoutConfig, WorkerSettings,
};
use crate::config::validation::validate_config;
use crate::errors::ConfigError;

/// Load configuration from the user and project config files.
///
/// # Errors
///
/// Returns an error if a file exists but cannot be read or parsed, or if
/// the merged result fails validation. Missing files are not errors.
pub fn load_hierarchy() -> Result<WinscoutConfig, ConfigError> {
    let user_root = dirs::home_dir();
    let project_root = std::env::current_dir()?;
    load_from_roots(user_root.as_deref(), Some(&project_root))
}

/// Load and merge `<root>/.winscout/config.toml` for each given root, in order.
pub fn load_from_roots(
    user_root: Option<&Path>,
    project_root: Option<&Path>,
) -> Result<WinscoutConfig, ConfigError> {
    let mut config = WinscoutConfig::default();

    for root in [user_root, project_root].into_iter().flatten() {
        let path = config_path(root);
        if let Some(loaded) = load_config_file(&path)? {
            debug!(
                event = "core.config.file_loaded",
                path = %path.display(),
            );
            config = merge_configs(config, loaded);
        }
    }

    validate_config(&config)?;
    Ok(config)
}

fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Load one config file. `Ok(None)` when the file does not exist.
pub fn load_config_file(path: &Path) -> Result<Option<WinscoutConfig>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::ConfigParseError {
            message: format!("'{}': {}", path.display(), e),
        })
}

/// Merge two configurations, with `override_config` taking precedence.
///
/// Optional values are replaced only when the override sets them. Disabled
/// providers accumulate across files; plugins are merged by name.
pub fn merge_configs(base: WinscoutConfig, override_config: WinscoutConfig) -> WinscoutConfig {
    WinscoutConfig {
        providers: ProvidersConfig {
            disabled: {
                let mut merged = base.providers.disabled;
                for name in override_config.providers.disabled {
                    if !merged.contains(&name) {
                        merged.push(name);
                    }
                }
                merged
            },
        },
        worker: WorkerSettings {
            executable: override_config.worker.executable.or(base.worker.executable),
            args: override_config.worker.args.or(base.worker.args),
            timeout_ms: override_config.worker.timeout_ms.or(base.worker.timeout_ms),
            plugins: {
                let mut merged = base.worker.plugins;
                for plugin in override_config.worker.plugins {
                    match merged.iter_mut().find(|p| p.name == plugin.name) {
                        Some(existing) => *existing = plugin,
                        None => merged.push(plugin),
                    }
                }
                merged
            },
        },
        processes: ProcessesConfig {
            include: override_config.processes.include.or(base.processes.include),
        },
        refresh: RefreshConfig {
            interval_ms: override_config
                .refresh
                .interval_ms
                .or(base.refresh.interval_ms),
        },
    }
}
