use std::path::PathBuf;

use clap::ArgMatches;
use tracing::{info, warn};

use winscout_core::config::defaults::DEFAULT_WORKER_EXECUTABLE;
use winscout_core::{
    Engine, EngineBuilder, EngineError, RemoteProvider, SettingsSnapshot, WinscoutConfig,
    WorkerClient, WorkerConfig,
};

use crate::providers::ProcessesProvider;

/// Plugin the bundled worker always hosts.
pub const DEFAULT_WORKER_PLUGIN: &str = "process-tree";

/// Load configuration with a user-visible warning on errors.
///
/// Falls back to defaults if config loading or validation fails, but
/// notifies the user via:
/// - stderr message for immediate visibility
/// - structured log event `cli.config.load_failed` for debugging
pub fn load_config_with_warning() -> WinscoutConfig {
    let loaded = WinscoutConfig::load_hierarchy().and_then(|config| {
        config.validate()?;
        Ok(config)
    });

    match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Could not load config: {}. Using defaults.\n\
                 Tip: Check ~/.winscout/config.toml and ./.winscout/config.toml for errors.",
                e
            );
            warn!(
                event = "cli.config.load_failed",
                error = %e,
                "Config load failed, using defaults"
            );
            WinscoutConfig::default()
        }
    }
}

/// Provider names given with `--disable`.
pub fn disabled_from(matches: &ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>("disable")
        .map(|names| names.cloned().collect())
        .unwrap_or_default()
}

pub fn settings_for(config: &WinscoutConfig, matches: &ArgMatches) -> SettingsSnapshot {
    SettingsSnapshot::from_config(config).with_disabled(disabled_from(matches))
}

pub fn build_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

/// Build an engine with the `processes` provider and the worker's plugins.
///
/// The default `process-tree` plugin walks the same process table as the
/// `processes` provider. Without an include list the `processes` provider
/// would claim nothing and list everything, so it is left out and the
/// worker owns every process. With an include list it owns those names and
/// the worker is told to skip them.
pub fn build_engine(config: &WinscoutConfig, use_worker: bool) -> Result<Engine, EngineError> {
    let includes = config.process_includes();
    let plugins = &config.worker.plugins;
    let default_plugin = use_worker && plugins.is_empty();

    let mut builder = EngineBuilder::new();
    if default_plugin && includes.is_empty() {
        info!(
            event = "cli.engine.processes_provider_skipped",
            reason = "default worker plugin lists every process",
        );
    } else {
        builder = builder.provider(ProcessesProvider::new(includes));
    }

    if use_worker {
        if default_plugin {
            builder = builder.provider(RemoteProvider::new(DEFAULT_WORKER_PLUGIN, Vec::new()));
        }
        for plugin in plugins {
            builder = builder.provider(RemoteProvider::new(
                plugin.name.clone(),
                plugin.processes.clone(),
            ));
        }

        let worker = WorkerConfig::from_config(config);
        let worker = WorkerConfig {
            executable: resolve_worker_executable(config.worker_executable()),
            ..worker
        };
        info!(
            event = "cli.engine.worker_configured",
            executable = %worker.executable.display(),
            plugins = plugins.len().max(1),
        );
        builder = builder.worker(WorkerClient::new(worker));
    }

    builder.build()
}

/// Prefer a worker installed next to this binary over one on `PATH`.
fn resolve_worker_executable(configured: &str) -> PathBuf {
    if configured == DEFAULT_WORKER_EXECUTABLE
        && let Ok(current) = std::env::current_exe()
        && let Some(dir) = current.parent()
    {
        let sibling = dir.join(format!("{configured}{}", std::env::consts::EXE_SUFFIX));
        if sibling.is_file() {
            return sibling;
        }
    }
    PathBuf::from(configured)
}
