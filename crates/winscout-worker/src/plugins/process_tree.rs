//! Deep per-process scan: one record per process titled by its command line.

use std::ffi::OsString;
use std::path::Path;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::debug;

use winscout_core::WindowInfo;
use winscout_core::providers::normalize_process_name;

use super::{PluginError, ScanPlugin};

pub const PLUGIN_NAME: &str = "process-tree";

const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Default)]
pub struct ProcessTreePlugin;

impl ProcessTreePlugin {
    pub fn new() -> Self {
        Self
    }
}

impl ScanPlugin for ProcessTreePlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn scan(&self, excluded: &[String]) -> Result<Vec<WindowInfo>, PluginError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(PluginError::Unsupported {
                plugin: PLUGIN_NAME.to_string(),
            });
        }

        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cmd(UpdateKind::Always)
                .with_exe(UpdateKind::Always),
        );
        // The worker itself is always running.
        if system.processes().is_empty() {
            return Err(PluginError::ScanFailed {
                plugin: PLUGIN_NAME.to_string(),
                message: "process table is empty".to_string(),
            });
        }

        let mut windows: Vec<WindowInfo> = system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let name = process.name().to_string_lossy();
                if excluded.contains(&normalize_process_name(&name)) {
                    return None;
                }
                Some(window_for(pid.as_u32(), &name, process.exe(), process.cmd()))
            })
            .collect();
        windows.sort_by_key(|window| window.hwnd);

        let fallbacks = windows.iter().filter(|window| window.is_fallback).count();
        debug!(
            event = "worker.process_tree.scanned",
            count = windows.len(),
            fallbacks = fallbacks,
        );
        Ok(windows)
    }
}

/// Build the record for one process.
///
/// A process whose command line cannot be read becomes a fallback record
/// titled with its bare name.
fn window_for(pid: u32, name: &str, exe: Option<&Path>, cmd: &[OsString]) -> WindowInfo {
    let path = exe.map(|exe| exe.display().to_string()).unwrap_or_default();
    let process_name = normalize_process_name(name);

    if cmd.is_empty() {
        return WindowInfo::new(u64::from(pid), name)
            .with_process(process_name, path)
            .fallback();
    }

    let command_line = cmd
        .iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");
    let title: String = command_line.chars().take(MAX_TITLE_CHARS).collect();
    WindowInfo::new(u64::from(pid), title).with_process(process_name, path)
}
