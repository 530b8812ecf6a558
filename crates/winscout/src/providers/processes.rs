//! In-process provider listing running processes.

use std::sync::{Mutex, PoisonError, RwLock};

use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

use winscout_core::providers::normalize_process_name;
use winscout_core::{ProviderError, WindowInfo, WindowProvider};

pub const PROVIDER_NAME: &str = "processes";

/// One record per running process, keyed by PID.
///
/// With an include list only matching processes are listed, and the
/// provider claims those names so other providers skip them.
pub struct ProcessesProvider {
    include: Vec<String>,
    exclusions: RwLock<Vec<String>>,
    system: Mutex<System>,
}

impl ProcessesProvider {
    pub fn new(include: &[String]) -> Self {
        Self {
            include: include
                .iter()
                .map(|name| normalize_process_name(name))
                .filter(|name| !name.is_empty())
                .collect(),
            exclusions: RwLock::new(Vec::new()),
            system: Mutex::new(System::new()),
        }
    }

    fn is_listed(&self, name: &str, excluded: &[String]) -> bool {
        if excluded.iter().any(|excluded| excluded == name) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|include| include == name)
    }
}

impl WindowProvider for ProcessesProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn get_windows(&self) -> Result<Vec<WindowInfo>, ProviderError> {
        let excluded = self
            .exclusions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::All, true);

        let mut windows: Vec<WindowInfo> = system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let raw_name = process.name().to_string_lossy();
                let name = normalize_process_name(&raw_name);
                if name.is_empty() || !self.is_listed(&name, &excluded) {
                    return None;
                }
                let path = process
                    .exe()
                    .map(|exe| exe.display().to_string())
                    .unwrap_or_default();
                Some(
                    WindowInfo::new(u64::from(pid.as_u32()), raw_name.to_string())
                        .with_process(name, path),
                )
            })
            .collect();
        windows.sort_by_key(|window| window.hwnd);

        debug!(
            event = "cli.processes.enumerated",
            count = windows.len(),
            excluded = excluded.len(),
        );
        Ok(windows)
    }

    fn handled_processes(&self) -> Vec<String> {
        self.include.clone()
    }

    fn set_exclusions(&self, excluded: &[String]) {
        *self
            .exclusions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = excluded.to_vec();
    }
}
