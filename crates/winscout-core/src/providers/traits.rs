//! Provider and image lookup trait definitions.

use crate::config::SettingsSnapshot;
use crate::providers::errors::ProviderError;
use crate::windows::{ImageHandle, WindowInfo};

/// Trait defining the interface for window sources.
///
/// Fast providers enumerate in-process and are called from a blocking
/// thread, so `get_windows` may block on native I/O. Out-of-process
/// providers are never enumerated directly; their windows arrive through
/// the worker and are routed to them by name or handled process.
pub trait WindowProvider: Send + Sync {
    /// The plugin name of this provider (e.g., "chrome", "native").
    fn name(&self) -> &str;

    /// Whether this provider's windows come from the out-of-process worker.
    fn is_out_of_process(&self) -> bool {
        false
    }

    /// Enumerate the windows this provider currently sees.
    fn get_windows(&self) -> Result<Vec<WindowInfo>, ProviderError>;

    /// Re-read provider settings before a refresh cycle.
    fn reload_settings(&self, _settings: &SettingsSnapshot) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Process names this provider owns.
    ///
    /// Other providers are told to skip these so one application is not
    /// listed twice by two sources.
    fn handled_processes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Receive the process names owned by other providers.
    fn set_exclusions(&self, _excluded: &[String]) {}
}

/// Resolves an icon image for an executable.
pub trait ImageLookup: Send + Sync {
    fn get_image(&self, executable_path: &str) -> Option<ImageHandle>;
}
