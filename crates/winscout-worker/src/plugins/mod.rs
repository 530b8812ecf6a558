mod errors;
pub mod process_tree;

pub use errors::PluginError;

use winscout_core::WindowInfo;

/// A scanner hosted by the worker.
pub trait ScanPlugin {
    fn name(&self) -> &str;

    /// Enumerate windows, skipping processes in `excluded` (normalised names).
    fn scan(&self, excluded: &[String]) -> Result<Vec<WindowInfo>, PluginError>;
}

pub fn builtin_plugins() -> Vec<Box<dyn ScanPlugin>> {
    vec![Box::new(process_tree::ProcessTreePlugin::new())]
}
