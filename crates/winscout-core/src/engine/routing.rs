use std::collections::HashSet;
use std::sync::Arc;

use crate::providers::{ProviderId, WindowProvider, normalize_process_name};
use crate::worker::PluginResult;

/// Find the provider that owns a worker result.
///
/// An exact plugin name match wins. Otherwise the first candidate whose
/// handled processes include any of the result's process names is used.
/// `None` means the result cannot be attributed and should be dropped.
pub fn route_result(
    result: &PluginResult,
    candidates: &[Arc<dyn WindowProvider>],
) -> Option<ProviderId> {
    if let Some(provider) = candidates
        .iter()
        .find(|provider| provider.name() == result.plugin_name)
    {
        return Some(ProviderId::new(provider.name()));
    }

    let processes: HashSet<String> = result
        .windows
        .iter()
        .map(|window| normalize_process_name(&window.process_name))
        .filter(|name| !name.is_empty())
        .collect();
    if processes.is_empty() {
        return None;
    }

    candidates
        .iter()
        .find(|provider| {
            provider
                .handled_processes()
                .iter()
                .any(|handled| processes.contains(&normalize_process_name(handled)))
        })
        .map(|provider| ProviderId::new(provider.name()))
}
