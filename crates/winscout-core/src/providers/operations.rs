use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::providers::traits::WindowProvider;
use crate::providers::types::ProviderId;

/// Normalise a process name for ownership comparisons.
///
/// Strips any directory and a trailing `.exe`, and lowercases the rest.
pub fn normalize_process_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let lower = base.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

/// Compute, for every provider, the processes owned by all the others.
///
/// The result is keyed by provider name and sorted so the same provider
/// set always yields the same lists.
pub fn compute_exclusions(
    providers: &[Arc<dyn WindowProvider>],
) -> HashMap<ProviderId, Vec<String>> {
    let owned: Vec<(ProviderId, BTreeSet<String>)> = providers
        .iter()
        .map(|provider| {
            let names = provider
                .handled_processes()
                .iter()
                .map(|name| normalize_process_name(name))
                .filter(|name| !name.is_empty())
                .collect();
            (ProviderId::new(provider.name()), names)
        })
        .collect();

    owned
        .iter()
        .map(|(id, _)| {
            let others: BTreeSet<String> = owned
                .iter()
                .filter(|(other, _)| other != id)
                .flat_map(|(_, names)| names.iter().cloned())
                .collect();
            (id.clone(), others.into_iter().collect())
        })
        .collect()
}

/// Processes the worker must skip: everything owned by in-process providers.
pub fn worker_exclusions(providers: &[Arc<dyn WindowProvider>]) -> Vec<String> {
    providers
        .iter()
        .filter(|provider| !provider.is_out_of_process())
        .flat_map(|provider| provider.handled_processes())
        .map(|name| normalize_process_name(&name))
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
