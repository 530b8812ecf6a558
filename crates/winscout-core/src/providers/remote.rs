//! Descriptor provider for plugins hosted in the out-of-process worker.

use std::sync::{PoisonError, RwLock};

use crate::providers::errors::ProviderError;
use crate::providers::traits::WindowProvider;
use crate::windows::WindowInfo;

/// A plugin that runs inside the worker process.
///
/// It owns records in the shared list like any other provider, but its
/// windows only ever arrive through a worker scan.
#[derive(Debug)]
pub struct RemoteProvider {
    name: String,
    processes: Vec<String>,
    exclusions: RwLock<Vec<String>>,
}

impl RemoteProvider {
    pub fn new(name: impl Into<String>, processes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            processes,
            exclusions: RwLock::new(Vec::new()),
        }
    }

    /// Process names owned by other providers, as last pushed by the engine.
    pub fn exclusions(&self) -> Vec<String> {
        self.exclusions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl WindowProvider for RemoteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_out_of_process(&self) -> bool {
        true
    }

    fn get_windows(&self) -> Result<Vec<WindowInfo>, ProviderError> {
        Ok(Vec::new())
    }

    fn handled_processes(&self) -> Vec<String> {
        self.processes.clone()
    }

    fn set_exclusions(&self, excluded: &[String]) {
        *self
            .exclusions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = excluded.to_vec();
    }
}
