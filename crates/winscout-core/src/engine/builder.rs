use std::collections::HashSet;
use std::sync::Arc;

use crate::engine::errors::EngineError;
use crate::engine::orchestrator::Engine;
use crate::providers::{ImageLookup, WindowProvider};
use crate::worker::WorkerClient;

const DEFAULT_UPDATE_CAPACITY: usize = 256;

/// Assembles an [`Engine`] from its collaborators.
pub struct EngineBuilder {
    providers: Vec<Arc<dyn WindowProvider>>,
    worker: Option<WorkerClient>,
    images: Option<Arc<dyn ImageLookup>>,
    update_capacity: usize,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            worker: None,
            images: None,
            update_capacity: DEFAULT_UPDATE_CAPACITY,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(self, provider: impl WindowProvider + 'static) -> Self {
        self.shared_provider(Arc::new(provider))
    }

    pub fn shared_provider(mut self, provider: Arc<dyn WindowProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Worker used for out-of-process providers. Without one the slow path
    /// is always skipped.
    pub fn worker(mut self, client: WorkerClient) -> Self {
        self.worker = Some(client);
        self
    }

    pub fn image_lookup(mut self, lookup: Arc<dyn ImageLookup>) -> Self {
        self.images = Some(lookup);
        self
    }

    /// How many list updates a slow subscriber may lag behind.
    pub fn update_capacity(mut self, capacity: usize) -> Self {
        self.update_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            let name = provider.name();
            if name.trim().is_empty() {
                return Err(EngineError::EmptyProviderName);
            }
            if !seen.insert(name.to_string()) {
                return Err(EngineError::DuplicateProvider {
                    name: name.to_string(),
                });
            }
        }

        Ok(Engine::new(
            self.providers,
            self.worker.map(Arc::new),
            self.images,
            self.update_capacity,
        ))
    }
}
