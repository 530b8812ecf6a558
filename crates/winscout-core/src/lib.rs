//! winscout-core: Core library for open window discovery
//!
//! This library gathers windows from many sources, keeps a single
//! identity-preserving list of them, and runs the slow out-of-process
//! scanner without letting it stall the fast sources.
//!
//! # Main Entry Points
//!
//! - [`engine`] - Build an engine and run refresh cycles
//! - [`reconcile`] - Identity-preserving window cache
//! - [`worker`] - Out-of-process scanner client and wire protocol
//! - [`providers`] - Provider traits and exclusion helpers
//! - [`config`] - Configuration management

pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod logging;
pub mod process;
pub mod providers;
pub mod reconcile;
pub mod windows;
pub mod worker;

// Re-export commonly used types at crate root for convenience
pub use config::{SettingsSnapshot, WinscoutConfig};
pub use engine::{Engine, EngineBuilder, EngineError, ListUpdate, PathOutcome, RefreshReport};
pub use errors::{WinscoutError, WinscoutResult};
pub use providers::{ImageLookup, ProviderError, ProviderId, RemoteProvider, WindowProvider};
pub use reconcile::Reconciler;
pub use windows::{ImageHandle, RecordId, WindowHandle, WindowInfo, WindowRecord, WindowSnapshot};
pub use worker::{PluginResult, ScanStatus, WorkerClient, WorkerConfig, WorkerError, WorkerScan};

// Re-export logging initialization
pub use logging::init_logging;
