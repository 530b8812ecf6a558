//! Client for the out-of-process window scanner.
//!
//! The worker is a separate executable speaking newline-delimited JSON
//! over stdio; see [`protocol`] for the wire format.

pub mod client;
pub mod errors;
pub mod protocol;

pub use client::{ScanStatus, WorkerClient, WorkerConfig, WorkerScan};
pub use errors::WorkerError;
pub use protocol::{PluginResult, ScanRequest};
