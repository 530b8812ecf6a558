//! Refresh orchestration.
//!
//! Fans a refresh out to every enabled provider, merges each batch into
//! the shared [`Reconciler`](crate::reconcile::Reconciler) as it arrives,
//! and publishes a [`ListUpdate`] per merged batch.

pub mod builder;
pub mod errors;
pub mod orchestrator;
pub mod routing;
pub mod types;

pub use builder::EngineBuilder;
pub use errors::EngineError;
pub use orchestrator::Engine;
pub use routing::route_result;
pub use types::{ListUpdate, PathOutcome, RefreshReport};
