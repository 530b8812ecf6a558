//! Window sources: the provider contract and helpers shared by all providers.

pub mod errors;
pub mod operations;
pub mod remote;
pub mod traits;
pub mod types;

pub use errors::ProviderError;
pub use operations::{compute_exclusions, normalize_process_name, worker_exclusions};
pub use remote::RemoteProvider;
pub use traits::{ImageLookup, WindowProvider};
pub use types::ProviderId;
