//! Identity-preserving merge of provider batches into the shared record cache.

pub mod fallback;
pub mod reconciler;

pub use fallback::should_keep_existing;
pub use reconciler::{BatchOutcome, Reconciled, Reconciler};
