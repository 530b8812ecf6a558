//! Last-known-good policy for low-fidelity batches.

use std::sync::Arc;

use crate::windows::{WindowInfo, WindowRecord};

/// Whether an incoming batch should be discarded in favour of existing records.
///
/// True when every incoming item is a fallback placeholder and the provider
/// already owns at least one record from a full scan. An empty batch is a
/// real result (the provider sees nothing) and is never discarded, and a
/// placeholder batch replaces records that were themselves placeholders.
pub fn should_keep_existing(existing: &[Arc<WindowRecord>], incoming: &[WindowInfo]) -> bool {
    !incoming.is_empty()
        && incoming.iter().all(|window| window.is_fallback)
        && existing.iter().any(|record| !record.is_fallback())
}
