use crate::providers::ProviderId;

/// What a refresh did with one of its two paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOutcome {
    /// The path ran to completion within the call.
    Completed,
    /// The path was launched in the background.
    Started,
    /// A previous run still held the gate; this request was dropped.
    Busy,
    /// Nothing to do (no enabled providers, no worker, or shut down).
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub fast: PathOutcome,
    pub slow: PathOutcome,
}

impl RefreshReport {
    pub(crate) fn skipped() -> Self {
        Self {
            fast: PathOutcome::Skipped,
            slow: PathOutcome::Skipped,
        }
    }
}

/// Published after a provider's batch lands in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListUpdate {
    pub provider: ProviderId,
    /// Records were added or removed, rather than only updated in place.
    pub structural: bool,
}
