use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::providers::{ImageLookup, ProviderId};
use crate::reconcile::fallback::should_keep_existing;
use crate::windows::{ImageHandle, RecordId, WindowHandle, WindowInfo, WindowRecord};

/// Result of reconciling one provider batch.
#[derive(Debug, Default)]
pub struct Reconciled {
    /// Resolved records, in incoming order.
    pub records: Vec<Arc<WindowRecord>>,
    /// Records created because nothing cached matched them.
    pub added: usize,
    /// Cached records matched and updated in place.
    pub matched: usize,
    /// Cached records dropped because no incoming item matched them.
    pub evicted: usize,
}

impl Reconciled {
    /// Whether list membership changed, as opposed to fields only.
    pub fn is_structural(&self) -> bool {
        self.added > 0 || self.evicted > 0
    }
}

/// What happened to a batch offered through [`Reconciler::merge_batch`].
#[derive(Debug)]
pub enum BatchOutcome {
    /// The batch held only fallback placeholders and good records already
    /// existed; the existing records were kept untouched.
    KeptExisting { kept: usize },
    /// The batch replaced the provider's records.
    Replaced(Reconciled),
}

/// Identity-preserving cache of window records.
///
/// Holds two indices over the same records: one bucketed by window handle
/// for matching, one keyed by provider for eviction. Every mutation goes
/// through `&mut self`, so callers serialise access with a single lock.
#[derive(Debug, Default)]
pub struct Reconciler {
    by_handle: HashMap<WindowHandle, Vec<Arc<WindowRecord>>>,
    by_provider: HashMap<ProviderId, Vec<Arc<WindowRecord>>>,
    provider_order: Vec<ProviderId>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `incoming` against the records currently owned by `provider`.
    ///
    /// Each incoming item claims at most one cached record with the same
    /// handle, preferring one whose title is equal. Matched records are
    /// updated in place and keep their identity; unmatched items become new
    /// records stamped with `provider`; cached records nobody claimed are
    /// evicted from both indices.
    pub fn reconcile(&mut self, incoming: Vec<WindowInfo>, provider: &ProviderId) -> Reconciled {
        let previous = self.by_provider.remove(provider).unwrap_or_default();
        let mut unclaimed: HashMap<RecordId, Arc<WindowRecord>> = previous
            .iter()
            .map(|record| (record.id(), Arc::clone(record)))
            .collect();

        let mut outcome = Reconciled {
            records: Vec::with_capacity(incoming.len()),
            ..Reconciled::default()
        };

        for info in incoming {
            match self.claim_candidate(&info, &unclaimed) {
                Some(record) => {
                    unclaimed.remove(&record.id());
                    record.update_from(info);
                    outcome.matched += 1;
                    outcome.records.push(record);
                }
                None => {
                    let record = Arc::new(WindowRecord::from_info(info, provider.clone()));
                    self.by_handle
                        .entry(record.handle())
                        .or_default()
                        .push(Arc::clone(&record));
                    outcome.added += 1;
                    outcome.records.push(record);
                }
            }
        }

        for record in unclaimed.values() {
            self.remove_from_handle_index(record);
        }
        outcome.evicted = unclaimed.len();

        if !self.provider_order.contains(provider) {
            self.provider_order.push(provider.clone());
        }
        if !outcome.records.is_empty() {
            self.by_provider
                .insert(provider.clone(), outcome.records.clone());
        }

        debug!(
            event = "core.reconcile.batch_completed",
            provider = %provider,
            added = outcome.added,
            matched = outcome.matched,
            evicted = outcome.evicted,
        );

        outcome
    }

    /// Apply the last-known-good policy, then reconcile if the batch is accepted.
    pub fn merge_batch(&mut self, incoming: Vec<WindowInfo>, provider: &ProviderId) -> BatchOutcome {
        let existing = self.records_for(provider);
        if should_keep_existing(existing, &incoming) {
            debug!(
                event = "core.reconcile.fallback_batch_discarded",
                provider = %provider,
                incoming = incoming.len(),
                kept = existing.len(),
            );
            return BatchOutcome::KeptExisting {
                kept: existing.len(),
            };
        }
        BatchOutcome::Replaced(self.reconcile(incoming, provider))
    }

    /// Evict every record owned by `provider`. Returns the number evicted.
    pub fn clear_provider(&mut self, provider: &ProviderId) -> usize {
        if !self.by_provider.contains_key(provider) {
            return 0;
        }
        self.reconcile(Vec::new(), provider).evicted
    }

    /// Records owned by `provider`, in the order of its last accepted batch.
    pub fn records_for(&self, provider: &ProviderId) -> &[Arc<WindowRecord>] {
        self.by_provider
            .get(provider)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All records: providers in first-seen order, each in last-batch order.
    pub fn records(&self) -> Vec<Arc<WindowRecord>> {
        self.provider_order
            .iter()
            .filter_map(|provider| self.by_provider.get(provider))
            .flat_map(|records| records.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.provider_index_len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_provider.is_empty()
    }

    /// Total entries across all handle buckets.
    pub fn handle_index_len(&self) -> usize {
        self.by_handle.values().map(Vec::len).sum()
    }

    /// Total entries across all provider buckets.
    pub fn provider_index_len(&self) -> usize {
        self.by_provider.values().map(Vec::len).sum()
    }

    /// Fill in missing images from `lookup`.
    ///
    /// Touches no index, so it runs after the reconciliation lock is
    /// released. Each distinct executable path is looked up once per pass.
    /// Returns the number of records that received an image.
    pub fn populate_images(records: &[Arc<WindowRecord>], lookup: &dyn ImageLookup) -> usize {
        let mut cache: HashMap<String, Option<ImageHandle>> = HashMap::new();
        let mut filled = 0;

        for record in records {
            if record.image().is_some() {
                continue;
            }
            let path = record.executable_path();
            if path.is_empty() {
                continue;
            }
            let image = cache
                .entry(path)
                .or_insert_with_key(|path| lookup.get_image(path));
            if let Some(image) = image {
                record.set_image(image.clone());
                filled += 1;
            }
        }

        filled
    }

    fn claim_candidate(
        &self,
        info: &WindowInfo,
        unclaimed: &HashMap<RecordId, Arc<WindowRecord>>,
    ) -> Option<Arc<WindowRecord>> {
        let bucket = self.by_handle.get(&info.hwnd)?;
        let mut free = bucket
            .iter()
            .filter(|candidate| unclaimed.contains_key(&candidate.id()));

        let first_free = free.next()?;
        if first_free.title_matches(&info.title) {
            return Some(Arc::clone(first_free));
        }
        free.find(|candidate| candidate.title_matches(&info.title))
            .or(Some(first_free))
            .cloned()
    }

    fn remove_from_handle_index(&mut self, record: &Arc<WindowRecord>) {
        if let Some(bucket) = self.by_handle.get_mut(&record.handle()) {
            bucket.retain(|candidate| candidate.id() != record.id());
            if bucket.is_empty() {
                self.by_handle.remove(&record.handle());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn provider(name: &str) -> ProviderId {
        ProviderId::new(name)
    }

    fn window(handle: u64, title: &str) -> WindowInfo {
        WindowInfo::new(handle, title).with_process("app", "/usr/bin/app")
    }

    #[test]
    fn test_reconcile_same_handle_tabs_stay_distinct() {
        let mut reconciler = Reconciler::new();
        let chrome = provider("Chrome");

        let first = reconciler.reconcile(vec![window(555, "Tab A"), window(555, "Tab B")], &chrome);
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.added, 2);
        assert_eq!(reconciler.records().len(), 2);

        let second = reconciler.reconcile(
            vec![window(555, "Tab A renamed"), window(555, "Tab B renamed")],
            &chrome,
        );
        assert_eq!(second.added, 0);
        assert_eq!(second.evicted, 0);
        assert!(Arc::ptr_eq(&first.records[0], &second.records[0]));
        assert!(Arc::ptr_eq(&first.records[1], &second.records[1]));
        assert_eq!(second.records[0].title(), "Tab A renamed");
        assert_eq!(second.records[1].title(), "Tab B renamed");
        assert!(!second.is_structural());
    }

    #[test]
    fn test_reconcile_exact_title_wins_over_free_slot() {
        let mut reconciler = Reconciler::new();
        let p = provider("p");

        let first = reconciler.reconcile(vec![window(1, "A"), window(1, "B")], &p);
        // Reversed order: "B" must still land on the record that was "B".
        let second = reconciler.reconcile(vec![window(1, "B"), window(1, "A")], &p);

        assert!(Arc::ptr_eq(&first.records[1], &second.records[0]));
        assert!(Arc::ptr_eq(&first.records[0], &second.records[1]));
    }

    #[test]
    fn test_reconcile_preserves_incoming_order() {
        let mut reconciler = Reconciler::new();
        let p = provider("p");
        reconciler.reconcile(vec![window(1, "one"), window(2, "two")], &p);

        let result = reconciler.reconcile(vec![window(3, "three"), window(2, "two"), window(1, "one")], &p);
        let titles: Vec<String> = result.records.iter().map(|r| r.title()).collect();
        assert_eq!(titles, vec!["three", "two", "one"]);
        assert_eq!(reconciler.records().len(), 3);
    }

    #[test]
    fn test_reconcile_evicts_missing_records() {
        let mut reconciler = Reconciler::new();
        let p = provider("p");
        let first = reconciler.reconcile(vec![window(1, "keep"), window(2, "drop")], &p);
        let dropped = Arc::clone(&first.records[1]);

        let second = reconciler.reconcile(vec![window(1, "keep")], &p);
        assert_eq!(second.evicted, 1);
        assert!(second.is_structural());
        assert!(
            !reconciler
                .records()
                .iter()
                .any(|r| Arc::ptr_eq(r, &dropped))
        );
        assert_eq!(reconciler.handle_index_len(), 1);
        assert_eq!(reconciler.provider_index_len(), 1);
    }

    #[test]
    fn test_reconcile_duplicate_incoming_creates_second_record() {
        let mut reconciler = Reconciler::new();
        let p = provider("p");
        reconciler.reconcile(vec![window(7, "same")], &p);

        let result = reconciler.reconcile(vec![window(7, "same"), window(7, "same")], &p);
        assert_eq!(result.matched, 1);
        assert_eq!(result.added, 1);
        assert!(!Arc::ptr_eq(&result.records[0], &result.records[1]));
    }

    #[test]
    fn test_reconcile_does_not_claim_other_providers_records() {
        let mut reconciler = Reconciler::new();
        let a = provider("a");
        let b = provider("b");

        let from_a = reconciler.reconcile(vec![window(10, "shared")], &a);
        let from_b = reconciler.reconcile(vec![window(10, "shared")], &b);

        assert!(!Arc::ptr_eq(&from_a.records[0], &from_b.records[0]));
        assert_eq!(from_b.records[0].source(), &b);
        assert_eq!(reconciler.records_for(&a).len(), 1);
        assert_eq!(reconciler.records().len(), 2);
        assert_eq!(reconciler.handle_index_len(), 2);
    }

    #[test]
    fn test_source_is_never_reassigned() {
        let mut reconciler = Reconciler::new();
        let p = provider("owner");
        let first = reconciler.reconcile(vec![window(1, "x")], &p);
        let second = reconciler.reconcile(vec![window(1, "y")], &p);
        assert!(Arc::ptr_eq(&first.records[0], &second.records[0]));
        assert_eq!(second.records[0].source().as_str(), "owner");
    }

    #[test]
    fn test_records_keep_provider_first_seen_order() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(vec![window(1, "b1")], &provider("b"));
        reconciler.reconcile(vec![window(2, "a1")], &provider("a"));
        reconciler.reconcile(vec![window(3, "b2")], &provider("b"));

        let titles: Vec<String> = reconciler.records().iter().map(|r| r.title()).collect();
        assert_eq!(titles, vec!["b2", "a1"]);
    }

    #[test]
    fn test_clear_provider() {
        let mut reconciler = Reconciler::new();
        let p = provider("p");
        reconciler.reconcile(vec![window(1, "a"), window(2, "b")], &p);

        assert_eq!(reconciler.clear_provider(&p), 2);
        assert!(reconciler.is_empty());
        assert_eq!(reconciler.handle_index_len(), 0);
        assert_eq!(reconciler.clear_provider(&p), 0);
    }

    #[test]
    fn test_merge_batch_keeps_good_records_over_fallback() {
        let mut reconciler = Reconciler::new();
        let p = provider("deep");
        let good = reconciler.reconcile(vec![window(1, "Real title"), window(2, "Other")], &p);

        let outcome = reconciler.merge_batch(vec![window(1, "app").fallback()], &p);
        assert!(matches!(outcome, BatchOutcome::KeptExisting { kept: 2 }));

        let after = reconciler.records();
        assert_eq!(after.len(), 2);
        assert!(Arc::ptr_eq(&after[0], &good.records[0]));
        assert_eq!(after[0].title(), "Real title");
    }

    #[test]
    fn test_merge_batch_accepts_first_fallback_batch() {
        let mut reconciler = Reconciler::new();
        let p = provider("deep");
        let outcome = reconciler.merge_batch(vec![window(1, "app").fallback()], &p);
        match outcome {
            BatchOutcome::Replaced(reconciled) => assert_eq!(reconciled.added, 1),
            other => panic!("expected replacement, got {other:?}"),
        }
        assert!(reconciler.records()[0].is_fallback());
    }

    #[test]
    fn test_merge_batch_mixed_batch_replaces() {
        let mut reconciler = Reconciler::new();
        let p = provider("deep");
        reconciler.reconcile(vec![window(1, "Real")], &p);

        let outcome = reconciler.merge_batch(vec![window(1, "Real 2"), window(2, "x").fallback()], &p);
        assert!(matches!(outcome, BatchOutcome::Replaced(_)));
        assert_eq!(reconciler.records().len(), 2);
    }

    #[test]
    fn test_merge_batch_empty_batch_evicts() {
        let mut reconciler = Reconciler::new();
        let p = provider("p");
        reconciler.reconcile(vec![window(1, "Real")], &p);

        let outcome = reconciler.merge_batch(Vec::new(), &p);
        match outcome {
            BatchOutcome::Replaced(reconciled) => assert_eq!(reconciled.evicted, 1),
            other => panic!("expected replacement, got {other:?}"),
        }
        assert!(reconciler.is_empty());
    }

    struct CountingLookup {
        calls: AtomicUsize,
    }

    impl ImageLookup for CountingLookup {
        fn get_image(&self, executable_path: &str) -> Option<ImageHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if executable_path.ends_with("missing") {
                None
            } else {
                Some(ImageHandle::new(executable_path.as_bytes().to_vec()))
            }
        }
    }

    #[test]
    fn test_populate_images_looks_up_each_path_once() {
        let mut reconciler = Reconciler::new();
        let p = provider("p");
        let result = reconciler.reconcile(
            vec![
                window(1, "a"),
                window(2, "b"),
                WindowInfo::new(3u64, "c").with_process("x", "/opt/missing"),
                WindowInfo::new(4u64, "d"),
            ],
            &p,
        );
        let lookup = CountingLookup {
            calls: AtomicUsize::new(0),
        };

        let filled = Reconciler::populate_images(&result.records, &lookup);
        assert_eq!(filled, 2);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
        assert!(result.records[0].image().is_some());
        assert!(result.records[2].image().is_none());

        // Records that already have an image are skipped on the next pass.
        let filled_again = Reconciler::populate_images(&result.records, &lookup);
        assert_eq!(filled_again, 0);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 3);
    }
}
