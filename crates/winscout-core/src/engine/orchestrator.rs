use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SettingsSnapshot;
use crate::engine::routing::route_result;
use crate::engine::types::{ListUpdate, PathOutcome, RefreshReport};
use crate::errors::WinscoutError;
use crate::events;
use crate::providers::{
    ImageLookup, ProviderError, ProviderId, WindowProvider, compute_exclusions, worker_exclusions,
};
use crate::reconcile::{BatchOutcome, Reconciler};
use crate::windows::{WindowInfo, WindowSnapshot};
use crate::worker::{ScanStatus, WorkerClient, WorkerError};

struct EngineInner {
    providers: Vec<Arc<dyn WindowProvider>>,
    reconciler: Mutex<Reconciler>,
    fast_gate: Arc<Semaphore>,
    slow_gate: Arc<Semaphore>,
    worker: Option<Arc<WorkerClient>>,
    images: Option<Arc<dyn ImageLookup>>,
    updates: broadcast::Sender<ListUpdate>,
    shutdown: CancellationToken,
    slow_task: Mutex<Option<JoinHandle<()>>>,
    /// Providers disabled by the latest refresh; their batches are discarded.
    disabled: Mutex<HashSet<String>>,
}

/// Coordinates providers, the worker, and the shared window list.
///
/// Refreshes are triggered from outside (a timer, a hotkey). In-process
/// providers run on the fast path, which the caller awaits; out-of-process
/// providers run on the slow path, a background task. Each path has its
/// own gate and a request that finds its gate taken is dropped.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub(crate) fn new(
        providers: Vec<Arc<dyn WindowProvider>>,
        worker: Option<Arc<WorkerClient>>,
        images: Option<Arc<dyn ImageLookup>>,
        update_capacity: usize,
    ) -> Self {
        let (updates, _) = broadcast::channel(update_capacity);
        Self {
            inner: Arc::new(EngineInner {
                providers,
                reconciler: Mutex::new(Reconciler::new()),
                fast_gate: Arc::new(Semaphore::new(1)),
                slow_gate: Arc::new(Semaphore::new(1)),
                worker,
                images,
                updates,
                shutdown: CancellationToken::new(),
                slow_task: Mutex::new(None),
                disabled: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Run one refresh cycle with the given settings.
    ///
    /// Returns when the fast path is done; the slow path, if started,
    /// keeps running and reports through [`subscribe`](Self::subscribe).
    /// Providers are only prepared and enumerated on a path whose gate
    /// this call acquired.
    pub async fn refresh(&self, settings: &SettingsSnapshot) -> RefreshReport {
        if self.inner.shutdown.is_cancelled() {
            debug!(event = "core.engine.refresh_skipped", reason = "shut down");
            return RefreshReport::skipped();
        }
        let started = Instant::now();

        let enabled: Vec<Arc<dyn WindowProvider>> = self
            .inner
            .providers
            .iter()
            .filter(|provider| settings.is_enabled(provider.name()))
            .cloned()
            .collect();
        let (remote, local): (Vec<_>, Vec<_>) = enabled
            .iter()
            .cloned()
            .partition(|provider| provider.is_out_of_process());

        self.record_disabled(settings);
        self.evict_disabled(settings);

        let fast_gate = self.acquire_fast_gate(&local);
        let slow_gate = self.acquire_slow_gate(&remote);
        if let (Err(fast), Err(slow)) = (&fast_gate, &slow_gate)
            && (*fast == PathOutcome::Busy || *slow == PathOutcome::Busy)
        {
            let report = RefreshReport {
                fast: *fast,
                slow: *slow,
            };
            events::log_cycle_dropped(&report);
            return report;
        }

        events::log_cycle_started(enabled.len(), self.inner.providers.len() - enabled.len());

        let exclusions = compute_exclusions(&enabled);
        if fast_gate.is_ok() {
            self.prepare_providers(&local, &exclusions, settings);
        }
        if slow_gate.is_ok() {
            self.prepare_providers(&remote, &exclusions, settings);
        }

        let slow = match slow_gate {
            Ok((permit, worker)) => self.start_slow_path(permit, worker, remote, &enabled, settings),
            Err(outcome) => outcome,
        };
        let fast = match fast_gate {
            Ok(permit) => self.run_fast_path(permit, local).await,
            Err(outcome) => outcome,
        };

        let report = RefreshReport { fast, slow };
        events::log_cycle_completed(&report, started.elapsed());
        report
    }

    /// Copy of the current list. Never a live view.
    pub fn current_windows(&self) -> Vec<WindowSnapshot> {
        self.lock_reconciler()
            .records()
            .iter()
            .map(|record| record.snapshot())
            .collect()
    }

    /// Number of records currently owned by `provider`.
    pub fn window_count(&self, provider: &ProviderId) -> usize {
        self.lock_reconciler().records_for(provider).len()
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.inner
            .providers
            .iter()
            .map(|provider| ProviderId::new(provider.name()))
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListUpdate> {
        self.inner.updates.subscribe()
    }

    /// Whether a slow path run is in flight.
    pub fn is_slow_path_running(&self) -> bool {
        self.inner.slow_gate.available_permits() == 0
    }

    /// Wait for the current slow path run, if any, to finish.
    pub async fn wait_for_slow_path(&self) {
        let handle = self.lock_slow_task().take();
        if let Some(handle) = handle {
            log_slow_task_exit(handle.await);
        }
    }

    /// Cancel any in-flight slow scan and dispose the worker.
    ///
    /// The worker process is dead by the time this returns. Later
    /// refreshes do nothing.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        info!(event = "core.engine.shutdown_started");
        self.inner.shutdown.cancel();
        self.wait_for_slow_path().await;
        if let Some(worker) = &self.inner.worker {
            worker.shutdown().await;
        }
        info!(event = "core.engine.shutdown_completed");
    }

    fn record_disabled(&self, settings: &SettingsSnapshot) {
        *self.lock_disabled() = settings.disabled_providers().map(String::from).collect();
    }

    fn is_disabled(&self, provider: &ProviderId) -> bool {
        self.lock_disabled().contains(provider.as_str())
    }

    fn evict_disabled(&self, settings: &SettingsSnapshot) {
        for provider in &self.inner.providers {
            if settings.is_enabled(provider.name()) {
                continue;
            }
            let id = ProviderId::new(provider.name());
            let evicted = self.lock_reconciler().clear_provider(&id);
            if evicted > 0 {
                info!(
                    event = "core.engine.disabled_provider_evicted",
                    provider = %id,
                    evicted = evicted,
                );
                self.publish(&id, true);
            }
        }
    }

    fn acquire_fast_gate(
        &self,
        local: &[Arc<dyn WindowProvider>],
    ) -> Result<OwnedSemaphorePermit, PathOutcome> {
        if local.is_empty() {
            return Err(PathOutcome::Skipped);
        }
        Arc::clone(&self.inner.fast_gate)
            .try_acquire_owned()
            .map_err(|_| {
                debug!(event = "core.engine.fast_busy");
                PathOutcome::Busy
            })
    }

    fn acquire_slow_gate(
        &self,
        remote: &[Arc<dyn WindowProvider>],
    ) -> Result<(OwnedSemaphorePermit, Arc<WorkerClient>), PathOutcome> {
        if remote.is_empty() {
            return Err(PathOutcome::Skipped);
        }
        let Some(worker) = self.inner.worker.clone() else {
            debug!(event = "core.engine.slow_skipped", reason = "no worker configured");
            return Err(PathOutcome::Skipped);
        };
        match Arc::clone(&self.inner.slow_gate).try_acquire_owned() {
            Ok(permit) => Ok((permit, worker)),
            Err(_) => {
                debug!(event = "core.engine.slow_busy");
                Err(PathOutcome::Busy)
            }
        }
    }

    /// Reload settings and push exclusions to the providers of one path.
    fn prepare_providers(
        &self,
        providers: &[Arc<dyn WindowProvider>],
        exclusions: &HashMap<ProviderId, Vec<String>>,
        settings: &SettingsSnapshot,
    ) {
        for provider in providers {
            if let Err(e) = provider.reload_settings(settings) {
                warn!(
                    event = "core.engine.settings_reload_failed",
                    provider = provider.name(),
                    error = %e,
                    error_code = e.error_code(),
                );
            }
        }

        for provider in providers {
            let excluded = exclusions
                .get(&ProviderId::new(provider.name()))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            provider.set_exclusions(excluded);
        }
        debug!(event = "core.engine.exclusions_pushed", providers = providers.len());
    }

    async fn run_fast_path(
        &self,
        _permit: OwnedSemaphorePermit,
        fast: Vec<Arc<dyn WindowProvider>>,
    ) -> PathOutcome {
        let started = Instant::now();
        info!(event = "core.engine.fast_started", providers = fast.len());

        let mut pending: FuturesUnordered<_> = fast
            .into_iter()
            .map(|provider| {
                let id = ProviderId::new(provider.name());
                async move {
                    let result = tokio::task::spawn_blocking(move || provider.get_windows()).await;
                    (id, result)
                }
            })
            .collect();

        while let Some((id, result)) = pending.next().await {
            let windows = match result {
                Ok(Ok(windows)) => windows,
                Ok(Err(e)) => {
                    error!(
                        event = "core.engine.provider_failed",
                        provider = %id,
                        error = %e,
                        error_code = e.error_code(),
                    );
                    Vec::new()
                }
                Err(join_error) => {
                    let e = ProviderError::Panicked {
                        provider: id.to_string(),
                    };
                    error!(
                        event = "core.engine.provider_failed",
                        provider = %id,
                        error = %e,
                        error_code = e.error_code(),
                        panicked = join_error.is_panic(),
                    );
                    Vec::new()
                }
            };
            self.merge(&id, windows).await;
        }

        info!(
            event = "core.engine.fast_completed",
            duration_ms = started.elapsed().as_millis() as u64,
        );
        PathOutcome::Completed
    }

    fn start_slow_path(
        &self,
        permit: OwnedSemaphorePermit,
        worker: Arc<WorkerClient>,
        remote: Vec<Arc<dyn WindowProvider>>,
        enabled: &[Arc<dyn WindowProvider>],
        settings: &SettingsSnapshot,
    ) -> PathOutcome {
        let run = SlowRun {
            disabled: settings.disabled_providers().map(String::from).collect(),
            excluded: worker_exclusions(enabled),
            timeout: settings.worker_timeout(),
            remote,
        };
        let engine = self.clone();
        let cancel = self.inner.shutdown.child_token();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            engine.run_slow_path(&worker, run, cancel).await;
        });

        let previous = self.lock_slow_task().replace(handle);
        if let Some(result) = previous.and_then(|previous| previous.now_or_never()) {
            log_slow_task_exit(result);
        }
        PathOutcome::Started
    }

    async fn run_slow_path(&self, worker: &WorkerClient, run: SlowRun, cancel: CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }

        let started = Instant::now();
        info!(
            event = "core.engine.slow_started",
            providers = run.remote.len(),
            timeout_ms = run.timeout.as_millis() as u64,
            excluded = run.excluded.len(),
        );

        let mut scan = worker
            .scan_streaming_with_timeout(&run.disabled, &run.excluded, run.timeout, cancel)
            .await;

        let mut merged = 0usize;
        while let Some(result) = scan.next().await {
            if let Some(message) = &result.error
                && result.windows.is_empty()
            {
                warn!(
                    event = "core.engine.slow_plugin_failed",
                    plugin = %result.plugin_name,
                    error = %message,
                );
                continue;
            }

            let Some(provider) = route_result(&result, &run.remote) else {
                warn!(
                    event = "core.engine.result_unroutable",
                    plugin = %result.plugin_name,
                    windows = result.windows.len(),
                );
                continue;
            };

            self.merge(&provider, result.windows).await;
            merged += 1;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        match scan.status() {
            ScanStatus::Completed | ScanStatus::StreamClosed | ScanStatus::Running => info!(
                event = "core.engine.slow_completed",
                merged = merged,
                duration_ms = duration_ms,
            ),
            ScanStatus::TimedOut => warn!(
                event = "core.engine.slow_timed_out",
                merged = merged,
                timeout_ms = run.timeout.as_millis() as u64,
            ),
            ScanStatus::Cancelled => info!(
                event = "core.engine.slow_cancelled",
                merged = merged,
                duration_ms = duration_ms,
            ),
            // The client already warned once for a missing worker.
            ScanStatus::Failed(e @ WorkerError::NotFound { .. }) => debug!(
                event = "core.engine.slow_failed",
                error = %e,
                error_code = e.error_code(),
            ),
            ScanStatus::Failed(e) => error!(
                event = "core.engine.slow_failed",
                error = %e,
                error_code = e.error_code(),
            ),
        }
    }

    /// Merge one provider batch, fill images outside the lock, then notify.
    async fn merge(&self, provider: &ProviderId, windows: Vec<WindowInfo>) {
        let outcome = {
            let mut reconciler = self.lock_reconciler();
            // Checked under the list lock so a concurrent eviction is never undone.
            if self.is_disabled(provider) {
                debug!(
                    event = "core.engine.batch_discarded",
                    provider = %provider,
                    reason = "provider disabled",
                );
                return;
            }
            reconciler.merge_batch(windows, provider)
        };

        let reconciled = match outcome {
            BatchOutcome::KeptExisting { kept } => {
                info!(
                    event = "core.engine.fallback_kept",
                    provider = %provider,
                    kept = kept,
                );
                return;
            }
            BatchOutcome::Replaced(reconciled) => reconciled,
        };

        if let Some(images) = &self.inner.images
            && !reconciled.records.is_empty()
        {
            let images = Arc::clone(images);
            let records = reconciled.records.clone();
            match tokio::task::spawn_blocking(move || {
                Reconciler::populate_images(&records, images.as_ref())
            })
            .await
            {
                Ok(filled) if filled > 0 => debug!(
                    event = "core.engine.images_populated",
                    provider = %provider,
                    filled = filled,
                ),
                Ok(_) => {}
                Err(e) => warn!(
                    event = "core.engine.image_lookup_failed",
                    provider = %provider,
                    error = %e,
                ),
            }
        }

        self.publish(provider, reconciled.is_structural());
    }

    fn publish(&self, provider: &ProviderId, structural: bool) {
        let update = ListUpdate {
            provider: provider.clone(),
            structural,
        };
        if self.inner.updates.send(update).is_err() {
            debug!(event = "core.engine.update_unobserved", provider = %provider);
        }
    }

    fn lock_reconciler(&self) -> MutexGuard<'_, Reconciler> {
        self.inner
            .reconciler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_disabled(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner
            .disabled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_slow_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .slow_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Inputs of one slow path run, captured from the settings at refresh time.
struct SlowRun {
    disabled: Vec<String>,
    excluded: Vec<String>,
    timeout: Duration,
    remote: Vec<Arc<dyn WindowProvider>>,
}

fn log_slow_task_exit(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(
            event = "core.engine.slow_task_failed",
            error = %e,
            panicked = e.is_panic(),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::engine::EngineBuilder;
    use crate::windows::ImageHandle;

    enum Step {
        Windows(Vec<WindowInfo>),
        Fail,
        Panic,
    }

    /// In-process provider that replays a script of results.
    ///
    /// Once the script runs out, the last window list is repeated.
    struct ScriptedProvider {
        name: String,
        handled: Vec<String>,
        delay: Duration,
        script: Mutex<VecDeque<Step>>,
        last: Mutex<Vec<WindowInfo>>,
        calls: AtomicUsize,
        exclusions: Mutex<Vec<String>>,
        exclusion_pushes: AtomicUsize,
        reloads: AtomicUsize,
        /// Reload count observed by each `get_windows` call.
        reloads_seen: Mutex<Vec<usize>>,
        fail_reload: bool,
    }

    impl ScriptedProvider {
        fn new(name: &str, script: Vec<Step>) -> Self {
            Self {
                name: name.to_string(),
                handled: Vec::new(),
                delay: Duration::ZERO,
                script: Mutex::new(script.into()),
                last: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                exclusions: Mutex::new(Vec::new()),
                exclusion_pushes: AtomicUsize::new(0),
                reloads: AtomicUsize::new(0),
                reloads_seen: Mutex::new(Vec::new()),
                fail_reload: false,
            }
        }

        fn with_failing_reload(mut self) -> Self {
            self.fail_reload = true;
            self
        }

        fn reloads(&self) -> usize {
            self.reloads.load(Ordering::SeqCst)
        }

        fn exclusion_pushes(&self) -> usize {
            self.exclusion_pushes.load(Ordering::SeqCst)
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn with_handled(mut self, handled: &[&str]) -> Self {
            self.handled = handled.iter().map(|name| name.to_string()).collect();
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl WindowProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn get_windows(&self) -> Result<Vec<WindowInfo>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reloads_seen.lock().unwrap().push(self.reloads());
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Step::Windows(windows)) => {
                    *self.last.lock().unwrap() = windows.clone();
                    Ok(windows)
                }
                Some(Step::Fail) => Err(ProviderError::EnumerationFailed {
                    provider: self.name.clone(),
                    message: "scripted failure".to_string(),
                }),
                Some(Step::Panic) => panic!("scripted panic"),
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }

        fn handled_processes(&self) -> Vec<String> {
            self.handled.clone()
        }

        fn reload_settings(&self, _settings: &SettingsSnapshot) -> Result<(), ProviderError> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            if self.fail_reload {
                return Err(ProviderError::SettingsReloadFailed {
                    provider: self.name.clone(),
                    message: "scripted failure".to_string(),
                });
            }
            Ok(())
        }

        fn set_exclusions(&self, excluded: &[String]) {
            self.exclusion_pushes.fetch_add(1, Ordering::SeqCst);
            *self.exclusions.lock().unwrap() = excluded.to_vec();
        }
    }

    fn tab(hwnd: u64, title: &str) -> WindowInfo {
        WindowInfo::new(hwnd, title).with_process("chrome", "/usr/bin/chrome")
    }

    fn titles(engine: &Engine) -> Vec<String> {
        engine
            .current_windows()
            .into_iter()
            .map(|window| window.title)
            .collect()
    }

    #[tokio::test]
    async fn test_same_handle_tabs_keep_identity_across_renames() {
        let chrome = Arc::new(ScriptedProvider::new(
            "chrome",
            vec![
                Step::Windows(vec![tab(555, "Tab A"), tab(555, "Tab B")]),
                Step::Windows(vec![tab(555, "Tab A (1)"), tab(555, "Tab B (1)")]),
            ],
        ));
        let engine = EngineBuilder::new()
            .shared_provider(chrome.clone())
            .build()
            .unwrap();
        let settings = SettingsSnapshot::default();

        let report = engine.refresh(&settings).await;
        assert_eq!(report.fast, PathOutcome::Completed);
        assert_eq!(report.slow, PathOutcome::Skipped);
        let first = engine.current_windows();
        assert_eq!(first.len(), 2);

        engine.refresh(&settings).await;
        let second = engine.current_windows();
        assert_eq!(second.len(), 2);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[1].id, second[1].id);
        assert_eq!(titles(&engine), vec!["Tab A (1)", "Tab B (1)"]);
        assert_eq!(second[0].source, "chrome");
    }

    #[tokio::test]
    async fn test_second_fast_refresh_is_dropped_while_busy() {
        let slow = Arc::new(
            ScriptedProvider::new("native", vec![Step::Windows(vec![tab(1, "One")])])
                .with_delay(Duration::from_millis(300)),
        );
        let engine = EngineBuilder::new()
            .shared_provider(slow.clone())
            .build()
            .unwrap();

        let background = engine.clone();
        let first = tokio::spawn(async move {
            background.refresh(&SettingsSnapshot::default()).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = engine.refresh(&SettingsSnapshot::default()).await;
        assert_eq!(second.fast, PathOutcome::Busy);

        let first = first.await.unwrap();
        assert_eq!(first.fast, PathOutcome::Completed);
        assert_eq!(slow.calls(), 1);

        engine.refresh(&SettingsSnapshot::default()).await;
        assert_eq!(slow.calls(), 2);
    }

    #[tokio::test]
    async fn test_dropped_refresh_does_not_touch_providers() {
        let slow = Arc::new(
            ScriptedProvider::new("native", vec![Step::Windows(vec![tab(1, "One")])])
                .with_delay(Duration::from_millis(300)),
        );
        let engine = EngineBuilder::new()
            .shared_provider(slow.clone())
            .build()
            .unwrap();

        let background = engine.clone();
        let first = tokio::spawn(async move {
            background.refresh(&SettingsSnapshot::default()).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = engine.refresh(&SettingsSnapshot::default()).await;
        assert_eq!(second.fast, PathOutcome::Busy);
        assert_eq!(second.slow, PathOutcome::Skipped);
        assert_eq!(slow.reloads(), 1);
        assert_eq!(slow.exclusion_pushes(), 1);

        first.await.unwrap();
        assert_eq!(slow.reloads(), 1);
        assert_eq!(slow.exclusion_pushes(), 1);
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test]
    async fn test_settings_reloaded_before_each_enumeration() {
        let provider = Arc::new(ScriptedProvider::new(
            "native",
            vec![Step::Windows(vec![tab(1, "One")])],
        ));
        let engine = EngineBuilder::new()
            .shared_provider(provider.clone())
            .build()
            .unwrap();

        engine.refresh(&SettingsSnapshot::default()).await;
        engine.refresh(&SettingsSnapshot::default()).await;

        assert_eq!(provider.reloads(), 2);
        assert_eq!(*provider.reloads_seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_settings_reload_still_enumerates() {
        let broken = Arc::new(
            ScriptedProvider::new("native", vec![Step::Windows(vec![tab(1, "Editor")])])
                .with_failing_reload(),
        );
        let steady = Arc::new(ScriptedProvider::new(
            "chrome",
            vec![Step::Windows(vec![tab(2, "Tab")])],
        ));
        let engine = EngineBuilder::new()
            .shared_provider(broken.clone())
            .shared_provider(steady.clone())
            .build()
            .unwrap();

        let report = engine.refresh(&SettingsSnapshot::default()).await;
        assert_eq!(report.fast, PathOutcome::Completed);
        assert_eq!(broken.reloads(), 1);
        assert_eq!(broken.calls(), 1);
        assert_eq!(engine.window_count(&ProviderId::new("native")), 1);
        assert_eq!(engine.window_count(&ProviderId::new("chrome")), 1);
    }

    #[tokio::test]
    async fn test_fallback_batch_keeps_last_known_good() {
        let provider = Arc::new(ScriptedProvider::new(
            "deep",
            vec![
                Step::Windows(vec![tab(1, "Inbox"), tab(2, "Drafts")]),
                Step::Windows(vec![tab(1, "mail").fallback()]),
            ],
        ));
        let engine = EngineBuilder::new()
            .shared_provider(provider.clone())
            .build()
            .unwrap();
        let mut updates = engine.subscribe();
        let settings = SettingsSnapshot::default();

        engine.refresh(&settings).await;
        let before = engine.current_windows();
        assert!(updates.try_recv().is_ok());

        engine.refresh(&settings).await;
        assert_eq!(engine.current_windows(), before);
        // A kept batch publishes nothing.
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_first_fallback_batch_is_accepted() {
        let provider = ScriptedProvider::new(
            "deep",
            vec![Step::Windows(vec![tab(1, "mail").fallback()])],
        );
        let engine = EngineBuilder::new().provider(provider).build().unwrap();

        engine.refresh(&SettingsSnapshot::default()).await;
        let windows = engine.current_windows();
        assert_eq!(windows.len(), 1);
        assert!(windows[0].is_fallback);
    }

    #[tokio::test]
    async fn test_failing_provider_is_isolated_and_evicted() {
        let flaky = Arc::new(ScriptedProvider::new(
            "flaky",
            vec![
                Step::Windows(vec![tab(1, "Flaky")]),
                Step::Panic,
                Step::Windows(vec![tab(1, "Flaky")]),
                Step::Fail,
            ],
        ));
        let steady = Arc::new(ScriptedProvider::new(
            "steady",
            vec![Step::Windows(vec![tab(2, "Steady")])],
        ));
        let engine = EngineBuilder::new()
            .shared_provider(flaky.clone())
            .shared_provider(steady.clone())
            .build()
            .unwrap();
        let settings = SettingsSnapshot::default();

        engine.refresh(&settings).await;
        assert_eq!(engine.current_windows().len(), 2);

        let report = engine.refresh(&settings).await;
        assert_eq!(report.fast, PathOutcome::Completed);
        assert_eq!(titles(&engine), vec!["Steady"]);

        engine.refresh(&settings).await;
        assert_eq!(engine.current_windows().len(), 2);

        engine.refresh(&settings).await;
        assert_eq!(titles(&engine), vec!["Steady"]);
        assert_eq!(engine.window_count(&ProviderId::new("flaky")), 0);
    }

    #[tokio::test]
    async fn test_disabled_provider_records_are_evicted() {
        let engine = EngineBuilder::new()
            .provider(ScriptedProvider::new(
                "chrome",
                vec![Step::Windows(vec![tab(1, "Tab")])],
            ))
            .provider(ScriptedProvider::new(
                "native",
                vec![Step::Windows(vec![tab(2, "Editor")])],
            ))
            .build()
            .unwrap();

        engine.refresh(&SettingsSnapshot::default()).await;
        assert_eq!(engine.current_windows().len(), 2);

        let mut updates = engine.subscribe();
        let settings = SettingsSnapshot::default().with_disabled(["chrome"]);
        engine.refresh(&settings).await;

        assert_eq!(titles(&engine), vec!["Editor"]);
        let update = updates.try_recv().unwrap();
        assert_eq!(update.provider, ProviderId::new("chrome"));
        assert!(update.structural);
    }

    #[tokio::test]
    async fn test_updates_distinguish_structural_changes() {
        let engine = EngineBuilder::new()
            .provider(ScriptedProvider::new(
                "chrome",
                vec![
                    Step::Windows(vec![tab(1, "Tab")]),
                    Step::Windows(vec![tab(1, "Tab renamed")]),
                    Step::Windows(vec![tab(1, "Tab renamed"), tab(2, "New")]),
                ],
            ))
            .build()
            .unwrap();
        let mut updates = engine.subscribe();
        let settings = SettingsSnapshot::default();

        engine.refresh(&settings).await;
        assert!(updates.try_recv().unwrap().structural);
        engine.refresh(&settings).await;
        assert!(!updates.try_recv().unwrap().structural);
        engine.refresh(&settings).await;
        assert!(updates.try_recv().unwrap().structural);
    }

    #[tokio::test]
    async fn test_exclusions_pushed_before_enumeration() {
        let chrome = Arc::new(
            ScriptedProvider::new("chrome", vec![Step::Windows(vec![])])
                .with_handled(&["chrome.exe"]),
        );
        let native = Arc::new(ScriptedProvider::new("native", vec![Step::Windows(vec![])]));
        let engine = EngineBuilder::new()
            .shared_provider(chrome.clone())
            .shared_provider(native.clone())
            .build()
            .unwrap();

        engine.refresh(&SettingsSnapshot::default()).await;
        assert_eq!(*native.exclusions.lock().unwrap(), vec!["chrome"]);
        assert!(chrome.exclusions.lock().unwrap().is_empty());

        engine
            .refresh(&SettingsSnapshot::default().with_disabled(["chrome"]))
            .await;
        assert!(native.exclusions.lock().unwrap().is_empty());
    }

    struct CountingImages {
        lookups: AtomicUsize,
    }

    impl ImageLookup for CountingImages {
        fn get_image(&self, _executable_path: &str) -> Option<ImageHandle> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Some(ImageHandle::new(vec![1u8, 2, 3]))
        }
    }

    #[tokio::test]
    async fn test_images_populated_after_merge() {
        let images = Arc::new(CountingImages {
            lookups: AtomicUsize::new(0),
        });
        let engine = EngineBuilder::new()
            .provider(ScriptedProvider::new(
                "chrome",
                vec![Step::Windows(vec![tab(1, "A"), tab(2, "B")])],
            ))
            .image_lookup(images.clone())
            .build()
            .unwrap();

        engine.refresh(&SettingsSnapshot::default()).await;
        assert!(engine.current_windows().iter().all(|w| w.has_image));
        assert_eq!(images.lookups.load(Ordering::SeqCst), 1);

        engine.refresh(&SettingsSnapshot::default()).await;
        assert_eq!(images.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_after_shutdown_is_skipped() {
        let provider = Arc::new(ScriptedProvider::new("native", vec![]));
        let engine = EngineBuilder::new()
            .shared_provider(provider.clone())
            .build()
            .unwrap();

        engine.shutdown().await;
        engine.shutdown().await;
        assert_eq!(
            engine.refresh(&SettingsSnapshot::default()).await,
            RefreshReport::skipped()
        );
        assert_eq!(provider.calls(), 0);
    }

    #[cfg(unix)]
    mod slow_path {
        use super::*;
        use crate::providers::RemoteProvider;
        use crate::worker::WorkerConfig;

        fn sh_worker(script: &str) -> WorkerClient {
            WorkerClient::new(
                WorkerConfig::new("/bin/sh")
                    .with_args(["-c", script])
                    .with_timeout(Duration::from_secs(10)),
            )
        }

        #[tokio::test]
        async fn test_slow_scan_does_not_delay_fast_path() {
            let fast = Arc::new(ScriptedProvider::new(
                "native",
                vec![Step::Windows(vec![tab(1, "Editor")])],
            ));
            let engine = EngineBuilder::new()
                .shared_provider(fast.clone())
                .provider(RemoteProvider::new("deep", vec![]))
                .worker(sh_worker("sleep 30"))
                .build()
                .unwrap();

            let started = Instant::now();
            let report = engine.refresh(&SettingsSnapshot::default()).await;
            assert_eq!(report.fast, PathOutcome::Completed);
            assert_eq!(report.slow, PathOutcome::Started);
            assert!(engine.is_slow_path_running());

            let again = engine.refresh(&SettingsSnapshot::default()).await;
            assert_eq!(again.fast, PathOutcome::Completed);
            assert_eq!(again.slow, PathOutcome::Busy);
            assert!(started.elapsed() < Duration::from_secs(5));
            assert_eq!(fast.calls(), 2);

            engine.shutdown().await;
            assert!(!engine.is_slow_path_running());
            assert!(started.elapsed() < Duration::from_secs(8));
        }

        #[tokio::test]
        async fn test_worker_results_routed_to_providers() {
            let script = concat!(
                "read req; ",
                r#"echo '{"pluginName":"deep","windows":[{"hwnd":7,"title":"Deep","processName":"deep","executablePath":"/bin/deep","isFallback":false}],"isFinal":false}'; "#,
                r#"echo '{"pluginName":"renamed","windows":[{"hwnd":8,"title":"Inbox","processName":"mail","executablePath":"/bin/mail","isFallback":false}],"isFinal":false}'; "#,
                r#"echo '{"pluginName":"stray","windows":[{"hwnd":9,"title":"Stray","processName":"other","executablePath":"/bin/other","isFallback":false}],"isFinal":false}'; "#,
                r#"echo '{"pluginName":"","windows":[],"isFinal":true}'"#,
            );
            let engine = EngineBuilder::new()
                .provider(RemoteProvider::new("deep", vec![]))
                .provider(RemoteProvider::new("mailer", vec!["mail".to_string()]))
                .worker(sh_worker(script))
                .build()
                .unwrap();
            let mut updates = engine.subscribe();

            let report = engine.refresh(&SettingsSnapshot::default()).await;
            assert_eq!(report.fast, PathOutcome::Skipped);
            assert_eq!(report.slow, PathOutcome::Started);
            engine.wait_for_slow_path().await;

            let windows = engine.current_windows();
            let sources: Vec<(&str, &str)> = windows
                .iter()
                .map(|w| (w.title.as_str(), w.source.as_str()))
                .collect();
            assert_eq!(sources, vec![("Deep", "deep"), ("Inbox", "mailer")]);

            assert_eq!(updates.try_recv().unwrap().provider, ProviderId::new("deep"));
            assert_eq!(
                updates.try_recv().unwrap().provider,
                ProviderId::new("mailer")
            );
            assert!(updates.try_recv().is_err());
            engine.shutdown().await;
        }

        #[tokio::test]
        async fn test_batches_for_provider_disabled_mid_scan_are_discarded() {
            let script = concat!(
                "read req; sleep 1; ",
                r#"echo '{"pluginName":"deep","windows":[{"hwnd":7,"title":"Deep","processName":"deep","executablePath":"/bin/deep","isFallback":false}],"isFinal":false}'; "#,
                r#"echo '{"pluginName":"","windows":[],"isFinal":true}'"#,
            );
            let engine = EngineBuilder::new()
                .provider(RemoteProvider::new("deep", vec![]))
                .worker(sh_worker(script))
                .build()
                .unwrap();

            let report = engine.refresh(&SettingsSnapshot::default()).await;
            assert_eq!(report.slow, PathOutcome::Started);

            let report = engine
                .refresh(&SettingsSnapshot::default().with_disabled(["deep"]))
                .await;
            assert_eq!(report, RefreshReport::skipped());

            engine.wait_for_slow_path().await;
            assert_eq!(engine.window_count(&ProviderId::new("deep")), 0);
            assert!(engine.current_windows().is_empty());

            engine.refresh(&SettingsSnapshot::default()).await;
            engine.wait_for_slow_path().await;
            assert_eq!(engine.window_count(&ProviderId::new("deep")), 1);
            engine.shutdown().await;
        }

        #[tokio::test]
        async fn test_slow_path_skipped_without_worker_or_remote_providers() {
            let no_worker = EngineBuilder::new()
                .provider(RemoteProvider::new("deep", vec![]))
                .build()
                .unwrap();
            let report = no_worker.refresh(&SettingsSnapshot::default()).await;
            assert_eq!(report.slow, PathOutcome::Skipped);

            let disabled = EngineBuilder::new()
                .provider(RemoteProvider::new("deep", vec![]))
                .worker(sh_worker("sleep 30"))
                .build()
                .unwrap();
            let report = disabled
                .refresh(&SettingsSnapshot::default().with_disabled(["deep"]))
                .await;
            assert_eq!(report.slow, PathOutcome::Skipped);
        }
    }
}
