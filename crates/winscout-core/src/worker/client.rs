use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WinscoutConfig;
use crate::config::defaults::DEFAULT_WORKER_TIMEOUT_MS;
use crate::process::{self, ProcessError};
use crate::worker::errors::WorkerError;
use crate::worker::protocol::{self, MAX_LINE_LENGTH, PluginResult, ScanRequest};

/// How long to wait for a killed worker to be reaped.
const KILL_WAIT: Duration = Duration::from_secs(2);
/// How long a worker that sent its final message gets to exit on its own.
const EXIT_GRACE: Duration = Duration::from_millis(500);
/// How long the stderr forwarder may keep draining after the worker exits.
const STDERR_SETTLE: Duration = Duration::from_millis(100);

/// How to launch the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Path to the worker, or a bare name resolved on `PATH`.
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Default scan timeout when the caller does not supply one.
    pub timeout: Duration,
}

impl WorkerConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            timeout: Duration::from_millis(DEFAULT_WORKER_TIMEOUT_MS),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_config(config: &WinscoutConfig) -> Self {
        Self::new(config.worker_executable())
            .with_args(config.worker_args().iter().cloned())
            .with_timeout(config.worker_timeout())
    }
}

/// Why a [`WorkerScan`] stopped, or that it has not stopped yet.
#[derive(Debug)]
pub enum ScanStatus {
    Running,
    /// The worker sent its final message.
    Completed,
    /// The worker's output ended before the final message.
    StreamClosed,
    /// The scan exceeded its timeout; the worker was killed.
    TimedOut,
    /// The caller cancelled the scan; the worker was killed.
    Cancelled,
    /// No worker ran.
    Failed(WorkerError),
}

impl ScanStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ScanStatus::Running)
    }
}

struct ActiveWorker {
    scan_id: u64,
    pid: Option<u32>,
    child: Child,
}

type WorkerSlot = Arc<Mutex<Option<ActiveWorker>>>;

fn lock_slot(slot: &WorkerSlot) -> MutexGuard<'_, Option<ActiveWorker>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Take the active worker out of the slot, if it belongs to `scan_id`.
fn take_active(slot: &WorkerSlot, scan_id: Option<u64>) -> Option<ActiveWorker> {
    let mut guard = lock_slot(slot);
    match scan_id {
        Some(id) => guard.take_if(|active| active.scan_id == id),
        None => guard.take(),
    }
}

/// Kill every descendant of `pid`, then its process group.
///
/// Walks the full process table, so async callers run it on the blocking pool.
fn kill_descendants(pid: u32) {
    match process::kill_process_tree(pid) {
        Ok(_) | Err(ProcessError::NotFound { .. }) => {}
        Err(e) => warn!(
            event = "core.worker.kill_tree_failed",
            pid = pid,
            error = %e,
        ),
    }

    #[cfg(unix)]
    {
        if let Err(e) = process::kill_process_group(pid)
            && !matches!(e, ProcessError::NotFound { .. })
        {
            warn!(
                event = "core.worker.kill_group_failed",
                pid = pid,
                error = %e,
            );
        }
    }
}

fn start_kill(active: &mut ActiveWorker) {
    if let Err(e) = active.child.start_kill() {
        debug!(
            event = "core.worker.start_kill_failed",
            pid = ?active.pid,
            error = %e,
        );
    }
}

/// Send kill signals to the worker, its process group, and its descendants.
async fn kill_worker(active: &mut ActiveWorker) {
    if let Some(pid) = active.pid
        && let Err(e) = tokio::task::spawn_blocking(move || kill_descendants(pid)).await
    {
        warn!(
            event = "core.worker.kill_tree_failed",
            pid = pid,
            error = %e,
        );
    }
    start_kill(active);
}

async fn kill_and_reap(mut active: ActiveWorker) {
    kill_worker(&mut active).await;
    match tokio::time::timeout(KILL_WAIT, active.child.wait()).await {
        Ok(Ok(status)) => debug!(
            event = "core.worker.reaped",
            pid = ?active.pid,
            status = %status,
        ),
        Ok(Err(e)) => warn!(
            event = "core.worker.reap_failed",
            pid = ?active.pid,
            error = %e,
        ),
        Err(_) => warn!(event = "core.worker.reap_timeout", pid = ?active.pid),
    }
}

/// Give a worker that finished its output a moment to exit, then kill it.
///
/// Anything the worker left behind in its process group is killed either way.
async fn wait_or_kill(mut active: ActiveWorker) {
    match tokio::time::timeout(EXIT_GRACE, active.child.wait()).await {
        Ok(Ok(status)) => {
            debug!(
                event = "core.worker.exited",
                pid = ?active.pid,
                status = %status,
            );
            #[cfg(unix)]
            {
                if let Some(pid) = active.pid {
                    let _ = process::kill_process_group(pid);
                }
            }
        }
        _ => kill_and_reap(active).await,
    }
}

/// Kill from a synchronous context.
///
/// On a runtime the kill and reap run as a task; without one they run inline.
fn kill_in_background(mut active: ActiveWorker) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(kill_and_reap(active));
        }
        Err(_) => {
            if let Some(pid) = active.pid {
                kill_descendants(pid);
            }
            start_kill(&mut active);
            let _ = active.child.try_wait();
        }
    }
}

async fn write_request(mut stdin: ChildStdin, line: String, deadline: Instant, pid: Option<u32>) {
    let write = async {
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok::<(), std::io::Error>(())
    };

    match tokio::time::timeout_at(deadline, write).await {
        Ok(Ok(())) => debug!(event = "core.worker.request_sent", pid = ?pid),
        Ok(Err(e)) => warn!(
            event = "core.worker.request_write_failed",
            pid = ?pid,
            error = %e,
        ),
        Err(_) => warn!(event = "core.worker.request_write_timed_out", pid = ?pid),
    }
    // Dropping stdin closes the worker's input.
}

/// Forward the worker's stderr to the log, one event per line.
async fn drain_stderr(stderr: ChildStderr, pid: Option<u32>) {
    let mut lines = FramedRead::new(stderr, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => info!(event = "core.worker.stderr", pid = ?pid, line = %line),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!(event = "core.worker.stderr_line_too_long", pid = ?pid)
            }
            Err(LinesCodecError::Io(e)) => {
                debug!(event = "core.worker.stderr_read_failed", pid = ?pid, error = %e);
                break;
            }
        }
    }
}

/// Runs scans of the out-of-process worker, one child process at a time.
pub struct WorkerClient {
    config: WorkerConfig,
    slot: WorkerSlot,
    disposed: AtomicBool,
    not_found_reported: AtomicBool,
    next_scan_id: AtomicU64,
}

impl WorkerClient {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            slot: Arc::new(Mutex::new(None)),
            disposed: AtomicBool::new(false),
            not_found_reported: AtomicBool::new(false),
            next_scan_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Whether a worker process is currently owned by this client.
    pub fn has_active_worker(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    /// Start a scan with the configured timeout.
    pub async fn scan_streaming(
        &self,
        disabled_plugins: &[String],
        excluded_processes: &[String],
        cancel: CancellationToken,
    ) -> WorkerScan {
        self.scan_streaming_with_timeout(
            disabled_plugins,
            excluded_processes,
            self.config.timeout,
            cancel,
        )
        .await
    }

    /// Spawn the worker, send the scan request, and return the result stream.
    ///
    /// Never fails: when no worker can run, the returned scan is empty and
    /// its status says why. The timeout starts at spawn.
    pub async fn scan_streaming_with_timeout(
        &self,
        disabled_plugins: &[String],
        excluded_processes: &[String],
        timeout: Duration,
        cancel: CancellationToken,
    ) -> WorkerScan {
        if self.is_disposed() {
            return WorkerScan::failed(WorkerError::Disposed);
        }

        let executable = match self.resolve_executable() {
            Ok(path) => path,
            Err(e) => return WorkerScan::failed(e),
        };

        if let Some(previous) = take_active(&self.slot, None) {
            warn!(
                event = "core.worker.previous_scan_killed",
                pid = ?previous.pid,
            );
            kill_and_reap(previous).await;
        }

        let line = match protocol::encode_request(&ScanRequest::scan(
            disabled_plugins,
            excluded_processes,
        )) {
            Ok(line) => line,
            Err(e) => return WorkerScan::failed(e),
        };

        let mut command = Command::new(&executable);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        info!(
            event = "core.worker.spawn_started",
            executable = %executable.display(),
            timeout_ms = timeout.as_millis() as u64,
            disabled_plugins = disabled_plugins.len(),
            excluded_processes = excluded_processes.len(),
        );

        let deadline = Instant::now() + timeout;
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(
                    event = "core.worker.spawn_failed",
                    executable = %executable.display(),
                    error = %e,
                );
                return WorkerScan::failed(WorkerError::SpawnFailed {
                    executable: executable.display().to_string(),
                    message: e.to_string(),
                });
            }
        };

        let pid = child.id();
        let scan_id = self.next_scan_id.fetch_add(1, Ordering::Relaxed);
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, pid)));

        let active = ActiveWorker {
            scan_id,
            pid,
            child,
        };

        let Some(stdout) = stdout else {
            kill_and_reap(active).await;
            return WorkerScan::failed(WorkerError::SpawnFailed {
                executable: executable.display().to_string(),
                message: "worker stdout was not captured".to_string(),
            });
        };

        *lock_slot(&self.slot) = Some(active);

        // A dispose that raced the spawn would have missed this child.
        if self.is_disposed()
            && let Some(active) = take_active(&self.slot, Some(scan_id))
        {
            kill_and_reap(active).await;
            return WorkerScan::failed(WorkerError::Disposed);
        }

        debug!(event = "core.worker.spawn_completed", pid = ?pid, scan_id = scan_id);

        if let Some(stdin) = stdin {
            write_request(stdin, line, deadline, pid).await;
        }

        WorkerScan {
            scan_id,
            pid,
            lines: Some(FramedRead::new(
                stdout,
                LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
            )),
            slot: Some(Arc::clone(&self.slot)),
            stderr_task,
            deadline,
            timeout,
            cancel,
            status: ScanStatus::Running,
            yielded: 0,
            skip_next_eof: false,
        }
    }

    /// Kill any in-flight worker and refuse further scans.
    ///
    /// Kill signals are sent before this returns; reaping continues on the
    /// runtime. Calling it again does nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        match take_active(&self.slot, None) {
            Some(active) => {
                info!(
                    event = "core.worker.disposed",
                    pid = ?active.pid,
                    in_flight = true,
                );
                kill_in_background(active);
            }
            None => debug!(event = "core.worker.disposed", in_flight = false),
        }
    }

    /// Like [`dispose`](Self::dispose), but waits until the worker is reaped.
    pub async fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(active) = take_active(&self.slot, None) {
            info!(
                event = "core.worker.disposed",
                pid = ?active.pid,
                in_flight = true,
            );
            kill_and_reap(active).await;
        }
    }

    fn resolve_executable(&self) -> Result<PathBuf, WorkerError> {
        let configured = &self.config.executable;
        let resolved = if configured.is_absolute() || configured.components().count() > 1 {
            configured.is_file().then(|| configured.clone())
        } else {
            which::which(configured).ok()
        };

        match resolved {
            Some(path) => {
                self.not_found_reported.store(false, Ordering::Relaxed);
                Ok(path)
            }
            None => {
                let executable = configured.display().to_string();
                if !self.not_found_reported.swap(true, Ordering::Relaxed) {
                    warn!(event = "core.worker.not_found", executable = %executable);
                } else {
                    debug!(event = "core.worker.not_found", executable = %executable);
                }
                Err(WorkerError::NotFound { executable })
            }
        }
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

enum Step {
    Cancelled,
    TimedOut,
    Line(Option<Result<String, LinesCodecError>>),
}

/// Pull-based stream of results from one worker run.
///
/// Each call to [`next`](Self::next) reads only as far as the next result.
/// Dropping the scan early kills the worker.
pub struct WorkerScan {
    scan_id: u64,
    pid: Option<u32>,
    lines: Option<FramedRead<ChildStdout, LinesCodec>>,
    slot: Option<WorkerSlot>,
    stderr_task: Option<JoinHandle<()>>,
    deadline: Instant,
    timeout: Duration,
    cancel: CancellationToken,
    status: ScanStatus,
    yielded: usize,
    skip_next_eof: bool,
}

impl WorkerScan {
    fn failed(error: WorkerError) -> Self {
        Self {
            scan_id: 0,
            pid: None,
            lines: None,
            slot: None,
            stderr_task: None,
            deadline: Instant::now(),
            timeout: Duration::ZERO,
            cancel: CancellationToken::new(),
            status: ScanStatus::Failed(error),
            yielded: 0,
            skip_next_eof: false,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn status(&self) -> &ScanStatus {
        &self.status
    }

    /// Number of results handed out so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Wait for the next result. `None` once the scan has ended for any reason.
    pub async fn next(&mut self) -> Option<PluginResult> {
        loop {
            if !self.status.is_running() {
                return None;
            }
            let Some(lines) = self.lines.as_mut() else {
                self.status = ScanStatus::StreamClosed;
                return None;
            };

            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                _ = tokio::time::sleep_until(self.deadline) => Step::TimedOut,
                line = lines.next() => Step::Line(line),
            };

            match step {
                Step::Cancelled => {
                    info!(
                        event = "core.worker.scan_cancelled",
                        pid = ?self.pid,
                        yielded = self.yielded,
                    );
                    self.terminate(ScanStatus::Cancelled).await;
                    return None;
                }
                Step::TimedOut => {
                    let error = WorkerError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    };
                    warn!(
                        event = "core.worker.scan_timed_out",
                        pid = ?self.pid,
                        yielded = self.yielded,
                        error = %error,
                    );
                    self.terminate(ScanStatus::TimedOut).await;
                    return None;
                }
                // The framer reports end-of-stream once after a decode error.
                Step::Line(None) if self.skip_next_eof => self.skip_next_eof = false,
                Step::Line(None) => {
                    info!(
                        event = "core.worker.stream_closed",
                        pid = ?self.pid,
                        yielded = self.yielded,
                        reason = %WorkerError::StreamClosed,
                    );
                    self.finish(ScanStatus::StreamClosed).await;
                    return None;
                }
                Step::Line(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => {
                    warn!(
                        event = "core.worker.protocol_error",
                        pid = ?self.pid,
                        error = "response line exceeds maximum length",
                    );
                    self.skip_next_eof = true;
                }
                Step::Line(Some(Err(LinesCodecError::Io(e)))) => {
                    warn!(
                        event = "core.worker.read_failed",
                        pid = ?self.pid,
                        error = %e,
                    );
                    self.finish(ScanStatus::StreamClosed).await;
                    return None;
                }
                Step::Line(Some(Ok(line))) => match protocol::decode_response_line(&line) {
                    Ok(None) => {}
                    Ok(Some(result)) if result.is_final => {
                        debug!(
                            event = "core.worker.scan_completed",
                            pid = ?self.pid,
                            yielded = self.yielded,
                        );
                        self.finish(ScanStatus::Completed).await;
                        if result.plugin_name.is_empty() && result.windows.is_empty() {
                            return None;
                        }
                        self.yielded += 1;
                        return Some(result);
                    }
                    Ok(Some(result)) => {
                        self.yielded += 1;
                        return Some(result);
                    }
                    Err(e) => warn!(
                        event = "core.worker.protocol_error",
                        pid = ?self.pid,
                        error = %e,
                    ),
                },
            }
        }
    }

    /// Turn the scan into a `futures` stream.
    pub fn into_stream(self) -> impl Stream<Item = PluginResult> {
        futures::stream::unfold(self, |mut scan| async move {
            scan.next().await.map(|result| (result, scan))
        })
    }

    fn take_active(&self) -> Option<ActiveWorker> {
        self.slot
            .as_ref()
            .and_then(|slot| take_active(slot, Some(self.scan_id)))
    }

    /// Stop reading and kill the worker; returns once it is reaped.
    async fn terminate(&mut self, status: ScanStatus) {
        self.status = status;
        self.lines = None;
        if let Some(active) = self.take_active() {
            kill_and_reap(active).await;
        }
        self.stop_stderr(false).await;
    }

    /// Stop reading after the worker's output ended.
    async fn finish(&mut self, status: ScanStatus) {
        self.status = status;
        self.lines = None;
        if let Some(active) = self.take_active() {
            wait_or_kill(active).await;
        }
        self.stop_stderr(true).await;
    }

    async fn stop_stderr(&mut self, settle: bool) {
        if let Some(mut task) = self.stderr_task.take() {
            if settle && tokio::time::timeout(STDERR_SETTLE, &mut task).await.is_ok() {
                return;
            }
            task.abort();
        }
    }
}

impl Drop for WorkerScan {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        if let Some(active) = self.take_active() {
            debug!(event = "core.worker.scan_abandoned", pid = ?self.pid);
            kill_in_background(active);
        }
    }
}
