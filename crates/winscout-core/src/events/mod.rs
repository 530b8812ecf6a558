//! Lifecycle events for the binaries and for each refresh cycle.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::engine::RefreshReport;
use crate::errors::WinscoutError;

pub fn log_app_startup(command: &str) {
    info!(
        event = "core.app.startup_completed",
        version = env!("CARGO_PKG_VERSION"),
        command = command,
    );
}

pub fn log_app_shutdown(reason: &str) {
    info!(event = "core.app.shutdown_started", reason = reason);
}

pub fn log_app_error(error: &dyn WinscoutError) {
    error!(
        event = "core.app.error_occurred",
        error = %error,
        error_code = error.error_code(),
        user_error = error.is_user_error(),
    );
}

/// A refresh cycle passed its gates and is about to touch providers.
pub fn log_cycle_started(enabled: usize, disabled: usize) {
    info!(
        event = "core.engine.refresh_started",
        enabled = enabled,
        disabled = disabled,
    );
}

pub fn log_cycle_completed(report: &RefreshReport, duration: Duration) {
    info!(
        event = "core.engine.refresh_completed",
        fast = ?report.fast,
        slow = ?report.slow,
        duration_ms = duration.as_millis() as u64,
    );
}

/// Every path that had work found its gate taken.
pub fn log_cycle_dropped(report: &RefreshReport) {
    debug!(
        event = "core.engine.refresh_dropped",
        fast = ?report.fast,
        slow = ?report.slow,
    );
}
