use std::io::{BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tracing::{error, info, warn};

use winscout_core::providers::normalize_process_name;
use winscout_core::worker::protocol::{self, SCAN_COMMAND};
use winscout_core::{PluginResult, WinscoutError, WorkerError};

use crate::plugins::ScanPlugin;

/// Serve one scan request read from `input`, streaming results to `output`.
///
/// The final marker is written even when the request is rejected, so the
/// parent never waits for a timeout. Returns the number of plugins run.
pub fn run(
    mut input: impl BufRead,
    mut output: impl Write,
    plugins: &[Box<dyn ScanPlugin>],
) -> Result<usize, WorkerError> {
    let mut line = String::new();
    input.read_line(&mut line).map_err(|e| WorkerError::Protocol {
        message: format!("failed to read request: {e}"),
    })?;

    let request = match protocol::decode_request(&line) {
        Ok(request) if request.command == SCAN_COMMAND => request,
        Ok(request) => {
            write_result(&mut output, &PluginResult::final_marker())?;
            return Err(WorkerError::Protocol {
                message: format!("unknown command '{}'", request.command),
            });
        }
        Err(e) => {
            write_result(&mut output, &PluginResult::final_marker())?;
            return Err(e);
        }
    };

    let excluded: Vec<String> = request
        .excluded_processes
        .iter()
        .map(|name| normalize_process_name(name))
        .collect();

    info!(
        event = "worker.scan_started",
        plugins = plugins.len(),
        disabled = request.disabled_plugins.len(),
        excluded = excluded.len(),
    );

    let mut ran = 0;
    for plugin in plugins {
        let name = plugin.name();
        if request.disabled_plugins.iter().any(|disabled| disabled == name) {
            info!(event = "worker.plugin_skipped", plugin = name);
            continue;
        }

        let started = Instant::now();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| plugin.scan(&excluded))) {
            Ok(Ok(windows)) => {
                info!(
                    event = "worker.plugin_completed",
                    plugin = name,
                    windows = windows.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                );
                PluginResult::with_windows(name, windows)
            }
            Ok(Err(e)) => {
                warn!(
                    event = "worker.plugin_failed",
                    plugin = name,
                    error = %e,
                    error_code = e.error_code(),
                );
                PluginResult::failed(name, e.to_string())
            }
            Err(_) => {
                error!(event = "worker.plugin_panicked", plugin = name);
                PluginResult::failed(name, "plugin panicked")
            }
        };

        write_result(&mut output, &result)?;
        ran += 1;
    }

    write_result(&mut output, &PluginResult::final_marker())?;
    info!(event = "worker.scan_completed", plugins = ran);
    Ok(ran)
}

/// Write one result line and flush so the parent sees it immediately.
fn write_result(output: &mut impl Write, result: &PluginResult) -> Result<(), WorkerError> {
    let line = protocol::encode_response(result)?;
    writeln!(output, "{line}")
        .and_then(|()| output.flush())
        .map_err(|_| WorkerError::StreamClosed)
}
