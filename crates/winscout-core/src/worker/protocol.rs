//! Wire format between the engine and the worker process.
//!
//! The parent writes one JSON line to the worker's stdin and closes it:
//!
//! ```json
//! {"command":"scan","disabledPlugins":["uia"],"excludedProcesses":["chrome"]}
//! ```
//!
//! The worker answers with one JSON line per finished plugin on stdout and
//! ends with a message whose `isFinal` is true:
//!
//! ```json
//! {"pluginName":"process-tree","windows":[{"hwnd":1234,"title":"Inbox","processName":"mail","executablePath":"/usr/bin/mail","isFallback":false}],"isFinal":false}
//! {"pluginName":"","windows":[],"isFinal":true}
//! ```

use serde::{Deserialize, Serialize};

use crate::windows::WindowInfo;
use crate::worker::errors::WorkerError;

pub const SCAN_COMMAND: &str = "scan";

/// Responses longer than this are rejected as malformed.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub command: String,
    #[serde(default)]
    pub disabled_plugins: Vec<String>,
    #[serde(default)]
    pub excluded_processes: Vec<String>,
}

impl ScanRequest {
    pub fn scan(disabled_plugins: &[String], excluded_processes: &[String]) -> Self {
        Self {
            command: SCAN_COMMAND.to_string(),
            disabled_plugins: disabled_plugins.to_vec(),
            excluded_processes: excluded_processes.to_vec(),
        }
    }
}

/// One completed sub-scan streamed by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginResult {
    #[serde(default)]
    pub plugin_name: String,
    #[serde(default)]
    pub windows: Vec<WindowInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub is_final: bool,
}

impl PluginResult {
    pub fn with_windows(plugin_name: impl Into<String>, windows: Vec<WindowInfo>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            windows,
            error: None,
            is_final: false,
        }
    }

    pub fn failed(plugin_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            windows: Vec::new(),
            error: Some(error.into()),
            is_final: false,
        }
    }

    pub fn final_marker() -> Self {
        Self {
            plugin_name: String::new(),
            windows: Vec::new(),
            error: None,
            is_final: true,
        }
    }
}

/// Serialise a request as a single line, without the trailing newline.
pub fn encode_request(request: &ScanRequest) -> Result<String, WorkerError> {
    serde_json::to_string(request).map_err(|e| WorkerError::Protocol {
        message: e.to_string(),
    })
}

pub fn decode_request(line: &str) -> Result<ScanRequest, WorkerError> {
    serde_json::from_str(line.trim()).map_err(|e| WorkerError::Protocol {
        message: e.to_string(),
    })
}

/// Serialise a response as a single line, without the trailing newline.
pub fn encode_response(result: &PluginResult) -> Result<String, WorkerError> {
    serde_json::to_string(result).map_err(|e| WorkerError::Protocol {
        message: e.to_string(),
    })
}

/// Parse one response line. Blank lines decode to `None`.
pub fn decode_response_line(line: &str) -> Result<Option<PluginResult>, WorkerError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| WorkerError::Protocol {
            message: e.to_string(),
        })
}
