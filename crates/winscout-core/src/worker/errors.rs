use crate::errors::WinscoutError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker executable '{executable}' not found")]
    NotFound { executable: String },

    #[error("Failed to spawn worker '{executable}': {message}")]
    SpawnFailed { executable: String, message: String },

    #[error("Worker scan timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Malformed worker message: {message}")]
    Protocol { message: String },

    #[error("Worker output closed before the final message")]
    StreamClosed,

    #[error("Worker client has been disposed")]
    Disposed,
}

impl WinscoutError for WorkerError {
    fn error_code(&self) -> &'static str {
        match self {
            WorkerError::NotFound { .. } => "WORKER_NOT_FOUND",
            WorkerError::SpawnFailed { .. } => "WORKER_SPAWN_FAILED",
            WorkerError::Timeout { .. } => "WORKER_TIMEOUT",
            WorkerError::Protocol { .. } => "WORKER_PROTOCOL_ERROR",
            WorkerError::StreamClosed => "WORKER_STREAM_CLOSED",
            WorkerError::Disposed => "WORKER_DISPOSED",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(self, WorkerError::NotFound { .. })
    }
}
