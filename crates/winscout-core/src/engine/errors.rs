use crate::errors::WinscoutError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Provider '{name}' is registered more than once")]
    DuplicateProvider { name: String },

    #[error("Provider names must not be empty")]
    EmptyProviderName,
}

impl WinscoutError for EngineError {
    fn error_code(&self) -> &'static str {
        match self {
            EngineError::DuplicateProvider { .. } => "DUPLICATE_PROVIDER",
            EngineError::EmptyProviderName => "EMPTY_PROVIDER_NAME",
        }
    }

    fn is_user_error(&self) -> bool {
        true
    }
}
