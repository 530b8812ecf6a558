use crate::errors::WinscoutError;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider '{provider}' failed to enumerate windows: {message}")]
    EnumerationFailed { provider: String, message: String },

    #[error("Provider '{provider}' panicked during enumeration")]
    Panicked { provider: String },

    #[error("Provider '{provider}' failed to reload settings: {message}")]
    SettingsReloadFailed { provider: String, message: String },

    #[error("Provider '{provider}' is not available on this platform")]
    Unsupported { provider: String },
}

impl WinscoutError for ProviderError {
    fn error_code(&self) -> &'static str {
        match self {
            ProviderError::EnumerationFailed { .. } => "PROVIDER_ENUMERATION_FAILED",
            ProviderError::Panicked { .. } => "PROVIDER_PANICKED",
            ProviderError::SettingsReloadFailed { .. } => "PROVIDER_SETTINGS_RELOAD_FAILED",
            ProviderError::Unsupported { .. } => "PROVIDER_UNSUPPORTED",
        }
    }
}
