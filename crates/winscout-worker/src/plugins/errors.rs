use winscout_core::WinscoutError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin '{plugin}' scan failed: {message}")]
    ScanFailed { plugin: String, message: String },

    #[error("Plugin '{plugin}' is not available on this platform")]
    Unsupported { plugin: String },
}

impl WinscoutError for PluginError {
    fn error_code(&self) -> &'static str {
        match self {
            PluginError::ScanFailed { .. } => "PLUGIN_SCAN_FAILED",
            PluginError::Unsupported { .. } => "PLUGIN_UNSUPPORTED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_error_display_and_code() {
        let error = PluginError::ScanFailed {
            plugin: "mail".to_string(),
            message: "access denied".to_string(),
        };
        assert_eq!(error.to_string(), "Plugin 'mail' scan failed: access denied");
        assert_eq!(error.error_code(), "PLUGIN_SCAN_FAILED");
        assert!(!error.is_user_error());

        let error = PluginError::Unsupported {
            plugin: "mail".to_string(),
        };
        assert_eq!(error.error_code(), "PLUGIN_UNSUPPORTED");
    }
}
