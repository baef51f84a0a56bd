use thiserror::Error;

/// Failures reported back to the caller of a method.
///
/// Everything that goes wrong after a call has been accepted (delivery,
/// sound playback, server hiccups) is logged instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("method {0} is not implemented")]
    NotImplemented(String),
    #[error("notification error: {0}")]
    Notification(String),
}

impl PluginError {
    pub fn code(&self) -> &'static str {
        match self {
            PluginError::InvalidArguments(_) => "INVALID_ARGS",
            PluginError::NotImplemented(_) => "NOT_IMPLEMENTED",
            PluginError::Notification(_) => "NOTIFICATION_ERROR",
        }
    }
}
