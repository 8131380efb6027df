pub mod avatar;
pub mod config;
pub mod inference;
pub mod messages;
pub mod speech;
pub mod turn;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum KaiwaError {
    /// Speech recognition is missing on this platform. Disables the spoken
    /// entry point for the whole session.
    #[error("Speech input is not available on this platform")]
    InputUnavailable,

    #[error("Speech recognition error: {0}")]
    InputError(String),

    #[error("Prompt must not be empty")]
    InferenceInvalidInput,

    #[error("Inference service rejected the credential")]
    InferenceUnauthorized,

    #[error("Inference service error {status}: {message}")]
    InferenceServiceError { status: u16, message: String },

    #[error("Inference network error: {0}")]
    InferenceNetworkError(String),

    #[error("Malformed inference response: {0}")]
    InferenceMalformed(String),

    #[error("Speech playback error: {0}")]
    OutputError(String),

    #[error("Unknown avatar cue: {0}")]
    InvalidCue(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl KaiwaError {
    /// Check if this error is recoverable within the session
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Missing platform capability requires a different entry point
            KaiwaError::InputUnavailable => false,
            // Transient: the next turn starts from a clean idle state
            KaiwaError::InputError(_) => true,
            KaiwaError::InferenceInvalidInput => true,
            // Credential problems persist until redeployment
            KaiwaError::InferenceUnauthorized => false,
            KaiwaError::InferenceServiceError { .. } => true,
            KaiwaError::InferenceNetworkError(_) => true,
            KaiwaError::InferenceMalformed(_) => true,
            // Text was already delivered; audio is best-effort
            KaiwaError::OutputError(_) => true,
            KaiwaError::InvalidCue(_) => true,
            KaiwaError::ConfigError(_) => false,
            KaiwaError::ChannelError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            KaiwaError::InputUnavailable => {
                "Speech input is not available here. Please type your message instead.".to_string()
            }
            KaiwaError::InputError(_) => {
                "Speech recognition failed. Please try again.".to_string()
            }
            KaiwaError::InferenceInvalidInput => {
                "There is nothing to send. Please enter a message.".to_string()
            }
            KaiwaError::InferenceUnauthorized
            | KaiwaError::InferenceServiceError { .. }
            | KaiwaError::InferenceNetworkError(_)
            | KaiwaError::InferenceMalformed(_) => {
                "Sorry, I couldn't get a response right now.".to_string()
            }
            KaiwaError::OutputError(_) => {
                "Speech playback failed. The response is shown as text.".to_string()
            }
            KaiwaError::InvalidCue(_) => {
                "The avatar could not react to that response.".to_string()
            }
            KaiwaError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            KaiwaError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, KaiwaError>;
