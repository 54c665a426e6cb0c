//! Error taxonomy for voice message sessions
//!
//! Every error returned by a controller leaves that controller idle.

use crate::audio::AudioError;
use crate::validation::ValidationError;

/// Errors surfaced by the recording and playback controllers.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceError {
    /// Microphone access was refused. The UI should offer a link to the OS settings.
    PermissionDenied,
    /// A recording session is already active; the existing one was left untouched.
    AlreadyActive,
    /// The session was cancelled while the start call was still in flight.
    Cancelled,
    /// The finished recording falls outside the duration/size bounds.
    ValidationFailed(ValidationError),
    /// The native audio collaborator failed.
    OperationFailed(String),
}

impl VoiceError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            VoiceError::PermissionDenied => {
                "Microphone access is needed to record voice messages. Enable it in Settings."
                    .to_string()
            }
            VoiceError::AlreadyActive => "A recording is already in progress.".to_string(),
            VoiceError::Cancelled => "Recording cancelled.".to_string(),
            VoiceError::ValidationFailed(e) => e.to_string(),
            VoiceError::OperationFailed(_) => {
                "Something went wrong with audio. Please try again.".to_string()
            }
        }
    }
}

impl std::fmt::Display for VoiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceError::PermissionDenied => write!(f, "Microphone permission denied"),
            VoiceError::AlreadyActive => write!(f, "Recording already in progress"),
            VoiceError::Cancelled => write!(f, "Recording cancelled before it started"),
            VoiceError::ValidationFailed(e) => write!(f, "Validation failed: {}", e.reason()),
            VoiceError::OperationFailed(e) => write!(f, "Audio operation failed: {}", e),
        }
    }
}

impl std::error::Error for VoiceError {}

impl From<AudioError> for VoiceError {
    fn from(err: AudioError) -> Self {
        VoiceError::OperationFailed(err.to_string())
    }
}

impl From<ValidationError> for VoiceError {
    fn from(err: ValidationError) -> Self {
        VoiceError::ValidationFailed(err)
    }
}
