//! Duration and size bounds for finished recordings.

use serde::{Deserialize, Serialize};

use crate::message::VoiceMessage;

/// Shortest accepted recording, in seconds.
pub const MIN_DURATION_SECS: f64 = 1.0;

/// Longest accepted recording, in seconds.
pub const MAX_DURATION_SECS: f64 = 300.0;

/// Largest accepted encoded size (10 MiB).
pub const MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationError {
    TooLong,
    TooLarge,
    TooShort,
}

impl ValidationError {
    /// Short machine-friendly reason.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::TooLong => "too long",
            ValidationError::TooLarge => "too large",
            ValidationError::TooShort => "too short",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::TooLong => write!(f, "Voice message is too long (maximum 5 minutes)"),
            ValidationError::TooLarge => write!(f, "Voice message is too large (maximum 10MB)"),
            ValidationError::TooShort => write!(f, "Voice message is too short (minimum 1 second)"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Bounds a recording must satisfy before it reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationPolicy {
    pub min_duration: f64,
    pub max_duration: f64,
    pub max_size_bytes: u64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_duration: MIN_DURATION_SECS,
            max_duration: MAX_DURATION_SECS,
            max_size_bytes: MAX_SIZE_BYTES,
        }
    }
}

impl ValidationPolicy {
    /// Checks run in a fixed order: too long, too large, too short.
    pub fn validate(&self, message: &VoiceMessage) -> Result<(), ValidationError> {
        if message.duration > self.max_duration {
            return Err(ValidationError::TooLong);
        }
        if message.size > self.max_size_bytes {
            return Err(ValidationError::TooLarge);
        }
        if message.duration.is_nan() || message.duration < self.min_duration {
            return Err(ValidationError::TooShort);
        }
        Ok(())
    }
}

/// Validate against the default bounds.
pub fn validate_voice_message(message: &VoiceMessage) -> Result<(), ValidationError> {
    ValidationPolicy::default().validate(message)
}
