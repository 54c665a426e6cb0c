//! Voice message recording and playback for Teacher Hub
//!
//! One recording session and one playback session at a time, each owned by
//! a controller that the application composes with its platform audio and
//! permission collaborators. The `ui` module drives the recorder widget
//! (tap to record, slide to cancel, tap to send) on top of the controllers.

pub mod audio;
pub mod error;
pub mod message;
pub mod permission;
pub mod playback;
pub mod recording;
pub mod service;
pub mod settings;
pub mod ui;
pub mod validation;

pub use error::VoiceError;
pub use message::{
    AudioFormat, AudioQuality, PlaybackStatus, RecordingOptions, RecordingStatus, VoiceMessage,
};
pub use permission::{
    PermissionGate, PermissionPrompt, PermissionStatus, Platform, StaticPermissionGate,
};
pub use playback::{PlaybackController, PlaybackUpdate};
pub use recording::{RecordingController, RecordingUpdate};
pub use service::{ServiceUpdates, VoiceMessageService};
pub use settings::{load_settings, save_settings, VoiceSettings};
pub use validation::{validate_voice_message, ValidationError, ValidationPolicy};
