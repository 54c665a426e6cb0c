//! Audio collaborators for voice messages
//!
//! The session controllers only talk to the capability traits below. The
//! simulated implementations back tests and the demo binary; the CPAL/hound
//! recorder (feature `native-audio`) captures from the default microphone.

use std::future::Future;

use uuid::Uuid;

use crate::message::RecordingOptions;

mod paths;
#[cfg(feature = "native-audio")]
pub mod recorder;
pub mod simulated;
mod waveform;

pub use paths::{cleanup_old_recordings, create_recordings_dir, generate_recording_path};
#[cfg(feature = "native-audio")]
pub use recorder::CpalCaptureDevice;
pub use simulated::{SimulatedCaptureDevice, SimulatedPlayer};
pub use waveform::{rms_level, WaveformWindow, WAVEFORM_CAPACITY};

/// Errors reported by capture and playback backends.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    NoInputDevice,
    NoSupportedConfig,
    UnsupportedFormat(String),
    StreamCreationFailed(String),
    FileCreationFailed(String),
    WriteFailed(String),
    PlaybackFailed(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::UnsupportedFormat(e) => write!(f, "Unsupported audio format: {}", e),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            AudioError::FileCreationFailed(e) => write!(f, "Failed to create audio file: {}", e),
            AudioError::WriteFailed(e) => write!(f, "Failed to write audio data: {}", e),
            AudioError::PlaybackFailed(e) => write!(f, "Playback failed: {}", e),
        }
    }
}

impl std::error::Error for AudioError {}

/// Result of a finished capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedAudio {
    pub uri: String,
    /// Encoder-reported length in seconds, when the backend can measure it.
    pub duration: Option<f64>,
    pub size: u64,
}

/// Microphone capture backend.
///
/// `start` hands back an opaque handle that stays with the recording
/// controller until the session ends through `stop` or `discard`.
pub trait AudioCaptureDevice: Send + Sync + 'static {
    type Handle: Send + 'static;

    fn start(
        &self,
        recording_id: Uuid,
        options: RecordingOptions,
    ) -> impl Future<Output = Result<Self::Handle, AudioError>> + Send;

    /// Current input amplitude in 0.0..=1.0, sampled for the live waveform.
    fn input_level(&self, handle: &Self::Handle) -> f32;

    /// Finish the capture and return the encoded file.
    fn stop(
        &self,
        handle: Self::Handle,
    ) -> impl Future<Output = Result<CapturedAudio, AudioError>> + Send;

    /// Abort the capture and delete whatever was written.
    fn discard(&self, handle: Self::Handle) -> impl Future<Output = Result<(), AudioError>> + Send;
}

/// Audio output backend. Holds at most one source at a time.
pub trait AudioPlayer: Send + Sync + 'static {
    /// Start (or restart) output of `uri` at `from` seconds.
    fn play(&self, uri: &str, from: f64) -> impl Future<Output = Result<(), AudioError>> + Send;

    fn pause(&self) -> impl Future<Output = Result<(), AudioError>> + Send;

    fn seek(&self, position: f64) -> impl Future<Output = Result<(), AudioError>> + Send;

    fn stop(&self) -> impl Future<Output = Result<(), AudioError>> + Send;
}
