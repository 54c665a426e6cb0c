//! Voice message data model shared by the controllers and the UI layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default and upper bound for a single recording, in seconds.
pub const DEFAULT_MAX_DURATION_SECS: u64 = 300;

/// A finished recording.
///
/// Immutable once produced by the recording controller, except for the
/// transient playback fields which the playback controller fills in on copies
/// it hands out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceMessage {
    pub id: String,
    pub uri: String,
    /// Length in seconds.
    pub duration: f64,
    /// Encoded size in bytes.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveform: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
}

impl VoiceMessage {
    pub fn new(id: impl Into<String>, uri: impl Into<String>, duration: f64, size: u64) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            duration,
            size,
            waveform: None,
            is_playing: None,
            current_time: None,
        }
    }

    pub fn with_waveform(mut self, waveform: Vec<f32>) -> Self {
        self.waveform = Some(waveform);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    Medium,
    #[default]
    High,
}

impl AudioQuality {
    /// Approximate encoded bitrate, used to estimate sizes when a device
    /// cannot report one.
    pub fn bitrate_bps(&self) -> u64 {
        match self {
            AudioQuality::Low => 32_000,
            AudioQuality::Medium => 64_000,
            AudioQuality::High => 128_000,
        }
    }

    /// Capture sample rate requested from the device.
    pub fn sample_rate(&self) -> u32 {
        match self {
            AudioQuality::Low => 16_000,
            AudioQuality::Medium => 22_050,
            AudioQuality::High => 44_100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    M4a,
    Wav,
    Aac,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Aac => "aac",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOptions {
    /// Seconds after which the recording stops on its own.
    pub max_duration: u64,
    pub quality: AudioQuality,
    pub format: AudioFormat,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            max_duration: DEFAULT_MAX_DURATION_SECS,
            quality: AudioQuality::default(),
            format: AudioFormat::default(),
        }
    }
}

/// Snapshot returned by `recording_status()` for UI polling.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub is_recording: bool,
    pub recording_id: Option<Uuid>,
    /// Whole seconds elapsed in the active session.
    pub duration: u64,
}

/// Snapshot returned by `playback_status()` for UI polling.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub player_id: Option<String>,
    pub current_time: f64,
}
