//! Player widget view state and actions.

use serde::Serialize;

use super::format_duration;
use crate::audio::AudioPlayer;
use crate::error::VoiceError;
use crate::message::{PlaybackStatus, VoiceMessage};
use crate::playback::PlaybackController;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerAction {
    Play,
    Pause,
}

/// What a single message bubble renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub message_id: String,
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    /// 0.0..=1.0
    pub progress: f64,
    pub elapsed_label: String,
    pub duration_label: String,
    pub waveform: Vec<f32>,
}

impl PlayerView {
    pub fn new(message: &VoiceMessage, status: &PlaybackStatus) -> Self {
        let owned = status.player_id.as_deref() == Some(message.id.as_str());
        let current_time = if owned {
            status.current_time.clamp(0.0, message.duration.max(0.0))
        } else {
            0.0
        };
        let progress = if message.duration > 0.0 {
            (current_time / message.duration).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            message_id: message.id.clone(),
            is_playing: owned && status.is_playing,
            current_time,
            duration: message.duration,
            progress,
            elapsed_label: format_duration(current_time),
            duration_label: format_duration(message.duration),
            waveform: message.waveform.clone().unwrap_or_default(),
        }
    }
}

/// What tapping the play button on `message` should do.
pub fn toggle_action(message: &VoiceMessage, status: &PlaybackStatus) -> PlayerAction {
    if status.is_playing && status.player_id.as_deref() == Some(message.id.as_str()) {
        PlayerAction::Pause
    } else {
        PlayerAction::Play
    }
}

/// Play or pause `message` depending on the current status.
pub async fn toggle<A: AudioPlayer>(
    controller: &PlaybackController<A>,
    message: &VoiceMessage,
) -> Result<PlayerAction, VoiceError> {
    let action = toggle_action(message, &controller.playback_status().await);
    match action {
        PlayerAction::Play => controller.play_voice_message(message.clone()).await?,
        PlayerAction::Pause => controller.pause_playback().await?,
    }
    Ok(action)
}

/// Seek to a fraction of the message, clamped to `[0, duration]`.
/// Returns the position in seconds.
pub async fn seek_fraction<A: AudioPlayer>(
    controller: &PlaybackController<A>,
    message: &VoiceMessage,
    fraction: f64,
) -> Result<f64, VoiceError> {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let position = (fraction * message.duration).clamp(0.0, message.duration.max(0.0));
    controller.seek_to(position).await?;
    Ok(position)
}
