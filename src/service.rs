//! Composition root for voice messages
//!
//! The application builds one `VoiceMessageService` with its platform
//! collaborators and passes it to whatever needs it.

use std::sync::Arc;

use uuid::Uuid;

use crate::audio::{AudioCaptureDevice, AudioPlayer};
use crate::error::VoiceError;
use crate::message::{PlaybackStatus, RecordingOptions, RecordingStatus, VoiceMessage};
use crate::permission::PermissionGate;
use crate::playback::{PlaybackController, PlaybackUpdateReceiver};
use crate::recording::{RecordingController, RecordingUpdateReceiver};
use crate::validation::{ValidationError, ValidationPolicy};

/// Receivers for live feedback from both controllers.
pub struct ServiceUpdates {
    pub recording: RecordingUpdateReceiver,
    pub playback: PlaybackUpdateReceiver,
}

pub struct VoiceMessageService<D, P, A>
where
    D: AudioCaptureDevice,
    P: PermissionGate,
    A: AudioPlayer,
{
    recording: RecordingController<D, P>,
    playback: PlaybackController<A>,
    policy: ValidationPolicy,
}

impl<D, P, A> Clone for VoiceMessageService<D, P, A>
where
    D: AudioCaptureDevice,
    P: PermissionGate,
    A: AudioPlayer,
{
    fn clone(&self) -> Self {
        Self {
            recording: self.recording.clone(),
            playback: self.playback.clone(),
            policy: self.policy,
        }
    }
}

impl<D, P, A> VoiceMessageService<D, P, A>
where
    D: AudioCaptureDevice,
    P: PermissionGate,
    A: AudioPlayer,
{
    pub fn new(
        device: Arc<D>,
        permissions: Arc<P>,
        player: Arc<A>,
        policy: ValidationPolicy,
    ) -> (Self, ServiceUpdates) {
        let (recording, recording_rx) = RecordingController::new(device, permissions);
        let (playback, playback_rx) = PlaybackController::new(player);
        let service = Self {
            recording,
            playback,
            policy,
        };
        let updates = ServiceUpdates {
            recording: recording_rx,
            playback: playback_rx,
        };
        (service, updates)
    }

    pub fn recording(&self) -> &RecordingController<D, P> {
        &self.recording
    }

    pub fn playback(&self) -> &PlaybackController<A> {
        &self.playback
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub async fn start_recording(&self, options: RecordingOptions) -> Result<Uuid, VoiceError> {
        self.recording.start_recording(options).await
    }

    pub async fn stop_recording(&self) -> Result<Option<VoiceMessage>, VoiceError> {
        self.recording.stop_recording().await
    }

    /// Stop and validate in one step. Rejected recordings never reach the
    /// caller; the error says why.
    pub async fn finish_recording(&self) -> Result<Option<VoiceMessage>, VoiceError> {
        match self.recording.stop_recording().await? {
            Some(message) => {
                self.validate_voice_message(&message)?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    pub async fn cancel_recording(&self) {
        self.recording.cancel_recording().await
    }

    pub async fn play_voice_message(&self, message: VoiceMessage) -> Result<(), VoiceError> {
        self.playback.play_voice_message(message).await
    }

    pub async fn pause_playback(&self) -> Result<(), VoiceError> {
        self.playback.pause_playback().await
    }

    pub async fn stop_playback(&self) -> Result<(), VoiceError> {
        self.playback.stop_playback().await
    }

    pub async fn seek_to(&self, position: f64) -> Result<(), VoiceError> {
        self.playback.seek_to(position).await
    }

    pub async fn recording_status(&self) -> RecordingStatus {
        self.recording.recording_status().await
    }

    pub async fn playback_status(&self) -> PlaybackStatus {
        self.playback.playback_status().await
    }

    pub fn validate_voice_message(&self, message: &VoiceMessage) -> Result<(), ValidationError> {
        self.policy.validate(message)
    }

    /// Release both sessions and their timers.
    pub async fn shutdown(&self) {
        self.recording.shutdown().await;
        self.playback.shutdown().await;
        log::info!("Voice message service shut down");
    }
}
