//! Effect runner and event loop for the recorder widget
//!
//! The loop is the single writer of `RecorderState`. Controller calls run in
//! spawned tasks and report back as events; UI-facing effects go straight
//! to the host's `RecorderCallbacks`.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::recorder::{
    reduce, state_to_ui, RecorderConfig, RecorderEffect, RecorderEvent, RecorderState, RecorderUi,
};
use crate::audio::AudioCaptureDevice;
use crate::message::VoiceMessage;
use crate::permission::{PermissionGate, PermissionPrompt};
use crate::recording::{RecordingController, RecordingUpdate, RecordingUpdateReceiver};

/// Runs controller-facing effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait RecorderEffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: RecorderEffect, tx: mpsc::Sender<RecorderEvent>);
}

/// Host hooks for what the widget shows and reports.
pub trait RecorderCallbacks: Send {
    fn on_recording_complete(&mut self, message: VoiceMessage);

    fn on_cancel(&mut self);

    /// Microphone refused; show `prompt` with its link to the OS settings.
    fn on_permission_required(&mut self, _prompt: &PermissionPrompt) {}

    fn on_error(&mut self, _message: &str) {}

    fn on_slide_reset(&mut self) {}

    fn on_ui(&mut self, _ui: &RecorderUi) {}
}

/// Effect runner backed by a `RecordingController`.
pub struct ControllerEffectRunner<D: AudioCaptureDevice, P: PermissionGate> {
    controller: RecordingController<D, P>,
}

impl<D: AudioCaptureDevice, P: PermissionGate> ControllerEffectRunner<D, P> {
    pub fn new(controller: RecordingController<D, P>) -> Arc<Self> {
        Arc::new(Self { controller })
    }
}

impl<D: AudioCaptureDevice, P: PermissionGate> RecorderEffectRunner
    for ControllerEffectRunner<D, P>
{
    fn spawn(&self, effect: RecorderEffect, tx: mpsc::Sender<RecorderEvent>) {
        let controller = self.controller.clone();
        match effect {
            RecorderEffect::StartRecording { attempt, options } => {
                tokio::spawn(async move {
                    let event = match controller.start_recording(options).await {
                        Ok(recording_id) => RecorderEvent::StartOk {
                            attempt,
                            recording_id,
                        },
                        Err(error) => RecorderEvent::StartFail { attempt, error },
                    };
                    let _ = tx.send(event).await;
                });
            }

            RecorderEffect::StopRecording { recording_id } => {
                tokio::spawn(async move {
                    let event = match controller.stop_recording_session(recording_id).await {
                        Ok(message) => RecorderEvent::StopOk {
                            recording_id,
                            message,
                        },
                        Err(error) => RecorderEvent::StopFail {
                            recording_id,
                            error,
                        },
                    };
                    let _ = tx.send(event).await;
                });
            }

            RecorderEffect::CancelRecording { session } => {
                tokio::spawn(async move {
                    controller.cancel_recording().await;
                    let _ = tx.send(RecorderEvent::CancelDone { session }).await;
                });
            }

            other => {
                log::warn!("Effect {:?} belongs to the recorder loop", other);
            }
        }
    }
}

/// Sender side of the recorder loop, held by gesture handlers.
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecorderEvent>,
}

impl RecorderHandle {
    pub fn new(tx: mpsc::Sender<RecorderEvent>) -> Self {
        Self { tx }
    }

    pub async fn send(
        &self,
        event: RecorderEvent,
    ) -> Result<(), mpsc::error::SendError<RecorderEvent>> {
        self.tx.send(event).await
    }

    pub fn sender(&self) -> mpsc::Sender<RecorderEvent> {
        self.tx.clone()
    }
}

/// Turn controller updates into recorder events until either side closes.
pub async fn forward_recording_updates(
    mut updates: RecordingUpdateReceiver,
    tx: mpsc::Sender<RecorderEvent>,
) {
    while let Some(update) = updates.recv().await {
        let event = match update {
            RecordingUpdate::Duration { id, seconds } => RecorderEvent::DurationTick {
                recording_id: id,
                seconds,
            },
            RecordingUpdate::Waveform { id, samples } => RecorderEvent::WaveformTick {
                recording_id: id,
                samples,
            },
            RecordingUpdate::AutoStopped { id, result } => RecorderEvent::AutoStopped {
                recording_id: id,
                result,
            },
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
    log::debug!("Recording update forwarder stopped");
}

/// Apply events to the recorder state until `Teardown` is processed or the
/// channel closes. Returns the final state.
pub async fn run_recorder_loop<R, C>(
    mut rx: mpsc::Receiver<RecorderEvent>,
    tx: mpsc::Sender<RecorderEvent>,
    runner: Arc<R>,
    callbacks: &mut C,
    config: RecorderConfig,
) -> RecorderState
where
    R: RecorderEffectRunner,
    C: RecorderCallbacks,
{
    let mut state = RecorderState::default();

    // Emit initial state
    callbacks.on_ui(&state_to_ui(&state, &config));
    log::info!("Recorder loop started");

    while let Some(event) = rx.recv().await {
        let teardown = matches!(event, RecorderEvent::Teardown);
        log::debug!("Recorder event: {:?}", event);

        let (next, effects) = reduce(&state, event, &config);
        if std::mem::discriminant(&next) != std::mem::discriminant(&state) {
            log::debug!("Recorder state: {:?} -> {:?}", state, next);
        }
        state = next;

        for effect in effects {
            match effect {
                RecorderEffect::EmitUi => callbacks.on_ui(&state_to_ui(&state, &config)),
                RecorderEffect::ResetSlide => callbacks.on_slide_reset(),
                RecorderEffect::Complete { message } => callbacks.on_recording_complete(message),
                RecorderEffect::NotifyCancel => callbacks.on_cancel(),
                RecorderEffect::RequestPermission { prompt } => {
                    callbacks.on_permission_required(&prompt)
                }
                RecorderEffect::ShowError { message } => callbacks.on_error(&message),
                other => runner.spawn(other, tx.clone()),
            }
        }

        if teardown {
            break;
        }
    }

    log::info!("Recorder loop ended");
    state
}
