//! State machine for the recorder widget
//!
//! Idle -> Starting -> Recording -> {Completing | Cancelling} -> Idle.
//! All transitions go through `reduce()`, which returns the next state and
//! the effects to run. Events carrying an id that doesn't match the current
//! session are dropped.

use serde::Serialize;
use uuid::Uuid;

use super::format_duration;
use super::gesture::{SlideOutcome, SlideToCancel};
use crate::error::VoiceError;
use crate::message::{RecordingOptions, VoiceMessage};
use crate::permission::PermissionPrompt;
use crate::validation::ValidationPolicy;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecorderConfig {
    pub options: RecordingOptions,
    pub slide: SlideToCancel,
    pub policy: ValidationPolicy,
    /// Shown when the microphone is refused.
    pub permission_prompt: PermissionPrompt,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    /// Waiting for permission and the device. `attempt` is local to the widget.
    Starting { attempt: Uuid },
    Recording {
        recording_id: Uuid,
        duration_secs: u64,
        waveform: Vec<f32>,
        slide_offset: f32,
    },
    Completing { recording_id: Uuid },
    Cancelling { recording_id: Uuid },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    /// Tap on the mic button
    MicPressed,
    /// Tap on stop/send
    StopPressed,
    /// Tap on an explicit cancel control
    CancelPressed,
    SlideMoved {
        translation_x: f32,
    },
    SlideReleased {
        translation_x: f32,
        velocity_x: f32,
    },
    /// Widget is going away
    Teardown,

    StartOk {
        attempt: Uuid,
        recording_id: Uuid,
    },
    StartFail {
        attempt: Uuid,
        error: VoiceError,
    },
    StopOk {
        recording_id: Uuid,
        message: Option<VoiceMessage>,
    },
    StopFail {
        recording_id: Uuid,
        error: VoiceError,
    },
    CancelDone {
        session: Uuid,
    },

    DurationTick {
        recording_id: Uuid,
        seconds: u64,
    },
    WaveformTick {
        recording_id: Uuid,
        samples: Vec<f32>,
    },
    AutoStopped {
        recording_id: Uuid,
        result: Result<VoiceMessage, VoiceError>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEffect {
    StartRecording {
        attempt: Uuid,
        options: RecordingOptions,
    },
    StopRecording {
        recording_id: Uuid,
    },
    /// Cancel whatever session the controller holds. `session` is the
    /// widget's current id (the start attempt or the recording) and is
    /// echoed back in `CancelDone`.
    CancelRecording {
        session: Uuid,
    },
    /// Stop the slide animation and spring the button back.
    ResetSlide,
    Complete {
        message: VoiceMessage,
    },
    NotifyCancel,
    RequestPermission {
        prompt: PermissionPrompt,
    },
    ShowError {
        message: String,
    },
    EmitUi,
}

/// Serializable snapshot for the host UI.
/// Tagged union: { "status": "idle" } or { "status": "recording", "durationLabel": "0:05", ... }
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RecorderUi {
    Idle,
    Starting,
    #[serde(rename_all = "camelCase")]
    Recording {
        duration_secs: u64,
        duration_label: String,
        max_duration_label: String,
        waveform: Vec<f32>,
        slide_offset: f32,
        /// 0.0..=1.0 progress toward the cancel threshold
        cancel_progress: f32,
    },
    Completing,
    Cancelling,
}

pub fn state_to_ui(state: &RecorderState, config: &RecorderConfig) -> RecorderUi {
    match state {
        RecorderState::Idle => RecorderUi::Idle,
        RecorderState::Starting { .. } => RecorderUi::Starting,
        RecorderState::Recording {
            duration_secs,
            waveform,
            slide_offset,
            ..
        } => RecorderUi::Recording {
            duration_secs: *duration_secs,
            duration_label: format_duration(*duration_secs as f64),
            max_duration_label: format_duration(config.options.max_duration as f64),
            waveform: waveform.clone(),
            slide_offset: *slide_offset,
            cancel_progress: config.slide.cancel_progress(*slide_offset),
        },
        RecorderState::Completing { .. } => RecorderUi::Completing,
        RecorderState::Cancelling { .. } => RecorderUi::Cancelling,
    }
}

/// Outcome of a finished recording: validate, then complete or fall back to
/// the cancellation path.
fn finish(
    result: Result<VoiceMessage, VoiceError>,
    policy: &ValidationPolicy,
    mut effects: Vec<RecorderEffect>,
) -> (RecorderState, Vec<RecorderEffect>) {
    use RecorderEffect::*;

    match result {
        Ok(message) => match policy.validate(&message) {
            Ok(()) => effects.push(Complete { message }),
            Err(e) => {
                log::info!("Recording {} rejected: {}", message.id, e.reason());
                effects.push(ShowError {
                    message: e.to_string(),
                });
                effects.push(NotifyCancel);
            }
        },
        Err(e) => {
            effects.push(ShowError {
                message: e.user_message(),
            });
            effects.push(NotifyCancel);
        }
    }
    effects.push(EmitUi);
    (RecorderState::Idle, effects)
}

/// Reducer: (state, event) -> (next_state, effects)
pub fn reduce(
    state: &RecorderState,
    event: RecorderEvent,
    config: &RecorderConfig,
) -> (RecorderState, Vec<RecorderEffect>) {
    use RecorderEffect::*;
    use RecorderEvent::*;
    use RecorderState::*;

    match (state, event) {
        // -----------------
        // Idle
        // -----------------
        (Idle, MicPressed) => {
            let attempt = Uuid::new_v4();
            (
                Starting { attempt },
                vec![
                    StartRecording {
                        attempt,
                        options: config.options,
                    },
                    EmitUi,
                ],
            )
        }

        // -----------------
        // Starting
        // -----------------
        (Starting { attempt }, StartOk { attempt: a, recording_id }) if *attempt == a => (
            Recording {
                recording_id,
                duration_secs: 0,
                waveform: Vec::new(),
                slide_offset: 0.0,
            },
            vec![EmitUi],
        ),
        (Starting { attempt }, StartFail { attempt: a, error }) if *attempt == a => {
            let effects = match error {
                VoiceError::PermissionDenied => vec![
                    RequestPermission {
                        prompt: config.permission_prompt.clone(),
                    },
                    EmitUi,
                ],
                VoiceError::Cancelled => vec![EmitUi],
                other => vec![
                    ShowError {
                        message: other.user_message(),
                    },
                    EmitUi,
                ],
            };
            (Idle, effects)
        }
        (Starting { attempt }, CancelPressed) => (
            Idle,
            vec![
                CancelRecording { session: *attempt },
                NotifyCancel,
                EmitUi,
            ],
        ),
        (Starting { attempt }, Teardown) => (
            Idle,
            vec![CancelRecording { session: *attempt }],
        ),

        // -----------------
        // Recording
        // -----------------
        (
            Recording {
                recording_id,
                waveform,
                slide_offset,
                ..
            },
            DurationTick {
                recording_id: id,
                seconds,
            },
        ) if *recording_id == id => (
            Recording {
                recording_id: id,
                duration_secs: seconds,
                waveform: waveform.clone(),
                slide_offset: *slide_offset,
            },
            vec![EmitUi],
        ),
        (
            Recording {
                recording_id,
                duration_secs,
                slide_offset,
                ..
            },
            WaveformTick {
                recording_id: id,
                samples,
            },
        ) if *recording_id == id => (
            Recording {
                recording_id: id,
                duration_secs: *duration_secs,
                waveform: samples,
                slide_offset: *slide_offset,
            },
            vec![EmitUi],
        ),
        (
            Recording {
                recording_id,
                duration_secs,
                waveform,
                ..
            },
            SlideMoved { translation_x },
        ) => (
            Recording {
                recording_id: *recording_id,
                duration_secs: *duration_secs,
                waveform: waveform.clone(),
                slide_offset: config.slide.track(translation_x),
            },
            vec![EmitUi],
        ),
        (
            Recording {
                recording_id,
                duration_secs,
                waveform,
                ..
            },
            SlideReleased {
                translation_x,
                velocity_x,
            },
        ) => match config.slide.on_release(translation_x, velocity_x) {
            SlideOutcome::Cancel => {
                log::info!("Recording {} cancelled by slide", recording_id);
                (
                    Cancelling {
                        recording_id: *recording_id,
                    },
                    vec![
                        ResetSlide,
                        CancelRecording { session: *recording_id },
                        EmitUi,
                    ],
                )
            }
            SlideOutcome::SpringBack => (
                Recording {
                    recording_id: *recording_id,
                    duration_secs: *duration_secs,
                    waveform: waveform.clone(),
                    slide_offset: 0.0,
                },
                vec![ResetSlide, EmitUi],
            ),
        },
        (Recording { recording_id, .. }, StopPressed) => (
            Completing {
                recording_id: *recording_id,
            },
            vec![
                ResetSlide,
                StopRecording {
                    recording_id: *recording_id,
                },
                EmitUi,
            ],
        ),
        (Recording { recording_id, .. }, CancelPressed) => (
            Cancelling {
                recording_id: *recording_id,
            },
            vec![
                ResetSlide,
                CancelRecording { session: *recording_id },
                EmitUi,
            ],
        ),
        (
            Recording { recording_id, .. },
            AutoStopped {
                recording_id: id,
                result,
            },
        ) if *recording_id == id => finish(result, &config.policy, vec![ResetSlide]),
        (Recording { recording_id, .. }, Teardown) => (
            Idle,
            vec![
                ResetSlide,
                CancelRecording { session: *recording_id },
            ],
        ),

        // -----------------
        // Completing
        // -----------------
        (
            Completing { recording_id },
            StopOk {
                recording_id: id,
                message: Some(message),
            },
        ) if *recording_id == id => finish(Ok(message), &config.policy, Vec::new()),
        // The duration tick got there first; its AutoStopped carries the message.
        (
            Completing { recording_id },
            StopOk {
                recording_id: id,
                message: None,
            },
        ) if *recording_id == id => (state.clone(), vec![]),
        (
            Completing { recording_id },
            AutoStopped {
                recording_id: id,
                result,
            },
        ) if *recording_id == id => finish(result, &config.policy, Vec::new()),
        (
            Completing { recording_id },
            StopFail {
                recording_id: id,
                error,
            },
        ) if *recording_id == id => finish(Err(error), &config.policy, Vec::new()),
        (Completing { .. }, Teardown) => (Idle, vec![]),

        // -----------------
        // Cancelling
        // -----------------
        (Cancelling { recording_id }, CancelDone { session }) if *recording_id == session => {
            (Idle, vec![NotifyCancel, EmitUi])
        }
        (Cancelling { .. }, Teardown) => (Idle, vec![]),

        // -----------------
        // Stale or unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}
