//! Integration tests for voice message sessions
//!
//! Everything runs on the simulated backends with a paused clock, so the
//! 300 second scenarios finish instantly.
//!
//! ```bash
//! cargo test --test voice_session_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use voicenote::audio::simulated::PlayerCall;
use voicenote::audio::{SimulatedCaptureDevice, SimulatedPlayer};
use voicenote::ui::{
    forward_recording_updates, run_recorder_loop, ControllerEffectRunner, RecorderCallbacks,
    RecorderConfig, RecorderEvent, RecorderHandle, RecorderState, RecorderUi,
};
use voicenote::{
    PermissionPrompt, PlaybackUpdate, Platform, RecordingOptions, StaticPermissionGate,
    ValidationError, ValidationPolicy, VoiceError, VoiceMessage, VoiceMessageService,
};

type Service = VoiceMessageService<SimulatedCaptureDevice, StaticPermissionGate, SimulatedPlayer>;

/// Records everything the recorder loop reports to the host.
#[derive(Default)]
struct Collected {
    completed: Vec<VoiceMessage>,
    cancels: usize,
    permission_prompts: Vec<PermissionPrompt>,
    errors: Vec<String>,
    slide_resets: usize,
    last_ui: Option<RecorderUi>,
}

impl RecorderCallbacks for Collected {
    fn on_recording_complete(&mut self, message: VoiceMessage) {
        self.completed.push(message);
    }

    fn on_cancel(&mut self) {
        self.cancels += 1;
    }

    fn on_permission_required(&mut self, prompt: &PermissionPrompt) {
        self.permission_prompts.push(prompt.clone());
    }

    fn on_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn on_slide_reset(&mut self) {
        self.slide_resets += 1;
    }

    fn on_ui(&mut self, ui: &RecorderUi) {
        self.last_ui = Some(ui.clone());
    }
}

struct Widget {
    handle: RecorderHandle,
    device: Arc<SimulatedCaptureDevice>,
    service: Service,
    task: JoinHandle<(RecorderState, Collected)>,
}

impl Widget {
    fn spawn(permissions: StaticPermissionGate) -> Self {
        Self::spawn_with(permissions, RecorderConfig::default())
    }

    fn spawn_with(permissions: StaticPermissionGate, config: RecorderConfig) -> Self {
        let device = Arc::new(SimulatedCaptureDevice::new());
        let (service, updates) = VoiceMessageService::new(
            device.clone(),
            Arc::new(permissions),
            Arc::new(SimulatedPlayer::new()),
            ValidationPolicy::default(),
        );

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(forward_recording_updates(updates.recording, tx.clone()));

        let runner = ControllerEffectRunner::new(service.recording().clone());
        let handle = RecorderHandle::new(tx.clone());
        let task = tokio::spawn(async move {
            let mut collected = Collected::default();
            let state = run_recorder_loop(rx, tx, runner, &mut collected, config).await;
            (state, collected)
        });

        Self {
            handle,
            device,
            service,
            task,
        }
    }

    async fn send(&self, event: RecorderEvent) {
        self.handle.send(event).await.unwrap();
    }

    async fn finish(self) -> (RecorderState, Collected, Arc<SimulatedCaptureDevice>, Service) {
        self.send(RecorderEvent::Teardown).await;
        let (state, collected) = self.task.await.unwrap();
        (state, collected, self.device, self.service)
    }
}

async fn sleep(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

// ============================================================================
// Recorder widget
// ============================================================================

#[tokio::test(start_paused = true)]
async fn tap_record_then_send_completes_with_waveform() {
    let widget = Widget::spawn(StaticPermissionGate::granted());

    widget.send(RecorderEvent::MicPressed).await;
    sleep(3_000).await;
    widget.send(RecorderEvent::StopPressed).await;
    sleep(100).await;

    let (state, collected, device, service) = widget.finish().await;
    assert_eq!(state, RecorderState::Idle);
    assert_eq!(collected.completed.len(), 1);
    assert_eq!(collected.cancels, 0);
    assert!(collected.errors.is_empty());

    let message = &collected.completed[0];
    assert!((message.duration - 3.0).abs() < 0.5, "{}", message.duration);
    let waveform = message.waveform.as_ref().unwrap();
    assert!(!waveform.is_empty() && waveform.len() <= 50);
    assert!(waveform.iter().all(|v| (0.0..=1.0).contains(v)));

    assert_eq!(device.active_captures(), 0);
    assert!(!service.recording_status().await.is_recording);
}

#[tokio::test(start_paused = true)]
async fn slide_past_threshold_cancels_and_discards() {
    let widget = Widget::spawn(StaticPermissionGate::granted());

    widget.send(RecorderEvent::MicPressed).await;
    sleep(1_000).await;
    widget
        .send(RecorderEvent::SlideMoved {
            translation_x: -150.0,
        })
        .await;
    widget
        .send(RecorderEvent::SlideReleased {
            translation_x: -150.0,
            velocity_x: 0.0,
        })
        .await;
    sleep(100).await;

    let (state, collected, device, _service) = widget.finish().await;
    assert_eq!(state, RecorderState::Idle);
    assert!(collected.completed.is_empty());
    assert_eq!(collected.cancels, 1);
    assert!(collected.slide_resets >= 1);
    assert_eq!(collected.last_ui, Some(RecorderUi::Idle));
    assert_eq!(device.discarded_captures(), 1);
    assert_eq!(device.active_captures(), 0);
}

#[tokio::test(start_paused = true)]
async fn short_slide_springs_back_and_keeps_recording() {
    let widget = Widget::spawn(StaticPermissionGate::granted());

    widget.send(RecorderEvent::MicPressed).await;
    sleep(1_500).await;
    widget
        .send(RecorderEvent::SlideReleased {
            translation_x: -60.0,
            velocity_x: -100.0,
        })
        .await;
    sleep(1_000).await;
    assert!(widget.service.recording_status().await.is_recording);

    widget.send(RecorderEvent::StopPressed).await;
    sleep(100).await;

    let (_state, collected, _device, _service) = widget.finish().await;
    assert_eq!(collected.completed.len(), 1);
    assert_eq!(collected.cancels, 0);
}

#[tokio::test(start_paused = true)]
async fn denied_permission_asks_host_to_prompt() {
    let config = RecorderConfig {
        permission_prompt: PermissionPrompt::for_platform(Platform::Ios, "org.teacherhub.app"),
        ..RecorderConfig::default()
    };
    let widget = Widget::spawn_with(StaticPermissionGate::denied(), config);

    widget.send(RecorderEvent::MicPressed).await;
    sleep(100).await;

    let (state, collected, device, service) = widget.finish().await;
    assert_eq!(state, RecorderState::Idle);
    assert_eq!(collected.permission_prompts.len(), 1);
    assert_eq!(
        collected.permission_prompts[0].settings_url.as_deref(),
        Some("app-settings:")
    );
    assert!(collected.completed.is_empty());
    assert_eq!(device.active_captures(), 0);
    assert!(!service.recording_status().await.is_recording);
}

#[tokio::test(start_paused = true)]
async fn too_short_recording_is_rejected_as_cancel() {
    let widget = Widget::spawn(StaticPermissionGate::granted());

    widget.send(RecorderEvent::MicPressed).await;
    sleep(500).await;
    widget.send(RecorderEvent::StopPressed).await;
    sleep(100).await;

    let (_state, collected, _device, _service) = widget.finish().await;
    assert!(collected.completed.is_empty());
    assert_eq!(collected.cancels, 1);
    assert_eq!(collected.errors.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unattended_recording_auto_stops_at_five_minutes() {
    let widget = Widget::spawn(StaticPermissionGate::granted());

    widget.send(RecorderEvent::MicPressed).await;
    sleep(301_000).await;

    assert!(!widget.service.recording_status().await.is_recording);

    let (state, collected, device, _service) = widget.finish().await;
    assert_eq!(state, RecorderState::Idle);
    assert_eq!(collected.completed.len(), 1);

    let message = &collected.completed[0];
    assert!(message.duration <= 300.0, "{}", message.duration);
    assert!(message.duration >= 299.0, "{}", message.duration);
    assert!(message.waveform.as_ref().unwrap().len() <= 50);
    assert_eq!(device.active_captures(), 0);
}

// ============================================================================
// Service
// ============================================================================

fn service() -> (Service, voicenote::ServiceUpdates, Arc<SimulatedPlayer>) {
    let player = Arc::new(SimulatedPlayer::new());
    let (service, updates) = VoiceMessageService::new(
        Arc::new(SimulatedCaptureDevice::new()),
        Arc::new(StaticPermissionGate::granted()),
        player.clone(),
        ValidationPolicy::default(),
    );
    (service, updates, player)
}

#[tokio::test(start_paused = true)]
async fn record_finish_and_play_back() {
    let (service, mut updates, player) = service();

    service
        .start_recording(RecordingOptions::default())
        .await
        .unwrap();
    sleep(2_000).await;
    let message = service.finish_recording().await.unwrap().unwrap();
    assert!(service.validate_voice_message(&message).is_ok());

    service.play_voice_message(message.clone()).await.unwrap();
    assert!(service.playback_status().await.is_playing);

    let mut positions = 0;
    while let Some(update) = updates.playback.recv().await {
        match update {
            PlaybackUpdate::Position { id, .. } => {
                assert_eq!(id, message.id);
                positions += 1;
            }
            PlaybackUpdate::Finished { id } => {
                assert_eq!(id, message.id);
                break;
            }
        }
    }
    assert!(positions > 0);

    let status = service.playback_status().await;
    assert!(!status.is_playing);
    assert_eq!(player.calls().last(), Some(&PlayerCall::Stop));
}

#[tokio::test(start_paused = true)]
async fn finish_recording_rejects_too_short() {
    let (service, _updates, _player) = service();

    service
        .start_recording(RecordingOptions::default())
        .await
        .unwrap();
    sleep(400).await;

    assert_eq!(
        service.finish_recording().await,
        Err(VoiceError::ValidationFailed(ValidationError::TooShort))
    );
    assert!(!service.recording_status().await.is_recording);
}

#[tokio::test(start_paused = true)]
async fn five_second_message_stops_itself() {
    let (service, mut updates, _player) = service();
    let message = VoiceMessage::new("msg-5", "sim://voice-messages/msg-5.m4a", 5.0, 80_000);

    let started = tokio::time::Instant::now();
    service.play_voice_message(message).await.unwrap();

    loop {
        match updates.playback.recv().await {
            Some(PlaybackUpdate::Finished { id }) => {
                assert_eq!(id, "msg-5");
                break;
            }
            Some(_) => {}
            None => panic!("playback updates closed early"),
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    assert!((elapsed - 5.0).abs() < 0.2, "{}", elapsed);
    assert!(!service.playback_status().await.is_playing);
}

#[tokio::test(start_paused = true)]
async fn second_start_is_refused_while_recording() {
    let (service, _updates, _player) = service();

    service
        .start_recording(RecordingOptions::default())
        .await
        .unwrap();
    assert_eq!(
        service.start_recording(RecordingOptions::default()).await,
        Err(VoiceError::AlreadyActive)
    );

    service.cancel_recording().await;
    assert!(service.stop_recording().await.unwrap().is_none());
    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn polling_caller_collects_auto_stopped_recording() {
    let (service, _updates, _player) = service();

    service
        .start_recording(RecordingOptions {
            max_duration: 20,
            ..RecordingOptions::default()
        })
        .await
        .unwrap();
    // Nobody reads the update channels; the caller only polls status.
    sleep(25_000).await;
    assert!(!service.recording_status().await.is_recording);

    let message = service.finish_recording().await.unwrap().unwrap();
    assert_eq!(message.duration, 20.0);
    assert!(service.finish_recording().await.unwrap().is_none());
}
