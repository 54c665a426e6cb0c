//! Scripted walk through one voice message: record, send, play back.
//!
//! Uses the simulated backends unless built with `native-audio`, in which
//! case capture goes through the default input device.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use voicenote::audio::{AudioCaptureDevice, SimulatedPlayer};
use voicenote::settings::default_settings_path;
use voicenote::ui::{
    forward_recording_updates, run_recorder_loop, ControllerEffectRunner, PlayerView,
    RecorderCallbacks, RecorderEvent, RecorderHandle, RecorderUi,
};
use voicenote::{
    load_settings, PermissionPrompt, PlaybackUpdate, ServiceUpdates, StaticPermissionGate,
    VoiceMessage, VoiceMessageService, VoiceSettings,
};

/// How long the scripted user holds the conversation open before tapping send.
const DEMO_RECORD_TIME: Duration = Duration::from_millis(2500);

#[derive(Default)]
struct DemoCallbacks {
    completed: Option<VoiceMessage>,
}

impl RecorderCallbacks for DemoCallbacks {
    fn on_recording_complete(&mut self, message: VoiceMessage) {
        log::info!(
            "Recording complete: {} ({:.1}s, {} bytes)",
            message.id,
            message.duration,
            message.size
        );
        self.completed = Some(message);
    }

    fn on_cancel(&mut self) {
        log::info!("Recording cancelled");
    }

    fn on_permission_required(&mut self, prompt: &PermissionPrompt) {
        log::warn!(
            "{}: {} ({})",
            prompt.title,
            prompt.message,
            prompt.settings_url.as_deref().unwrap_or("no settings link")
        );
    }

    fn on_error(&mut self, message: &str) {
        log::error!("{}", message);
    }

    fn on_ui(&mut self, ui: &RecorderUi) {
        match serde_json::to_string(ui) {
            Ok(json) => log::debug!("ui: {}", json),
            Err(e) => log::warn!("Failed to serialize recorder ui: {}", e),
        }
    }
}

async fn run_demo<D: AudioCaptureDevice>(device: Arc<D>, settings: VoiceSettings) {
    let permissions = Arc::new(StaticPermissionGate::granted());
    let player = Arc::new(SimulatedPlayer::new());
    let (service, updates) =
        VoiceMessageService::new(device, permissions, player, settings.validation);
    let ServiceUpdates {
        recording,
        mut playback,
    } = updates;

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(forward_recording_updates(recording, tx.clone()));

    let handle = RecorderHandle::new(tx.clone());
    tokio::spawn(async move {
        let script = [
            (Duration::ZERO, RecorderEvent::MicPressed),
            (
                DEMO_RECORD_TIME,
                RecorderEvent::SlideMoved {
                    translation_x: -40.0,
                },
            ),
            (
                Duration::from_millis(100),
                RecorderEvent::SlideReleased {
                    translation_x: -40.0,
                    velocity_x: -120.0,
                },
            ),
            (Duration::from_millis(100), RecorderEvent::StopPressed),
            (Duration::from_millis(300), RecorderEvent::Teardown),
        ];
        for (delay, event) in script {
            tokio::time::sleep(delay).await;
            if handle.send(event).await.is_err() {
                log::warn!("Recorder loop closed before the script finished");
                break;
            }
        }
    });

    let runner = ControllerEffectRunner::new(service.recording().clone());
    let mut callbacks = DemoCallbacks::default();
    let final_state =
        run_recorder_loop(rx, tx, runner, &mut callbacks, settings.recorder_config()).await;
    log::debug!("Recorder finished in {:?}", final_state);

    let Some(message) = callbacks.completed else {
        log::warn!("Nothing recorded, skipping playback");
        service.shutdown().await;
        return;
    };

    match serde_json::to_string_pretty(&message) {
        Ok(json) => println!("{}", json),
        Err(e) => log::warn!("Failed to serialize voice message: {}", e),
    }

    if let Err(e) = service.play_voice_message(message.clone()).await {
        log::error!("Playback failed: {}", e.user_message());
        service.shutdown().await;
        return;
    }

    while let Some(update) = playback.recv().await {
        match update {
            PlaybackUpdate::Position { .. } => {
                let view = PlayerView::new(&message, &service.playback_status().await);
                log::debug!("{} / {}", view.elapsed_label, view.duration_label);
            }
            PlaybackUpdate::Finished { id } => {
                log::info!("Playback of {} finished", id);
                break;
            }
        }
    }

    service.shutdown().await;
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = default_settings_path()
        .map(|path| load_settings(&path))
        .unwrap_or_default();
    log::info!(
        "Max duration {}s, quality {:?}, format {:?}",
        settings.max_duration_secs,
        settings.quality,
        settings.format
    );

    #[cfg(feature = "native-audio")]
    {
        match voicenote::audio::CpalCaptureDevice::new() {
            Ok(device) => run_demo(Arc::new(device), settings).await,
            Err(e) => log::error!("Audio device unavailable: {}", e),
        }
    }

    #[cfg(not(feature = "native-audio"))]
    run_demo(
        Arc::new(voicenote::audio::SimulatedCaptureDevice::new()),
        settings,
    )
    .await;
}
