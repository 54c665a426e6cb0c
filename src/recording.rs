//! Recording session controller
//!
//! Owns at most one recording at a time. While a session is active two
//! periodic tasks run beside it: a 1s duration tick that stops the session
//! once `max_duration` is reached, and a 100ms tick that samples the input
//! level into a 50-sample waveform window. Both are cancelled through a
//! shared `CancellationToken` whenever the session ends.
//!
//! The session lock is never held across a device call. A start that is
//! still waiting on permission or the device when `cancel_recording` runs is
//! detected by id when it resumes, and its capture is discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audio::{AudioCaptureDevice, WaveformWindow};
use crate::error::VoiceError;
use crate::message::{RecordingOptions, RecordingStatus, VoiceMessage};
use crate::permission::PermissionGate;

const DURATION_TICK: Duration = Duration::from_secs(1);
const WAVEFORM_TICK: Duration = Duration::from_millis(100);
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Live feedback published while a session runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingUpdate {
    Duration {
        id: Uuid,
        seconds: u64,
    },
    Waveform {
        id: Uuid,
        samples: Vec<f32>,
    },
    /// The duration tick hit `max_duration` and stopped the session.
    AutoStopped {
        id: Uuid,
        result: Result<VoiceMessage, VoiceError>,
    },
}

/// Receiving side of a controller's updates.
///
/// Duration and waveform updates are bounded and dropped when the reader
/// falls behind. `AutoStopped` has its own unbounded channel so the tick
/// task never waits on the reader, and arrives after anything still queued.
pub struct RecordingUpdateReceiver {
    live: mpsc::Receiver<RecordingUpdate>,
    terminal: mpsc::UnboundedReceiver<RecordingUpdate>,
}

impl RecordingUpdateReceiver {
    pub async fn recv(&mut self) -> Option<RecordingUpdate> {
        tokio::select! {
            biased;
            Some(update) = self.live.recv() => Some(update),
            Some(update) = self.terminal.recv() => Some(update),
            else => None,
        }
    }

    pub fn try_recv(&mut self) -> Result<RecordingUpdate, mpsc::error::TryRecvError> {
        match self.live.try_recv() {
            Ok(update) => Ok(update),
            Err(_) => self.terminal.try_recv(),
        }
    }
}

struct ActiveRecording<H> {
    id: Uuid,
    handle: H,
    options: RecordingOptions,
    started_at: Instant,
    duration_secs: u64,
    waveform: WaveformWindow,
    ticks: CancellationToken,
}

enum Session<H> {
    Idle,
    /// Reserved while permission and device start are awaited.
    Starting {
        id: Uuid,
    },
    Active(ActiveRecording<H>),
    /// Auto-stopped and not yet claimed by `stop_recording`. Counts as idle.
    Finished {
        id: Uuid,
        result: Result<VoiceMessage, VoiceError>,
    },
}

impl<H> Session<H> {
    fn is_idle(&self) -> bool {
        matches!(self, Session::Idle | Session::Finished { .. })
    }
}

/// Coordinates exactly one in-flight recording.
pub struct RecordingController<D: AudioCaptureDevice, P: PermissionGate> {
    device: Arc<D>,
    permissions: Arc<P>,
    session: Arc<Mutex<Session<D::Handle>>>,
    updates: mpsc::Sender<RecordingUpdate>,
    terminal: mpsc::UnboundedSender<RecordingUpdate>,
}

impl<D: AudioCaptureDevice, P: PermissionGate> Clone for RecordingController<D, P> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            permissions: self.permissions.clone(),
            session: self.session.clone(),
            updates: self.updates.clone(),
            terminal: self.terminal.clone(),
        }
    }
}

impl<D: AudioCaptureDevice, P: PermissionGate> RecordingController<D, P> {
    /// Create a controller and the receiver for its live updates.
    pub fn new(device: Arc<D>, permissions: Arc<P>) -> (Self, RecordingUpdateReceiver) {
        let (updates, live) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let (terminal, terminal_rx) = mpsc::unbounded_channel();
        let controller = Self {
            device,
            permissions,
            session: Arc::new(Mutex::new(Session::Idle)),
            updates,
            terminal,
        };
        let rx = RecordingUpdateReceiver {
            live,
            terminal: terminal_rx,
        };
        (controller, rx)
    }

    /// Start a new recording and return its session id.
    ///
    /// Fails with `AlreadyActive` while another session is starting or
    /// running, and with `PermissionDenied` if the microphone is refused.
    pub async fn start_recording(&self, options: RecordingOptions) -> Result<Uuid, VoiceError> {
        let id = {
            let mut session = self.session.lock().await;
            if !session.is_idle() {
                log::warn!("start_recording ignored: a recording is already active");
                return Err(VoiceError::AlreadyActive);
            }
            let id = Uuid::new_v4();
            *session = Session::Starting { id };
            id
        };

        let permission = self.permissions.request_microphone().await;
        if !permission.is_granted() {
            log::warn!("Recording {} refused: microphone {:?}", id, permission);
            return Err(self
                .release_reservation(id, VoiceError::PermissionDenied)
                .await);
        }

        if !self.is_starting(id).await {
            log::info!("Recording {} cancelled during permission request", id);
            return Err(VoiceError::Cancelled);
        }

        let handle = match self.device.start(id, options).await {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to start recording {}: {}", id, e);
                return Err(self.release_reservation(id, e.into()).await);
            }
        };

        let ticks = CancellationToken::new();
        {
            let mut session = self.session.lock().await;
            if !matches!(*session, Session::Starting { id: sid } if sid == id) {
                drop(session);
                log::info!("Recording {} cancelled while the device was opening", id);
                if let Err(e) = self.device.discard(handle).await {
                    log::warn!("Failed to discard late capture {}: {}", id, e);
                }
                return Err(VoiceError::Cancelled);
            }
            *session = Session::Active(ActiveRecording {
                id,
                handle,
                options,
                started_at: Instant::now(),
                duration_secs: 0,
                waveform: WaveformWindow::new(),
                ticks: ticks.clone(),
            });
        }

        self.spawn_duration_tick(id, options.max_duration.max(1), ticks.clone());
        self.spawn_waveform_tick(id, ticks);

        log::info!(
            "Recording {} started (max {}s, {:?}, {:?})",
            id,
            options.max_duration,
            options.quality,
            options.format
        );
        Ok(id)
    }

    /// Stop the active recording and return the finished message.
    /// A recording that auto-stopped since the last call is returned here
    /// once. Returns `Ok(None)` when nothing is recording.
    pub async fn stop_recording(&self) -> Result<Option<VoiceMessage>, VoiceError> {
        self.stop_session(None).await
    }

    /// Stop the recording only if `id` is still the active session.
    pub async fn stop_recording_session(
        &self,
        id: Uuid,
    ) -> Result<Option<VoiceMessage>, VoiceError> {
        self.stop_session(Some(id)).await
    }

    /// Drop the active or starting session and any captured audio.
    /// Safe to call when idle.
    pub async fn cancel_recording(&self) {
        let taken = {
            let mut session = self.session.lock().await;
            std::mem::replace(&mut *session, Session::Idle)
        };

        match taken {
            Session::Idle => log::debug!("cancel_recording: nothing to cancel"),
            Session::Starting { id } => {
                log::info!("Recording {} cancelled before it started", id);
            }
            Session::Finished { id, .. } => {
                log::info!("Auto-stopped recording {} discarded unclaimed", id);
            }
            Session::Active(active) => {
                active.ticks.cancel();
                let id = active.id;
                if let Err(e) = self.device.discard(active.handle).await {
                    log::warn!("Failed to discard recording {}: {}", id, e);
                }
                log::info!("Recording {} cancelled", id);
            }
        }
    }

    pub async fn recording_status(&self) -> RecordingStatus {
        let session = self.session.lock().await;
        match &*session {
            Session::Active(active) => RecordingStatus {
                is_recording: true,
                recording_id: Some(active.id),
                duration: active.duration_secs,
            },
            _ => RecordingStatus::default(),
        }
    }

    /// Cancel whatever is in flight. Call when the owning component goes away.
    pub async fn shutdown(&self) {
        self.cancel_recording().await;
    }

    async fn stop_session(
        &self,
        expected: Option<Uuid>,
    ) -> Result<Option<VoiceMessage>, VoiceError> {
        let active = {
            let mut session = self.session.lock().await;
            match std::mem::replace(&mut *session, Session::Idle) {
                Session::Active(active) if expected.map_or(true, |id| id == active.id) => active,
                Session::Finished { id, result } if expected.map_or(true, |e| e == id) => {
                    log::debug!("stop_recording: returning auto-stopped recording {}", id);
                    return result.map(Some);
                }
                other => {
                    *session = other;
                    log::debug!("stop_recording: no matching active recording");
                    return Ok(None);
                }
            }
        };

        active.ticks.cancel();
        let id = active.id;
        let elapsed = active.started_at.elapsed().as_secs_f64();
        let max_duration = active.options.max_duration.max(1) as f64;

        let captured = self.device.stop(active.handle).await.map_err(|e| {
            log::error!("Failed to stop recording {}: {}", id, e);
            VoiceError::from(e)
        })?;

        // Prefer what the encoder measured; fall back to wall-clock time.
        let duration = captured
            .duration
            .unwrap_or_else(|| elapsed.min(max_duration));

        let message = VoiceMessage::new(id.to_string(), captured.uri, duration, captured.size)
            .with_waveform(active.waveform.to_vec());

        log::info!(
            "Recording {} stopped: {:.2}s, {} bytes",
            id,
            message.duration,
            message.size
        );
        Ok(Some(message))
    }

    /// Keep an auto-stopped result for `stop_recording`, unless a new session
    /// has started in the meantime.
    async fn park_finished(&self, id: Uuid, result: Result<VoiceMessage, VoiceError>) {
        let mut session = self.session.lock().await;
        if session.is_idle() {
            *session = Session::Finished { id, result };
        }
    }

    async fn release_reservation(&self, id: Uuid, err: VoiceError) -> VoiceError {
        let mut session = self.session.lock().await;
        if matches!(*session, Session::Starting { id: sid } if sid == id) {
            *session = Session::Idle;
            err
        } else {
            VoiceError::Cancelled
        }
    }

    async fn is_starting(&self, id: Uuid) -> bool {
        let session = self.session.lock().await;
        matches!(*session, Session::Starting { id: sid } if sid == id)
    }

    /// Bump the duration counter of session `id`, if it is still active.
    async fn advance_duration(&self, id: Uuid) -> Option<u64> {
        let mut session = self.session.lock().await;
        match &mut *session {
            Session::Active(active) if active.id == id => {
                active.duration_secs += 1;
                Some(active.duration_secs)
            }
            _ => None,
        }
    }

    /// Append one level sample to session `id`'s waveform.
    async fn sample_waveform(&self, id: Uuid) -> Option<Vec<f32>> {
        let mut session = self.session.lock().await;
        match &mut *session {
            Session::Active(active) if active.id == id => {
                let level = self.device.input_level(&active.handle);
                active.waveform.push(level);
                Some(active.waveform.to_vec())
            }
            _ => None,
        }
    }

    fn publish(&self, update: RecordingUpdate) {
        if let Err(e) = self.updates.try_send(update) {
            log::trace!("Recording update dropped: {}", e);
        }
    }

    fn spawn_duration_tick(&self, id: Uuid, max_duration: u64, ticks: CancellationToken) {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + DURATION_TICK, DURATION_TICK);
            loop {
                tokio::select! {
                    biased;
                    _ = ticks.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(seconds) = controller.advance_duration(id).await else {
                            break;
                        };
                        controller.publish(RecordingUpdate::Duration { id, seconds });

                        if seconds >= max_duration {
                            log::warn!(
                                "Recording {} auto-stopped after {}s (max duration reached)",
                                id,
                                seconds
                            );
                            let result = match controller.stop_session(Some(id)).await {
                                Ok(Some(message)) => Ok(message),
                                Ok(None) => break,
                                Err(e) => Err(e),
                            };
                            controller.park_finished(id, result.clone()).await;
                            let _ = controller
                                .terminal
                                .send(RecordingUpdate::AutoStopped { id, result });
                            break;
                        }
                    }
                }
            }
            log::debug!("Duration tick stopped for recording {}", id);
        });
    }

    fn spawn_waveform_tick(&self, id: Uuid, ticks: CancellationToken) {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + WAVEFORM_TICK, WAVEFORM_TICK);
            loop {
                tokio::select! {
                    biased;
                    _ = ticks.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(samples) = controller.sample_waveform(id).await else {
                            break;
                        };
                        controller.publish(RecordingUpdate::Waveform { id, samples });
                    }
                }
            }
            log::debug!("Waveform tick stopped for recording {}", id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SimulatedCaptureDevice;
    use crate::permission::StaticPermissionGate;

    fn controller(
        device: SimulatedCaptureDevice,
    ) -> (
        RecordingController<SimulatedCaptureDevice, StaticPermissionGate>,
        RecordingUpdateReceiver,
        Arc<SimulatedCaptureDevice>,
    ) {
        let device = Arc::new(device);
        let (controller, rx) =
            RecordingController::new(device.clone(), Arc::new(StaticPermissionGate::granted()));
        (controller, rx, device)
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_and_first_survives() {
        let (controller, _rx, _device) = controller(SimulatedCaptureDevice::new());
        let first = controller
            .start_recording(RecordingOptions::default())
            .await
            .unwrap();

        let second = controller.start_recording(RecordingOptions::default()).await;
        assert_eq!(second, Err(VoiceError::AlreadyActive));

        let status = controller.recording_status().await;
        assert!(status.is_recording);
        assert_eq!(status.recording_id, Some(first));
    }

    #[tokio::test(start_paused = true)]
    async fn denied_permission_leaves_controller_idle() {
        let device = Arc::new(SimulatedCaptureDevice::new());
        let gate = Arc::new(StaticPermissionGate::denied());
        let (controller, _rx) = RecordingController::new(device.clone(), gate.clone());

        let result = controller.start_recording(RecordingOptions::default()).await;
        assert_eq!(result, Err(VoiceError::PermissionDenied));
        assert_eq!(gate.request_count(), 1);
        assert_eq!(device.active_captures(), 0);
        assert!(!controller.recording_status().await.is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_then_stop_returns_none() {
        let (controller, _rx, device) = controller(SimulatedCaptureDevice::new());
        controller
            .start_recording(RecordingOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        controller.cancel_recording().await;
        assert_eq!(controller.stop_recording().await, Ok(None));
        assert_eq!(device.discarded_captures(), 1);
        assert_eq!(device.active_captures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_when_idle_is_harmless() {
        let (controller, _rx, _device) = controller(SimulatedCaptureDevice::new());
        controller.cancel_recording().await;
        controller.cancel_recording().await;
        assert_eq!(controller.stop_recording().await, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_produces_message_with_bounded_waveform() {
        let (controller, _rx, _device) = controller(SimulatedCaptureDevice::new());
        let id = controller
            .start_recording(RecordingOptions::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10_050)).await;
        assert_eq!(controller.recording_status().await.duration, 10);

        let message = controller.stop_recording().await.unwrap().unwrap();
        assert_eq!(message.id, id.to_string());
        assert_eq!(message.waveform.as_ref().map(Vec::len), Some(50));
        assert!((message.duration - 10.05).abs() < 1e-6);
        assert!(message.size > 0);
        assert!(!controller.recording_status().await.is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_stop_after_stop() {
        let (controller, mut rx, _device) = controller(SimulatedCaptureDevice::new());
        controller
            .start_recording(RecordingOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1_050)).await;
        controller.stop_recording().await.unwrap();

        // Drain what was published while recording.
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err(), "no updates after the session ended");
    }

    #[tokio::test(start_paused = true)]
    async fn device_stop_failure_resets_to_idle() {
        let (controller, _rx, device) = controller(SimulatedCaptureDevice::new());
        controller
            .start_recording(RecordingOptions::default())
            .await
            .unwrap();
        device.fail_next_stop(true);

        let result = controller.stop_recording().await;
        assert!(matches!(result, Err(VoiceError::OperationFailed(_))));
        assert!(!controller.recording_status().await.is_recording);

        // A fresh session can start right away.
        assert!(controller
            .start_recording(RecordingOptions::default())
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn device_start_failure_releases_reservation() {
        let (controller, _rx, device) = controller(SimulatedCaptureDevice::new());
        device.fail_next_start(true);

        let result = controller.start_recording(RecordingOptions::default()).await;
        assert!(matches!(result, Err(VoiceError::OperationFailed(_))));
        assert!(controller
            .start_recording(RecordingOptions::default())
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_slow_start_discards_late_capture() {
        let (controller, _rx, device) =
            controller(SimulatedCaptureDevice::with_start_latency(Duration::from_millis(500)));

        let starter = controller.clone();
        let start = tokio::spawn(async move {
            starter
                .start_recording(RecordingOptions::default())
                .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.cancel_recording().await;

        assert_eq!(start.await.unwrap(), Err(VoiceError::Cancelled));
        assert!(!controller.recording_status().await.is_recording);
        assert_eq!(device.active_captures(), 0);
        assert_eq!(device.discarded_captures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_stop_at_max_duration() {
        let (controller, mut rx, _device) = controller(SimulatedCaptureDevice::new());
        let id = controller
            .start_recording(RecordingOptions {
                max_duration: 3,
                ..RecordingOptions::default()
            })
            .await
            .unwrap();

        let message = loop {
            match rx.recv().await {
                Some(RecordingUpdate::AutoStopped { id: sid, result }) => {
                    assert_eq!(sid, id);
                    break result.unwrap();
                }
                Some(_) => continue,
                None => panic!("update channel closed"),
            }
        };

        assert!(message.duration <= 3.0);
        assert!(!controller.recording_status().await.is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_stopped_recording_is_claimed_by_stop_without_draining() {
        let (controller, mut rx, device) = controller(SimulatedCaptureDevice::new());
        let id = controller
            .start_recording(RecordingOptions {
                max_duration: 10,
                ..RecordingOptions::default()
            })
            .await
            .unwrap();

        // 100 waveform ticks against a 64-slot channel nobody reads
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(!controller.recording_status().await.is_recording);
        assert_eq!(device.active_captures(), 0);

        let message = controller.stop_recording().await.unwrap().unwrap();
        assert_eq!(message.id, id.to_string());
        assert_eq!(message.duration, 10.0);
        assert!(controller.stop_recording().await.unwrap().is_none());

        let mut last = None;
        while let Ok(update) = rx.try_recv() {
            last = Some(update);
        }
        assert!(matches!(
            last,
            Some(RecordingUpdate::AutoStopped { id: sid, result: Ok(_) }) if sid == id
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unclaimed_auto_stop_does_not_block_next_start() {
        let (controller, _rx, _device) = controller(SimulatedCaptureDevice::new());
        let options = RecordingOptions {
            max_duration: 2,
            ..RecordingOptions::default()
        };
        let first = controller.start_recording(options).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        let second = controller.start_recording(options).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(
            controller.recording_status().await.recording_id,
            Some(second)
        );

        controller.cancel_recording().await;
        assert!(controller.stop_recording().await.unwrap().is_none());
    }
}
