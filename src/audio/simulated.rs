//! Simulated audio backends
//!
//! Stand-ins for the platform bindings. They keep the same timing contract
//! as real devices (async start/stop, optional latency) and can be told to
//! fail, which the controller tests rely on.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use super::{AudioCaptureDevice, AudioError, AudioPlayer, CapturedAudio};
use crate::message::RecordingOptions;

/// Handle for a simulated capture.
#[derive(Debug)]
pub struct SimulatedCapture {
    recording_id: Uuid,
    options: RecordingOptions,
    started_at: Instant,
    level_reads: AtomicU32,
}

/// Capture device that fabricates levels and sizes from elapsed time.
#[derive(Debug, Default)]
pub struct SimulatedCaptureDevice {
    start_latency: Duration,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    active: AtomicUsize,
    discarded: AtomicUsize,
}

impl SimulatedCaptureDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay `start` by `latency`, like a device that takes time to open.
    pub fn with_start_latency(latency: Duration) -> Self {
        Self {
            start_latency: latency,
            ..Self::default()
        }
    }

    pub fn fail_next_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Captures started and not yet stopped or discarded.
    pub fn active_captures(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn discarded_captures(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }
}

impl AudioCaptureDevice for SimulatedCaptureDevice {
    type Handle = SimulatedCapture;

    async fn start(
        &self,
        recording_id: Uuid,
        options: RecordingOptions,
    ) -> Result<SimulatedCapture, AudioError> {
        if !self.start_latency.is_zero() {
            tokio::time::sleep(self.start_latency).await;
        }
        if self.fail_start.swap(false, Ordering::SeqCst) {
            return Err(AudioError::StreamCreationFailed(
                "simulated start failure".to_string(),
            ));
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        log::info!("Simulated capture started: {}", recording_id);
        Ok(SimulatedCapture {
            recording_id,
            options,
            started_at: Instant::now(),
            level_reads: AtomicU32::new(0),
        })
    }

    fn input_level(&self, handle: &SimulatedCapture) -> f32 {
        let n = handle.level_reads.fetch_add(1, Ordering::Relaxed);
        0.2 + 0.6 * ((n as f32) * 0.7).sin().abs()
    }

    async fn stop(&self, handle: SimulatedCapture) -> Result<CapturedAudio, AudioError> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail_stop.swap(false, Ordering::SeqCst) {
            return Err(AudioError::WriteFailed("simulated stop failure".to_string()));
        }

        let elapsed = handle.started_at.elapsed().as_secs_f64();
        let size = (elapsed * handle.options.quality.bitrate_bps() as f64 / 8.0) as u64;
        let uri = format!(
            "sim://voice-messages/{}.{}",
            handle.recording_id,
            handle.options.format.extension()
        );
        log::info!("Simulated capture stopped: {} ({} bytes)", uri, size);

        Ok(CapturedAudio {
            uri,
            duration: None,
            size,
        })
    }

    async fn discard(&self, handle: SimulatedCapture) -> Result<(), AudioError> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.discarded.fetch_add(1, Ordering::SeqCst);
        log::debug!("Simulated capture discarded: {}", handle.recording_id);
        Ok(())
    }
}

/// Calls received by a `SimulatedPlayer`, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    Play { uri: String, from: f64 },
    Pause,
    Seek(f64),
    Stop,
}

/// Player that records every call instead of producing sound.
#[derive(Debug, Default)]
pub struct SimulatedPlayer {
    play_latency: Duration,
    fail_play: AtomicBool,
    calls: Mutex<Vec<PlayerCall>>,
}

impl SimulatedPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_play_latency(latency: Duration) -> Self {
        Self {
            play_latency: latency,
            ..Self::default()
        }
    }

    pub fn fail_next_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: PlayerCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl AudioPlayer for SimulatedPlayer {
    async fn play(&self, uri: &str, from: f64) -> Result<(), AudioError> {
        self.record(PlayerCall::Play {
            uri: uri.to_string(),
            from,
        });
        if !self.play_latency.is_zero() {
            tokio::time::sleep(self.play_latency).await;
        }
        if self.fail_play.swap(false, Ordering::SeqCst) {
            return Err(AudioError::PlaybackFailed(format!("cannot open {}", uri)));
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), AudioError> {
        self.record(PlayerCall::Pause);
        Ok(())
    }

    async fn seek(&self, position: f64) -> Result<(), AudioError> {
        self.record(PlayerCall::Seek(position));
        Ok(())
    }

    async fn stop(&self) -> Result<(), AudioError> {
        self.record(PlayerCall::Stop);
        Ok(())
    }
}
